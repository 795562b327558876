//
// Copyright (c) 2025 Nathan Fiedler
//
use cdcdedup::HashAlgorithm;
use cdcdedup::chunker::{AsyncStreamChunker, ChunkSizer};
use clap::{Arg, arg, command, value_parser};
use tokio::fs::File;
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() {
    let matches = command!("Example of using the asynchronous streaming chunker.")
        .about("Finds the content-defined chunk boundaries of a file.")
        .arg(
            arg!(
                -s --size <SIZE> "The desired average size of the chunks."
            )
            .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("INPUT")
                .help("Sets the input file to use")
                .required(true)
                .index(1),
        )
        .get_matches();
    let size = matches.get_one::<u32>("size").unwrap_or(&65536);
    let avg_size = *size;
    let filename = matches.get_one::<String>("INPUT").unwrap();
    let file = File::open(filename).await.expect("cannot open file!");
    let sizer = ChunkSizer::new(avg_size / 4, avg_size, avg_size * 4);
    let mut chunker = AsyncStreamChunker::new(file, sizer);
    let mut stream = Box::pin(chunker.as_stream());
    while let Some(result) = stream.next().await {
        let entry = result.expect("failed to read chunk");
        let digest = HashAlgorithm::Blake3.hash_hex(&entry.data);
        println!(
            "hash={} offset={} size={}",
            digest, entry.offset, entry.length
        );
    }
}
