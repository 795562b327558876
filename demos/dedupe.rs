//
// Copyright (c) 2025 Nathan Fiedler
//
use cdcdedup::chunker::Chunker;
use cdcdedup::{DedupOptions, DeduplicationEngine};
use clap::{Arg, ArgAction, arg, command, value_parser};
use memmap2::Mmap;
use std::fs::File;

fn main() {
    let matches = command!("Example of deduplicating files with cdcdedup.")
        .about("Splits files into chunks, hashes them and reports the savings.")
        .arg(
            arg!(
                -s --size <SIZE> "The desired average size of the chunks."
            )
            .value_parser(value_parser!(u32)),
        )
        .arg(
            arg!(
                -a --algorithm <NAME> "The chunk hash algorithm, e.g. SHA256 or BLAKE3."
            )
            .value_parser(value_parser!(String)),
        )
        .arg(arg!(-f --fixed "Use fixed-size chunks instead of content defined chunks."))
        .arg(arg!(-v --verbose "Print the boundaries of every chunk."))
        .arg(
            Arg::new("INPUT")
                .help("Sets the input files to use")
                .required(true)
                .action(ArgAction::Append)
                .index(1),
        )
        .get_matches();
    let size = matches.get_one::<u32>("size").unwrap_or(&65536);
    let avg_size = *size;
    let mut options = if matches.get_flag("fixed") {
        DedupOptions::fixed(avg_size)
    } else {
        DedupOptions::variable(avg_size / 4, avg_size, avg_size * 4)
    };
    if let Some(name) = matches.get_one::<String>("algorithm") {
        options = options
            .with_hash_algorithm_name(name)
            .expect("unsupported algorithm");
    }
    let filenames: Vec<&String> = matches.get_many::<String>("INPUT").unwrap().collect();
    let mut engine = DeduplicationEngine::new(options).expect("invalid chunk size");

    if matches.get_flag("verbose") {
        let sizer = engine.options().sizer();
        for filename in &filenames {
            let file = File::open(filename).expect("cannot open file!");
            let mmap = unsafe { Mmap::map(&file).expect("cannot create mmap?") };
            println!("{filename}");
            for entry in Chunker::new(&mmap[..], sizer) {
                let end = entry.offset + entry.length;
                let digest = engine.calculate_chunk_hash(&mmap[entry.offset..end]);
                println!(
                    "hash={} offset={} size={}",
                    digest, entry.offset, entry.length
                );
            }
        }
    }

    let result = engine
        .deduplicate_files(&filenames)
        .expect("deduplication cancelled");
    for skipped in &result.skipped_files {
        eprintln!("skipped {}: {}", skipped.path.display(), skipped.error);
    }
    for stats in &result.files {
        println!(
            "file={} size={} chunks={} new={} saved={}",
            stats.path.display(),
            stats.size,
            stats.chunks,
            stats.new_chunks,
            stats.saved_bytes
        );
    }
    println!(
        "total={} unique={} duplicate={} original={} deduplicated={} ratio={:.2}%",
        result.total_chunks,
        result.unique_chunks,
        result.duplicate_chunks,
        result.original_size,
        result.deduplicated_size,
        result.deduplication_ratio * 100.0
    );
}
