//
// Copyright (c) 2025 Nathan Fiedler
//

use super::*;

#[cfg(all(feature = "futures", not(feature = "tokio")))]
use futures::{
    io::{AsyncRead, AsyncReadExt},
    stream::Stream,
};

#[cfg(all(feature = "tokio", not(feature = "futures")))]
use tokio_stream::Stream;

#[cfg(all(feature = "tokio", not(feature = "futures")))]
use tokio::io::{AsyncRead, AsyncReadExt};

#[cfg(all(feature = "tokio", not(feature = "futures")))]
use async_stream::try_stream;

///
/// An async-streamable version of the [`StreamChunker`].
///
/// Use `new` to construct an instance, and then
/// [`as_stream`](AsyncStreamChunker::as_stream) to produce an async [Stream]
/// of the chunks.
///
/// Both `futures` and `tokio`-based [AsyncRead] inputs are supported via
/// feature flags, which are mutually exclusive.
///
/// Note that this struct allocates a [`Vec<u8>`] of `max_size` bytes to act as
/// a buffer when reading from the source and finding chunk boundaries.
///
/// ```no_run
/// # use cdcdedup::chunker::{AsyncStreamChunker, ChunkSizer};
/// # #[cfg(all(feature = "futures", not(feature = "tokio")))]
/// # use futures::stream::StreamExt;
/// # #[cfg(all(feature = "tokio", not(feature = "futures")))]
/// # use tokio_stream::StreamExt;
///
/// async fn run() {
///     let source = std::fs::read("disk.img").unwrap();
///     let sizer = ChunkSizer::new(16384, 65536, 262144);
///     let mut chunker = AsyncStreamChunker::new(source.as_slice(), sizer);
///     let stream = chunker.as_stream();
///
///     let chunks = stream.collect::<Vec<_>>().await;
///
///     for result in chunks {
///         let chunk = result.unwrap();
///         println!("offset={} length={}", chunk.offset, chunk.length);
///     }
/// }
/// ```
///
pub struct AsyncStreamChunker<R> {
    /// Buffer of data from source for finding cut points.
    buffer: Vec<u8>,
    /// Maximum capacity of the buffer (always `max_size`).
    capacity: usize,
    /// Number of relevant bytes in the `buffer`.
    length: usize,
    /// Source from which data is read into `buffer`.
    source: R,
    /// Number of bytes read from the source so far.
    processed: u64,
    /// True when the source produces no more data.
    eof: bool,
    sizer: ChunkSizer,
}

impl<R: AsyncRead + Unpin> AsyncStreamChunker<R> {
    ///
    /// Construct an [`AsyncStreamChunker`] that will process bytes from the
    /// given source.
    ///
    pub fn new(source: R, sizer: ChunkSizer) -> Self {
        Self {
            buffer: vec![0_u8; sizer.max_size],
            capacity: sizer.max_size,
            length: 0,
            source,
            eof: false,
            processed: 0,
            sizer,
        }
    }

    /// Fill the buffer with data from the source, returning the number of bytes
    /// read (zero if end of source has been reached).
    async fn fill_buffer(&mut self) -> Result<usize> {
        if self.eof {
            Ok(0)
        } else {
            let mut all_bytes_read = 0;
            while !self.eof && self.length < self.capacity {
                let bytes_read = match self.source.read(&mut self.buffer[self.length..]).await {
                    Ok(n) => n,
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e.into()),
                };
                if bytes_read == 0 {
                    self.eof = true;
                } else {
                    self.length += bytes_read;
                    all_bytes_read += bytes_read;
                }
            }
            Ok(all_bytes_read)
        }
    }

    /// Drains a specified number of bytes from the buffer, then resizes the
    /// buffer back to `capacity` size in preparation for further reads.
    fn drain_bytes(&mut self, count: usize) -> Vec<u8> {
        debug_assert!(count <= self.length);
        let data = self.buffer.drain(..count).collect::<Vec<u8>>();
        self.length -= count;
        self.buffer.resize(self.capacity, 0_u8);
        data
    }

    /// Find the next chunk in the source, `None` once the source is exhausted.
    async fn read_chunk(&mut self) -> Result<Option<ChunkData>> {
        self.fill_buffer().await?;
        if self.length == 0 {
            return Ok(None);
        }
        let (hash, count) = cut(&self.buffer[..self.length], &self.sizer);
        if count == 0 {
            Ok(None)
        } else {
            let offset = self.processed;
            self.processed += count as u64;
            let data = self.drain_bytes(count);
            Ok(Some(ChunkData {
                hash,
                offset,
                length: count,
                data,
            }))
        }
    }

    #[cfg(all(feature = "tokio", not(feature = "futures")))]
    pub fn as_stream(&mut self) -> impl Stream<Item = Result<ChunkData>> + '_ {
        try_stream! {
            while let Some(chunk) = self.read_chunk().await? {
                yield chunk;
            }
        }
    }

    #[cfg(all(feature = "futures", not(feature = "tokio")))]
    pub fn as_stream(&mut self) -> impl Stream<Item = Result<ChunkData>> + '_ {
        futures::stream::unfold(self, |this| async move {
            this.read_chunk()
                .await
                .transpose()
                .map(|chunk| (chunk, this))
        })
    }
}
