//
// Copyright (c) 2025 Nathan Fiedler
//

//! This module implements the content defined chunking used by the
//! deduplication engine, a Rabin-like windowed polynomial rolling hash.
//!
//! A rolling hash is maintained over a sliding window of `window_size` bytes
//! (48 by default), advancing by one byte at a time: `hash = hash * 31 + in`,
//! minus the contribution of the byte that just left the window. Once the
//! window has filled and the chunk has reached the minimum size, the first
//! position at which `hash & (target - 1) == 0` becomes the cut point, where
//! `target` is the nominal (average) chunk size rounded up to a power of two.
//! If no such position exists before the maximum chunk size or the end of the
//! data, the chunk is cut there instead.
//!
//! Because the hash at any position depends only on the bytes in the window
//! ending at that position, the chunker skips hashing everything below the
//! minimum chunk size except for the last window, which yields exactly the same
//! cut points as a full scan. More importantly, the boundaries depend only on
//! the data and the [`ChunkSizer`], never on how the data was read, so an
//! insertion or deletion near the start of a file shifts only the nearby
//! boundaries and the remaining chunks still match.
//!
//! There are three ways to find the chunks of some data: the [`Chunker`]
//! iterator over a byte slice, the [`StreamChunker`] that reads from any
//! [`Read`] through a buffer of `max_size` bytes and yields [`ChunkData`], and
//! (with the `tokio` or `futures` feature) the asynchronous
//! `AsyncStreamChunker`. All of them produce identical boundaries.
//!
//! Fixed-size chunking is available via [`ChunkSizer::fixed`], in which case
//! every chunk is exactly the configured size except for the final one.

use std::io::Read;

use crate::Result;

#[cfg(any(feature = "tokio", feature = "futures"))]
mod async_stream;
#[cfg(any(feature = "tokio", feature = "futures"))]
pub use async_stream::*;

/// Smallest acceptable value for the minimum chunk size.
pub const MINIMUM_MIN: u32 = 64;
/// Largest acceptable value for the minimum chunk size.
pub const MINIMUM_MAX: u32 = 4_194_304;
/// Smallest acceptable value for the average chunk size.
pub const AVERAGE_MIN: u32 = 256;
/// Largest acceptable value for the average chunk size.
pub const AVERAGE_MAX: u32 = 16_777_216;
/// Smallest acceptable value for the maximum chunk size.
pub const MAXIMUM_MIN: u32 = 1024;
/// Largest acceptable value for the maximum chunk size, which also bounds the
/// size of fixed chunks.
pub const MAXIMUM_MAX: u32 = 67_108_864;
/// Default size of the rolling hash window in bytes.
pub const WINDOW_SIZE: usize = 48;
/// Largest acceptable rolling hash window.
pub const WINDOW_MAX: usize = 4096;

// Multiplier of the polynomial rolling hash.
const MULTIPLIER: u64 = 31;

///
/// The policy that decides where chunks end.
///
/// For content defined chunking use [`ChunkSizer::new`] or
/// [`ChunkSizer::with_window`]; for fixed-size chunking use
/// [`ChunkSizer::fixed`]. The constructors panic when given values outside of
/// the acceptable ranges; use
/// [`DedupOptions::validate`](crate::DedupOptions::validate) to check user
/// supplied values beforehand.
///
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ChunkSizer {
    min_size: usize,
    avg_size: usize,
    max_size: usize,
    window_size: usize,
    mask: u64,
    // MULTIPLIER^window_size, used to remove the byte leaving the window.
    out_factor: u64,
    variable: bool,
}

impl ChunkSizer {
    ///
    /// Content defined chunking with the default window of [`WINDOW_SIZE`]
    /// bytes.
    ///
    pub fn new(min_size: u32, avg_size: u32, max_size: u32) -> Self {
        ChunkSizer::with_window(min_size, avg_size, max_size, WINDOW_SIZE)
    }

    ///
    /// Content defined chunking with a rolling hash window of the given size.
    ///
    pub fn with_window(min_size: u32, avg_size: u32, max_size: u32, window_size: usize) -> Self {
        assert!(min_size >= MINIMUM_MIN);
        assert!(min_size <= MINIMUM_MAX);
        assert!(avg_size >= AVERAGE_MIN);
        assert!(avg_size <= AVERAGE_MAX);
        assert!(max_size >= MAXIMUM_MIN);
        assert!(max_size <= MAXIMUM_MAX);
        assert!(min_size <= avg_size);
        assert!(avg_size <= max_size);
        assert!(window_size >= 1);
        assert!(window_size <= WINDOW_MAX);
        Self {
            min_size: min_size as usize,
            avg_size: avg_size as usize,
            max_size: max_size as usize,
            window_size,
            mask: u64::from(avg_size).next_power_of_two() - 1,
            out_factor: MULTIPLIER.wrapping_pow(window_size as u32),
            variable: true,
        }
    }

    ///
    /// Fixed-size chunking, every chunk but the last is `size` bytes.
    ///
    pub fn fixed(size: u32) -> Self {
        assert!(size >= 1);
        assert!(size <= MAXIMUM_MAX);
        Self {
            min_size: size as usize,
            avg_size: size as usize,
            max_size: size as usize,
            window_size: WINDOW_SIZE,
            mask: 0,
            out_factor: 0,
            variable: false,
        }
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub fn avg_size(&self) -> usize {
        self.avg_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Returns `true` for content defined chunking, `false` for fixed-size.
    pub fn is_variable(&self) -> bool {
        self.variable
    }

    ///
    /// Find the end of the chunk that starts at the beginning of `source`,
    /// see [`cut()`].
    ///
    pub fn cut(&self, source: &[u8]) -> (u64, usize) {
        cut(source, self)
    }
}

///
/// Find the next chunk cut point in the source.
///
/// The returned 2-tuple consists of the rolling hash value at the cut point
/// and the length of the chunk. When the source is no longer than the minimum
/// chunk size, the whole source is returned with a hash of zero; fixed-size
/// chunks also carry a hash of zero.
///
pub fn cut(source: &[u8], sizer: &ChunkSizer) -> (u64, usize) {
    let mut remaining = source.len();
    if !sizer.variable {
        return (0, remaining.min(sizer.avg_size));
    }
    if remaining <= sizer.min_size {
        return (0, remaining);
    }
    if remaining > sizer.max_size {
        remaining = sizer.max_size;
    }
    let window = sizer.window_size;
    // The first index allowed to end a chunk: the window must be full and the
    // chunk must have reached the minimum size.
    let first = window.max(sizer.min_size - 1);
    if first >= remaining {
        return (0, remaining);
    }
    let mut hash: u64 = 0;
    for &byte in &source[first + 1 - window..=first] {
        hash = hash.wrapping_mul(MULTIPLIER).wrapping_add(u64::from(byte));
    }
    if hash & sizer.mask == 0 {
        return (hash, first + 1);
    }
    for index in first + 1..remaining {
        let outgoing = u64::from(source[index - window]).wrapping_mul(sizer.out_factor);
        hash = hash
            .wrapping_mul(MULTIPLIER)
            .wrapping_add(u64::from(source[index]))
            .wrapping_sub(outgoing);
        if hash & sizer.mask == 0 {
            return (hash, index + 1);
        }
    }
    // No content defined boundary, fall back to the largest chunk. This will
    // happen with pathological data, such as long runs of a repeated byte.
    (hash, remaining)
}

///
/// Represents a chunk returned from the [`Chunker`] iterator.
///
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct Chunk {
    /// The rolling hash value as of the end of the chunk.
    pub hash: u64,
    /// Starting byte position within the source.
    pub offset: usize,
    /// Length of the chunk in bytes.
    pub length: usize,
}

///
/// Chunker that finds the chunks of a byte slice.
///
/// ```no_run
/// use cdcdedup::chunker::{ChunkSizer, Chunker};
/// let contents = std::fs::read("disk.img").unwrap();
/// let chunker = Chunker::new(&contents, ChunkSizer::new(16384, 65536, 262144));
/// for entry in chunker {
///     println!("offset={} size={}", entry.offset, entry.length);
/// }
/// ```
///
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Chunker<'a> {
    source: &'a [u8],
    processed: usize,
    remaining: usize,
    sizer: ChunkSizer,
}

impl<'a> Chunker<'a> {
    ///
    /// Construct a [`Chunker`] that will process the given slice of bytes.
    ///
    pub fn new(source: &'a [u8], sizer: ChunkSizer) -> Self {
        Self {
            source,
            processed: 0,
            remaining: source.len(),
            sizer,
        }
    }

    ///
    /// Find the next cut point in the data, where `start` is the position from
    /// which to start processing the source data, and `remaining` are the
    /// number of bytes left to be processed.
    ///
    /// The returned 2-tuple consists of the rolling hash and the byte offset
    /// of the end of the chunk.
    ///
    pub fn cut(&self, start: usize, remaining: usize) -> (u64, usize) {
        let end = start + remaining;
        let (hash, count) = cut(&self.source[start..end], &self.sizer);
        (hash, start + count)
    }
}

impl Iterator for Chunker<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.remaining == 0 {
            None
        } else {
            let (hash, cutpoint) = self.cut(self.processed, self.remaining);
            if cutpoint == self.processed {
                None
            } else {
                let offset = self.processed;
                let length = cutpoint - offset;
                self.processed += length;
                self.remaining -= length;
                Some(Chunk {
                    hash,
                    offset,
                    length,
                })
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let lower = self.remaining.div_ceil(self.sizer.max_size);
        let upper = self.remaining.div_ceil(self.sizer.min_size);
        (lower, Some(upper))
    }
}

///
/// Represents a chunk returned from the [`StreamChunker`] iterator.
///
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ChunkData {
    /// The rolling hash value as of the end of the chunk.
    pub hash: u64,
    /// Starting byte position within the source.
    pub offset: u64,
    /// Length of the chunk in bytes.
    pub length: usize,
    /// Source bytes contained in this chunk.
    pub data: Vec<u8>,
}

///
/// Chunker that reads from a [`Read`] source.
///
/// Use `new` to construct an instance, and then iterate over the
/// [`ChunkData`]s via the [`Iterator`] trait.
///
/// Note that this struct allocates a [`Vec<u8>`] of `max_size` bytes to act as
/// a buffer when reading from the source and finding chunk boundaries.
///
/// ```no_run
/// # use std::fs::File;
/// # use cdcdedup::chunker::{ChunkSizer, StreamChunker};
/// let source = File::open("disk.img").unwrap();
/// let chunker = StreamChunker::new(source, ChunkSizer::new(16384, 65536, 262144));
/// for result in chunker {
///     let chunk = result.unwrap();
///     println!("offset={} length={}", chunk.offset, chunk.length);
/// }
/// ```
///
pub struct StreamChunker<R: Read> {
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

impl<R: Read> StreamChunker<R> {
    ///
    /// Construct a [`StreamChunker`] that will process bytes from the given
    /// source.
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

    /// Number of bytes handed out as chunks so far.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Fill the buffer with data from the source, returning the number of bytes
    /// read (zero if end of source has been reached).
    fn fill_buffer(&mut self) -> Result<usize> {
        if self.eof {
            Ok(0)
        } else {
            let mut all_bytes_read = 0;
            while !self.eof && self.length < self.capacity {
                let bytes_read = match self.source.read(&mut self.buffer[self.length..]) {
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
    fn read_chunk(&mut self) -> Result<Option<ChunkData>> {
        self.fill_buffer()?;
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
}

impl<R: Read> Iterator for StreamChunker<R> {
    type Item = Result<ChunkData>;

    fn next(&mut self) -> Option<Result<ChunkData>> {
        self.read_chunk().transpose()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    /// Reproducible pseudo-random bytes from a xorshift64 generator.
    pub(crate) fn pseudo_random(len: usize, seed: u64) -> Vec<u8> {
        let mut state = seed;
        let mut out = Vec::with_capacity(len);
        for _ in 0..len {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            out.push(state as u8);
        }
        out
    }

    const SEED: u64 = 0x2545_f491_4f6c_dd1d;

    #[test]
    #[should_panic]
    fn test_minimum_too_low() {
        ChunkSizer::new(63, 256, 1024);
    }

    #[test]
    #[should_panic]
    fn test_minimum_too_high() {
        ChunkSizer::new(67_108_867, 256, 1024);
    }

    #[test]
    #[should_panic]
    fn test_average_too_low() {
        ChunkSizer::new(64, 255, 1024);
    }

    #[test]
    #[should_panic]
    fn test_maximum_too_low() {
        ChunkSizer::new(64, 256, 1023);
    }

    #[test]
    #[should_panic]
    fn test_minimum_above_average() {
        ChunkSizer::new(4096, 2048, 8192);
    }

    #[test]
    #[should_panic]
    fn test_window_zero() {
        ChunkSizer::with_window(64, 256, 1024, 0);
    }

    #[test]
    #[should_panic]
    fn test_fixed_zero() {
        ChunkSizer::fixed(0);
    }

    #[test]
    fn test_masks() {
        let sizer = ChunkSizer::new(64, 256, 1024);
        assert_eq!(sizer.mask, 255);
        let sizer = ChunkSizer::new(16384, 65536, 262144);
        assert_eq!(sizer.mask, 65535);
        // not a power of two, rounded up
        let sizer = ChunkSizer::new(16384, 50000, 262144);
        assert_eq!(sizer.mask, 65535);
    }

    #[test]
    fn test_out_factor_removes_outgoing_byte() {
        // rolling over a window must equal hashing the window from scratch
        let data = pseudo_random(200, SEED);
        let sizer = ChunkSizer::with_window(64, 256, 1024, 16);
        let mut rolling: u64 = 0;
        for &b in &data[..16] {
            rolling = rolling.wrapping_mul(MULTIPLIER).wrapping_add(u64::from(b));
        }
        for index in 16..data.len() {
            rolling = rolling
                .wrapping_mul(MULTIPLIER)
                .wrapping_add(u64::from(data[index]))
                .wrapping_sub(u64::from(data[index - 16]).wrapping_mul(sizer.out_factor));
            let mut fresh: u64 = 0;
            for &b in &data[index - 15..=index] {
                fresh = fresh.wrapping_mul(MULTIPLIER).wrapping_add(u64::from(b));
            }
            assert_eq!(rolling, fresh);
        }
    }

    #[test]
    fn test_cut_all_zeros() {
        // a window of zeros hashes to zero, so every chunk is the minimum size
        let array = [0u8; 10240];
        let chunker = Chunker::new(&array, ChunkSizer::new(64, 256, 1024));
        let mut cursor: usize = 0;
        for _ in 0..160 {
            let (hash, pos) = chunker.cut(cursor, 10240 - cursor);
            assert_eq!(hash, 0);
            assert_eq!(pos, cursor + 64);
            cursor = pos;
        }
        assert_eq!(cursor, 10240);
    }

    #[test]
    fn test_cut_without_boundary_uses_maximum() {
        // a window of ones never satisfies a 10 bit mask
        let array = [1u8; 5000];
        let chunker = Chunker::new(&array, ChunkSizer::new(64, 1024, 2048));
        let lengths: Vec<usize> = chunker.map(|c| c.length).collect();
        assert_eq!(lengths, vec![2048, 2048, 904]);
    }

    #[test]
    fn test_cut_short_source() {
        let sizer = ChunkSizer::new(64, 256, 1024);
        assert_eq!(cut(&[], &sizer), (0, 0));
        assert_eq!(cut(&[7u8; 10], &sizer), (0, 10));
        assert_eq!(cut(&[7u8; 64], &sizer), (0, 64));
    }

    #[test]
    fn test_cut_fixed() {
        let data = pseudo_random(10000, SEED);
        let chunker = Chunker::new(&data, ChunkSizer::fixed(4096));
        let chunks: Vec<Chunk> = chunker.collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[0].length, 4096);
        assert_eq!(chunks[1].offset, 4096);
        assert_eq!(chunks[1].length, 4096);
        assert_eq!(chunks[2].offset, 8192);
        assert_eq!(chunks[2].length, 1808);
        assert!(chunks.iter().all(|c| c.hash == 0));
    }

    #[test]
    fn test_iter_random_1k_chunks() {
        let data = pseudo_random(16384, SEED);
        let expected: Vec<(u64, usize, usize)> = vec![
            (14380715403536736256, 0, 1193),
            (13116879267792560128, 1193, 1147),
            (6431207091309010944, 2340, 1655),
            (7689474234495953920, 3995, 1431),
            (17865622952489213952, 5426, 905),
            (11022165675114593280, 6331, 1661),
            (2773072888154489856, 7992, 2392),
            (6866988153510048768, 10384, 579),
            (2615765850156180480, 10963, 840),
            (8114429586330302464, 11803, 647),
            (16307818620160096256, 12450, 1477),
            (18004519838480009216, 13927, 523),
            (16553455018699979165, 14450, 1934),
        ];
        let chunker = Chunker::new(&data, ChunkSizer::new(256, 1024, 4096));
        let actual: Vec<(u64, usize, usize)> =
            chunker.map(|c| (c.hash, c.offset, c.length)).collect();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_iter_random_256_chunks() {
        let data = pseudo_random(16384, SEED);
        let chunks: Vec<Chunk> = Chunker::new(&data, ChunkSizer::new(64, 256, 1024)).collect();
        assert_eq!(chunks.len(), 54);
        assert_eq!((chunks[0].offset, chunks[0].length), (0, 430));
        assert_eq!((chunks[1].offset, chunks[1].length), (430, 376));
        assert_eq!((chunks[2].offset, chunks[2].length), (806, 66));
        // no boundary found within the maximum
        assert_eq!((chunks[9].offset, chunks[9].length), (2332, 1024));
        assert_eq!((chunks[53].offset, chunks[53].length), (15644, 740));
    }

    #[test]
    fn test_shifted_content_realigns() {
        let original = pseudo_random(65536, SEED);
        let mut shifted = pseudo_random(100, 42);
        shifted.extend_from_slice(&original);
        let sizer = ChunkSizer::new(256, 1024, 4096);
        let ends_a: Vec<usize> = Chunker::new(&original, sizer)
            .map(|c| c.offset + c.length)
            .collect();
        let ends_b: Vec<usize> = Chunker::new(&shifted, sizer)
            .map(|c| c.offset + c.length - 100)
            .collect();
        let common = ends_b.iter().filter(|e| ends_a.contains(e)).count();
        assert!(common > ends_a.len() / 2);
    }

    #[test]
    fn test_stream_matches_slice() {
        let data = pseudo_random(16384, SEED);
        let sizer = ChunkSizer::new(256, 1024, 4096);
        let expected: Vec<Chunk> = Chunker::new(&data, sizer).collect();
        let chunker = StreamChunker::new(Cursor::new(&data), sizer);
        let mut index = 0;
        for result in chunker {
            let chunk = result.unwrap();
            assert_eq!(chunk.hash, expected[index].hash);
            assert_eq!(chunk.offset, expected[index].offset as u64);
            assert_eq!(chunk.length, expected[index].length);
            let start = expected[index].offset;
            assert_eq!(chunk.data, &data[start..start + chunk.length]);
            index += 1;
        }
        assert_eq!(index, expected.len());
    }

    /// Reader that fails every other call with `Interrupted`.
    pub(crate) struct Interrupting {
        pub(crate) data: Vec<u8>,
        pos: usize,
        interrupt: bool,
    }

    impl Interrupting {
        pub(crate) fn new(data: Vec<u8>) -> Self {
            Self {
                data,
                pos: 0,
                interrupt: true,
            }
        }

        pub(crate) fn step(&mut self, len: usize) -> std::io::Result<std::ops::Range<usize>> {
            self.interrupt = !self.interrupt;
            if !self.interrupt {
                return Err(std::io::ErrorKind::Interrupted.into());
            }
            let end = (self.pos + len.min(700)).min(self.data.len());
            let range = self.pos..end;
            self.pos = end;
            Ok(range)
        }
    }

    impl Read for Interrupting {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let range = self.step(buf.len())?;
            let n = range.len();
            buf[..n].copy_from_slice(&self.data[range]);
            Ok(n)
        }
    }

    #[test]
    fn test_stream_retries_interrupted_reads() {
        let data = pseudo_random(16384, SEED);
        let sizer = ChunkSizer::new(256, 1024, 4096);
        let expected: Vec<(u64, usize)> = Chunker::new(&data, sizer)
            .map(|c| (c.offset as u64, c.length))
            .collect();
        let actual: Vec<(u64, usize)> = StreamChunker::new(Interrupting::new(data), sizer)
            .map(|r| r.map(|c| (c.offset, c.length)))
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(actual, expected);
    }

    #[test]
    fn test_stream_empty_source() {
        let chunker = StreamChunker::new(Cursor::new(Vec::new()), ChunkSizer::fixed(1024));
        assert_eq!(chunker.count(), 0);
    }

    #[test]
    fn test_size_hint() {
        let data = [0u8; 10000];
        let chunker = Chunker::new(&data, ChunkSizer::fixed(4096));
        assert_eq!(chunker.size_hint(), (3, Some(3)));
    }

    proptest! {
        #[test]
        fn prop_chunks_cover_input(data in proptest::collection::vec(any::<u8>(), 0..20000)) {
            let sizer = ChunkSizer::new(64, 256, 1024);
            let chunks: Vec<Chunk> = Chunker::new(&data, sizer).collect();
            let mut expected_offset = 0;
            for (index, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.offset, expected_offset);
                prop_assert!(chunk.length <= 1024);
                if index + 1 < chunks.len() {
                    prop_assert!(chunk.length >= 64);
                }
                expected_offset += chunk.length;
            }
            prop_assert_eq!(expected_offset, data.len());
        }

        #[test]
        fn prop_chunking_is_deterministic(data in proptest::collection::vec(any::<u8>(), 0..20000)) {
            let sizer = ChunkSizer::with_window(128, 512, 2048, 32);
            let first: Vec<Chunk> = Chunker::new(&data, sizer).collect();
            let second: Vec<Chunk> = Chunker::new(&data, sizer).collect();
            prop_assert_eq!(&first, &second);
            let streamed: Vec<(u64, usize)> = StreamChunker::new(Cursor::new(&data), sizer)
                .map(|r| r.map(|c| (c.offset, c.length)))
                .collect::<Result<Vec<_>>>()
                .unwrap();
            let sliced: Vec<(u64, usize)> =
                first.iter().map(|c| (c.offset as u64, c.length)).collect();
            prop_assert_eq!(streamed, sliced);
        }
    }
}
