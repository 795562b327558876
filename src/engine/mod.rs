//
// Copyright (c) 2025 Nathan Fiedler
//

//! The deduplication driver.
//!
//! A [`DeduplicationEngine`] walks a list of files, splits each one into
//! chunks with the configured [`ChunkSizer`], hashes every chunk and records it
//! in its [`ChunkStore`]. The store outlives individual calls: running the same
//! files a second time finds every chunk already known and only raises the
//! reference counts, until [`clear_chunk_store`](DeduplicationEngine::clear_chunk_store)
//! is called.
//!
//! Each file is chunked and hashed completely before any of its chunks are
//! recorded, so a file that fails half way through leaves no trace in the
//! store. Files that cannot be read are reported in
//! [`DedupResult::skipped_files`] rather than aborting the run; only
//! cancellation stops a run early.

use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};

use crate::chunker::{ChunkData, ChunkSizer, StreamChunker};
use crate::manifest::Manifest;
use crate::store::{ChunkStore, Recorded};
use crate::{Error, Result};

mod options;
pub use options::*;

///
/// Cooperative cancellation flag shared between an engine and its caller.
///
/// Clones share the same flag. The engine checks it before every chunk and
/// fails with [`Error::Cancelled`] once it is set.
///
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

///
/// Per-file outcome of a deduplication run.
///
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileStats {
    pub path: PathBuf,
    /// Size of the file in bytes, the sum of its chunk sizes.
    pub size: u64,
    /// Number of chunks the file was split into.
    pub chunks: u64,
    /// Chunks that were not yet in the chunk store.
    pub new_chunks: u64,
    /// Bytes of chunks that were already in the chunk store.
    pub saved_bytes: u64,
}

///
/// A file that could not be processed, along with the reason.
///
#[derive(Debug)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub error: Error,
}

///
/// Aggregate statistics of a deduplication run.
///
/// The counters satisfy `unique_chunks + duplicate_chunks == total_chunks`
/// and `deduplicated_size + saved_bytes == original_size`.
///
#[derive(Debug, Default)]
pub struct DedupResult {
    /// Total size of all processed files.
    pub original_size: u64,
    /// Bytes that would have to be stored, i.e. the sizes of the new chunks.
    pub deduplicated_size: u64,
    /// Bytes of chunks that were already known.
    pub saved_bytes: u64,
    pub total_chunks: u64,
    /// Chunks that were new to the chunk store.
    pub unique_chunks: u64,
    /// Chunks that were already in the chunk store.
    pub duplicate_chunks: u64,
    /// `saved_bytes / original_size`, or zero when nothing was processed.
    pub deduplication_ratio: f64,
    /// Statistics for every processed file, in input order.
    pub files: Vec<FileStats>,
    /// Files that could not be processed.
    pub skipped_files: Vec<SkippedFile>,
}

impl DedupResult {
    pub(crate) fn add_file(&mut self, stats: FileStats) {
        self.original_size += stats.size;
        self.saved_bytes += stats.saved_bytes;
        self.deduplicated_size += stats.size - stats.saved_bytes;
        self.total_chunks += stats.chunks;
        self.unique_chunks += stats.new_chunks;
        self.duplicate_chunks += stats.chunks - stats.new_chunks;
        self.files.push(stats);
    }

    pub(crate) fn skip_file(&mut self, path: &Path, error: Error) {
        warn!("skipping {}: {}", path.display(), error);
        self.skipped_files.push(SkippedFile {
            path: path.to_path_buf(),
            error,
        });
    }

    pub(crate) fn finish(&mut self) {
        self.deduplication_ratio = if self.original_size == 0 {
            0.0
        } else {
            self.saved_bytes as f64 / self.original_size as f64
        };
    }

    /// Returns `true` if any input file could not be processed.
    pub fn is_partial(&self) -> bool {
        !self.skipped_files.is_empty()
    }
}

///
/// Two files whose chunk sets overlap by at least the similarity threshold.
///
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarFiles {
    pub first: PathBuf,
    pub second: PathBuf,
    /// Jaccard similarity of the two sets of chunk hashes, in `[0, 1]`.
    pub similarity: f64,
}

/// Location and identity of one chunk of a scanned file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChunkRef {
    pub hash: String,
    pub offset: u64,
    pub length: u32,
}

///
/// Content defined chunking deduplication over a list of files.
///
/// ```no_run
/// use cdcdedup::{DedupOptions, DeduplicationEngine};
/// let mut engine = DeduplicationEngine::new(DedupOptions::default()).unwrap();
/// let result = engine.deduplicate_files(&["a.img", "b.img"]).unwrap();
/// println!(
///     "{} of {} bytes are duplicates ({:.1}%)",
///     result.saved_bytes,
///     result.original_size,
///     result.deduplication_ratio * 100.0
/// );
/// ```
///
#[derive(Debug)]
pub struct DeduplicationEngine {
    options: DedupOptions,
    sizer: ChunkSizer,
    store: ChunkStore,
    cancel: CancellationToken,
}

impl DeduplicationEngine {
    ///
    /// Create an engine with an empty chunk store.
    ///
    pub fn new(options: DedupOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            sizer: options.sizer(),
            options,
            store: ChunkStore::new(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn options(&self) -> &DedupOptions {
        &self.options
    }

    ///
    /// Replace the options. Chunks already in the store were produced with the
    /// old options and will generally not match chunks produced with the new
    /// ones.
    ///
    pub fn set_options(&mut self, options: DedupOptions) -> Result<()> {
        options.validate()?;
        self.sizer = options.sizer();
        self.options = options;
        Ok(())
    }

    pub fn chunk_store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn clear_chunk_store(&mut self) {
        self.store.clear();
    }

    pub fn set_cancellation_token(&mut self, token: CancellationToken) {
        self.cancel = token;
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub(crate) fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }

    ///
    /// Seed the chunk store with the chunks of a previously written manifest,
    /// keeping their reference counts, so that a new run deduplicates against
    /// an earlier one. Legacy manifests do not name their hash algorithm, so
    /// every hash must at least look like one of the configured algorithm.
    ///
    pub fn load_manifest(&mut self, manifest: &Manifest) -> Result<usize> {
        let expected = self.options.hash_algorithm;
        if let Some(algorithm) = manifest.algorithm() {
            if algorithm != expected {
                return Err(Error::InvalidManifest(format!(
                    "manifest chunks are hashed with {}, engine uses {}",
                    algorithm, expected
                )));
            }
        }
        let foreign = manifest.chunks().iter().find(|record| {
            record.hash.len() != expected.digest_len()
                || !record.hash.bytes().all(|b| b.is_ascii_hexdigit())
        });
        if let Some(record) = foreign {
            return Err(Error::InvalidManifest(format!(
                "chunk hash {} is not a {} digest",
                record.hash, expected
            )));
        }
        let mut added = 0;
        for record in manifest.chunks() {
            if self.store.insert_record(record.clone()).is_new() {
                added += 1;
            }
        }
        debug!("loaded {} chunks from manifest", added);
        Ok(added)
    }

    ///
    /// Decide the size of the chunk starting at `offset` of a file of
    /// `file_size` bytes. The result never runs past the end of the file and is
    /// zero when `offset` is at or beyond the end.
    ///
    pub fn calculate_optimal_chunk_size<R: Read + Seek>(
        &self,
        file: &mut R,
        offset: u64,
        file_size: u64,
    ) -> Result<usize> {
        if offset >= file_size {
            return Ok(0);
        }
        let remaining = file_size - offset;
        if !self.sizer.is_variable() {
            return Ok(remaining.min(self.sizer.avg_size() as u64) as usize);
        }
        let wanted = remaining.min(self.sizer.max_size() as u64);
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = Vec::with_capacity(wanted as usize);
        file.by_ref().take(wanted).read_to_end(&mut buffer)?;
        let (_, count) = self.sizer.cut(&buffer);
        Ok(count)
    }

    /// Hex encoded hash of the data with the configured algorithm.
    pub fn calculate_chunk_hash(&self, data: &[u8]) -> String {
        self.options.hash_algorithm.hash_hex(data)
    }

    ///
    /// Deduplicate the files in order, updating the chunk store.
    ///
    /// Files that cannot be read are listed in
    /// [`DedupResult::skipped_files`]; the only error returned is
    /// [`Error::Cancelled`].
    ///
    pub fn deduplicate_files<P: AsRef<Path>>(&mut self, files: &[P]) -> Result<DedupResult> {
        let mut result = DedupResult::default();
        for path in files {
            let path = path.as_ref();
            match self.deduplicate_file(path) {
                Ok(stats) => result.add_file(stats),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(error) => result.skip_file(path, error),
            }
        }
        result.finish();
        log_summary(&result);
        Ok(result)
    }

    ///
    /// Deduplicate the files, chunking and hashing them concurrently.
    ///
    /// The chunk store is updated by this thread alone, in input order, once
    /// all files have been scanned, so the result and the store contents are
    /// exactly those of [`deduplicate_files`](Self::deduplicate_files).
    ///
    #[cfg(feature = "parallel")]
    pub fn deduplicate_files_parallel<P>(&mut self, files: &[P]) -> Result<DedupResult>
    where
        P: AsRef<Path> + Sync,
    {
        use rayon::prelude::*;

        let scanned: Vec<Result<Vec<ChunkRef>>> = files
            .par_iter()
            .map(|path| self.scan_path(path.as_ref()))
            .collect();
        let mut result = DedupResult::default();
        for (path, outcome) in files.iter().zip(scanned) {
            let path = path.as_ref();
            match outcome {
                Ok(chunks) => result.add_file(self.apply(path, &chunks)),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(error) => result.skip_file(path, error),
            }
        }
        result.finish();
        log_summary(&result);
        Ok(result)
    }

    ///
    /// Deduplicate a single file, updating the chunk store.
    ///
    pub fn deduplicate_file<P: AsRef<Path>>(&mut self, path: P) -> Result<FileStats> {
        let path = path.as_ref();
        let chunks = self.scan_path(path)?;
        Ok(self.apply(path, &chunks))
    }

    ///
    /// Deduplicate everything read from `reader`, reporting it under `label`.
    ///
    pub fn deduplicate_reader<R: Read, P: AsRef<Path>>(
        &mut self,
        reader: R,
        label: P,
    ) -> Result<FileStats> {
        let chunks = self.scan(reader)?;
        Ok(self.apply(label.as_ref(), &chunks))
    }

    ///
    /// Find pairs of files whose sets of chunks are at least
    /// `similarity_threshold` similar (Jaccard index). The chunk store is not
    /// modified. Unreadable files are logged and left out.
    ///
    pub fn find_similar_files<P: AsRef<Path>>(&self, files: &[P]) -> Result<Vec<SimilarFiles>> {
        let mut sets: Vec<(&Path, HashSet<String>)> = Vec::with_capacity(files.len());
        for path in files {
            let path = path.as_ref();
            match self.scan_path(path) {
                Ok(chunks) => sets.push((path, chunks.into_iter().map(|c| c.hash).collect())),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(error) => warn!("skipping {}: {}", path.display(), error),
            }
        }
        let mut similar = Vec::new();
        for (i, (first, a)) in sets.iter().enumerate() {
            for (second, b) in sets.iter().skip(i + 1) {
                let similarity = jaccard(a, b);
                if similarity >= self.options.similarity_threshold {
                    similar.push(SimilarFiles {
                        first: first.to_path_buf(),
                        second: second.to_path_buf(),
                        similarity,
                    });
                }
            }
        }
        Ok(similar)
    }

    /// Chunker over the given reader using the configured boundaries.
    pub(crate) fn stream_chunks<R: Read>(&self, reader: R) -> StreamChunker<R> {
        StreamChunker::new(reader, self.sizer)
    }

    fn scan_path(&self, path: &Path) -> Result<Vec<ChunkRef>> {
        let file = File::open(path)?;
        self.scan(file)
    }

    /// Chunk and hash everything in the reader without touching the store.
    fn scan<R: Read>(&self, reader: R) -> Result<Vec<ChunkRef>> {
        let mut chunks = Vec::new();
        for result in self.stream_chunks(reader) {
            self.check_cancelled()?;
            let chunk: ChunkData = result?;
            chunks.push(ChunkRef {
                hash: self.calculate_chunk_hash(&chunk.data),
                offset: chunk.offset,
                length: chunk.length as u32,
            });
        }
        Ok(chunks)
    }

    /// Record the chunks of one file in the store.
    fn apply(&mut self, path: &Path, chunks: &[ChunkRef]) -> FileStats {
        let mut stats = FileStats {
            path: path.to_path_buf(),
            ..Default::default()
        };
        for chunk in chunks {
            let length = u64::from(chunk.length);
            stats.size += length;
            stats.chunks += 1;
            match self.store.record(&chunk.hash, chunk.offset, chunk.length) {
                Recorded::New(_) => stats.new_chunks += 1,
                Recorded::Duplicate(_) => stats.saved_bytes += length,
            }
        }
        debug!(
            "{}: {} bytes, {} chunks, {} new",
            path.display(),
            stats.size,
            stats.chunks,
            stats.new_chunks
        );
        stats
    }
}

fn log_summary(result: &DedupResult) {
    info!(
        "deduplicated {} files ({} skipped): {} of {} bytes saved in {} chunks, {} unique",
        result.files.len(),
        result.skipped_files.len(),
        result.saved_bytes,
        result.original_size,
        result.total_chunks,
        result.unique_chunks
    );
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(b).count();
    let union = a.len() + b.len() - shared;
    shared as f64 / union as f64
}
