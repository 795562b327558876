//
// Copyright (c) 2025 Nathan Fiedler
//

//! This crate implements chunk-level deduplication of files using content
//! defined chunking. Files are split into variable sized chunks at positions
//! chosen by a rolling hash over the data itself, each chunk is identified by a
//! content hash, and chunks that have been seen before are counted rather than
//! stored again. A critical aspect of the chunking is that it returns exactly
//! the same results for the same input, regardless of how the input is read.
//!
//! ## Examples
//!
//! Deduplicating a set of files and reporting the savings:
//!
//! ```no_run
//! use cdcdedup::{DedupOptions, DeduplicationEngine};
//! let mut engine = DeduplicationEngine::new(DedupOptions::default()).unwrap();
//! let result = engine
//!     .deduplicate_files(&["disk-monday.img", "disk-tuesday.img"])
//!     .unwrap();
//! for skipped in &result.skipped_files {
//!     eprintln!("skipped {}: {}", skipped.path.display(), skipped.error);
//! }
//! println!(
//!     "{} chunks, {} unique, {} bytes saved",
//!     result.total_chunks, result.unique_chunks, result.saved_bytes
//! );
//! ```
//!
//! The chunker can also be used on its own, much like any other content
//! defined chunker:
//!
//! ```no_run
//! use std::fs;
//! use cdcdedup::chunker::{ChunkSizer, Chunker};
//! let contents = fs::read("disk-monday.img").unwrap();
//! let sizer = ChunkSizer::new(16384, 65536, 262144);
//! for entry in Chunker::new(&contents, sizer) {
//!     println!("offset={} size={}", entry.offset, entry.length);
//! }
//! ```
//!
//! ## Chunk Sizes
//!
//! The nominal chunk size sets the probability of a cut at any given position,
//! so chunks average somewhat more than the nominal size once the minimum is
//! taken into account. Note that changing the minimum chunk size or the window
//! size will almost certainly result in different cut points, and therefore
//! different chunks for the same data. Pick values that can remain relevant
//! for as long as the chunks are kept.
//!
//! Fixed-size chunking is available through [`DedupOptions::fixed`]. It is
//! cheaper, but any insertion or deletion shifts every following chunk and
//! defeats deduplication of the rest of the file.
//!
//! ## Archives
//!
//! The engine can write the unique chunks of a set of files to a chunk blob,
//! along with a manifest describing the chunks and the files built from them,
//! and hand both to an [`ArchiveCollaborator`] for compression. The
//! [`manifest`] module reads those files back and restores the originals.
//!
//! ## Features
//!
//! * `parallel` (default): chunk and hash files on multiple threads with
//!   [`DeduplicationEngine::deduplicate_files_parallel`].
//! * `tokio` or `futures`: an asynchronous streaming chunker, see
//!   `chunker::AsyncStreamChunker`. Only one of the two may be enabled.

pub mod archive;
pub mod chunker;
pub mod engine;
mod error;
pub mod hasher;
pub mod manifest;
pub mod store;

pub use archive::{ArchiveCollaborator, CompressionOptions, PackedPaths};
pub use engine::{
    CancellationToken, DedupOptions, DedupResult, DeduplicationEngine, FileStats, SimilarFiles,
    SkippedFile,
};
pub use error::{Error, Result};
pub use hasher::HashAlgorithm;
pub use manifest::Manifest;
pub use store::{ChunkRecord, ChunkStore};
