//
// Copyright (c) 2025 Nathan Fiedler
//

//! Error type shared by the chunkers, the deduplication engine and the
//! manifest codec.

use std::io;

/// Result type for all fallible operations in this crate.
pub type Result<T> = std::result::Result<T, Error>;

///
/// All of the ways in which chunking, deduplication and packing can fail.
///
/// Failures that only concern a single input file are not returned directly
/// from [`deduplicate_files`](crate::DeduplicationEngine::deduplicate_files);
/// they are collected into [`DedupResult::skipped_files`](crate::DedupResult)
/// so that callers can tell "nothing to do" apart from "partial failure".
///
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The deduplication options are out of range or inconsistent.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// The named chunk hash algorithm is not supported.
    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A manifest could not be decoded.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Restored chunk data does not match the hash recorded in the manifest.
    #[error("chunk {index} hash mismatch: expected {expected}, got {actual}")]
    ChunkHashMismatch {
        /// Position of the chunk within the manifest chunk table.
        index: usize,
        /// Hash recorded in the manifest.
        expected: String,
        /// Hash of the bytes found in the chunk blob.
        actual: String,
    },

    /// A manifest names a file outside of the restore directory.
    #[error("unsafe path in manifest: {0}")]
    UnsafePath(String),

    /// Two input files map to the same path in a manifest.
    #[error("duplicate path in manifest: {0}")]
    DuplicatePath(String),

    /// The external archive collaborator reported a failure.
    #[error("archive collaborator failed: {0}")]
    Archive(String),

    /// The operation was stopped through its cancellation token.
    #[error("operation cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_fmt() {
        let err = Error::Cancelled;
        assert_eq!(format!("{err}"), "operation cancelled");
        let err = Error::ChunkHashMismatch {
            index: 3,
            expected: "ab".into(),
            actual: "cd".into(),
        };
        assert_eq!(
            format!("{err}"),
            "chunk 3 hash mismatch: expected ab, got cd"
        );
    }

    #[test]
    fn test_error_from_io() {
        let ioerr = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err: Error = ioerr.into();
        assert!(matches!(err, Error::Io(ref e) if e.kind() == io::ErrorKind::NotFound));
    }
}
