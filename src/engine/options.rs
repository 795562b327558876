//
// Copyright (c) 2025 Nathan Fiedler
//

use std::str::FromStr;

use crate::chunker::{
    AVERAGE_MAX, AVERAGE_MIN, ChunkSizer, MAXIMUM_MAX, MAXIMUM_MIN, MINIMUM_MAX, MINIMUM_MIN,
    WINDOW_MAX, WINDOW_SIZE,
};
use crate::hasher::HashAlgorithm;
use crate::{Error, Result};

/// Default nominal chunk size (64 KiB).
pub const DEFAULT_CHUNK_SIZE: u32 = 65_536;
/// Default minimum chunk size (16 KiB).
pub const DEFAULT_CHUNK_SIZE_MIN: u32 = 16_384;
/// Default maximum chunk size (256 KiB).
pub const DEFAULT_CHUNK_SIZE_MAX: u32 = 262_144;
/// Default similarity threshold for the near-duplicate file finder.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.8;

///
/// Configuration of the deduplication engine.
///
/// The options are read at the start of every file scan and never change
/// during one. With `variable_size_chunks` disabled, every chunk is
/// `chunk_size` bytes (except the last of each file) and the minimum, maximum
/// and window settings are ignored.
///
#[derive(Debug, Clone, PartialEq)]
pub struct DedupOptions {
    /// Nominal (average) chunk size; rounded up to a power of two for the
    /// boundary mask.
    pub chunk_size: u32,
    /// Smallest chunk, except for the last chunk of a file.
    pub chunk_size_min: u32,
    /// Largest chunk.
    pub chunk_size_max: u32,
    /// Algorithm for the chunk content hash.
    pub hash_algorithm: HashAlgorithm,
    /// Content defined (`true`) or fixed-size (`false`) chunking.
    pub variable_size_chunks: bool,
    /// Jaccard similarity at which two files are reported as near duplicates.
    pub similarity_threshold: f64,
    /// Size of the rolling hash window in bytes.
    pub window_size: usize,
}

impl Default for DedupOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_size_min: DEFAULT_CHUNK_SIZE_MIN,
            chunk_size_max: DEFAULT_CHUNK_SIZE_MAX,
            hash_algorithm: HashAlgorithm::default(),
            variable_size_chunks: true,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            window_size: WINDOW_SIZE,
        }
    }
}

impl DedupOptions {
    /// Fixed-size chunking of `chunk_size` bytes, other settings default.
    pub fn fixed(chunk_size: u32) -> Self {
        Self {
            chunk_size,
            variable_size_chunks: false,
            ..Default::default()
        }
    }

    /// Content defined chunking with the given bounds.
    pub fn variable(chunk_size_min: u32, chunk_size: u32, chunk_size_max: u32) -> Self {
        Self {
            chunk_size,
            chunk_size_min,
            chunk_size_max,
            variable_size_chunks: true,
            ..Default::default()
        }
    }

    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    /// Select the hash algorithm by name, e.g. `"SHA256"` or `"crc32"`.
    pub fn with_hash_algorithm_name(self, name: &str) -> Result<Self> {
        Ok(self.with_hash_algorithm(HashAlgorithm::from_str(name)?))
    }

    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    ///
    /// Check that the options describe a usable chunker.
    ///
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(invalid(format!(
                "similarity threshold {} is outside of [0, 1]",
                self.similarity_threshold
            )));
        }
        if !self.variable_size_chunks {
            if self.chunk_size == 0 || self.chunk_size > MAXIMUM_MAX {
                return Err(invalid(format!(
                    "fixed chunk size {} is outside of [1, {}]",
                    self.chunk_size, MAXIMUM_MAX
                )));
            }
            return Ok(());
        }
        check_range("minimum chunk size", self.chunk_size_min, MINIMUM_MIN, MINIMUM_MAX)?;
        check_range("chunk size", self.chunk_size, AVERAGE_MIN, AVERAGE_MAX)?;
        check_range("maximum chunk size", self.chunk_size_max, MAXIMUM_MIN, MAXIMUM_MAX)?;
        if self.chunk_size_min > self.chunk_size || self.chunk_size > self.chunk_size_max {
            return Err(invalid(format!(
                "chunk sizes must satisfy min <= nominal <= max, got {} / {} / {}",
                self.chunk_size_min, self.chunk_size, self.chunk_size_max
            )));
        }
        if self.window_size == 0 || self.window_size > WINDOW_MAX {
            return Err(invalid(format!(
                "window size {} is outside of [1, {}]",
                self.window_size, WINDOW_MAX
            )));
        }
        Ok(())
    }

    ///
    /// The boundary policy described by these options. The options must have
    /// passed [`validate()`](Self::validate).
    ///
    pub fn sizer(&self) -> ChunkSizer {
        if self.variable_size_chunks {
            ChunkSizer::with_window(
                self.chunk_size_min,
                self.chunk_size,
                self.chunk_size_max,
                self.window_size,
            )
        } else {
            ChunkSizer::fixed(self.chunk_size)
        }
    }
}

fn invalid(message: String) -> Error {
    Error::InvalidOptions(message)
}

fn check_range(what: &str, value: u32, low: u32, high: u32) -> Result<()> {
    if value < low || value > high {
        Err(invalid(format!("{what} {value} is outside of [{low}, {high}]")))
    } else {
        Ok(())
    }
}
