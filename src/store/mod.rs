//
// Copyright (c) 2025 Nathan Fiedler
//

//! The in-memory table of unique chunks, keyed by chunk hash.

use std::collections::HashMap;

///
/// Metadata for a unique chunk.
///
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ChunkRecord {
    /// Hex encoded content hash.
    pub hash: String,
    /// Position of the first occurrence within its source file.
    pub offset: u64,
    /// Length of the chunk in bytes.
    pub size: u32,
    /// Number of times the chunk has been seen, always at least one.
    pub ref_count: u32,
}

///
/// Outcome of [`ChunkStore::record`], carrying the index of the record.
///
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Recorded {
    /// The hash was not known and a record was inserted.
    New(usize),
    /// The hash was already known and its reference count was incremented.
    Duplicate(usize),
}

impl Recorded {
    pub fn index(&self) -> usize {
        match self {
            Recorded::New(index) | Recorded::Duplicate(index) => *index,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Recorded::New(_))
    }
}

///
/// Mapping from chunk hash to [`ChunkRecord`] with unique keys.
///
/// Records keep the order in which they were first inserted, which is the
/// order used for manifests and chunk blobs. The store is not synchronized;
/// concurrent producers must funnel their updates through a single writer, as
/// the parallel deduplication driver does.
///
#[derive(Debug, Default, Clone)]
pub struct ChunkStore {
    records: Vec<ChunkRecord>,
    index: HashMap<String, usize>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unique chunks.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.index.contains_key(hash)
    }

    pub fn get(&self, hash: &str) -> Option<&ChunkRecord> {
        self.index.get(hash).map(|&i| &self.records[i])
    }

    /// Position of the record in insertion order.
    pub fn index_of(&self, hash: &str) -> Option<usize> {
        self.index.get(hash).copied()
    }

    ///
    /// Record an occurrence of a chunk: insert it with a reference count of
    /// one, or increment the count of the existing record. The lookup and the
    /// insert happen under the same `&mut` borrow so a hash can never be
    /// inserted twice.
    ///
    pub fn record(&mut self, hash: &str, offset: u64, size: u32) -> Recorded {
        if let Some(&i) = self.index.get(hash) {
            let record = &mut self.records[i];
            record.ref_count = record.ref_count.saturating_add(1);
            Recorded::Duplicate(i)
        } else {
            let i = self.records.len();
            self.records.push(ChunkRecord {
                hash: hash.to_owned(),
                offset,
                size,
                ref_count: 1,
            });
            self.index.insert(hash.to_owned(), i);
            Recorded::New(i)
        }
    }

    /// Insert a record as read from a manifest, keeping its reference count.
    pub(crate) fn insert_record(&mut self, record: ChunkRecord) -> Recorded {
        if let Some(&i) = self.index.get(&record.hash) {
            return Recorded::Duplicate(i);
        }
        let i = self.records.len();
        self.index.insert(record.hash.clone(), i);
        self.records.push(record);
        Recorded::New(i)
    }

    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ChunkRecord> {
        self.records.iter()
    }

    pub fn records(&self) -> &[ChunkRecord] {
        &self.records
    }

    /// Sum of the sizes of the unique chunks.
    pub fn total_bytes(&self) -> u64 {
        self.records.iter().map(|r| u64::from(r.size)).sum()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.index.clear();
    }
}
