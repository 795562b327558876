//
// Copyright (c) 2025 Nathan Fiedler
//

//! Packing deduplicated files for an external archiver.
//!
//! The engine does not compress anything itself. It writes a manifest and a
//! blob of unique chunks, then hands both files to an [`ArchiveCollaborator`]
//! that adds them to an archive of its choosing.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;
use tempfile::NamedTempFile;

use crate::engine::{DedupResult, DeduplicationEngine, FileStats};
use crate::manifest::{self, FileEntry, Manifest};
use crate::store::ChunkStore;
use crate::{Error, Result};

/// Name of the manifest written by [`DeduplicationEngine::export_deduplicated`].
pub const MANIFEST_FILE_NAME: &str = "manifest.bin";
/// Name of the chunk blob written by [`DeduplicationEngine::export_deduplicated`].
pub const CHUNK_BLOB_FILE_NAME: &str = "chunks.bin";

///
/// Settings passed through to the archiver untouched.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionOptions {
    /// Compression method name, e.g. `"LZMA2"`.
    pub method: String,
    pub level: u32,
    pub solid: bool,
    /// Number of compression threads, zero to let the archiver decide.
    pub threads: u32,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            method: "LZMA2".into(),
            level: 5,
            solid: true,
            threads: 0,
        }
    }
}

///
/// Something that can add files to an archive.
///
/// Implemented for closures with the same signature as
/// [`add_to_archive`](Self::add_to_archive).
///
pub trait ArchiveCollaborator {
    ///
    /// Add the given files to the archive at `archive_path`. The files exist
    /// for the duration of the call only.
    ///
    fn add_to_archive(
        &self,
        archive_path: &Path,
        files: &[PathBuf],
        options: &CompressionOptions,
    ) -> Result<()>;
}

impl<F> ArchiveCollaborator for F
where
    F: Fn(&Path, &[PathBuf], &CompressionOptions) -> Result<()>,
{
    fn add_to_archive(
        &self,
        archive_path: &Path,
        files: &[PathBuf],
        options: &CompressionOptions,
    ) -> Result<()> {
        self(archive_path, files, options)
    }
}

///
/// Location of an exported manifest and its chunk blob.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedPaths {
    pub manifest: PathBuf,
    pub chunks: PathBuf,
}

impl PackedPaths {
    /// The paths used when exporting into `dir`.
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            manifest: dir.join(MANIFEST_FILE_NAME),
            chunks: dir.join(CHUNK_BLOB_FILE_NAME),
        }
    }

    /// Both paths, manifest first, as handed to the archiver.
    pub fn to_vec(&self) -> Vec<PathBuf> {
        vec![self.manifest.clone(), self.chunks.clone()]
    }

    ///
    /// Read the manifest and rebuild its files below `dest`.
    ///
    pub fn restore<P: AsRef<Path>>(&self, dest: P) -> Result<Vec<PathBuf>> {
        let manifest = Manifest::open(&self.manifest)?;
        let blob = BufReader::new(File::open(&self.chunks)?);
        manifest::restore_files(&manifest, blob, dest.as_ref())
    }
}

impl DeduplicationEngine {
    ///
    /// Deduplicate the files against a fresh chunk store and write the
    /// result to `dir` as [`MANIFEST_FILE_NAME`] and [`CHUNK_BLOB_FILE_NAME`].
    ///
    /// Files that cannot be opened are reported as skipped and left out of
    /// the manifest. A read error part way through a file, cancellation, or a
    /// failure to write the output aborts the export and leaves nothing
    /// behind in `dir`. The same goes for two files whose paths normalize to
    /// the same manifest path ([`Error::DuplicatePath`]). The engine's own
    /// chunk store is not modified.
    ///
    pub fn export_deduplicated<P: AsRef<Path>>(
        &self,
        files: &[P],
        dir: &Path,
    ) -> Result<(DedupResult, PackedPaths)> {
        let mut store = ChunkStore::new();
        let mut result = DedupResult::default();
        let mut entries = Vec::with_capacity(files.len());
        let mut names = HashSet::with_capacity(files.len());
        let mut blob = BufWriter::new(NamedTempFile::new_in(dir)?);
        for path in files {
            let path = path.as_ref();
            let name = manifest::manifest_path(path);
            if name.is_empty() {
                return Err(Error::UnsafePath(path.display().to_string()));
            }
            if names.contains(&name) {
                return Err(Error::DuplicatePath(name));
            }
            let file = match File::open(path) {
                Ok(file) => file,
                Err(error) => {
                    result.skip_file(path, error.into());
                    continue;
                }
            };
            let mut stats = FileStats {
                path: path.to_path_buf(),
                ..Default::default()
            };
            let mut indices = Vec::new();
            for chunk in self.stream_chunks(file) {
                self.check_cancelled()?;
                let chunk = chunk?;
                let hash = self.calculate_chunk_hash(&chunk.data);
                let length = chunk.length as u32;
                stats.size += u64::from(length);
                stats.chunks += 1;
                let recorded = store.record(&hash, chunk.offset, length);
                if recorded.is_new() {
                    blob.write_all(&chunk.data)?;
                    stats.new_chunks += 1;
                } else {
                    stats.saved_bytes += u64::from(length);
                }
                indices.push(recorded.index() as u32);
            }
            names.insert(name.clone());
            entries.push(FileEntry {
                path: name,
                size: stats.size,
                chunks: indices,
            });
            result.add_file(stats);
        }
        result.finish();

        let blob = blob.into_inner().map_err(|e| e.into_error())?;
        let mut manifest_file = NamedTempFile::new_in(dir)?;
        let manifest = Manifest::from_store(&store, self.options().hash_algorithm, entries);
        manifest.write_to(BufWriter::new(manifest_file.as_file_mut()))?;
        manifest_file.as_file().sync_all()?;
        blob.as_file().sync_all()?;

        let packed = PackedPaths::in_dir(dir);
        blob.persist(&packed.chunks).map_err(|e| Error::Io(e.error))?;
        if let Err(e) = manifest_file.persist(&packed.manifest) {
            let _ = fs::remove_file(&packed.chunks);
            return Err(Error::Io(e.error));
        }
        debug!(
            "exported {} chunks ({} bytes) for {} files to {}",
            store.len(),
            store.total_bytes(),
            result.files.len(),
            dir.display()
        );
        Ok((result, packed))
    }

    ///
    /// Deduplicate the files and have `collaborator` add the manifest and
    /// chunk blob to the archive at `archive_path`.
    ///
    /// The manifest and blob live in a temporary directory that is removed
    /// once the collaborator returns, whether it succeeded or not.
    ///
    pub fn store_deduplicated_archive<P, C>(
        &self,
        archive_path: &Path,
        files: &[P],
        collaborator: &C,
        options: &CompressionOptions,
    ) -> Result<DedupResult>
    where
        P: AsRef<Path>,
        C: ArchiveCollaborator + ?Sized,
    {
        let workspace = tempfile::Builder::new().prefix(".cdcdedup-").tempdir()?;
        let (result, packed) = self.export_deduplicated(files, workspace.path())?;
        let outcome = collaborator.add_to_archive(archive_path, &packed.to_vec(), options);
        let cleanup = workspace.close();
        outcome?;
        cleanup?;
        debug!(
            "stored {} unique chunks in {}",
            result.unique_chunks,
            archive_path.display()
        );
        Ok(result)
    }
}
