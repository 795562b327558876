//
// Copyright (c) 2025 Nathan Fiedler
//

//! Binary manifest describing a chunk store and the files built from it.
//!
//! All integers are little-endian. The chunk table is the format written by
//! earlier releases, which had neither magic number nor version:
//!
//! ```text
//! u32 chunk_count
//! chunk_count times:
//!     u32 hash_len, hash_len bytes of ASCII hex hash
//!     u64 offset, u32 size, u32 ref_count
//! ```
//!
//! Version 1 manifests wrap that table with a header and append the list of
//! files, each described by the indices of its chunks in the table:
//!
//! ```text
//! b"CDCM", u32 version, u32 name_len, name_len bytes of hash algorithm name
//! <chunk table>
//! u32 file_count
//! file_count times:
//!     u32 path_len, path_len bytes of UTF-8 path
//!     u64 size, u32 chunk_ref_count, chunk_ref_count times u32 chunk index
//! ```
//!
//! The chunk blob that accompanies a manifest holds the bytes of every chunk
//! in table order, so the blob offset of a chunk is the sum of the sizes of
//! the chunks before it.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use tempfile::NamedTempFile;

use crate::hasher::HashAlgorithm;
use crate::store::{ChunkRecord, ChunkStore};
use crate::{Error, Result};

/// Leading bytes of a versioned manifest.
pub const MAGIC: [u8; 4] = *b"CDCM";
/// Version written by [`Manifest::write_to`].
pub const VERSION: u32 = 1;
/// Version reported for manifests without a header.
pub const LEGACY_VERSION: u32 = 0;

// Upper bound for hash, path and algorithm name lengths when decoding.
const MAX_STRING_LEN: u32 = 65_536;
// Upper bound for speculative allocation while decoding counts.
const MAX_PREALLOCATE: usize = 65_536;

///
/// A file reassembled from the chunk table.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Relative path with `/` separators.
    pub path: String,
    pub size: u64,
    /// Indices into the manifest chunk table, in file order.
    pub chunks: Vec<u32>,
}

///
/// Decoded or to-be-written manifest.
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    version: u32,
    algorithm: Option<HashAlgorithm>,
    chunks: Vec<ChunkRecord>,
    files: Vec<FileEntry>,
}

impl Manifest {
    ///
    /// Build a manifest from the records of a store and the files that
    /// reference them.
    ///
    pub fn from_store(store: &ChunkStore, algorithm: HashAlgorithm, files: Vec<FileEntry>) -> Self {
        Self {
            version: VERSION,
            algorithm: Some(algorithm),
            chunks: store.records().to_vec(),
            files,
        }
    }

    /// Format version, [`LEGACY_VERSION`] for headerless manifests.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Chunk hash algorithm, unknown for legacy manifests.
    pub fn algorithm(&self) -> Option<HashAlgorithm> {
        self.algorithm
    }

    pub fn chunks(&self) -> &[ChunkRecord] {
        &self.chunks
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    /// Rebuild a chunk store from the chunk table.
    pub fn to_store(&self) -> ChunkStore {
        let mut store = ChunkStore::new();
        for record in &self.chunks {
            store.insert_record(record.clone());
        }
        store
    }

    /// Offset of every chunk within the chunk blob.
    pub fn blob_offsets(&self) -> Vec<u64> {
        let mut offset = 0;
        self.chunks
            .iter()
            .map(|record| {
                let start = offset;
                offset += u64::from(record.size);
                start
            })
            .collect()
    }

    /// Expected size of the chunk blob.
    pub fn blob_size(&self) -> u64 {
        self.chunks.iter().map(|r| u64::from(r.size)).sum()
    }

    ///
    /// Check that every file refers to existing chunks whose sizes add up to
    /// the file size, and that no path is empty or listed twice.
    ///
    pub fn validate(&self) -> Result<()> {
        check_file_entries(&self.files, &self.chunks)
    }

    ///
    /// Write a version 1 manifest.
    ///
    /// Fails for a manifest without a hash algorithm, such as one read from
    /// the legacy format; those can only be written with
    /// [`write_legacy_to`](Self::write_legacy_to).
    ///
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let algorithm = self.algorithm.ok_or_else(|| {
            Error::InvalidManifest("chunk hash algorithm is unknown".into())
        })?;
        writer.write_all(&MAGIC)?;
        writer.write_u32::<LittleEndian>(VERSION)?;
        write_string(&mut writer, algorithm.name())?;
        self.write_chunk_table(&mut writer)?;
        writer.write_u32::<LittleEndian>(checked_count(self.files.len())?)?;
        for file in &self.files {
            write_string(&mut writer, &file.path)?;
            writer.write_u64::<LittleEndian>(file.size)?;
            writer.write_u32::<LittleEndian>(checked_count(file.chunks.len())?)?;
            for &index in &file.chunks {
                writer.write_u32::<LittleEndian>(index)?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    ///
    /// Write only the headerless chunk table understood by older readers.
    ///
    pub fn write_legacy_to<W: Write>(&self, mut writer: W) -> Result<()> {
        self.write_chunk_table(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    fn write_chunk_table<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(checked_count(self.chunks.len())?)?;
        for record in &self.chunks {
            write_string(writer, &record.hash)?;
            writer.write_u64::<LittleEndian>(record.offset)?;
            writer.write_u32::<LittleEndian>(record.size)?;
            writer.write_u32::<LittleEndian>(record.ref_count)?;
        }
        Ok(())
    }

    ///
    /// Decode a manifest, either version 1 or legacy.
    ///
    /// A legacy manifest whose chunk count happens to equal the magic number
    /// read as an integer would be misread; that count is far beyond anything
    /// a manifest can practically hold.
    ///
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut lead = [0u8; 4];
        reader.read_exact(&mut lead).map_err(truncated)?;
        let manifest = if lead == MAGIC {
            let version = reader.read_u32::<LittleEndian>().map_err(truncated)?;
            if version != VERSION {
                return Err(Error::InvalidManifest(format!(
                    "unsupported version {version}"
                )));
            }
            let name = read_string(&mut reader)?;
            let algorithm: HashAlgorithm = name.parse()?;
            let count = reader.read_u32::<LittleEndian>().map_err(truncated)?;
            let chunks = read_chunk_table(&mut reader, count)?;
            let files = read_file_table(&mut reader, &chunks)?;
            Manifest {
                version,
                algorithm: Some(algorithm),
                chunks,
                files,
            }
        } else {
            let count = u32::from_le_bytes(lead);
            let chunks = read_chunk_table(&mut reader, count)?;
            Manifest {
                version: LEGACY_VERSION,
                algorithm: None,
                chunks,
                files: Vec::new(),
            }
        };
        Ok(manifest)
    }

    /// Read a manifest from a file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Manifest::read_from(io::BufReader::new(file))
    }
}

fn checked_count(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| Error::InvalidManifest(format!("too many entries: {len}")))
}

fn write_string<W: Write>(writer: &mut W, value: &str) -> Result<()> {
    writer.write_u32::<LittleEndian>(checked_count(value.len())?)?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

fn truncated(error: io::Error) -> Error {
    if error.kind() == io::ErrorKind::UnexpectedEof {
        Error::InvalidManifest("unexpected end of manifest".into())
    } else {
        Error::Io(error)
    }
}

fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    let len = reader.read_u32::<LittleEndian>().map_err(truncated)?;
    if len > MAX_STRING_LEN {
        return Err(Error::InvalidManifest(format!("string length {len} too large")));
    }
    let mut bytes = vec![0u8; len as usize];
    reader.read_exact(&mut bytes).map_err(truncated)?;
    String::from_utf8(bytes).map_err(|_| Error::InvalidManifest("string is not UTF-8".into()))
}

fn read_chunk_table<R: Read>(reader: &mut R, count: u32) -> Result<Vec<ChunkRecord>> {
    let mut chunks = Vec::with_capacity((count as usize).min(MAX_PREALLOCATE));
    for _ in 0..count {
        let hash = read_string(reader)?;
        let offset = reader.read_u64::<LittleEndian>().map_err(truncated)?;
        let size = reader.read_u32::<LittleEndian>().map_err(truncated)?;
        let ref_count = reader.read_u32::<LittleEndian>().map_err(truncated)?;
        if ref_count == 0 {
            return Err(Error::InvalidManifest(format!(
                "chunk {hash} has a reference count of zero"
            )));
        }
        chunks.push(ChunkRecord {
            hash,
            offset,
            size,
            ref_count,
        });
    }
    Ok(chunks)
}

fn read_file_table<R: Read>(reader: &mut R, chunks: &[ChunkRecord]) -> Result<Vec<FileEntry>> {
    let count = reader.read_u32::<LittleEndian>().map_err(truncated)?;
    let mut files = Vec::with_capacity((count as usize).min(MAX_PREALLOCATE));
    for _ in 0..count {
        let path = read_string(reader)?;
        let size = reader.read_u64::<LittleEndian>().map_err(truncated)?;
        let refs = reader.read_u32::<LittleEndian>().map_err(truncated)?;
        let mut indices = Vec::with_capacity((refs as usize).min(MAX_PREALLOCATE));
        for _ in 0..refs {
            indices.push(reader.read_u32::<LittleEndian>().map_err(truncated)?);
        }
        files.push(FileEntry {
            path,
            size,
            chunks: indices,
        });
    }
    check_file_entries(&files, chunks)?;
    Ok(files)
}

fn check_file_entries(files: &[FileEntry], chunks: &[ChunkRecord]) -> Result<()> {
    let mut paths = HashSet::with_capacity(files.len());
    for file in files {
        let path = &file.path;
        if path.is_empty() {
            return Err(Error::InvalidManifest("file with an empty path".into()));
        }
        if !paths.insert(path.as_str()) {
            return Err(Error::InvalidManifest(format!("{path} is listed twice")));
        }
        let mut total: u64 = 0;
        for &index in &file.chunks {
            let record = chunks.get(index as usize).ok_or_else(|| {
                Error::InvalidManifest(format!("{path} refers to missing chunk {index}"))
            })?;
            total += u64::from(record.size);
        }
        if total != file.size {
            return Err(Error::InvalidManifest(format!(
                "{path} is {} bytes but its chunks add up to {total}",
                file.size
            )));
        }
    }
    Ok(())
}

///
/// Turn a path into the relative, `/` separated form stored in manifests.
///
/// The path is normalized lexically: root, prefix and `.` components are
/// dropped and `..` removes the component before it, so that `sub/../a.bin`
/// becomes `a.bin`. A `..` with nothing left to remove is dropped.
///
pub fn manifest_path(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
            Component::ParentDir => {
                parts.pop();
            }
            Component::RootDir | Component::Prefix(_) | Component::CurDir => {}
        }
    }
    parts.join("/")
}

// Resolve a manifest path below `dest`, rejecting anything that could escape.
fn restore_target(dest: &Path, path: &str) -> Result<PathBuf> {
    let mut target = dest.to_path_buf();
    let mut parts = 0;
    for component in Path::new(path).components() {
        match component {
            Component::Normal(part) => {
                target.push(part);
                parts += 1;
            }
            Component::CurDir => {}
            _ => return Err(Error::UnsafePath(path.to_owned())),
        }
    }
    if parts == 0 {
        return Err(Error::UnsafePath(path.to_owned()));
    }
    Ok(target)
}

///
/// Rebuild the files listed in the manifest below `dest` from the chunk blob,
/// returning the paths written.
///
/// When the manifest names its hash algorithm every chunk is verified before
/// it is written. Each file is assembled in a temporary file next to its
/// target and only moved into place once all of its chunks have been read,
/// so a failure never leaves a partial file at the target path.
///
pub fn restore_files<R: Read + Seek>(
    manifest: &Manifest,
    mut blob: R,
    dest: &Path,
) -> Result<Vec<PathBuf>> {
    manifest.validate()?;
    let offsets = manifest.blob_offsets();
    let mut written = Vec::with_capacity(manifest.files().len());
    let mut buffer = Vec::new();
    for entry in manifest.files() {
        let target = restore_target(dest, &entry.path)?;
        let parent = target.parent().unwrap_or(dest);
        fs::create_dir_all(parent)?;
        let mut staged = NamedTempFile::new_in(parent)?;
        let mut output = BufWriter::new(staged.as_file_mut());
        for &index in &entry.chunks {
            let index = index as usize;
            let (record, &offset) = manifest
                .chunks()
                .get(index)
                .zip(offsets.get(index))
                .ok_or_else(|| Error::InvalidManifest(format!("missing chunk {index}")))?;
            buffer.resize(record.size as usize, 0);
            blob.seek(SeekFrom::Start(offset))?;
            blob.read_exact(&mut buffer).map_err(|e| {
                if e.kind() == io::ErrorKind::UnexpectedEof {
                    Error::InvalidManifest(format!("chunk blob ends before chunk {index}"))
                } else {
                    Error::Io(e)
                }
            })?;
            if let Some(algorithm) = manifest.algorithm() {
                let actual = algorithm.hash_hex(&buffer);
                if actual != record.hash {
                    return Err(Error::ChunkHashMismatch {
                        index,
                        expected: record.hash.clone(),
                        actual,
                    });
                }
            }
            output.write_all(&buffer)?;
        }
        output.flush()?;
        drop(output);
        staged.persist(&target).map_err(|e| Error::Io(e.error))?;
        debug!("restored {} ({} bytes)", target.display(), entry.size);
        written.push(target);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn sample_store() -> ChunkStore {
        let mut store = ChunkStore::new();
        for data in [&b"hello "[..], b"world", b"hello "] {
            let hash = HashAlgorithm::Sha256.hash_hex(data);
            store.record(&hash, 0, data.len() as u32);
        }
        store
    }

    fn sample_manifest() -> Manifest {
        let files = vec![FileEntry {
            path: "greeting/a.txt".into(),
            size: 17,
            chunks: vec![0, 1, 0],
        }];
        Manifest::from_store(&sample_store(), HashAlgorithm::Sha256, files)
    }

    #[test]
    fn test_legacy_layout_is_bit_exact() {
        let mut store = ChunkStore::new();
        store.record("ab12", 0x0102, 7);
        store.record("ab12", 99, 7);
        let manifest = Manifest::from_store(&store, HashAlgorithm::Crc32, Vec::new());
        let mut bytes = Vec::new();
        manifest.write_legacy_to(&mut bytes).unwrap();
        let expected: Vec<u8> = vec![
            1, 0, 0, 0, // chunk count
            4, 0, 0, 0, b'a', b'b', b'1', b'2', // hash
            0x02, 0x01, 0, 0, 0, 0, 0, 0, // offset
            7, 0, 0, 0, // size
            2, 0, 0, 0, // ref count
        ];
        assert_eq!(bytes, expected);
        let decoded = Manifest::read_from(Cursor::new(&bytes)).unwrap();
        assert_eq!(decoded.version(), LEGACY_VERSION);
        assert_eq!(decoded.algorithm(), None);
        assert_eq!(decoded.chunks(), manifest.chunks());
        assert!(decoded.files().is_empty());
    }

    #[test]
    fn test_versioned_header() {
        let mut bytes = Vec::new();
        sample_manifest().write_to(&mut bytes).unwrap();
        assert_eq!(&bytes[..4], b"CDCM");
        assert_eq!(&bytes[4..8], &[1, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[6, 0, 0, 0]);
        assert_eq!(&bytes[12..18], b"SHA256");
        let decoded = Manifest::read_from(Cursor::new(&bytes)).unwrap();
        assert_eq!(decoded, sample_manifest());
        assert_eq!(decoded.to_store().get(&decoded.chunks()[0].hash).unwrap().ref_count, 2);
    }

    #[test]
    fn test_truncated_manifest() {
        let mut bytes = Vec::new();
        sample_manifest().write_to(&mut bytes).unwrap();
        for len in [0, 3, 10, bytes.len() - 1] {
            let result = Manifest::read_from(Cursor::new(&bytes[..len]));
            assert!(matches!(result, Err(Error::InvalidManifest(_))), "{len}");
        }
    }

    #[test]
    fn test_unsupported_version() {
        let mut bytes = b"CDCM".to_vec();
        bytes.extend_from_slice(&7u32.to_le_bytes());
        let result = Manifest::read_from(Cursor::new(&bytes));
        assert!(matches!(result, Err(Error::InvalidManifest(_))));
    }

    #[test]
    fn test_file_size_mismatch_rejected() {
        let mut manifest = sample_manifest();
        manifest.files[0].size = 18;
        let mut bytes = Vec::new();
        manifest.write_to(&mut bytes).unwrap();
        assert!(matches!(
            Manifest::read_from(Cursor::new(&bytes)),
            Err(Error::InvalidManifest(_))
        ));
    }

    #[test]
    fn test_blob_offsets() {
        let manifest = sample_manifest();
        assert_eq!(manifest.blob_offsets(), vec![0, 6]);
        assert_eq!(manifest.blob_size(), 11);
    }

    #[test]
    fn test_manifest_path() {
        assert_eq!(manifest_path(Path::new("a/b/c.txt")), "a/b/c.txt");
        assert_eq!(manifest_path(Path::new("./a/../b")), "b");
        assert_eq!(manifest_path(Path::new("in/sub/../a.bin")), "in/a.bin");
        assert_eq!(manifest_path(Path::new("../../a.bin")), "a.bin");
        assert_ne!(
            manifest_path(Path::new("in/sub/../a.bin")),
            manifest_path(Path::new("in/sub/a.bin"))
        );
        #[cfg(unix)]
        assert_eq!(manifest_path(Path::new("/tmp/x.bin")), "tmp/x.bin");
    }

    #[test]
    fn test_restore_files() {
        let dir = TempDir::new().unwrap();
        let blob = b"hello world".to_vec();
        let written = restore_files(&sample_manifest(), Cursor::new(blob), dir.path()).unwrap();
        assert_eq!(written, vec![dir.path().join("greeting").join("a.txt")]);
        let contents = fs::read(&written[0]).unwrap();
        assert_eq!(contents, b"hello worldhello ");
    }

    #[test]
    fn test_restore_detects_corruption() {
        let dir = TempDir::new().unwrap();
        let blob = b"jello world".to_vec();
        let result = restore_files(&sample_manifest(), Cursor::new(blob), dir.path());
        assert!(matches!(result, Err(Error::ChunkHashMismatch { index: 0, .. })));
        let target = dir.path().join("greeting").join("a.txt");
        assert!(!target.exists());
        let short = b"hello".to_vec();
        let result = restore_files(&sample_manifest(), Cursor::new(short), dir.path());
        assert!(matches!(result, Err(Error::InvalidManifest(_))));
        assert!(!target.exists());
        // staging files are gone as well
        let leftovers = fs::read_dir(dir.path().join("greeting")).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_restore_rejects_missing_chunk() {
        let dir = TempDir::new().unwrap();
        let files = vec![FileEntry {
            path: "a.txt".into(),
            size: 6,
            chunks: vec![5],
        }];
        let manifest = Manifest::from_store(&sample_store(), HashAlgorithm::Sha256, files);
        assert!(matches!(manifest.validate(), Err(Error::InvalidManifest(_))));
        let result = restore_files(&manifest, Cursor::new(b"hello world".to_vec()), dir.path());
        assert!(matches!(result, Err(Error::InvalidManifest(_))));
        assert!(!dir.path().join("a.txt").exists());
    }

    #[test]
    fn test_duplicate_paths_rejected() {
        let mut manifest = sample_manifest();
        let mut copy = manifest.files[0].clone();
        copy.size = 5;
        copy.chunks = vec![1];
        manifest.files.push(copy);
        assert!(matches!(manifest.validate(), Err(Error::InvalidManifest(_))));
        let mut bytes = Vec::new();
        manifest.write_to(&mut bytes).unwrap();
        assert!(matches!(
            Manifest::read_from(Cursor::new(&bytes)),
            Err(Error::InvalidManifest(_))
        ));
        let dir = TempDir::new().unwrap();
        let result = restore_files(&manifest, Cursor::new(b"hello world".to_vec()), dir.path());
        assert!(matches!(result, Err(Error::InvalidManifest(_))));
    }

    #[test]
    fn test_legacy_manifest_keeps_unknown_algorithm() {
        let mut legacy = Vec::new();
        sample_manifest().write_legacy_to(&mut legacy).unwrap();
        let decoded = Manifest::read_from(Cursor::new(&legacy)).unwrap();
        assert_eq!(decoded.algorithm(), None);
        let mut bytes = Vec::new();
        let result = decoded.write_to(&mut bytes);
        assert!(matches!(result, Err(Error::InvalidManifest(_))));
        assert!(bytes.is_empty());
        let mut rewritten = Vec::new();
        decoded.write_legacy_to(&mut rewritten).unwrap();
        assert_eq!(rewritten, legacy);
    }

    #[test]
    fn test_restore_rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        for path in ["../evil", "a/../../evil", "/etc/evil"] {
            let mut manifest = sample_manifest();
            manifest.files[0].path = path.into();
            let result = restore_files(&manifest, Cursor::new(b"hello world".to_vec()), dir.path());
            assert!(matches!(result, Err(Error::UnsafePath(_))), "{path}");
        }
        let mut manifest = sample_manifest();
        manifest.files[0].path = String::new();
        let result = restore_files(&manifest, Cursor::new(b"hello world".to_vec()), dir.path());
        assert!(matches!(result, Err(Error::InvalidManifest(_))));
    }
}
