use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};

/// Content address of a chunk (SHA-1 of its plaintext).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkId(pub [u8; 20]);

impl ChunkId {
    pub fn to_hex(&self) -> String { hex::encode(self.0) }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.to_hex()) }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "ChunkId({})", self.to_hex()) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id:            ChunkId,
    /// Adler-32 of the chunk plaintext.
    pub checksum:            u32,
    pub offset:              u64,
    pub compressed_length:   u32,
    pub uncompressed_length: u32,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileFlags(u32);

impl FileFlags {
    pub const NONE: Self = Self(0);
    pub const USER_CONFIG: Self = Self(1);
    pub const VERSIONED_USER_CONFIG: Self = Self(2);
    pub const ENCRYPTED: Self = Self(4);
    pub const READ_ONLY: Self = Self(8);
    pub const HIDDEN: Self = Self(16);
    pub const EXECUTABLE: Self = Self(32);
    pub const DIRECTORY: Self = Self(64);
    pub const CUSTOM_EXECUTABLE: Self = Self(128);
    pub const INSTALL_SCRIPT: Self = Self(256);
    pub const SYMLINK: Self = Self(512);

    pub const fn from_bits(bits: u32) -> Self { Self(bits) }

    pub const fn bits(self) -> u32 { self.0 }

    pub const fn contains(self, other: Self) -> bool { self.0 & other.0 == other.0 }
}

impl BitOr for FileFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self { Self(self.0 | rhs.0) }
}

impl fmt::Debug for FileFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "FileFlags({:#x})", self.0) }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    name:       String,
    chunks:     Vec<ChunkRecord>,
    flags:      FileFlags,
    total_size: u64,
    file_hash:  Vec<u8>,
}

impl FileRecord {
    /// Build a file record; backslash separators in `name` become `/`.
    pub fn new(
        name: impl Into<String>,
        flags: FileFlags,
        total_size: u64,
        file_hash: impl Into<Vec<u8>>,
        chunks: impl IntoIterator<Item = ChunkRecord>,
    ) -> Self {
        Self {
            name: normalize_path(name.into()),
            chunks: chunks.into_iter().collect(),
            flags,
            total_size,
            file_hash: file_hash.into(),
        }
    }

    pub fn name(&self) -> &str { &self.name }

    pub fn chunks(&self) -> &[ChunkRecord] { &self.chunks }

    pub fn flags(&self) -> FileFlags { self.flags }

    pub fn total_size(&self) -> u64 { self.total_size }

    pub fn file_hash(&self) -> &[u8] { &self.file_hash }

    pub fn is_directory(&self) -> bool { self.flags.contains(FileFlags::DIRECTORY) }

    pub fn is_symlink(&self) -> bool { self.flags.contains(FileFlags::SYMLINK) }

    pub fn is_executable(&self) -> bool { self.flags.contains(FileFlags::EXECUTABLE) }
}

fn normalize_path(name: String) -> String {
    if name.contains('\\') { name.replace('\\', "/") } else { name }
}

/// Metadata of one depot manifest. Immutable once built.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    depot_id:      u32,
    manifest_id:   u64,
    creation_time: u64,
    files:         Vec<FileRecord>,
}

impl Manifest {
    pub fn builder(depot_id: u32, manifest_id: u64) -> ManifestBuilder { ManifestBuilder::new(depot_id, manifest_id) }

    pub fn depot_id(&self) -> u32 { self.depot_id }

    pub fn manifest_id(&self) -> u64 { self.manifest_id }

    /// Seconds since the Unix epoch, as reported by the source manifest.
    pub fn creation_time(&self) -> u64 { self.creation_time }

    pub fn files(&self) -> &[FileRecord] { &self.files }

    pub fn file(&self, name: &str) -> Option<&FileRecord> { self.files.iter().find(|f| f.name == name) }

    pub fn total_size(&self) -> u64 { self.files.iter().map(|f| f.total_size).sum() }

    pub fn chunk_count(&self) -> usize { self.files.iter().map(|f| f.chunks.len()).sum() }
}

#[derive(Debug)]
pub struct ManifestBuilder {
    depot_id:      u32,
    manifest_id:   u64,
    creation_time: u64,
    files:         Vec<FileRecord>,
}

impl ManifestBuilder {
    pub fn new(depot_id: u32, manifest_id: u64) -> Self {
        Self {
            depot_id,
            manifest_id,
            creation_time: 0,
            files: Vec::new(),
        }
    }

    pub fn creation_time(mut self, creation_time: u64) -> Self {
        self.creation_time = creation_time;
        self
    }

    pub fn file(mut self, file: FileRecord) -> Self {
        self.files.push(file);
        self
    }

    pub fn files(mut self, files: impl IntoIterator<Item = FileRecord>) -> Self {
        self.files.extend(files);
        self
    }

    pub fn build(self) -> Manifest {
        Manifest {
            depot_id:      self.depot_id,
            manifest_id:   self.manifest_id,
            creation_time: self.creation_time,
            files:         self.files,
        }
    }
}
