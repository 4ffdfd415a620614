//! The tagged inode record stored in every [`super::MetaStore`] container.

use serde::{Deserialize, Serialize};

/// Timestamps carried by every record, expressed as whole seconds since
/// the Unix epoch (serde has no native `SystemTime` support, and seconds
/// are all the object store's `LastModified` gives us anyway).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timestamps {
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub crtime: i64,
}

impl Timestamps {
    pub fn now() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Self {
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirRecord {
    pub inode: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub times: Timestamps,
    pub flags: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub inode: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub times: Timestamps,
    pub flags: u32,
    pub size: u64,
    pub etag: String,
    /// SHA-256 of the last staged body, set once the body has been fetched
    /// or uploaded at least once.
    pub hash: Option<[u8; 32]>,
}

/// A single entry in a directory's container: either a subdirectory or a
/// file. The discriminator is preserved explicitly so decode never has to
/// guess the shape of the bytes behind a key, unlike the source's runtime
/// type assertion over an untyped value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InodeRecord {
    Directory(DirRecord),
    File(FileRecord),
}

impl InodeRecord {
    pub fn inode(&self) -> u64 {
        match self {
            InodeRecord::Directory(d) => d.inode,
            InodeRecord::File(f) => f.inode,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, InodeRecord::Directory(_))
    }

    pub fn as_dir(&self) -> Option<&DirRecord> {
        match self {
            InodeRecord::Directory(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileRecord> {
        match self {
            InodeRecord::File(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_file_mut(&mut self) -> Option<&mut FileRecord> {
        match self {
            InodeRecord::File(f) => Some(f),
            _ => None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, crate::error::FsError> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, crate::error::FsError> {
        Ok(bincode::deserialize(bytes)?)
    }
}
