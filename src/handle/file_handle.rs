//! A single open file's staged local body.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::error::FsError;

/// The local, on-disk staging area for one open remote object. Reads and
/// writes are served from `file`; its bytes become canonical remotely only
/// once `release` uploads them.
pub struct FileHandle {
    pub handle_id: u64,
    /// Remote object key (also the MetaStore path).
    pub path: String,
    pub local_path: PathBuf,
    pub file: File,
    pub dirty: bool,
    /// SHA-256 of the body as last staged from the remote object, computed
    /// while streaming the fetch in `Open`. `None` until a fetch (or a
    /// write-back) has computed one.
    pub hash: Option<[u8; 32]>,
}

impl FileHandle {
    pub fn read_at(&mut self, offset: i64, size: u32) -> Result<Vec<u8>, FsError> {
        self.file.seek(SeekFrom::Start(offset.max(0) as u64))?;
        let mut buf = vec![0u8; size as usize];
        let n = self.file.read(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    pub fn write_at(&mut self, offset: i64, data: &[u8]) -> Result<usize, FsError> {
        self.file.seek(SeekFrom::Start(offset.max(0) as u64))?;
        self.file.write_all(data)?;
        self.dirty = true;
        Ok(data.len())
    }

    pub fn current_len(&self) -> Result<u64, FsError> {
        Ok(self.file.metadata()?.len())
    }

    pub fn truncate(&mut self, size: u64) -> Result<(), FsError> {
        self.file.set_len(size)?;
        self.dirty = true;
        Ok(())
    }
}
