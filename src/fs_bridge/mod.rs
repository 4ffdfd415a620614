//! Root of the FUSE filesystem implementation: the `FsState` that every
//! operation shares, and the `Filesystem` dispatcher that hands each kernel
//! call to the matching submodule.
//!
//! Shaped after the retrieved client's own `fs` module (one state struct,
//! one `Arc<Mutex<_>>` wrapper implementing `fuser::Filesystem` purely as a
//! router), with the REST-backed caches replaced by the metadata store,
//! object client, handle table and content cache this mount actually needs.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use fuser::{Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request};

use crate::config::FileConfig;
use crate::content_cache::ContentCache;
use crate::error::FsError;
use crate::handle::HandleTable;
use crate::meta::{InodeRecord, MetaStore};
use crate::object_client::ObjectClient;
use crate::scanner::Scanner;

pub mod attr;
pub mod create;
pub mod delete;
pub mod prelude;
pub mod read;
pub mod rename;
pub mod write;

/// Default TTL handed back to the kernel for entry/attribute caching.
pub const TTL: Duration = Duration::from_secs(1);

pub struct FsState {
    pub meta: Arc<MetaStore>,
    pub client: Arc<dyn ObjectClient>,
    pub handles: HandleTable,
    pub cache: std::sync::Mutex<ContentCache>,
    pub runtime: tokio::runtime::Runtime,
    pub config: FileConfig,
    inode_to_path: HashMap<u64, String>,
}

impl FsState {
    pub fn new(meta: Arc<MetaStore>, client: Arc<dyn ObjectClient>, config: FileConfig, runtime: tokio::runtime::Runtime) -> Self {
        let mut inode_to_path = HashMap::new();
        inode_to_path.insert(1, String::new());
        let cache = ContentCache::new(config.cache_dir.clone(), config.cache_size_bytes);
        Self {
            meta,
            client,
            handles: HandleTable::new(),
            cache: std::sync::Mutex::new(cache),
            runtime,
            config,
            inode_to_path,
        }
    }

    pub fn path_for_inode(&self, ino: u64) -> Option<String> {
        if ino == 1 {
            return Some(String::new());
        }
        self.inode_to_path.get(&ino).cloned()
    }

    pub fn remember(&mut self, path: &str, inode: u64) {
        self.inode_to_path.insert(inode, path.to_string());
    }

    /// Resolves `name` inside `dir_path`, triggering an on-demand scan the
    /// first time the directory is visited so freshly-discovered remote
    /// objects get inode records.
    pub fn lookup_child(&self, dir_path: &str, name: &str) -> Result<Option<InodeRecord>, FsError> {
        {
            let txn = self.meta.begin_read()?;
            if let Some(rec) = txn.container(dir_path).try_get(name)? {
                return Ok(Some(rec));
            }
        }
        let scanner = Scanner {
            client: self.client.as_ref(),
            meta: &self.meta,
            config: &self.config,
        };
        self.runtime.block_on(scanner.scan(dir_path))?;
        let txn = self.meta.begin_read()?;
        txn.container(dir_path).try_get(name)
    }

    /// Resolves `name` inside `dir_path` from the existing metadata only,
    /// never triggering a scan. Used by `Getattr`/`Setattr`, which per the
    /// trigger list only `Lookup`/`ReadDirAll` are allowed to invoke the
    /// scanner.
    pub fn lookup_child_no_scan(&self, dir_path: &str, name: &str) -> Result<Option<InodeRecord>, FsError> {
        let txn = self.meta.begin_read()?;
        txn.container(dir_path).try_get(name)
    }

    /// Lists every child of `dir_path`, scanning first if it has never been
    /// enumerated (a directory with zero children and zero scans looks the
    /// same, so this always scans — the scan itself is a cheap no-op once
    /// every record already exists).
    pub fn list_children(&self, dir_path: &str) -> Result<Vec<(String, InodeRecord)>, FsError> {
        let scanner = Scanner {
            client: self.client.as_ref(),
            meta: &self.meta,
            config: &self.config,
        };
        self.runtime.block_on(scanner.scan(dir_path))?;

        let txn = self.meta.begin_read()?;
        let container = txn.container(dir_path);
        let mut out = Vec::new();
        container.for_each(|name, record| {
            out.push((name.to_string(), record));
            Ok(())
        })?;
        Ok(out)
    }
}

#[derive(Clone)]
pub struct FsBridge(pub Arc<std::sync::Mutex<FsState>>);

impl Filesystem for FsBridge {
    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        let mut fs = self.0.lock().unwrap();
        attr::getattr(&mut fs, ino, reply);
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<std::time::SystemTime>,
        fh: Option<u64>,
        _crtime: Option<std::time::SystemTime>,
        _chgtime: Option<std::time::SystemTime>,
        _bkuptime: Option<std::time::SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let mut fs = self.0.lock().unwrap();
        attr::setattr(&mut fs, ino, mode, uid, gid, size, fh, reply);
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let mut fs = self.0.lock().unwrap();
        read::lookup(&mut fs, parent, name, reply);
    }

    fn readdir(&mut self, _req: &Request, ino: u64, fh: u64, offset: i64, reply: ReplyDirectory) {
        let mut fs = self.0.lock().unwrap();
        read::readdir(&mut fs, ino, fh, offset, reply);
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let mut fs = self.0.lock().unwrap();
        read::open(&mut fs, ino, flags, reply);
    }

    #[allow(clippy::too_many_arguments)]
    fn read(&mut self, _req: &Request<'_>, ino: u64, fh: u64, offset: i64, size: u32, _flags: i32, _lock_owner: Option<u64>, reply: ReplyData) {
        let mut fs = self.0.lock().unwrap();
        read::read(&mut fs, ino, fh, offset, size, reply);
    }

    #[allow(clippy::too_many_arguments)]
    fn write(&mut self, _req: &Request<'_>, ino: u64, fh: u64, offset: i64, data: &[u8], _write_flags: u32, _flags: i32, _lock_owner: Option<u64>, reply: ReplyWrite) {
        let mut fs = self.0.lock().unwrap();
        write::write(&mut fs, ino, fh, offset, data, reply);
    }

    fn release(&mut self, _req: &Request<'_>, ino: u64, fh: u64, _flags: i32, _lock_owner: Option<u64>, _flush: bool, reply: ReplyEmpty) {
        let mut fs = self.0.lock().unwrap();
        write::release(&mut fs, ino, fh, reply);
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let mut fs = self.0.lock().unwrap();
        write::flush(&mut fs, ino, fh, reply);
    }

    fn create(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, _umask: u32, flags: i32, reply: ReplyCreate) {
        let mut fs = self.0.lock().unwrap();
        create::create(&mut fs, parent, name, mode, flags, reply);
    }

    fn mkdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, mode: u32, _umask: u32, reply: ReplyEntry) {
        let mut fs = self.0.lock().unwrap();
        create::mkdir(&mut fs, parent, name, mode, reply);
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let mut fs = self.0.lock().unwrap();
        delete::unlink(&mut fs, parent, name, reply);
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let mut fs = self.0.lock().unwrap();
        delete::rmdir(&mut fs, parent, name, reply);
    }

    fn rename(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, newparent: u64, newname: &OsStr, flags: u32, reply: ReplyEmpty) {
        let mut fs = self.0.lock().unwrap();
        rename::rename(&mut fs, parent, name, newparent, newname, flags, reply);
    }
}
