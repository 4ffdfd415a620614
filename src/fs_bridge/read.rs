//! `lookup`, `readdir`, `open` and `read`: the read-side of the bridge.

use sha2::{Digest, Sha256};

use super::prelude::*;
use crate::namespace;

pub fn root_attr() -> FileAttr {
    FileAttr {
        ino: 1,
        size: 0,
        blocks: 0,
        atime: UNIX_EPOCH,
        mtime: UNIX_EPOCH,
        ctime: UNIX_EPOCH,
        crtime: UNIX_EPOCH,
        kind: FileType::Directory,
        perm: 0o755,
        nlink: 2,
        uid: 0,
        gid: 0,
        rdev: 0,
        flags: 0,
        blksize: 4096,
    }
}

pub fn lookup(fs: &mut FsState, parent: u64, name: &OsStr, reply: ReplyEntry) {
    let Some(parent_path) = fs.path_for_inode(parent) else {
        reply.error(ENOENT);
        return;
    };
    let Some(name_str) = name.to_str() else {
        reply.error(ENOENT);
        return;
    };

    match fs.lookup_child(&parent_path, name_str) {
        Ok(Some(record)) => {
            let child_path = namespace::join(&parent_path, name_str);
            fs.remember(&child_path, record.inode());
            reply.entry(&TTL, &super::attr::to_file_attr(&record), 0);
        }
        Ok(None) => reply.error(ENOENT),
        Err(e) => reply.error(e.to_errno()),
    }
}

pub fn readdir(fs: &mut FsState, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
    let Some(dir_path) = fs.path_for_inode(ino) else {
        reply.error(ENOENT);
        return;
    };

    let children = match fs.list_children(&dir_path) {
        Ok(c) => c,
        Err(e) => {
            reply.error(e.to_errno());
            return;
        }
    };

    let mut entries = vec![
        (ino, FileType::Directory, ".".to_string()),
        (ino, FileType::Directory, "..".to_string()),
    ];
    for (name, record) in &children {
        let child_path = namespace::join(&dir_path, name);
        fs.remember(&child_path, record.inode());
        let kind = if record.is_dir() { FileType::Directory } else { FileType::RegularFile };
        entries.push((record.inode(), kind, name.clone()));
    }

    for (i, (entry_ino, kind, name)) in entries.into_iter().enumerate().skip(offset as usize) {
        if reply.add(entry_ino, (i + 1) as i64, kind, &name) {
            break;
        }
    }
    reply.ok();
}

pub fn open(fs: &mut FsState, ino: u64, _flags: i32, reply: ReplyOpen) {
    let Some(path) = fs.path_for_inode(ino) else {
        reply.error(ENOENT);
        return;
    };
    let Some((parent, name)) = namespace::split(&path) else {
        reply.error(EISDIR);
        return;
    };

    match fs.lookup_child(parent, name) {
        Ok(Some(InodeRecord::Directory(_))) => {
            reply.error(EISDIR);
        }
        Ok(Some(InodeRecord::File(_))) => open_staged(fs, &path, reply),
        Ok(None) => reply.error(ENOENT),
        Err(e) => reply.error(e.to_errno()),
    }
}

fn open_staged(fs: &mut FsState, path: &str, reply: ReplyOpen) {
    let local_path = fs.cache.lock().unwrap().local_path(path);
    if let Some(parent_dir) = local_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent_dir) {
            reply.error(e.raw_os_error().unwrap_or(EIO));
            return;
        }
    }

    let mut fetched_hash = None;
    if !local_path.exists() {
        let key = namespace::object_key(path);
        let body = match fs.runtime.block_on(fs.client.get_object(&key)) {
            Ok(b) => b,
            Err(e) => {
                reply.error(e.to_errno());
                return;
            }
        };
        let hash: [u8; 32] = Sha256::digest(&body).into();
        if let Err(e) = std::fs::write(&local_path, &body) {
            reply.error(e.raw_os_error().unwrap_or(EIO));
            return;
        }
        if let Err(e) = persist_fetch_hash(fs, path, hash) {
            reply.error(e.to_errno());
            return;
        }
        fetched_hash = Some(hash);
    }

    let file = match std::fs::OpenOptions::new().read(true).write(true).open(&local_path) {
        Ok(f) => f,
        Err(e) => {
            reply.error(e.raw_os_error().unwrap_or(EIO));
            return;
        }
    };

    let path_owned = path.to_string();
    let (fh, _handle) = fs.handles.register(move |handle_id| crate::handle::FileHandle {
        handle_id,
        path: path_owned,
        local_path,
        file,
        dirty: false,
        hash: fetched_hash,
    });

    reply.opened(fh, 0);
}

/// Persists the hash computed while streaming a fresh fetch onto the file's
/// inode record, the read-side counterpart of `write::update_file_record`.
fn persist_fetch_hash(fs: &FsState, path: &str, hash: [u8; 32]) -> Result<(), FsError> {
    let Some((parent, name)) = namespace::split(path) else {
        return Ok(());
    };
    let txn = fs.meta.begin_write()?;
    let container = txn.container(parent);
    let mut record = container.get(name)?;
    if let Some(file) = record.as_file_mut() {
        file.hash = Some(hash);
    }
    container.put(name, &record)?;
    txn.commit()
}

pub fn read(fs: &mut FsState, _ino: u64, fh: u64, offset: i64, size: u32, reply: ReplyData) {
    let Some(handle) = fs.handles.get(fh) else {
        reply.error(EBADF);
        return;
    };
    match handle.lock().unwrap().read_at(offset, size) {
        Ok(data) => reply.data(&data),
        Err(e) => reply.error(e.to_errno()),
    }
}
