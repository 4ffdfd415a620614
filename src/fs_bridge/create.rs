//! `create` and `mkdir`. Both wait for any conflicting in-flight write to
//! the same path first, mirroring `dir.go`'s `wait(path)` guard.

use super::attr;
use super::prelude::*;
use crate::meta::{DirRecord, FileRecord, Timestamps};
use crate::namespace;

pub fn create(fs: &mut FsState, parent: u64, name: &OsStr, mode: u32, flags: i32, reply: ReplyCreate) {
    let Some(parent_path) = fs.path_for_inode(parent) else {
        reply.error(ENOENT);
        return;
    };
    let Some(name_str) = name.to_str() else {
        reply.error(ENOENT);
        return;
    };
    let path = namespace::join(&parent_path, name_str);

    if let Err(e) = fs.handles.wait_for_unlock(&path) {
        reply.error(e.to_errno());
        return;
    }
    fs.handles.lock_path(&path);

    let record = match stage_file_record(fs, &parent_path, name_str, mode) {
        Ok(r) => r,
        Err(e) => {
            fs.handles.unlock_path(&path);
            reply.error(e.to_errno());
            return;
        }
    };
    fs.remember(&path, record.inode());

    let local_path = fs.cache.lock().unwrap().local_path(&path);
    if let Some(dir) = local_path.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            fs.handles.unlock_path(&path);
            reply.error(e.raw_os_error().unwrap_or(EIO));
            return;
        }
    }
    let file = match std::fs::OpenOptions::new().read(true).write(true).create(true).truncate(true).open(&local_path) {
        Ok(f) => f,
        Err(e) => {
            fs.handles.unlock_path(&path);
            reply.error(e.raw_os_error().unwrap_or(EIO));
            return;
        }
    };

    let path_owned = path.clone();
    let (fh, _handle) = fs.handles.register(move |handle_id| crate::handle::FileHandle {
        handle_id,
        path: path_owned,
        local_path,
        file,
        dirty: true,
        hash: None,
    });

    reply.created(&TTL, &attr::to_file_attr(&record), 0, fh, flags as u32);
}

fn stage_file_record(fs: &FsState, parent_path: &str, name: &str, mode: u32) -> Result<InodeRecord, FsError> {
    let txn = fs.meta.begin_write()?;
    let container = txn.container(parent_path);
    if let Some(existing) = container.try_get(name)? {
        txn.commit()?;
        return Ok(existing);
    }
    let inode = txn.next_inode()?;
    let record = InodeRecord::File(FileRecord {
        inode,
        mode,
        uid: fs.config.uid,
        gid: fs.config.gid,
        times: Timestamps::now(),
        flags: 0,
        size: 0,
        etag: String::new(),
        hash: None,
    });
    container.put(name, &record)?;
    txn.commit()?;
    Ok(record)
}

pub fn mkdir(fs: &mut FsState, parent: u64, name: &OsStr, mode: u32, reply: ReplyEntry) {
    let Some(parent_path) = fs.path_for_inode(parent) else {
        reply.error(ENOENT);
        return;
    };
    let Some(name_str) = name.to_str() else {
        reply.error(ENOENT);
        return;
    };
    let path = namespace::join(&parent_path, name_str);

    let record = match stage_dir_record(fs, &parent_path, name_str, mode) {
        Ok(r) => r,
        Err(e) => {
            reply.error(e.to_errno());
            return;
        }
    };

    // S3 has no real directories; a zero-byte, trailing-slash marker object
    // is the conventional way to make the directory visible to a bare
    // `ListObjectsV2` client that hasn't seen this mount's metadata store.
    let marker_key = format!("{path}/");
    if let Err(e) = fs
        .runtime
        .block_on(fs.client.put_object(&marker_key, bytes::Bytes::new(), &fs.config.account_id))
    {
        reply.error(e.to_errno());
        return;
    }

    fs.remember(&path, record.inode());
    reply.entry(&TTL, &attr::to_file_attr(&record), 0);
}

fn stage_dir_record(fs: &FsState, parent_path: &str, name: &str, mode: u32) -> Result<InodeRecord, FsError> {
    let txn = fs.meta.begin_write()?;
    let container = txn.container(parent_path);
    if let Some(existing) = container.try_get(name)? {
        txn.commit()?;
        return Ok(existing);
    }
    let inode = txn.next_inode()?;
    let record = InodeRecord::Directory(DirRecord {
        inode,
        mode,
        uid: fs.config.uid,
        gid: fs.config.gid,
        times: Timestamps::now(),
        flags: 0,
    });
    container.put(name, &record)?;
    txn.commit()?;
    Ok(record)
}
