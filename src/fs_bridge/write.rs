//! `write`, `flush` and `release`: the write-back half of the bridge.
//! A dirty handle's body is staged entirely on local disk and uploaded
//! whole on `release`, matching the source's buffer-then-upload shape.

use sha2::{Digest, Sha256};

use super::prelude::*;
use crate::namespace;

pub fn write(fs: &mut FsState, _ino: u64, fh: u64, offset: i64, data: &[u8], reply: ReplyWrite) {
    let Some(handle) = fs.handles.get(fh) else {
        reply.error(EBADF);
        return;
    };
    match handle.lock().unwrap().write_at(offset, data) {
        Ok(n) => reply.written(n as u32),
        Err(e) => reply.error(e.to_errno()),
    }
}

pub fn flush(fs: &mut FsState, _ino: u64, fh: u64, reply: ReplyEmpty) {
    let Some(handle) = fs.handles.get(fh) else {
        reply.ok();
        return;
    };
    match handle.lock().unwrap().file.sync_all() {
        Ok(()) => reply.ok(),
        Err(e) => reply.error(e.raw_os_error().unwrap_or(EIO)),
    }
}

pub fn release(fs: &mut FsState, _ino: u64, fh: u64, reply: ReplyEmpty) {
    let Some(handle_arc) = fs.handles.remove(fh) else {
        reply.ok();
        return;
    };
    let (path, dirty, local_path) = {
        let h = handle_arc.lock().unwrap();
        (h.path.clone(), h.dirty, h.local_path.clone())
    };

    if dirty {
        if let Err(e) = upload(fs, &path, &local_path) {
            fs.handles.unlock_path(&path);
            reply.error(e.to_errno());
            return;
        }
    }

    fs.handles.unlock_path(&path);

    let size = std::fs::metadata(&local_path).map(|m| m.len()).unwrap_or(0);
    let open_paths = fs.handles.open_paths();
    fs.cache.lock().unwrap().touch_and_evict(&path, size, &open_paths);

    reply.ok();
}

fn upload(fs: &FsState, path: &str, local_path: &std::path::Path) -> Result<(), FsError> {
    let body = std::fs::read(local_path)?;
    let hash: [u8; 32] = Sha256::digest(&body).into();
    let key = namespace::object_key(path);
    let etag = fs
        .runtime
        .block_on(fs.client.put_object(&key, bytes::Bytes::from(body.clone()), &fs.config.account_id))?;
    update_file_record(fs, path, body.len() as u64, &etag, hash)
}

fn update_file_record(fs: &FsState, path: &str, size: u64, etag: &str, hash: [u8; 32]) -> Result<(), FsError> {
    let Some((parent, name)) = namespace::split(path) else {
        return Ok(());
    };
    let txn = fs.meta.begin_write()?;
    let container = txn.container(parent);
    let mut record = container.get(name)?;
    if let Some(file) = record.as_file_mut() {
        file.size = size;
        file.etag = etag.to_string();
        file.hash = Some(hash);
        file.times.mtime = crate::meta::Timestamps::now().mtime;
    }
    container.put(name, &record)?;
    txn.commit()
}
