//! `getattr`/`setattr`: translating an [`InodeRecord`] to and from a
//! `fuser::FileAttr`.

use super::prelude::*;

pub fn to_file_attr(record: &InodeRecord) -> FileAttr {
    let (size, mode, uid, gid, times, kind) = match record {
        InodeRecord::Directory(d) => (0u64, d.mode, d.uid, d.gid, d.times, FileType::Directory),
        InodeRecord::File(f) => (f.size, f.mode, f.uid, f.gid, f.times, FileType::RegularFile),
    };

    let to_time = |secs: i64| UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64);
    let blocks = size.div_ceil(512);

    FileAttr {
        ino: record.inode(),
        size,
        blocks,
        atime: to_time(times.atime),
        mtime: to_time(times.mtime),
        ctime: to_time(times.ctime),
        crtime: to_time(times.crtime),
        kind,
        perm: (mode & 0o7777) as u16,
        nlink: if kind == FileType::Directory { 2 } else { 1 },
        uid,
        gid,
        rdev: 0,
        flags: 0,
        blksize: 4096,
    }
}

pub fn getattr(fs: &mut FsState, ino: u64, reply: ReplyAttr) {
    let Some(path) = fs.path_for_inode(ino) else {
        reply.error(ENOENT);
        return;
    };

    if path.is_empty() {
        reply.attr(&TTL, &super::read::root_attr());
        return;
    }

    let Some((parent, name)) = crate::namespace::split(&path) else {
        reply.error(ENOENT);
        return;
    };

    match fs.lookup_child_no_scan(parent, name) {
        Ok(Some(record)) => reply.attr(&TTL, &to_file_attr(&record)),
        Ok(None) => reply.error(ENOENT),
        Err(e) => reply.error(e.to_errno()),
    }
}

/// Supports truncation (`size`) only; permission/ownership/time changes are
/// accepted and echoed back without being persisted, since the store has no
/// representation for them beyond what every new object already carries.
pub fn setattr(fs: &mut FsState, ino: u64, _mode: Option<u32>, _uid: Option<u32>, _gid: Option<u32>, size: Option<u64>, fh: Option<u64>, reply: ReplyAttr) {
    let Some(path) = fs.path_for_inode(ino) else {
        reply.error(ENOENT);
        return;
    };

    if let Some(new_size) = size {
        if let Some(fh) = fh {
            if let Some(handle) = fs.handles.get(fh) {
                if let Err(e) = handle.lock().unwrap().truncate(new_size) {
                    reply.error(e.to_errno());
                    return;
                }
            }
        }
    }

    let Some((parent, name)) = crate::namespace::split(&path) else {
        reply.attr(&TTL, &super::read::root_attr());
        return;
    };

    match fs.lookup_child_no_scan(parent, name) {
        Ok(Some(record)) => reply.attr(&TTL, &to_file_attr(&record)),
        Ok(None) => reply.error(ENOENT),
        Err(e) => reply.error(e.to_errno()),
    }
}
