//! `unlink` and `rmdir`, both routed through the same remove path: wait for
//! any in-flight writer, confirm the entry's kind, remove the remote
//! object(s), then drop the metadata record (cascading for directories).

use super::prelude::*;
use crate::namespace;

pub fn unlink(fs: &mut FsState, parent: u64, name: &OsStr, reply: ReplyEmpty) {
    remove_entry(fs, parent, name, false, reply)
}

pub fn rmdir(fs: &mut FsState, parent: u64, name: &OsStr, reply: ReplyEmpty) {
    remove_entry(fs, parent, name, true, reply)
}

fn remove_entry(fs: &mut FsState, parent: u64, name: &OsStr, expect_dir: bool, reply: ReplyEmpty) {
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

    let record = match fs.lookup_child(&parent_path, name_str) {
        Ok(Some(r)) => r,
        Ok(None) => {
            reply.error(ENOENT);
            return;
        }
        Err(e) => {
            reply.error(e.to_errno());
            return;
        }
    };

    if record.is_dir() != expect_dir {
        reply.error(if expect_dir { ENOTDIR } else { EISDIR });
        return;
    }

    let key = if record.is_dir() {
        format!("{path}/")
    } else {
        namespace::object_key(&path)
    };
    if let Err(e) = fs.runtime.block_on(fs.client.remove_object(&key)) {
        reply.error(e.to_errno());
        return;
    }

    let txn_result: Result<(), FsError> = (|| {
        let txn = fs.meta.begin_write()?;
        let container = txn.container(&parent_path);
        container.delete_sub(name_str)?;
        container.delete(name_str)?;
        txn.commit()
    })();
    if let Err(e) = txn_result {
        reply.error(e.to_errno());
        return;
    }

    {
        let mut cache = fs.cache.lock().unwrap();
        cache.forget(&path);
        let local_path = cache.local_path(&path);
        let _ = std::fs::remove_file(local_path);
    }

    reply.ok();
}
