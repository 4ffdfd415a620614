//! The persistent, transactional metadata cache.
//!
//! Backed by `redb`, an embedded single-file ACID key/value engine. The
//! source's nested bucket-of-buckets layout (one bolt sub-bucket per
//! directory) is realized here as a single flat table keyed by
//! `"<container path>\0<segment>"`: a directory's "container" is simply
//! every key sharing its path as a string prefix. This keeps the
//! transaction and table-handle plumbing trivial while still giving a
//! cascading directory delete for free (removing a subtree is one prefix
//! scan), and it sidesteps opening a fresh dynamically-named table per
//! directory on every request.

pub mod record;

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::error::FsError;
pub use record::{DirRecord, FileRecord, InodeRecord, Timestamps};

const ENTRIES: TableDefinition<&str, Vec<u8>> = TableDefinition::new("entries");
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

/// Reserved sequence key: a mount-wide inode counter. The source allocates
/// inode numbers per-bucket (bolt's `NextSequence` is bucket-scoped), which
/// cannot guarantee the global uniqueness this design requires (see
/// DESIGN.md); a single counter shared by every container closes that gap.
const GLOBAL_SEQ_KEY: &str = "\u{1}";

/// Normalizes a directory path into its container's key prefix. The root
/// directory's container prefix is `"\0"`; `"a"`'s is `"a/\0"`; `"a/b"`'s
/// is `"a/b/\0"`.
fn container_prefix(dir_path: &str) -> String {
    if dir_path.is_empty() {
        "\0".to_string()
    } else {
        format!("{}/\0", dir_path.trim_end_matches('/'))
    }
}

fn entry_key(dir_path: &str, segment: &str) -> String {
    format!("{}{}", container_prefix(dir_path), segment)
}

pub struct MetaStore {
    db: Database,
}

impl MetaStore {
    /// Opens (creating if absent) the metadata store at `path`.
    pub fn open(path: &Path) -> Result<Self, FsError> {
        let db = Database::create(path).map_err(|e| FsError::Storage(e.to_string()))?;
        // Ensure both tables exist so read-only transactions never race a
        // first writer to create them.
        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(ENTRIES)?;
            let _ = txn.open_table(SEQUENCES)?;
        }
        txn.commit()?;
        Ok(Self { db })
    }

    pub fn begin_write(&self) -> Result<WriteTxn, FsError> {
        Ok(WriteTxn {
            txn: self.db.begin_write()?,
        })
    }

    pub fn begin_read(&self) -> Result<ReadTxn, FsError> {
        Ok(ReadTxn {
            txn: self.db.begin_read()?,
        })
    }
}

pub struct WriteTxn {
    txn: redb::WriteTransaction,
}

impl WriteTxn {
    pub fn container<'a>(&'a self, dir_path: &str) -> WriteContainer<'a> {
        WriteContainer {
            txn: &self.txn,
            dir_path: dir_path.to_string(),
        }
    }

    /// Allocates the next globally-unique inode number.
    pub fn next_inode(&self) -> Result<u64, FsError> {
        let mut seqs = self.txn.open_table(SEQUENCES)?;
        let current = seqs.get(GLOBAL_SEQ_KEY)?.map(|v| v.value()).unwrap_or(0);
        let next = current + 1;
        seqs.insert(GLOBAL_SEQ_KEY, next)?;
        Ok(next)
    }

    pub fn commit(self) -> Result<(), FsError> {
        self.txn.commit()?;
        Ok(())
    }

    pub fn rollback(self) {
        let _ = self.txn.abort();
    }
}

pub struct ReadTxn {
    txn: redb::ReadTransaction,
}

impl ReadTxn {
    pub fn container<'a>(&'a self, dir_path: &str) -> ReadContainer<'a> {
        ReadContainer {
            txn: &self.txn,
            dir_path: dir_path.to_string(),
        }
    }
}

/// A directory's view into the store within a writable transaction.
pub struct WriteContainer<'a> {
    txn: &'a redb::WriteTransaction,
    dir_path: String,
}

impl<'a> WriteContainer<'a> {
    pub fn get(&self, segment: &str) -> Result<InodeRecord, FsError> {
        let table = self.txn.open_table(ENTRIES)?;
        let key = entry_key(&self.dir_path, segment);
        match table.get(key.as_str())? {
            Some(v) => InodeRecord::decode(v.value()),
            None => Err(FsError::NoSuchObject),
        }
    }

    pub fn try_get(&self, segment: &str) -> Result<Option<InodeRecord>, FsError> {
        match self.get(segment) {
            Ok(r) => Ok(Some(r)),
            Err(FsError::NoSuchObject) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn put(&self, segment: &str, record: &InodeRecord) -> Result<(), FsError> {
        let mut table = self.txn.open_table(ENTRIES)?;
        let key = entry_key(&self.dir_path, segment);
        table.insert(key.as_str(), record.encode()?)?;
        Ok(())
    }

    pub fn delete(&self, segment: &str) -> Result<(), FsError> {
        let mut table = self.txn.open_table(ENTRIES)?;
        let key = entry_key(&self.dir_path, segment);
        table.remove(key.as_str())?;
        Ok(())
    }

    /// Removes `segment`'s own record plus, if it names a directory, every
    /// record nested beneath it.
    pub fn delete_sub(&self, segment: &str) -> Result<(), FsError> {
        let sub_prefix = container_prefix(&format!("{}/{}", self.dir_path.trim_end_matches('/'), segment));
        let mut table = self.txn.open_table(ENTRIES)?;
        let doomed: Vec<String> = table
            .iter()?
            .filter_map(|r| r.ok())
            .map(|(k, _)| k.value().to_string())
            .filter(|k| k.starts_with(&sub_prefix))
            .collect();
        for key in &doomed {
            table.remove(key.as_str())?;
        }
        Ok(())
    }

    /// Enumerates every entry directly inside this container.
    pub fn for_each(&self, mut f: impl FnMut(&str, InodeRecord) -> Result<(), FsError>) -> Result<(), FsError> {
        let table = self.txn.open_table(ENTRIES)?;
        let prefix = container_prefix(&self.dir_path);
        for row in table.iter()? {
            let (k, v) = row?;
            let key = k.value();
            if let Some(segment) = key.strip_prefix(prefix.as_str()) {
                let record = InodeRecord::decode(v.value())?;
                f(segment, record)?;
            }
        }
        Ok(())
    }
}

pub struct ReadContainer<'a> {
    txn: &'a redb::ReadTransaction,
    dir_path: String,
}

impl<'a> ReadContainer<'a> {
    pub fn try_get(&self, segment: &str) -> Result<Option<InodeRecord>, FsError> {
        let table = self.txn.open_table(ENTRIES)?;
        let key = entry_key(&self.dir_path, segment);
        match table.get(key.as_str())? {
            Some(v) => Ok(Some(InodeRecord::decode(v.value())?)),
            None => Ok(None),
        }
    }

    pub fn for_each(&self, mut f: impl FnMut(&str, InodeRecord) -> Result<(), FsError>) -> Result<(), FsError> {
        let table = self.txn.open_table(ENTRIES)?;
        let prefix = container_prefix(&self.dir_path);
        for row in table.iter()? {
            let (k, v) = row?;
            let key = k.value();
            if let Some(segment) = key.strip_prefix(prefix.as_str()) {
                let record = InodeRecord::decode(v.value())?;
                f(segment, record)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use record::Timestamps;

    fn mk_dir(inode: u64) -> InodeRecord {
        InodeRecord::Directory(DirRecord {
            inode,
            mode: 0o770,
            uid: 0,
            gid: 0,
            times: Timestamps::now(),
            flags: 0,
        })
    }

    fn mk_file(inode: u64, size: u64) -> InodeRecord {
        InodeRecord::File(FileRecord {
            inode,
            mode: 0o660,
            uid: 0,
            gid: 0,
            times: Timestamps::now(),
            flags: 0,
            size,
            etag: "etag".into(),
            hash: None,
        })
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::open(&dir.path().join("cache.db")).unwrap();

        let txn = store.begin_write().unwrap();
        let root = txn.container("");
        root.put("a", &mk_dir(2)).unwrap();
        txn.commit().unwrap();

        let txn = store.begin_read().unwrap();
        let root = txn.container("");
        let got = root.try_get("a").unwrap().unwrap();
        assert_eq!(got.inode(), 2);
        assert!(got.is_dir());
    }

    #[test]
    fn next_inode_is_monotonic_and_global() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::open(&dir.path().join("cache.db")).unwrap();

        let txn = store.begin_write().unwrap();
        let first = txn.next_inode().unwrap();
        let second = txn.next_inode().unwrap();
        txn.commit().unwrap();
        assert!(second > first);
    }

    #[test]
    fn delete_sub_cascades_to_nested_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::open(&dir.path().join("cache.db")).unwrap();

        let txn = store.begin_write().unwrap();
        let root = txn.container("");
        root.put("a", &mk_dir(2)).unwrap();
        let a = txn.container("a");
        a.put("b", &mk_file(3, 5)).unwrap();
        root.delete_sub("a").unwrap();
        txn.commit().unwrap();

        let txn = store.begin_read().unwrap();
        let a = txn.container("a");
        assert!(a.try_get("b").unwrap().is_none());
    }

    #[test]
    fn for_each_only_sees_direct_children() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::open(&dir.path().join("cache.db")).unwrap();

        let txn = store.begin_write().unwrap();
        let root = txn.container("");
        root.put("a", &mk_dir(2)).unwrap();
        root.put("x", &mk_file(3, 1)).unwrap();
        let a = txn.container("a");
        a.put("b", &mk_file(4, 1)).unwrap();
        txn.commit().unwrap();

        let txn = store.begin_read().unwrap();
        let root = txn.container("");
        let mut names = vec![];
        root.for_each(|name, _| {
            names.push(name.to_string());
            Ok(())
        })
        .unwrap();
        names.sort();
        assert_eq!(names, vec!["a".to_string(), "x".to_string()]);
    }
}
