//! Folds the object store's bucket-event stream into the metadata cache so
//! changes made outside this mount (or by another mount of the same
//! bucket) eventually show up locally without a directory re-scan.
//!
//! Grounded in the source's `startNotificationListener` goroutine: one
//! writable transaction per event, insert-only-if-absent for creates,
//! recursive delete for removes, `url.QueryUnescape` on the event key.

use std::time::Duration;

use futures_util::StreamExt;
use percent_encoding::percent_decode_str;

use crate::config::FileConfig;
use crate::error::FsError;
use crate::meta::{DirRecord, FileRecord, InodeRecord, MetaStore, Timestamps};
use crate::namespace;
use crate::object_client::{BucketEvent, ObjectClient};

const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct EventReconciler<'a> {
    pub client: &'a dyn ObjectClient,
    pub meta: &'a MetaStore,
    pub config: &'a FileConfig,
}

impl<'a> EventReconciler<'a> {
    /// Runs until `shutdown` is signalled, reconnecting with exponential
    /// backoff on transport errors. Intended to run as a background task
    /// alongside the mount loop; `interrupt` unregisters it by flipping
    /// `shutdown` to `true`, the async counterpart of the source's
    /// `stopNotificationListener` closing its stop channel.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            if *shutdown.borrow() {
                tracing::info!("event reconciler stopping");
                return;
            }
            match self.client.subscribe_events(&self.config.account_id).await {
                Ok(mut stream) => {
                    backoff = INITIAL_BACKOFF;
                    loop {
                        tokio::select! {
                            changed = shutdown.changed() => {
                                if changed.is_err() || *shutdown.borrow() {
                                    tracing::info!("event reconciler stopping");
                                    return;
                                }
                            }
                            item = stream.next() => {
                                match item {
                                    Some(Ok(event)) => {
                                        if let Err(e) = self.apply(event) {
                                            tracing::warn!(error = %e, "failed to apply bucket event");
                                        }
                                    }
                                    Some(Err(e)) => {
                                        tracing::warn!(error = %e, "bucket event stream error, reconnecting");
                                        break;
                                    }
                                    None => break,
                                }
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to subscribe to bucket events");
                }
            }
            tracing::debug!(backoff = ?backoff, "waiting before reconnecting to bucket events");
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("event reconciler stopping");
                        return;
                    }
                }
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    fn apply(&self, event: BucketEvent) -> Result<(), FsError> {
        match event {
            BucketEvent::Created(entry) => self.apply_created(&entry.key, entry.size, &entry.etag, entry.last_modified),
            BucketEvent::Removed { key } => self.apply_removed(&key),
        }
    }

    fn apply_created(&self, raw_key: &str, size: u64, etag: &str, last_modified: i64) -> Result<(), FsError> {
        let key = percent_decode_str(raw_key).decode_utf8_lossy().to_string();
        if key.is_empty() {
            return Ok(());
        }
        let (parent, segment, is_dir) = namespace::from_object_key(&key);
        if segment.is_empty() {
            return Ok(());
        }

        let txn = self.meta.begin_write()?;
        let container = txn.container(&parent);
        if container.try_get(&segment)?.is_some() {
            txn.rollback();
            return Ok(());
        }

        let inode = txn.next_inode()?;
        let times = Timestamps {
            atime: last_modified,
            mtime: last_modified,
            ctime: last_modified,
            crtime: last_modified,
        };
        let record = if is_dir {
            InodeRecord::Directory(DirRecord {
                inode,
                mode: self.config.dir_mode as u32,
                uid: self.config.uid,
                gid: self.config.gid,
                times,
                flags: 0,
            })
        } else {
            InodeRecord::File(FileRecord {
                inode,
                mode: self.config.file_mode as u32,
                uid: self.config.uid,
                gid: self.config.gid,
                times,
                flags: 0,
                size,
                etag: etag.to_string(),
                hash: None,
            })
        };
        container.put(&segment, &record)?;
        txn.commit()
    }

    fn apply_removed(&self, raw_key: &str) -> Result<(), FsError> {
        let key = percent_decode_str(raw_key).decode_utf8_lossy().to_string();
        if key.is_empty() {
            return Ok(());
        }
        let (parent, segment, _) = namespace::from_object_key(&key);
        if segment.is_empty() {
            return Ok(());
        }

        let txn = self.meta.begin_write()?;
        let container = txn.container(&parent);
        container.delete_sub(&segment)?;
        container.delete(&segment)?;
        txn.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_client::{ListedEntry, MockObjectClient};

    fn test_config() -> FileConfig {
        FileConfig {
            cache_dir: std::env::temp_dir(),
            cache_size_bytes: 1_000_000,
            uid: 0,
            gid: 0,
            file_mode: 0o660,
            dir_mode: 0o770,
            account_id: "test".into(),
            debug: false,
        }
    }

    #[tokio::test]
    async fn created_event_inserts_missing_record() {
        let dir = tempfile::tempdir().unwrap();
        let meta = MetaStore::open(&dir.path().join("cache.db")).unwrap();
        let client = MockObjectClient::new();
        client.push_event(BucketEvent::Created(ListedEntry {
            key: "a.txt".into(),
            size: 3,
            etag: "e".into(),
            last_modified: 0,
        }));
        let config = test_config();
        let reconciler = EventReconciler {
            client: client.as_ref(),
            meta: &meta,
            config: &config,
        };

        let mut stream = reconciler.client.subscribe_events("test").await.unwrap();
        while let Some(item) = stream.next().await {
            reconciler.apply(item.unwrap()).unwrap();
        }

        let txn = meta.begin_read().unwrap();
        let got = txn.container("").try_get("a.txt").unwrap().unwrap();
        assert_eq!(got.as_file().unwrap().size, 3);
    }

    #[tokio::test]
    async fn removed_event_deletes_record() {
        let dir = tempfile::tempdir().unwrap();
        let meta = MetaStore::open(&dir.path().join("cache.db")).unwrap();
        let client = MockObjectClient::new();
        let config = test_config();
        let reconciler = EventReconciler {
            client: client.as_ref(),
            meta: &meta,
            config: &config,
        };
        reconciler
            .apply(BucketEvent::Created(ListedEntry {
                key: "a.txt".into(),
                size: 1,
                etag: "e".into(),
                last_modified: 0,
            }))
            .unwrap();
        reconciler.apply(BucketEvent::Removed { key: "a.txt".into() }).unwrap();

        let txn = meta.begin_read().unwrap();
        assert!(txn.container("").try_get("a.txt").unwrap().is_none());
    }
}
