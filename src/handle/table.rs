//! Tracks open file handles and the per-path write-back exclusion that
//! `Create`/`Remove` need: a path stays "locked" from the moment a dirty
//! handle is created for it until that handle is released and its body
//! uploaded, mirroring the original `dir.go` `wait(path)` poll loop.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::FsError;
use crate::handle::file_handle::FileHandle;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(200);
const WAIT_MAX_ATTEMPTS: u32 = 25;

struct Inner {
    next_fh: u64,
    locked: HashSet<String>,
    handles: HashMap<u64, Arc<Mutex<FileHandle>>>,
}

pub struct HandleTable {
    inner: Mutex<Inner>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_fh: 1,
                locked: HashSet::new(),
                handles: HashMap::new(),
            }),
        }
    }

    /// Blocks the calling (fuser worker) thread until `path` is unlocked,
    /// polling every 200ms, up to 25 attempts (~5s) before giving up.
    pub fn wait_for_unlock(&self, path: &str) -> Result<(), FsError> {
        let start = Instant::now();
        for attempt in 0.. {
            if !self.inner.lock().unwrap().locked.contains(path) {
                return Ok(());
            }
            if attempt >= WAIT_MAX_ATTEMPTS {
                tracing::warn!(path, elapsed = ?start.elapsed(), "timed out waiting for path lock");
                return Err(FsError::Locked);
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
        unreachable!()
    }

    pub fn lock_path(&self, path: &str) {
        self.inner.lock().unwrap().locked.insert(path.to_string());
    }

    pub fn unlock_path(&self, path: &str) {
        self.inner.lock().unwrap().locked.remove(path);
    }

    pub fn is_locked(&self, path: &str) -> bool {
        self.inner.lock().unwrap().locked.contains(path)
    }

    /// Registers a new handle and assigns it a fresh, process-unique id.
    pub fn register(&self, build: impl FnOnce(u64) -> FileHandle) -> (u64, Arc<Mutex<FileHandle>>) {
        let mut inner = self.inner.lock().unwrap();
        let fh = inner.next_fh;
        inner.next_fh += 1;
        let handle = Arc::new(Mutex::new(build(fh)));
        inner.handles.insert(fh, handle.clone());
        (fh, handle)
    }

    pub fn get(&self, fh: u64) -> Option<Arc<Mutex<FileHandle>>> {
        self.inner.lock().unwrap().handles.get(&fh).cloned()
    }

    pub fn remove(&self, fh: u64) -> Option<Arc<Mutex<FileHandle>>> {
        self.inner.lock().unwrap().handles.remove(&fh)
    }

    /// Paths currently backing a registered (open) handle, for the content
    /// cache to exclude from eviction.
    pub fn open_paths(&self) -> HashSet<String> {
        self.inner.lock().unwrap().handles.values().map(|h| h.lock().unwrap().path.clone()).collect()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn dummy_handle(fh: u64, path: &str, dir: &std::path::Path) -> FileHandle {
        let local_path = dir.join(format!("{fh}"));
        let mut file = std::fs::File::create(&local_path).unwrap();
        file.write_all(b"x").unwrap();
        FileHandle {
            handle_id: fh,
            path: path.to_string(),
            local_path,
            file: std::fs::OpenOptions::new().read(true).write(true).open(&local_path).unwrap(),
            dirty: false,
            hash: None,
        }
    }

    #[test]
    fn lock_then_unlock_releases_waiters() {
        let dir = tempfile::tempdir().unwrap();
        let table = HandleTable::new();
        table.lock_path("a.txt");
        assert!(table.is_locked("a.txt"));

        let (fh, _handle) = table.register(|fh| dummy_handle(fh, "a.txt", dir.path()));
        assert_eq!(fh, 1);

        table.unlock_path("a.txt");
        table.wait_for_unlock("a.txt").unwrap();
        assert!(table.remove(fh).is_some());
    }

    #[test]
    fn unlocked_path_returns_immediately() {
        let table = HandleTable::new();
        table.wait_for_unlock("never-locked").unwrap();
    }
}
