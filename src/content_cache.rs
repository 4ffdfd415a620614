//! Bounds the local `cache_dir` to roughly `cache_size_bytes` by evicting
//! the least-recently-used staged bodies after each `Release`, the
//! resolution SPEC_FULL.md gives the source's open question about cache
//! eviction. A path currently backing an open handle is never evicted.

use std::collections::HashSet;
use std::path::PathBuf;

use lru::LruCache;

pub struct ContentCache {
    cache_dir: PathBuf,
    budget_bytes: u64,
    order: LruCache<String, u64>,
}

impl ContentCache {
    pub fn new(cache_dir: PathBuf, budget_bytes: u64) -> Self {
        Self {
            cache_dir,
            budget_bytes,
            // Capacity is nominal; eviction is driven by `budget_bytes`, not
            // entry count, so any non-zero bound satisfies `LruCache::new`.
            order: LruCache::unbounded(),
        }
    }

    pub fn local_path(&self, remote_key: &str) -> PathBuf {
        let escaped = percent_encoding::utf8_percent_encode(
            remote_key,
            percent_encoding::NON_ALPHANUMERIC,
        )
        .to_string();
        self.cache_dir.join(escaped)
    }

    /// Records that `remote_key`'s staged body now occupies `size_bytes`,
    /// refreshing its recency, then evicts until the tracked total is back
    /// under budget. Entries whose path is in `open_paths` are skipped.
    pub fn touch_and_evict(&mut self, remote_key: &str, size_bytes: u64, open_paths: &HashSet<String>) {
        self.order.put(remote_key.to_string(), size_bytes);

        let snapshot: Vec<(String, u64)> = self.order.iter().map(|(k, v)| (k.clone(), *v)).collect();
        let mut total: u64 = snapshot.iter().map(|(_, size)| *size).sum();
        if total <= self.budget_bytes {
            return;
        }

        let mut victims = Vec::new();
        for (key, size) in snapshot.iter().rev() {
            if total <= self.budget_bytes {
                break;
            }
            if open_paths.contains(key) || key == remote_key {
                continue;
            }
            victims.push(key.clone());
            total = total.saturating_sub(*size);
        }

        for key in victims {
            self.order.pop(&key);
            let path = self.local_path(&key);
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(path = %path.display(), error = %e, "failed to evict cached body");
                }
            }
        }
    }

    pub fn forget(&mut self, remote_key: &str) {
        self.order.pop(remote_key);
    }
}
