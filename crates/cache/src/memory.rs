//! Fast in-process cache tier

use crate::entry::EntryMetadata;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

/// A fast-tier entry: uncompressed payload plus metadata
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    pub data: Arc<Vec<u8>>,
    pub meta: EntryMetadata,
}

/// In-process tier backed by a concurrent map.
///
/// When an insert would push the tier over its key or byte limit, the
/// entries with the highest `age / (hits + 1)` score are evicted until
/// both limits hold again.
pub struct MemoryTier {
    entries: DashMap<String, MemoryEntry>,
    total_bytes: AtomicU64,
    max_keys: usize,
    max_bytes: u64,
}

impl MemoryTier {
    pub fn new(max_keys: usize, max_bytes: u64) -> Self {
        Self {
            entries: DashMap::new(),
            total_bytes: AtomicU64::new(0),
            max_keys,
            max_bytes,
        }
    }

    /// Look up a key, dropping it if expired. Bumps the hit count on a hit.
    pub fn get(&self, key: &str, now: SystemTime) -> Option<MemoryEntry> {
        let expired = match self.entries.get_mut(key) {
            Some(mut entry) => {
                if entry.meta.is_expired(now) {
                    true
                } else {
                    entry.meta.hit_count += 1;
                    return Some(entry.clone());
                }
            }
            None => return None,
        };
        if expired {
            self.remove(key);
        }
        None
    }

    /// Insert an entry, evicting as needed. Returns the number of entries
    /// evicted to make room.
    pub fn insert(&self, key: String, data: Arc<Vec<u8>>, mut meta: EntryMetadata) -> usize {
        meta.size_bytes = data.len() as u64;
        meta.compressed = false;

        let added = meta.size_bytes;
        if let Some(previous) = self.entries.insert(key, MemoryEntry { data, meta }) {
            self.total_bytes
                .fetch_sub(previous.meta.size_bytes, Ordering::AcqRel);
        }
        self.total_bytes.fetch_add(added, Ordering::AcqRel);

        self.evict_over_limits()
    }

    pub fn remove(&self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some((_, entry)) => {
                self.total_bytes
                    .fetch_sub(entry.meta.size_bytes, Ordering::AcqRel);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.total_bytes.store(0, Ordering::Release);
    }

    /// Remove every entry whose metadata matches the predicate, returning
    /// how many were removed.
    pub fn invalidate_where<F>(&self, predicate: F) -> usize
    where
        F: Fn(&EntryMetadata) -> bool,
    {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| predicate(&e.meta))
            .map(|e| e.key().clone())
            .collect();
        let mut removed = 0;
        for key in keys {
            if self.remove(&key) {
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Acquire)
    }

    fn evict_over_limits(&self) -> usize {
        let mut evicted = 0;
        let now = SystemTime::now();

        while self.entries.len() > self.max_keys || self.bytes() > self.max_bytes {
            let victim = self
                .entries
                .iter()
                .max_by(|a, b| {
                    a.meta
                        .eviction_score(now)
                        .total_cmp(&b.meta.eviction_score(now))
                })
                .map(|e| e.key().clone());

            match victim {
                Some(key) => {
                    if self.remove(&key) {
                        tracing::debug!(key = %key, "evicted fast-tier cache entry");
                        evicted += 1;
                    }
                }
                None => break,
            }
        }

        evicted
    }
}
