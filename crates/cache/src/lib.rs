//! Two-level result cache for detector output
//!
//! A fast in-process tier backed by a concurrent map sits in front of a
//! persistent on-disk tier. Writes go to both tiers; reads check the fast
//! tier first and promote persistent-tier hits. Entries expire by clamped
//! TTL, and can be bulk-invalidated by git hash or key pattern.

pub mod config;
pub mod entry;
pub mod errors;
pub mod key;
pub mod memory;
pub mod storage;

pub use config::CacheConfig;
pub use entry::EntryMetadata;
pub use errors::{CacheError, Result};
pub use key::generate_key;

use memory::MemoryTier;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use storage::DiskTier;

/// Snapshot of cache effectiveness, recomputed on demand
#[derive(Debug, Clone, Default)]
pub struct CacheStatistics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub memory_entries: usize,
    pub memory_bytes: u64,
    pub avg_get_latency_us: u64,
}

impl CacheStatistics {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn memory_hit_rate(&self) -> f64 {
        if self.hits == 0 {
            0.0
        } else {
            self.memory_hits as f64 / self.hits as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    get_latency_us: AtomicU64,
    get_count: AtomicU64,
}

/// The two-level result cache
pub struct ResultCache {
    config: CacheConfig,
    memory: MemoryTier,
    disk: DiskTier,
    counters: Counters,
}

impl ResultCache {
    pub fn new(config: CacheConfig) -> Result<Self> {
        let disk = DiskTier::new(
            config.cache_dir.clone(),
            config.compression_threshold,
            config.compression_level,
        )?;
        let memory = MemoryTier::new(config.max_memory_keys, config.max_memory_bytes);
        Ok(Self {
            config,
            memory,
            disk,
            counters: Counters::default(),
        })
    }

    /// Look up a key. Checks the fast tier first; a persistent-tier hit is
    /// promoted into the fast tier before returning. Expired entries are
    /// deleted wherever they are found and count as misses, as does any
    /// read or decode failure.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let started = Instant::now();
        let value = self.get_inner(key).await;
        self.counters
            .get_latency_us
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
        self.counters.get_count.fetch_add(1, Ordering::Relaxed);
        value
    }

    async fn get_inner<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let now = SystemTime::now();

        if let Some(entry) = self.memory.get(key, now) {
            if let Some(value) = decode(key, &entry.data) {
                self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
                return Some(value);
            }
            // Undecodable payload: drop it so the next read falls through
            // to the persistent tier instead of failing here again
            self.memory.remove(key);
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        match self.disk.read(key).await {
            Ok(Some((meta, payload))) => {
                if meta.is_expired(now) {
                    let _ = self.disk.remove(key).await;
                    self.memory.remove(key);
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                }
                let Some(value) = decode(key, &payload) else {
                    let _ = self.disk.remove(key).await;
                    self.counters.misses.fetch_add(1, Ordering::Relaxed);
                    return None;
                };
                // Promote into the fast tier
                let evicted = self.memory.insert(key.to_string(), Arc::new(payload), meta);
                self.counters
                    .evictions
                    .fetch_add(evicted as u64, Ordering::Relaxed);
                self.counters.disk_hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "persistent tier read failed, treating as miss");
                let _ = self.disk.remove(key).await;
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value in both tiers. The TTL is clamped into the configured
    /// `[min_ttl, max_ttl]` window.
    pub async fn set<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
        git_hash: Option<String>,
    ) -> Result<()> {
        let ttl = self.config.clamp_ttl(ttl);
        let meta = EntryMetadata::new(key, ttl, git_hash);

        let payload = bincode::serialize(value).map_err(|e| CacheError::Serialization {
            key: key.to_string(),
            operation: "encode",
            source: e,
        })?;

        self.disk.write(meta.clone(), &payload).await?;

        let evicted = self.memory.insert(key.to_string(), Arc::new(payload), meta);
        self.counters
            .evictions
            .fetch_add(evicted as u64, Ordering::Relaxed);
        Ok(())
    }

    /// Remove a key from both tiers
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let in_memory = self.memory.remove(key);
        let on_disk = self.disk.remove(key).await?;
        Ok(in_memory || on_disk)
    }

    /// Drop everything from both tiers
    pub async fn clear(&self) -> Result<()> {
        self.memory.clear();
        self.disk.clear().await
    }

    /// Remove every entry computed against the given git hash, in both
    /// tiers. Used when the repository HEAD moves.
    pub async fn invalidate_by_git_hash(&self, hash: &str) -> Result<usize> {
        let matches = |meta: &EntryMetadata| meta.git_hash.as_deref() == Some(hash);
        let from_memory = self.memory.invalidate_where(&matches);
        let from_disk = self.disk.invalidate_where(&matches).await?;
        tracing::debug!(hash = %hash, from_memory, from_disk, "invalidated cache entries by git hash");
        Ok(from_memory + from_disk)
    }

    /// Remove every entry whose key matches the pattern, in both tiers
    pub async fn invalidate_by_pattern(&self, pattern: &str) -> Result<usize> {
        let regex = regex::Regex::new(pattern).map_err(|e| CacheError::InvalidPattern {
            pattern: pattern.to_string(),
            source: e,
        })?;
        let matches = |meta: &EntryMetadata| regex.is_match(&meta.key);
        let from_memory = self.memory.invalidate_where(&matches);
        let from_disk = self.disk.invalidate_where(&matches).await?;
        Ok(from_memory + from_disk)
    }

    /// Sweep expired entries out of both tiers
    pub async fn prune_expired(&self) -> Result<usize> {
        let now = SystemTime::now();
        let expired = |meta: &EntryMetadata| meta.is_expired(now);
        let from_memory = self.memory.invalidate_where(expired);
        let from_disk = self.disk.invalidate_where(expired).await?;
        Ok(from_memory + from_disk)
    }

    /// Current statistics, derived from running counters
    pub fn statistics(&self) -> CacheStatistics {
        let memory_hits = self.counters.memory_hits.load(Ordering::Relaxed);
        let disk_hits = self.counters.disk_hits.load(Ordering::Relaxed);
        let get_count = self.counters.get_count.load(Ordering::Relaxed);
        let latency = self.counters.get_latency_us.load(Ordering::Relaxed);
        CacheStatistics {
            hits: memory_hits + disk_hits,
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            memory_hits,
            disk_hits,
            memory_entries: self.memory.len(),
            memory_bytes: self.memory.bytes(),
            avg_get_latency_us: if get_count == 0 { 0 } else { latency / get_count },
        }
    }

    /// Drop the fast tier only, leaving persistent entries in place
    pub fn clear_memory(&self) {
        self.memory.clear();
    }

    /// Directory backing the persistent tier
    pub fn directory(&self) -> &std::path::Path {
        &self.config.cache_dir
    }
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Option<T> {
    match bincode::deserialize(bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "cached payload failed to deserialize");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
        values: Vec<u32>,
    }

    fn payload() -> Payload {
        Payload {
            name: "typescript".into(),
            values: vec![1, 2, 3],
        }
    }

    fn cache_in(dir: &TempDir, config: CacheConfig) -> ResultCache {
        ResultCache::new(CacheConfig {
            cache_dir: dir.path().to_path_buf(),
            ..config
        })
        .unwrap()
    }

    fn default_cache(dir: &TempDir) -> ResultCache {
        cache_in(dir, CacheConfig::default())
    }

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let dir = TempDir::new().unwrap();
        let cache = default_cache(&dir);

        cache.set("odavl:abc123", &payload(), None, None).await.unwrap();
        let read: Option<Payload> = cache.get("odavl:abc123").await;
        assert_eq!(read, Some(payload()));

        assert!(cache.delete("odavl:abc123").await.unwrap());
        let gone: Option<Payload> = cache.get("odavl:abc123").await;
        assert_eq!(gone, None);
    }

    #[tokio::test]
    async fn expired_entries_are_misses_and_rewritable() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(
            &dir,
            CacheConfig {
                min_ttl_secs: 0,
                ..CacheConfig::default()
            },
        );

        cache
            .set("odavl:abc123", &payload(), Some(Duration::from_millis(50)), None)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        let expired: Option<Payload> = cache.get("odavl:abc123").await;
        assert_eq!(expired, None);

        // The slot is reusable after expiry
        cache.set("odavl:abc123", &payload(), None, None).await.unwrap();
        let read: Option<Payload> = cache.get("odavl:abc123").await;
        assert_eq!(read, Some(payload()));
    }

    #[tokio::test]
    async fn disk_hits_are_promoted_to_memory() {
        let dir = TempDir::new().unwrap();
        let cache = default_cache(&dir);

        cache.set("k", &payload(), None, None).await.unwrap();
        cache.clear_memory();
        assert_eq!(cache.statistics().memory_entries, 0);

        let read: Option<Payload> = cache.get("k").await;
        assert_eq!(read, Some(payload()));
        assert_eq!(cache.statistics().memory_entries, 1);
        assert_eq!(cache.statistics().disk_hits, 1);

        let again: Option<Payload> = cache.get("k").await;
        assert_eq!(again, Some(payload()));
        assert_eq!(cache.statistics().memory_hits, 1);
    }

    #[tokio::test]
    async fn git_hash_invalidation_removes_only_matching_entries() {
        let dir = TempDir::new().unwrap();
        let cache = default_cache(&dir);

        cache
            .set("a", &payload(), None, Some("abc123".into()))
            .await
            .unwrap();
        cache
            .set("b", &payload(), None, Some("abc123".into()))
            .await
            .unwrap();
        cache
            .set("c", &payload(), None, Some("def456".into()))
            .await
            .unwrap();

        let removed = cache.invalidate_by_git_hash("abc123").await.unwrap();
        // Each entry lives in both tiers
        assert_eq!(removed, 4);

        let a: Option<Payload> = cache.get("a").await;
        let c: Option<Payload> = cache.get("c").await;
        assert_eq!(a, None);
        assert_eq!(c, Some(payload()));
    }

    #[tokio::test]
    async fn pattern_invalidation_is_prefix_precise() {
        let dir = TempDir::new().unwrap();
        let cache = default_cache(&dir);

        cache.set("odavl:security:a", &payload(), None, None).await.unwrap();
        cache.set("odavl:security:b", &payload(), None, None).await.unwrap();
        cache.set("odavl:eslint:a", &payload(), None, None).await.unwrap();

        cache.invalidate_by_pattern("^odavl:security:").await.unwrap();

        let sec: Option<Payload> = cache.get("odavl:security:a").await;
        let lint: Option<Payload> = cache.get("odavl:eslint:a").await;
        assert_eq!(sec, None);
        assert_eq!(lint, Some(payload()));
    }

    #[tokio::test]
    async fn invalid_patterns_are_rejected() {
        let dir = TempDir::new().unwrap();
        let cache = default_cache(&dir);
        let err = cache.invalidate_by_pattern("[unclosed").await.unwrap_err();
        assert!(matches!(err, CacheError::InvalidPattern { .. }));
    }

    #[tokio::test]
    async fn memory_eviction_falls_back_to_disk() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(
            &dir,
            CacheConfig {
                max_memory_keys: 2,
                ..CacheConfig::default()
            },
        );

        for key in ["a", "b", "c", "d"] {
            cache.set(key, &payload(), None, None).await.unwrap();
        }
        assert!(cache.statistics().memory_entries <= 2);
        assert!(cache.statistics().evictions >= 2);

        // Evicted keys still resolve through the persistent tier
        for key in ["a", "b", "c", "d"] {
            let read: Option<Payload> = cache.get(key).await;
            assert_eq!(read, Some(payload()), "key {key} lost after eviction");
        }
    }

    #[tokio::test]
    async fn statistics_track_hits_and_misses() {
        let dir = TempDir::new().unwrap();
        let cache = default_cache(&dir);

        let miss: Option<Payload> = cache.get("absent").await;
        assert_eq!(miss, None);
        cache.set("present", &payload(), None, None).await.unwrap();
        let hit: Option<Payload> = cache.get("present").await;
        assert_eq!(hit, Some(payload()));

        let stats = cache.statistics();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn undecodable_fast_tier_entries_count_once_and_are_dropped() {
        let dir = TempDir::new().unwrap();
        let cache = default_cache(&dir);
        cache.set("k", &"short".to_string(), None, None).await.unwrap();

        // A 5-byte string payload cannot deserialize as a Vec<u64> of
        // length 5, so the typed read fails in the fast tier
        let bad: Option<Vec<u64>> = cache.get("k").await;
        assert_eq!(bad, None);

        let stats = cache.statistics();
        assert_eq!(stats.memory_hits, 0);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.memory_entries, 0);

        // The persistent copy fails the same way and is removed with it
        let bad: Option<Vec<u64>> = cache.get("k").await;
        assert_eq!(bad, None);
        let gone: Option<String> = cache.get("k").await;
        assert_eq!(gone, None);
    }

    #[tokio::test]
    async fn prune_removes_only_expired_entries() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(
            &dir,
            CacheConfig {
                min_ttl_secs: 0,
                ..CacheConfig::default()
            },
        );

        cache
            .set("short", &payload(), Some(Duration::from_millis(30)), None)
            .await
            .unwrap();
        cache.set("long", &payload(), None, None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        let pruned = cache.prune_expired().await.unwrap();
        assert_eq!(pruned, 2); // both tiers held the short entry

        let long: Option<Payload> = cache.get("long").await;
        assert_eq!(long, Some(payload()));
    }
}
