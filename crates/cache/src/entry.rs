//! Cache entry metadata shared by both tiers

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Metadata carried alongside every cached payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// The caller-visible cache key
    pub key: String,
    pub created_at: SystemTime,
    pub expires_at: SystemTime,
    /// Read count, maintained by the fast tier only
    pub hit_count: u64,
    /// Payload size as stored in the owning tier
    pub size_bytes: u64,
    /// Whether the stored payload is zstd-compressed
    pub compressed: bool,
    /// Git commit the cached result was computed against
    pub git_hash: Option<String>,
    /// Persistent format version the entry was written with
    pub schema_version: u16,
}

impl EntryMetadata {
    pub fn new(key: impl Into<String>, ttl: Duration, git_hash: Option<String>) -> Self {
        let now = SystemTime::now();
        Self {
            key: key.into(),
            created_at: now,
            expires_at: now + ttl,
            hit_count: 0,
            size_bytes: 0,
            compressed: false,
            git_hash,
            schema_version: crate::storage::SCHEMA_VERSION,
        }
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }

    /// Eviction score: older and less-read entries score higher and are
    /// evicted first.
    pub fn eviction_score(&self, now: SystemTime) -> f64 {
        let age = now
            .duration_since(self.created_at)
            .unwrap_or_default()
            .as_secs_f64();
        age / (self.hit_count as f64 + 1.0)
    }
}
