//! Cache configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Tunable parameters for both cache tiers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory backing the persistent tier
    pub cache_dir: PathBuf,
    /// Lower TTL clamp bound, in seconds
    pub min_ttl_secs: u64,
    /// Upper TTL clamp bound, in seconds
    pub max_ttl_secs: u64,
    /// TTL applied when the caller does not request one, in seconds
    pub default_ttl_secs: u64,
    /// Fast-tier key count limit
    pub max_memory_keys: usize,
    /// Fast-tier total payload byte limit
    pub max_memory_bytes: u64,
    /// Payloads at or above this size are compressed on disk
    pub compression_threshold: usize,
    /// zstd compression level
    pub compression_level: i32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(".insight/cache"),
            min_ttl_secs: 60,
            max_ttl_secs: 24 * 60 * 60,
            default_ttl_secs: 60 * 60,
            max_memory_keys: 1024,
            max_memory_bytes: 64 * 1024 * 1024,
            compression_threshold: 4096,
            compression_level: 3,
        }
    }
}

impl CacheConfig {
    /// Clamp a requested TTL into `[min_ttl, max_ttl]`.
    ///
    /// Out-of-range requests are adjusted, not rejected.
    pub fn clamp_ttl(&self, requested: Option<Duration>) -> Duration {
        let ttl = requested.unwrap_or(Duration::from_secs(self.default_ttl_secs));
        ttl.clamp(
            Duration::from_secs(self.min_ttl_secs),
            Duration::from_secs(self.max_ttl_secs),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_is_clamped_not_rejected() {
        let config = CacheConfig {
            min_ttl_secs: 10,
            max_ttl_secs: 100,
            default_ttl_secs: 50,
            ..CacheConfig::default()
        };

        assert_eq!(
            config.clamp_ttl(Some(Duration::from_secs(1))),
            Duration::from_secs(10)
        );
        assert_eq!(
            config.clamp_ttl(Some(Duration::from_secs(10_000))),
            Duration::from_secs(100)
        );
        assert_eq!(
            config.clamp_ttl(Some(Duration::from_secs(42))),
            Duration::from_secs(42)
        );
        assert_eq!(config.clamp_ttl(None), Duration::from_secs(50));
    }
}
