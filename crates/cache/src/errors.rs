use std::path::PathBuf;

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors raised by the result cache.
///
/// Callers are expected to degrade on these: a failed read is a miss, a
/// failed write means the result simply is not cached. Nothing here should
/// ever abort an analysis run.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache {operation} failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to {operation} cache entry '{key}': {source}")]
    Serialization {
        key: String,
        operation: &'static str,
        #[source]
        source: Box<bincode::ErrorKind>,
    },

    #[error("cache entry '{key}' is corrupt: {reason}")]
    Corruption { key: String, reason: String },

    #[error("invalid invalidation pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
