use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the detector engine
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration errors
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// A detector reported a failure while analyzing a target
    #[error("detector '{detector}' failed: {message}")]
    Detector { detector: String, message: String },

    /// The requested detector name is not part of the registry
    #[error("unknown detector '{name}'")]
    UnknownDetector { name: String },

    /// The worker pool cannot accept work
    #[error("worker pool unavailable: {reason}")]
    PoolUnavailable { reason: String },

    /// Operation timeout errors
    #[error("operation '{operation}' timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Git invocation errors
    #[error("git operation failed: {message}")]
    Git { message: String },

    /// File system operations
    #[error("file system {operation} operation failed for {}: {source}", path.display())]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// The caller cancelled the run
    #[error("run cancelled by caller")]
    Cancelled,
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Json {
            message: error.to_string(),
            source: error,
        }
    }
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Create a detector failure error
    #[must_use]
    pub fn detector(detector: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Detector {
            detector: detector.into(),
            message: message.into(),
        }
    }

    /// Create a git error
    #[must_use]
    pub fn git(message: impl Into<String>) -> Self {
        Error::Git {
            message: message.into(),
        }
    }

    /// Create a file system error with context
    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }
}
