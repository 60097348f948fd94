//! # Harbor Common
//!
//! Error type, logging setup, and retry helpers shared by every Harbor crate.
//! Each crate keeps its own error enum and converts into [`HarborError`] at
//! the boundary.

use std::time::Duration;
use thiserror::Error;

pub mod logging;
pub mod retry;

pub use logging::{init_logging, LogConfig, LogFormat};
pub use retry::{retry_with_backoff, with_timeout, RetryConfig};

/// Boxed underlying cause.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error surfaced at crate boundaries.
#[derive(Error, Debug)]
pub enum HarborError {
    /// Fetching from the origin failed.
    #[error("network: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Reading or writing a cache namespace failed.
    #[error("cache: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// An install, activate, or state transition was rejected or failed.
    #[error("lifecycle: {message}")]
    Lifecycle {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("notification: {0}")]
    Notification(String),

    /// Worker config could not be loaded or is invalid.
    #[error("config: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

fn boxed<E: std::error::Error + Send + Sync + 'static>(source: E) -> Option<BoxError> {
    Some(Box::new(source))
}

impl HarborError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    pub fn network_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: boxed(source),
        }
    }

    pub fn cache_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Cache {
            message: message.into(),
            source: boxed(source),
        }
    }

    pub fn lifecycle(message: impl Into<String>) -> Self {
        Self::Lifecycle {
            message: message.into(),
            source: None,
        }
    }

    pub fn lifecycle_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Lifecycle {
            message: message.into(),
            source: boxed(source),
        }
    }

    pub fn notification(message: impl Into<String>) -> Self {
        Self::Notification(message.into())
    }

    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: boxed(source),
        }
    }

    /// Whether a later attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HarborError::Network { .. } | HarborError::Timeout(_) | HarborError::Io(_)
        )
    }

    /// Short tag for the `category` log field.
    pub fn category(&self) -> &'static str {
        match self {
            HarborError::Network { .. } => "network",
            HarborError::Cache { .. } => "cache",
            HarborError::Lifecycle { .. } => "lifecycle",
            HarborError::Notification(_) => "notification",
            HarborError::Config { .. } => "config",
            HarborError::Io(_) => "io",
            HarborError::Timeout(_) => "timeout",
            HarborError::NotFound(_) => "not_found",
            HarborError::InvalidArgument(_) => "invalid_argument",
        }
    }
}

pub type Result<T> = std::result::Result<T, HarborError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(HarborError::network("origin unreachable").category(), "network");
        assert_eq!(HarborError::lifecycle("not installed").category(), "lifecycle");
        assert_eq!(HarborError::notification("denied").category(), "notification");
        assert_eq!(
            HarborError::Timeout(Duration::from_secs(3)).category(),
            "timeout"
        );
    }

    #[test]
    fn test_only_transport_failures_retry() {
        assert!(HarborError::network("reset").is_retryable());
        assert!(HarborError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!HarborError::lifecycle("redundant").is_retryable());
        assert!(!HarborError::NotFound("client-7".into()).is_retryable());
    }

    #[test]
    fn test_source_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "quota exceeded");
        let err = HarborError::cache_with_source("put shop-dynamic-v1", io);
        assert_eq!(err.to_string(), "cache: put shop-dynamic-v1");
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("quota exceeded"));
    }
}
