//! Error types for Harbor configuration

use harbor_common::HarborError;
use thiserror::Error;

/// Result type alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or validating a worker configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    /// Create a new validation error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

impl From<ConfigError> for HarborError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Io(e) => HarborError::Io(e),
            other => HarborError::config_with_source("invalid worker configuration", other),
        }
    }
}
