//! Error types shared by every Queuewatch crate.

use std::time::Duration;
use thiserror::Error;

/// Result type for persistent store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for queue and worker collaborator calls
pub type SourceResult<T> = Result<T, SourceError>;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid threshold for {metric}: {message}")]
    InvalidThreshold {
        metric: &'static str,
        message: String,
    },

    #[error("Invalid value for '{field}': {message}")]
    InvalidValue {
        field: &'static str,
        message: String,
    },

    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Failures reported by a queue or worker-registry collaborator.
///
/// All of these are treated as transient: the sampler degrades only the
/// affected queue for the current tick.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Source call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Source backend error: {0}")]
    Backend(String),
}

/// Persistent store failures
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Store connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization failed: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Alert sink delivery failures
#[derive(Debug, Clone, Error)]
pub enum SinkError {
    #[error("Alert delivery transport error: {0}")]
    Transport(String),

    #[error("Alert sink responded with status {0}")]
    Status(u16),

    #[error("Alert delivery timed out after {0:?}")]
    Timeout(Duration),
}
