//! Monitor error types

use queuewatch_core::{ConfigError, SinkError};
use queuewatch_observability::MetricsError;
use thiserror::Error;

/// Result type for monitor operations
pub type MonitorResult<T> = Result<T, MonitorError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Invalid queue name '{name}': {reason}")]
    InvalidQueueName { name: String, reason: String },

    #[error("Monitor is already running")]
    AlreadyStarted,

    #[error("Sampling pass failed: {0}")]
    PassFailed(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
