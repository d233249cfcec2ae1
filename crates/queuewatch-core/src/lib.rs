//! # Queuewatch Core
//!
//! Domain model, configuration, error types and collaborator ports shared by
//! every Queuewatch crate, plus the pure health classifier.
//!
//! The monitor itself lives in `queuewatch-monitor`; this crate has no runtime
//! dependencies so that queue and store backends can implement the ports
//! without pulling in tokio.

pub mod config;
pub mod error;
pub mod health;
pub mod model;
pub mod ports;

pub use config::{MonitorConfig, RetentionConfig, Thresholds, WebhookConfig};
pub use error::{ConfigError, SinkError, SourceError, SourceResult, StoreError, StoreResult};
pub use health::{classify, classify_metrics};
pub use model::{
    AlertEvent, AlertNotification, AlertRule, AlertSeverity, DerivedMetrics, GlobalSummary,
    HealthStatus, JobEventKind, MAX_QUEUE_NAME_LEN, MetricKey, QueueHealth, QueueMetrics,
    SampleMetrics, ThresholdPair, WorkerMetrics, validate_queue_name,
};
pub use ports::{
    AlertSink, JobQueue, ListenerId, MetricsStore, QueueEventListener, QueueHandle,
    WorkerRegistry, WorkerStatus,
};
