//! # Queuewatch
//!
//! Queuewatch samples job queues on a fixed interval, derives throughput,
//! error rate, processing time and lag, classifies each queue's health and
//! raises hysteresis-based alerts when thresholds are crossed. Everything it
//! knows is exposed as Prometheus text, a JSON snapshot and a stream of
//! domain events.
//!
//! ## Core Components
//!
//! - **[QueueMonitor]**: façade owning the registry, sampler and background task
//! - **[JobQueue], [WorkerRegistry]**: ports a queue backend implements
//! - **[MetricsStore]**: persistence port, see [InMemoryStore] and `RedisStore`
//! - **[AlertSink]**: where triggered alerts go, e.g. [WebhookAlertSink]
//! - **[classify]**: the pure health classifier
//!
//! ## Quick Start
//!
//! ```no_run
//! use queuewatch::{MonitorConfig, QueueHandle, QueueMonitor};
//!
//! # async fn run(emails: QueueHandle) -> queuewatch::MonitorResult<()> {
//! let monitor = QueueMonitor::new(MonitorConfig::default())?;
//! monitor.add_queue("emails", emails).await?;
//! monitor.start()?;
//!
//! // Serve this from a metrics endpoint
//! let exposition = monitor.render_text()?;
//! # let _ = exposition;
//! monitor.stop().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Module aliases for namespaced access
// ============================================================================

pub use queuewatch_core as core;
pub use queuewatch_monitor as monitor;
pub use queuewatch_observability as observability;
pub use queuewatch_store as store;

#[cfg(feature = "testing")]
pub use queuewatch_testing as testing;

// ============================================================================
// Domain model
// ============================================================================

pub use queuewatch_core::{
    AlertEvent, AlertNotification, AlertRule, AlertSeverity, DerivedMetrics, GlobalSummary,
    HealthStatus, JobEventKind, MetricKey, QueueHealth, QueueMetrics, SampleMetrics,
    ThresholdPair, WorkerMetrics,
};

// ============================================================================
// Configuration and errors
// ============================================================================

pub use queuewatch_core::{MonitorConfig, RetentionConfig, Thresholds, WebhookConfig};
pub use queuewatch_core::{ConfigError, SinkError, SourceError, StoreError};
pub use queuewatch_monitor::{MonitorError, MonitorResult};

// ============================================================================
// Collaborator ports
// ============================================================================

pub use queuewatch_core::{
    AlertSink, JobQueue, ListenerId, MetricsStore, QueueEventListener, QueueHandle,
    WorkerRegistry, WorkerStatus,
};

// ============================================================================
// Monitor
// ============================================================================

pub use queuewatch_core::{classify, classify_metrics};
pub use queuewatch_monitor::{
    MetricsSnapshot, MonitorEvent, PassReport, QueueMonitor, QueueMonitorBuilder,
    RetentionReport, WebhookAlertSink,
};

// ============================================================================
// Storage backends
// ============================================================================

pub use queuewatch_store::InMemoryStore;

#[cfg(feature = "redis")]
pub use queuewatch_store::{RedisStore, RedisStoreConfig};
