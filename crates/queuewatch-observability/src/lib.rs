//! # Queuewatch Observability
//!
//! Prometheus metrics for the queue monitor, registered into a registry owned
//! by each monitor instance, and tracing subscriber setup for binaries.

pub mod metrics;
pub mod trace;

pub use metrics::{FetchSource, MetricsError, MetricsRegistry, MonitorMetrics};
pub use trace::init_tracing;

/// Buckets for sampling pass duration, from 5ms up to a full default timeout
pub const COLLECTION_BUCKETS: &[f64] = &[
    0.005, // 5ms
    0.01,  // 10ms
    0.025, // 25ms
    0.05,  // 50ms
    0.1,   // 100ms
    0.25,  // 250ms
    0.5,   // 500ms
    1.0,   // 1s
    2.5,   // 2.5s
    5.0,   // 5s
    10.0,  // 10s
    30.0,  // 30s
];

/// Observability setup errors
#[derive(thiserror::Error, Debug)]
pub enum ObservabilityError {
    #[error("Tracing initialization failed: {0}")]
    TracingInit(String),
}
