//! # Queuewatch Monitor
//!
//! Periodically samples job queues, derives throughput, error rate, latency
//! and lag figures, classifies each queue's health, raises and resolves
//! threshold alerts, and exposes everything as Prometheus text or a JSON
//! snapshot.
//!
//! Most users only need [`QueueMonitor`]:
//!
//! ```no_run
//! use queuewatch_core::MonitorConfig;
//! use queuewatch_monitor::{MonitorEvent, QueueMonitor};
//!
//! # use queuewatch_monitor::MonitorResult;
//! # async fn example(queue: queuewatch_core::QueueHandle) -> MonitorResult<()> {
//! let monitor = QueueMonitor::new(MonitorConfig::default())?;
//! let mut events = monitor.subscribe();
//! monitor.add_queue("emails", queue).await?;
//! monitor.collect_now().await?;
//!
//! while let Ok(event) = events.try_recv() {
//!     if let MonitorEvent::AlertTriggered(alert) = event {
//!         println!("{} breached {}", alert.queue_name, alert.metric);
//!     }
//! }
//! println!("{}", monitor.render_text()?);
//! # Ok(())
//! # }
//! ```

pub mod aggregator;
pub mod alerts;
pub mod clock;
pub mod error;
pub mod events;
pub mod exporter;
pub mod history;
pub mod monitor;
pub mod registry;
pub mod sampler;
pub mod webhook;

pub use aggregator::{GlobalAggregator, fold};
pub use alerts::{AlertEngine, AlertLog, AlertTransition};
pub use clock::MonotonicClock;
pub use error::{MonitorError, MonitorResult};
pub use events::MonitorEvent;
pub use exporter::{MetricsExporter, MetricsSnapshot};
pub use history::{HistoryLog, HistoryStore, PersistedSweep};
pub use monitor::{EVENT_CHANNEL_CAPACITY, QueueMonitor, QueueMonitorBuilder, RetentionReport};
pub use registry::{MAX_TRACKED_JOBS, QueueRecord, QueueRegistry};
pub use sampler::{MetricsSampler, PassReport, QueueOutcome, derive_metrics};
pub use webhook::WebhookAlertSink;
