//! # Queuewatch Testing
//!
//! Scriptable stand-ins for every collaborator a `QueueMonitor` talks to:
//!
//! - [`MockQueue`]: counts set by the test, injectable failures and delays,
//!   hand-emitted job events
//! - [`StaticWorkerRegistry`]: fixed worker table per queue
//! - [`RecordingAlertSink`]: captures delivered notifications
//! - [`FailingStore`]: a store that is always down
//! - [`DelayedStore`]: wraps a store and slows down its writes

pub mod collaborators;
pub mod mock_queue;

pub use collaborators::{DelayedStore, FailingStore, RecordingAlertSink, StaticWorkerRegistry};
pub use mock_queue::{MockCounts, MockQueue};
