//! Collaborator ports
//!
//! The monitor never talks to a concrete job-queue library, worker registry,
//! key-value store or notification channel. Each is reached through one of the
//! traits below so any backend can be plugged in.

use crate::error::{SinkError, SourceResult, StoreResult};
use crate::model::AlertNotification;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Handle returned by [`JobQueue::subscribe`], used to unsubscribe later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Receives job lifecycle events from a queue.
///
/// Called synchronously from the queue's emitter; implementations must not
/// block.
pub trait QueueEventListener: Send + Sync {
    fn on_waiting(&self, job_id: &str);
    fn on_active(&self, job_id: &str);
    /// `duration` is the processing time when the backend reports it
    fn on_completed(&self, job_id: &str, result: &serde_json::Value, duration: Option<Duration>);
    fn on_failed(&self, job_id: &str, reason: &str);
    fn on_stalled(&self, job_id: &str);
    fn on_progress(&self, job_id: &str, data: &serde_json::Value);
}

/// A job queue the monitor can sample and subscribe to
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn waiting_count(&self) -> SourceResult<u64>;
    async fn active_count(&self) -> SourceResult<u64>;
    async fn completed_count(&self) -> SourceResult<u64>;
    async fn failed_count(&self) -> SourceResult<u64>;
    async fn delayed_count(&self) -> SourceResult<u64>;
    async fn is_paused(&self) -> SourceResult<bool>;

    fn subscribe(&self, listener: Arc<dyn QueueEventListener>) -> ListenerId;

    /// Unknown ids are ignored
    fn unsubscribe(&self, id: ListenerId);
}

/// Shared queue handle as registered with the monitor
pub type QueueHandle = Arc<dyn JobQueue>;

/// Status reported for a single worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Active,
    Idle,
    Unknown,
}

impl WorkerStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, WorkerStatus::Active)
    }
}

/// External registry of worker processes
#[async_trait]
pub trait WorkerRegistry: Send + Sync {
    async fn list_workers(&self, queue_name: &str) -> SourceResult<Vec<String>>;
    async fn worker_status(&self, worker_id: &str) -> SourceResult<WorkerStatus>;
}

/// Persistent key-value store with bounded lists and TTL values.
///
/// Lists are ordered most-recent-first.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Prepend `value` and trim the list to `max_len` entries
    async fn push_front(&self, key: &str, value: String, max_len: usize) -> StoreResult<()>;

    /// Inclusive range, negative indices count from the end
    async fn range(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>>;

    /// Keep the first `len` entries; `len == 0` removes the key
    async fn trim(&self, key: &str, len: usize) -> StoreResult<()>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;
}

/// Destination for triggered alert notifications
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, notification: &AlertNotification) -> Result<(), SinkError>;
}
