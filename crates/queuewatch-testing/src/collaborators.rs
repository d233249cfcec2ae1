//! Mock worker registry, alert sink and store

use async_trait::async_trait;
use queuewatch_core::{
    AlertNotification, AlertSink, MetricsStore, SinkError, SourceError, SourceResult, StoreError,
    StoreResult, WorkerRegistry, WorkerStatus,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Worker registry backed by a fixed table of workers per queue
#[derive(Debug, Default)]
pub struct StaticWorkerRegistry {
    workers: Mutex<HashMap<String, Vec<(String, WorkerStatus)>>>,
    failing: AtomicBool,
    failing_status: Mutex<HashSet<String>>,
}

impl StaticWorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the workers of `queue` with `total` workers, the first
    /// `active` of which report as active
    pub fn set_workers(&self, queue: &str, total: u32, active: u32) {
        let workers = (0..total)
            .map(|i| {
                let status = if i < active {
                    WorkerStatus::Active
                } else {
                    WorkerStatus::Idle
                };
                (format!("{}-worker-{}", queue, i), status)
            })
            .collect();
        lock(&self.workers).insert(queue.to_string(), workers);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Make `worker_status` fail for one worker while listing still works
    pub fn fail_status(&self, worker_id: &str) {
        lock(&self.failing_status).insert(worker_id.to_string());
    }

    fn check(&self) -> SourceResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(SourceError::Unavailable(
                "worker registry unreachable".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl WorkerRegistry for StaticWorkerRegistry {
    async fn list_workers(&self, queue_name: &str) -> SourceResult<Vec<String>> {
        self.check()?;
        Ok(lock(&self.workers)
            .get(queue_name)
            .map(|workers| workers.iter().map(|(id, _)| id.clone()).collect())
            .unwrap_or_default())
    }

    async fn worker_status(&self, worker_id: &str) -> SourceResult<WorkerStatus> {
        self.check()?;
        if lock(&self.failing_status).contains(worker_id) {
            return Err(SourceError::Unavailable(format!(
                "status of worker '{}' unavailable",
                worker_id
            )));
        }
        Ok(lock(&self.workers)
            .values()
            .flatten()
            .find(|(id, _)| id == worker_id)
            .map(|(_, status)| *status)
            .unwrap_or(WorkerStatus::Unknown))
    }
}

/// Alert sink that records every delivered notification
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    delivered: Mutex<Vec<AlertNotification>>,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every delivery with `SinkError::Status(503)`
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.failing.store(true, Ordering::SeqCst);
        sink
    }

    pub fn notifications(&self) -> Vec<AlertNotification> {
        lock(&self.delivered).clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Wait until at least `count` delivery attempts were made
    pub async fn wait_for_attempts(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.attempts() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.attempts() >= count
    }
}

#[async_trait]
impl AlertSink for RecordingAlertSink {
    async fn deliver(&self, notification: &AlertNotification) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(SinkError::Status(503));
        }
        lock(&self.delivered).push(notification.clone());
        Ok(())
    }
}

/// Store whose every operation fails with a backend error
#[derive(Debug, Default)]
pub struct FailingStore {
    calls: AtomicUsize,
}

impl FailingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> StoreResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Backend("store offline".to_string()))
    }
}

#[async_trait]
impl MetricsStore for FailingStore {
    async fn push_front(&self, _key: &str, _value: String, _max_len: usize) -> StoreResult<()> {
        self.fail()
    }

    async fn range(&self, _key: &str, _start: isize, _stop: isize) -> StoreResult<Vec<String>> {
        self.fail()
    }

    async fn trim(&self, _key: &str, _len: usize) -> StoreResult<()> {
        self.fail()
    }

    async fn delete(&self, _key: &str) -> StoreResult<()> {
        self.fail()
    }

    async fn set_with_ttl(&self, _key: &str, _value: String, _ttl: Duration) -> StoreResult<()> {
        self.fail()
    }

    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        self.fail()
    }
}

/// Store that forwards to another store, delaying every list write
pub struct DelayedStore {
    inner: Arc<dyn MetricsStore>,
    delay: Duration,
    writes: AtomicUsize,
}

impl DelayedStore {
    pub fn new(inner: Arc<dyn MetricsStore>, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            writes: AtomicUsize::new(0),
        }
    }

    /// List writes started so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricsStore for DelayedStore {
    async fn push_front(&self, key: &str, value: String, max_len: usize) -> StoreResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.push_front(key, value, max_len).await
    }

    async fn range(&self, key: &str, start: isize, stop: isize) -> StoreResult<Vec<String>> {
        self.inner.range(key, start, stop).await
    }

    async fn trim(&self, key: &str, len: usize) -> StoreResult<()> {
        self.inner.trim(key, len).await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.inner.delete(key).await
    }

    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> StoreResult<()> {
        self.inner.set_with_ttl(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key).await
    }
}
