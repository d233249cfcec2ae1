//! # Mock Queue
//!
//! A [`JobQueue`] whose counts are set by the test, which can be told to fail
//! or stall, and which lets the test emit job lifecycle events by hand.

use async_trait::async_trait;
use queuewatch_core::{
    JobQueue, ListenerId, QueueEventListener, SourceError, SourceResult,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Counts reported by a [`MockQueue`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockCounts {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
    pub paused: bool,
}

/// Scriptable in-process queue
pub struct MockQueue {
    name: String,
    counts: Mutex<MockCounts>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    listeners: Mutex<HashMap<u64, Arc<dyn QueueEventListener>>>,
    next_listener: AtomicU64,
    fetch_calls: AtomicUsize,
}

impl MockQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            counts: Mutex::new(MockCounts::default()),
            failing: AtomicBool::new(false),
            delay: Mutex::new(None),
            listeners: Mutex::new(HashMap::new()),
            next_listener: AtomicU64::new(1),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    /// Wrap in an `Arc` so the same mock can be registered and scripted
    pub fn shared(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(name))
    }

    pub fn with_counts(self, counts: MockCounts) -> Self {
        *lock(&self.counts) = counts;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn counts(&self) -> MockCounts {
        *lock(&self.counts)
    }

    pub fn set_counts(&self, counts: MockCounts) {
        *lock(&self.counts) = counts;
    }

    /// Apply an in-place edit to the current counts
    pub fn update(&self, f: impl FnOnce(&mut MockCounts)) {
        f(&mut lock(&self.counts));
    }

    pub fn set_waiting(&self, waiting: u64) {
        self.update(|c| c.waiting = waiting);
    }

    pub fn set_active(&self, active: u64) {
        self.update(|c| c.active = active);
    }

    pub fn set_completed(&self, completed: u64) {
        self.update(|c| c.completed = completed);
    }

    pub fn set_failed(&self, failed: u64) {
        self.update(|c| c.failed = failed);
    }

    pub fn set_paused(&self, paused: bool) {
        self.update(|c| c.paused = paused);
    }

    /// Make every count fetch return `SourceError::Unavailable`
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every count fetch, e.g. to trip the fetch timeout
    pub fn set_delay(&self, delay: Option<Duration>) {
        *lock(&self.delay) = delay;
    }

    /// Number of count fetches served so far
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.listeners).len()
    }

    fn listeners(&self) -> Vec<Arc<dyn QueueEventListener>> {
        lock(&self.listeners).values().cloned().collect()
    }

    pub fn emit_waiting(&self, job_id: &str) {
        for listener in self.listeners() {
            listener.on_waiting(job_id);
        }
    }

    pub fn emit_active(&self, job_id: &str) {
        for listener in self.listeners() {
            listener.on_active(job_id);
        }
    }

    pub fn emit_completed(&self, job_id: &str, duration: Option<Duration>) {
        let result = serde_json::json!({ "ok": true });
        for listener in self.listeners() {
            listener.on_completed(job_id, &result, duration);
        }
    }

    pub fn emit_failed(&self, job_id: &str, reason: &str) {
        for listener in self.listeners() {
            listener.on_failed(job_id, reason);
        }
    }

    pub fn emit_stalled(&self, job_id: &str) {
        for listener in self.listeners() {
            listener.on_stalled(job_id);
        }
    }

    pub fn emit_progress(&self, job_id: &str, progress: u8) {
        let data = serde_json::json!({ "progress": progress });
        for listener in self.listeners() {
            listener.on_progress(job_id, &data);
        }
    }

    async fn read<T>(&self, f: impl FnOnce(&MockCounts) -> T) -> SourceResult<T> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable(format!(
                "queue '{}' is unreachable",
                self.name
            )));
        }
        Ok(f(&lock(&self.counts)))
    }
}

#[async_trait]
impl JobQueue for MockQueue {
    async fn waiting_count(&self) -> SourceResult<u64> {
        self.read(|c| c.waiting).await
    }

    async fn active_count(&self) -> SourceResult<u64> {
        self.read(|c| c.active).await
    }

    async fn completed_count(&self) -> SourceResult<u64> {
        self.read(|c| c.completed).await
    }

    async fn failed_count(&self) -> SourceResult<u64> {
        self.read(|c| c.failed).await
    }

    async fn delayed_count(&self) -> SourceResult<u64> {
        self.read(|c| c.delayed).await
    }

    async fn is_paused(&self) -> SourceResult<bool> {
        self.read(|c| c.paused).await
    }

    fn subscribe(&self, listener: Arc<dyn QueueEventListener>) -> ListenerId {
        let id = self.next_listener.fetch_add(1, Ordering::SeqCst);
        lock(&self.listeners).insert(id, listener);
        ListenerId(id)
    }

    fn unsubscribe(&self, id: ListenerId) {
        lock(&self.listeners).remove(&id.0);
    }
}
