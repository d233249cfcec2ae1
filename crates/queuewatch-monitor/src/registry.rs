//! Queue registry
//!
//! One [`QueueRecord`] per monitored queue in a single concurrent map. All
//! mutable per-queue state (health, history, alerts) sits behind the record's
//! async mutex, which is the only lock sampling passes, acknowledgements and
//! removal use. A record that has been removed is flagged under that lock, so
//! a pass holding a stale `Arc` sees it and discards its result.
//!
//! Writes to the persistent store happen under a second, per-record
//! persistence lock taken before the state lock and held after the state lock
//! is released. Readers never wait on store I/O, and a purge on removal always
//! lands after any write that observed the record as live.

use crate::alerts::AlertLog;
use crate::events::MonitorEvent;
use crate::history::HistoryLog;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use queuewatch_core::{JobEventKind, ListenerId, QueueEventListener, QueueHandle, QueueHealth};
use queuewatch_observability::MetricsRegistry;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

/// In-flight start times tracked per queue
pub const MAX_TRACKED_JOBS: usize = 10_000;

/// Mutable state of one queue, guarded by [`QueueRecord::state`]
#[derive(Debug)]
pub struct QueueState {
    pub removed: bool,
    pub health: QueueHealth,
    pub history: HistoryLog,
    pub alerts: AlertLog,
}

impl QueueState {
    pub fn new(
        name: &str,
        now: DateTime<Utc>,
        history_limit: usize,
        alert_history_limit: usize,
    ) -> Self {
        Self {
            removed: false,
            health: QueueHealth::unknown(name, now),
            history: HistoryLog::new(history_limit),
            alerts: AlertLog::new(alert_history_limit),
        }
    }

    /// Drop everything and mark the record as gone
    pub fn tear_down(&mut self) {
        self.removed = true;
        self.history.clear();
        self.alerts.clear();
        self.health.active_alerts.clear();
    }
}

#[derive(Debug, Default)]
struct TimingState {
    /// Job id to (insertion sequence, start instant)
    started: HashMap<String, (u64, Instant)>,
    /// Insertion sequence to job id, oldest first
    order: BTreeMap<u64, String>,
    next_seq: u64,
    duration_sum_ms: f64,
    duration_count: u64,
}

impl TimingState {
    fn take(&mut self, job_id: &str) -> Option<Instant> {
        let (seq, started) = self.started.remove(job_id)?;
        self.order.remove(&seq);
        Some(started)
    }
}

/// Job processing durations observed from the event stream between passes
#[derive(Debug, Default)]
pub struct JobTimings {
    inner: Mutex<TimingState>,
}

impl JobTimings {
    fn lock(&self) -> MutexGuard<'_, TimingState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn record_start(&self, job_id: &str) {
        let mut state = self.lock();
        if state.started.contains_key(job_id) {
            return;
        }
        while state.started.len() >= MAX_TRACKED_JOBS {
            match state.order.pop_first() {
                Some((_, oldest)) => {
                    state.started.remove(&oldest);
                }
                None => break,
            }
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.started.insert(job_id.to_string(), (seq, Instant::now()));
        state.order.insert(seq, job_id.to_string());
    }

    /// Record a completion, preferring the backend-reported duration
    pub fn record_completion(&self, job_id: &str, reported: Option<Duration>) {
        let mut state = self.lock();
        let started = state.take(job_id);
        if let Some(duration) = reported.or_else(|| started.map(|s| s.elapsed())) {
            state.duration_sum_ms += duration.as_secs_f64() * 1000.0;
            state.duration_count += 1;
        }
    }

    pub fn forget(&self, job_id: &str) {
        self.lock().take(job_id);
    }

    /// Mean duration observed since the last call, then reset
    pub fn drain_mean_ms(&self) -> Option<f64> {
        let mut state = self.lock();
        if state.duration_count == 0 {
            return None;
        }
        let mean = state.duration_sum_ms / state.duration_count as f64;
        state.duration_sum_ms = 0.0;
        state.duration_count = 0;
        Some(mean)
    }

    #[cfg(test)]
    pub(crate) fn in_flight(&self) -> usize {
        self.lock().started.len()
    }
}

/// Listener subscribed to a queue's emitter on behalf of the monitor
pub struct EventForwarder {
    queue: String,
    timings: Arc<JobTimings>,
    metrics: Arc<MetricsRegistry>,
    events: broadcast::Sender<MonitorEvent>,
    /// `true` once detached; forwards hold the read side
    detached: RwLock<bool>,
}

impl EventForwarder {
    pub fn new(
        queue: impl Into<String>,
        metrics: Arc<MetricsRegistry>,
        events: broadcast::Sender<MonitorEvent>,
    ) -> Self {
        Self {
            queue: queue.into(),
            timings: Arc::new(JobTimings::default()),
            metrics,
            events,
            detached: RwLock::new(false),
        }
    }

    pub fn timings(&self) -> &JobTimings {
        &self.timings
    }

    /// Stop forwarding. Returns once every in-flight forward has finished, so
    /// nothing is recorded for this queue afterwards.
    pub fn detach(&self) {
        *self.detached.write().unwrap_or_else(|e| e.into_inner()) = true;
    }

    pub fn attach(&self) {
        *self.detached.write().unwrap_or_else(|e| e.into_inner()) = false;
    }

    fn forward(&self, job_id: &str, event: JobEventKind, timing: impl FnOnce(&JobTimings)) {
        let detached = self.detached.read().unwrap_or_else(|e| e.into_inner());
        if *detached {
            return;
        }
        timing(&self.timings);
        self.metrics.record_job_event(&self.queue, event);
        // No subscribers is fine
        let _ = self.events.send(MonitorEvent::Job {
            queue: self.queue.clone(),
            job_id: job_id.to_string(),
            event,
        });
    }
}

impl QueueEventListener for EventForwarder {
    fn on_waiting(&self, job_id: &str) {
        self.forward(job_id, JobEventKind::Waiting, |_| {});
    }

    fn on_active(&self, job_id: &str) {
        self.forward(job_id, JobEventKind::Active, |t| t.record_start(job_id));
    }

    fn on_completed(&self, job_id: &str, _result: &serde_json::Value, duration: Option<Duration>) {
        self.forward(job_id, JobEventKind::Completed, |t| {
            t.record_completion(job_id, duration)
        });
    }

    fn on_failed(&self, job_id: &str, _reason: &str) {
        self.forward(job_id, JobEventKind::Failed, |t| t.forget(job_id));
    }

    fn on_stalled(&self, job_id: &str) {
        self.forward(job_id, JobEventKind::Stalled, |_| {});
    }

    fn on_progress(&self, job_id: &str, _data: &serde_json::Value) {
        self.forward(job_id, JobEventKind::Progress, |_| {});
    }
}

/// A monitored queue and everything owned on its behalf
pub struct QueueRecord {
    name: String,
    handle: QueueHandle,
    forwarder: Arc<EventForwarder>,
    listener: Mutex<Option<ListenerId>>,
    state: tokio::sync::Mutex<QueueState>,
    persistence: tokio::sync::Mutex<()>,
}

impl QueueRecord {
    pub fn new(
        name: impl Into<String>,
        handle: QueueHandle,
        forwarder: Arc<EventForwarder>,
        state: QueueState,
    ) -> Self {
        Self {
            name: name.into(),
            handle,
            forwarder,
            listener: Mutex::new(None),
            state: tokio::sync::Mutex::new(state),
            persistence: tokio::sync::Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &QueueHandle {
        &self.handle
    }

    pub fn timings(&self) -> &JobTimings {
        self.forwarder.timings()
    }

    pub fn state(&self) -> &tokio::sync::Mutex<QueueState> {
        &self.state
    }

    /// Held across persistent-store writes for this queue. Take it before
    /// [`state`](Self::state) when both are needed.
    pub fn persistence(&self) -> &tokio::sync::Mutex<()> {
        &self.persistence
    }

    fn listener_slot(&self) -> MutexGuard<'_, Option<ListenerId>> {
        self.listener.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Subscribe the forwarder to the queue's emitter unless already subscribed
    pub fn subscribe(&self) {
        let mut slot = self.listener_slot();
        if slot.is_none() {
            self.forwarder.attach();
            let listener: Arc<dyn QueueEventListener> = self.forwarder.clone();
            *slot = Some(self.handle.subscribe(listener));
        }
    }

    pub fn unsubscribe(&self) {
        self.forwarder.detach();
        if let Some(id) = self.listener_slot().take() {
            self.handle.unsubscribe(id);
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.listener_slot().is_some()
    }

    /// Current health, or `None` once removed
    pub async fn health(&self) -> Option<QueueHealth> {
        let state = self.state.lock().await;
        (!state.removed).then(|| state.health.clone())
    }
}

/// Concurrent map of monitored queues
#[derive(Default)]
pub struct QueueRegistry {
    queues: DashMap<String, Arc<QueueRecord>>,
}

impl QueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, returning the one it replaced
    pub fn insert(&self, record: Arc<QueueRecord>) -> Option<Arc<QueueRecord>> {
        self.queues.insert(record.name().to_string(), record)
    }

    pub fn remove(&self, name: &str) -> Option<Arc<QueueRecord>> {
        self.queues.remove(name).map(|(_, record)| record)
    }

    pub fn get(&self, name: &str) -> Option<Arc<QueueRecord>> {
        self.queues.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.queues.contains_key(name)
    }

    /// Records at this instant, sorted by name
    pub fn snapshot(&self) -> Vec<Arc<QueueRecord>> {
        let mut records: Vec<_> = self
            .queues
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.name().cmp(b.name()));
        records
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.queues.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Current health of every live queue, sorted by name
    pub async fn all_health(&self) -> Vec<QueueHealth> {
        let mut health = Vec::with_capacity(self.len());
        for record in self.snapshot() {
            if let Some(h) = record.health().await {
                health.push(h);
            }
        }
        health
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuewatch_testing::MockQueue;

    fn record(
        name: &str,
        queue: Arc<MockQueue>,
    ) -> (Arc<QueueRecord>, broadcast::Receiver<MonitorEvent>) {
        let metrics = Arc::new(MetricsRegistry::new("test").unwrap());
        let (tx, rx) = broadcast::channel(16);
        let forwarder = Arc::new(EventForwarder::new(name, metrics, tx));
        let state = QueueState::new(name, Utc::now(), 10, 10);
        (
            Arc::new(QueueRecord::new(name, queue, forwarder, state)),
            rx,
        )
    }

    #[test]
    fn test_job_timings_reported_and_measured() {
        let timings = JobTimings::default();
        assert_eq!(timings.drain_mean_ms(), None);

        timings.record_completion("a", Some(Duration::from_millis(100)));
        timings.record_completion("b", Some(Duration::from_millis(300)));
        assert_eq!(timings.drain_mean_ms(), Some(200.0));
        assert_eq!(timings.drain_mean_ms(), None);

        timings.record_start("c");
        assert_eq!(timings.in_flight(), 1);
        timings.record_completion("c", None);
        assert_eq!(timings.in_flight(), 0);
        assert!(timings.drain_mean_ms().is_some());
    }

    #[test]
    fn test_job_timings_cap() {
        let timings = JobTimings::default();
        for i in 0..MAX_TRACKED_JOBS + 5 {
            timings.record_start(&i.to_string());
        }
        assert_eq!(timings.in_flight(), MAX_TRACKED_JOBS);
        timings.forget("0");
        assert_eq!(timings.in_flight(), MAX_TRACKED_JOBS);
    }

    #[test]
    fn test_job_timings_evicts_oldest_remaining() {
        let timings = JobTimings::default();
        for i in 0..MAX_TRACKED_JOBS {
            timings.record_start(&i.to_string());
        }
        timings.record_completion("0", None);
        assert!(timings.drain_mean_ms().is_some());
        timings.record_start("late");
        timings.record_start("later");
        assert_eq!(timings.in_flight(), MAX_TRACKED_JOBS);

        // "1" was the oldest still tracked and got evicted
        timings.record_completion("1", None);
        assert_eq!(timings.drain_mean_ms(), None);
        timings.record_completion("2", None);
        assert!(timings.drain_mean_ms().is_some());
        timings.forget("later");
        assert_eq!(timings.in_flight(), MAX_TRACKED_JOBS - 2);
    }

    #[tokio::test]
    async fn test_detached_forwarder_records_nothing() {
        let metrics = Arc::new(MetricsRegistry::new("gate").unwrap());
        let (tx, mut rx) = broadcast::channel(16);
        let forwarder = EventForwarder::new("orders", metrics.clone(), tx);

        forwarder.detach();
        forwarder.on_completed("1", &serde_json::Value::Null, Some(Duration::from_millis(5)));
        assert!(rx.try_recv().is_err());
        assert_eq!(forwarder.timings().drain_mean_ms(), None);
        assert!(!metrics.render_text().unwrap().contains("queue=\"orders\""));

        forwarder.attach();
        forwarder.on_stalled("2");
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_forwarder_broadcasts_until_detached() {
        let queue = MockQueue::shared("orders");
        let (record, mut rx) = record("orders", queue.clone());
        record.subscribe();
        record.subscribe();
        assert_eq!(queue.listener_count(), 1);

        queue.emit_active("job-1");
        queue.emit_completed("job-1", Some(Duration::from_millis(50)));
        assert!(matches!(
            rx.recv().await.unwrap(),
            MonitorEvent::Job {
                event: JobEventKind::Active,
                ..
            }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            MonitorEvent::Job {
                event: JobEventKind::Completed,
                ..
            }
        ));
        assert_eq!(record.timings().drain_mean_ms(), Some(50.0));

        record.unsubscribe();
        assert_eq!(queue.listener_count(), 0);
        assert!(!record.is_subscribed());
    }

    #[tokio::test]
    async fn test_registry_snapshot_and_removed_health() {
        let registry = QueueRegistry::new();
        let (b, _) = record("b", MockQueue::shared("b"));
        let (a, _) = record("a", MockQueue::shared("a"));
        registry.insert(b.clone());
        registry.insert(a);

        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.all_health().await.len(), 2);

        b.state().lock().await.tear_down();
        assert!(b.health().await.is_none());
        assert_eq!(registry.all_health().await.len(), 1);

        assert!(registry.remove("b").is_some());
        assert!(!registry.contains("b"));
    }
}
