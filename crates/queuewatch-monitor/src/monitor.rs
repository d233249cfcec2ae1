//! Queue monitor façade
//!
//! [`QueueMonitor`] wires the registry, sampler, alert engine, history store,
//! exporter and aggregator together and owns the background task that drives
//! sampling passes and retention sweeps.

use crate::aggregator::GlobalAggregator;
use crate::alerts::AlertEngine;
use crate::clock::MonotonicClock;
use crate::error::{MonitorError, MonitorResult};
use crate::events::MonitorEvent;
use crate::exporter::{MetricsExporter, MetricsSnapshot};
use crate::history::HistoryStore;
use crate::registry::{EventForwarder, QueueRecord, QueueRegistry, QueueState};
use crate::sampler::{MetricsSampler, PassReport};
use crate::webhook::WebhookAlertSink;
use async_trait::async_trait;
use chrono::Utc;
use queuewatch_core::{
    AlertEvent, AlertRule, AlertSink, GlobalSummary, MetricsStore, MonitorConfig, QueueHandle,
    QueueHealth, QueueMetrics, RetentionConfig, SourceResult, WorkerRegistry, WorkerStatus,
    validate_queue_name,
};
use queuewatch_observability::MetricsRegistry;
use queuewatch_store::InMemoryStore;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

/// Buffered events per subscriber before it starts lagging
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Worker registry used when none is configured: every queue has no workers
#[derive(Debug, Default)]
struct NoWorkers;

#[async_trait]
impl WorkerRegistry for NoWorkers {
    async fn list_workers(&self, _queue_name: &str) -> SourceResult<Vec<String>> {
        Ok(Vec::new())
    }

    async fn worker_status(&self, _worker_id: &str) -> SourceResult<WorkerStatus> {
        Ok(WorkerStatus::Unknown)
    }
}

/// What one retention sweep removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub samples_removed: usize,
    pub alerts_removed: usize,
    pub persisted_samples_removed: usize,
    pub persisted_alerts_removed: usize,
}

#[derive(Clone)]
struct RetentionSweeper {
    queues: Arc<QueueRegistry>,
    history: Arc<HistoryStore>,
    retention: RetentionConfig,
}

impl RetentionSweeper {
    async fn sweep(&self) -> RetentionReport {
        let now = Utc::now();
        let metrics_cutoff = now - self.retention.metrics_retention();
        let alerts_cutoff = now - self.retention.alerts_retention();
        let mut report = RetentionReport::default();

        for record in self.queues.snapshot() {
            let _persistence = record.persistence().lock().await;
            {
                let mut state = record.state().lock().await;
                if state.removed {
                    continue;
                }
                report.samples_removed += state.history.sweep(metrics_cutoff);
                report.alerts_removed += state.alerts.sweep(alerts_cutoff);
            }
            let persisted = self
                .history
                .sweep(record.name(), metrics_cutoff, alerts_cutoff)
                .await;
            report.persisted_samples_removed += persisted.samples_removed;
            report.persisted_alerts_removed += persisted.alerts_removed;
        }

        debug!(
            samples = report.samples_removed,
            alerts = report.alerts_removed,
            persisted_samples = report.persisted_samples_removed,
            persisted_alerts = report.persisted_alerts_removed,
            "Retention sweep complete"
        );
        report
    }
}

/// Builder for [`QueueMonitor`]
pub struct QueueMonitorBuilder {
    config: MonitorConfig,
    store: Option<Arc<dyn MetricsStore>>,
    workers: Option<Arc<dyn WorkerRegistry>>,
    sink: Option<Arc<dyn AlertSink>>,
}

impl QueueMonitorBuilder {
    fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            store: None,
            workers: None,
            sink: None,
        }
    }

    /// Persistent store for history and summaries; in-memory by default
    pub fn store(mut self, store: Arc<dyn MetricsStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn worker_registry(mut self, workers: Arc<dyn WorkerRegistry>) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Alert sink; takes precedence over a configured webhook
    pub fn alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validate the configuration and assemble the monitor
    pub fn build(self) -> MonitorResult<QueueMonitor> {
        let config = self.config;
        config.validate()?;

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryStore::new()) as Arc<dyn MetricsStore>);
        let workers = self
            .workers
            .unwrap_or_else(|| Arc::new(NoWorkers) as Arc<dyn WorkerRegistry>);
        let sink = match (self.sink, &config.webhook) {
            (Some(sink), _) => Some(sink),
            (None, Some(webhook)) => {
                Some(Arc::new(WebhookAlertSink::new(webhook)?) as Arc<dyn AlertSink>)
            }
            (None, None) => None,
        };
        let sink_timeout = config
            .webhook
            .as_ref()
            .map(|w| w.timeout())
            .unwrap_or_else(|| config.fetch_timeout());

        let tracker = TaskTracker::new();
        let metrics = Arc::new(MetricsRegistry::new(&config.namespace)?);
        let queues = Arc::new(QueueRegistry::new());
        let history = Arc::new(HistoryStore::new(
            store.clone(),
            config.namespace.clone(),
            config.history_limit,
            config.alert_history_limit,
            config.fetch_timeout(),
        ));
        let alerts = Arc::new(AlertEngine::new(
            config.thresholds.default_rules(),
            sink,
            sink_timeout,
            tracker.clone(),
        ));
        let aggregator = Arc::new(GlobalAggregator::new(
            store,
            &config.namespace,
            &config.instance_id,
            config.summary_ttl(),
            config.fetch_timeout(),
        ));
        let exporter = Arc::new(MetricsExporter::new(
            metrics.clone(),
            queues.clone(),
            aggregator.clone(),
            alerts.clone(),
        ));
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let clock = Arc::new(MonotonicClock::new());
        let sampler = MetricsSampler::new(
            &config,
            queues.clone(),
            workers,
            history.clone(),
            alerts.clone(),
            exporter.clone(),
            aggregator.clone(),
            events.clone(),
            clock.clone(),
        );
        let sweeper = RetentionSweeper {
            queues: queues.clone(),
            history: history.clone(),
            retention: config.retention.clone(),
        };

        info!(
            namespace = %config.namespace,
            instance_id = %config.instance_id,
            interval_ms = config.metrics_interval_ms,
            alerting = config.alerting_enabled,
            "Queue monitor created"
        );

        Ok(QueueMonitor {
            config,
            queues,
            metrics,
            history,
            alerts,
            exporter,
            aggregator,
            sampler,
            sweeper,
            events,
            clock,
            tracker,
            lifecycle: tokio::sync::Mutex::new(()),
            running: Mutex::new(None),
        })
    }
}

/// Monitors a set of job queues, alerts on threshold breaches and exports
/// metrics.
///
/// ```no_run
/// use queuewatch_core::MonitorConfig;
/// use queuewatch_monitor::QueueMonitor;
///
/// # async fn run(queue: queuewatch_core::QueueHandle) -> queuewatch_monitor::MonitorResult<()> {
/// let monitor = QueueMonitor::new(MonitorConfig::default())?;
/// monitor.add_queue("orders", queue).await?;
/// monitor.start()?;
/// // ...
/// monitor.stop().await;
/// # Ok(())
/// # }
/// ```
pub struct QueueMonitor {
    config: MonitorConfig,
    queues: Arc<QueueRegistry>,
    metrics: Arc<MetricsRegistry>,
    history: Arc<HistoryStore>,
    alerts: Arc<AlertEngine>,
    exporter: Arc<MetricsExporter>,
    aggregator: Arc<GlobalAggregator>,
    sampler: MetricsSampler,
    sweeper: RetentionSweeper,
    events: broadcast::Sender<MonitorEvent>,
    clock: Arc<MonotonicClock>,
    tracker: TaskTracker,
    /// Serialises add and remove
    lifecycle: tokio::sync::Mutex<()>,
    running: Mutex<Option<CancellationToken>>,
}

impl QueueMonitor {
    pub fn new(config: MonitorConfig) -> MonitorResult<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: MonitorConfig) -> QueueMonitorBuilder {
        QueueMonitorBuilder::new(config)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    fn running_slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self) -> bool {
        self.running_slot().is_some()
    }

    /// Receive domain events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.events.subscribe()
    }

    /// Register a queue, replacing and resetting any queue of the same name
    pub async fn add_queue(
        &self,
        name: impl Into<String>,
        handle: QueueHandle,
    ) -> MonitorResult<()> {
        let name = name.into();
        validate_queue_name(&name).map_err(|reason| MonitorError::InvalidQueueName {
            name: name.clone(),
            reason,
        })?;

        let _lifecycle = self.lifecycle.lock().await;
        let replaced = match self.queues.get(&name) {
            Some(old) => {
                self.retire(&old).await;
                true
            }
            None => false,
        };

        let forwarder = Arc::new(EventForwarder::new(
            name.clone(),
            self.metrics.clone(),
            self.events.clone(),
        ));
        let state = QueueState::new(
            &name,
            self.clock.now(),
            self.config.history_limit,
            self.config.alert_history_limit,
        );
        let record = Arc::new(QueueRecord::new(name.clone(), handle, forwarder, state));
        record.subscribe();
        self.queues.insert(record);

        info!(queue = %name, replaced, "Queue added");
        let _ = self.events.send(MonitorEvent::QueueAdded { queue: name });
        Ok(())
    }

    /// Stop monitoring a queue and drop its health, history and alerts
    pub async fn remove_queue(&self, name: &str) -> MonitorResult<()> {
        let _lifecycle = self.lifecycle.lock().await;
        let record = self
            .queues
            .get(name)
            .ok_or_else(|| MonitorError::QueueNotFound(name.to_string()))?;

        self.retire(&record).await;
        self.queues.remove(name);

        info!(queue = %name, "Queue removed");
        let _ = self.events.send(MonitorEvent::QueueRemoved {
            queue: name.to_string(),
        });
        Ok(())
    }

    async fn retire(&self, record: &QueueRecord) {
        record.unsubscribe();
        {
            let mut state = record.state().lock().await;
            state.tear_down();
            self.metrics.remove_queue(record.name());
        }
        // Waits out a commit that saw the record live; later ones discard
        let _persistence = record.persistence().lock().await;
        self.history.purge(record.name()).await;
    }

    fn record(&self, name: &str) -> MonitorResult<Arc<QueueRecord>> {
        self.queues
            .get(name)
            .ok_or_else(|| MonitorError::QueueNotFound(name.to_string()))
    }

    /// Acknowledge an active or resolved alert of `queue`.
    ///
    /// Returns `false` for an unknown alert id; repeated calls on a known id
    /// keep returning `true`.
    pub async fn acknowledge_alert(&self, queue: &str, alert_id: &str) -> MonitorResult<bool> {
        let record = self.record(queue)?;
        let mut state = record.state().lock().await;
        if state.removed {
            return Err(MonitorError::QueueNotFound(queue.to_string()));
        }
        let acknowledged = state.alerts.acknowledge(alert_id);
        if acknowledged {
            state.health.active_alerts = state.alerts.active();
            debug!(queue = %queue, alert_id = %alert_id, "Alert acknowledged");
        }
        Ok(acknowledged)
    }

    /// Start the background sampling task
    pub fn start(&self) -> MonitorResult<()> {
        let mut running = self.running_slot();
        if running.is_some() {
            return Err(MonitorError::AlreadyStarted);
        }

        for record in self.queues.snapshot() {
            record.subscribe();
        }

        let token = CancellationToken::new();
        let task_token = token.clone();
        let sampler = self.sampler.clone();
        let sweeper = self.sweeper.clone();
        let metrics = self.metrics.clone();
        let tracker = self.tracker.clone();
        let interval = self.config.metrics_interval();
        let sweep_interval = self.config.retention.sweep_interval();

        self.tracker.spawn(async move {
            let mut ticks = tokio::time::interval(interval);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut sweeps = tokio::time::interval(sweep_interval);
            sweeps.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = task_token.cancelled() => break,
                    _ = ticks.tick() => {
                        let sampler = sampler.clone();
                        let pass = tracker.spawn(async move { sampler.run_pass().await });
                        if let Err(e) = pass.await {
                            error!(error = %e, "Sampling pass aborted");
                            metrics.record_collection_error();
                        }
                    }
                    _ = sweeps.tick() => {
                        sweeper.sweep().await;
                    }
                }
            }
            debug!("Sampling loop stopped");
        });

        *running = Some(token);
        info!(
            queues = self.queues.len(),
            interval_ms = interval.as_millis() as u64,
            "Queue monitor started"
        );
        Ok(())
    }

    /// Stop the background task, let in-flight work finish and unsubscribe
    /// every queue listener. Stopping a stopped monitor is a no-op.
    pub async fn stop(&self) {
        let Some(token) = self.running_slot().take() else {
            return;
        };
        token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();

        for record in self.queues.snapshot() {
            record.unsubscribe();
        }
        info!("Queue monitor stopped");
    }

    /// Run one sampling pass now, outside the timer
    pub async fn collect_now(&self) -> MonitorResult<PassReport> {
        let sampler = self.sampler.clone();
        self.tracker
            .spawn(async move { sampler.run_pass().await })
            .await
            .map_err(|e| {
                self.metrics.record_collection_error();
                MonitorError::PassFailed(e.to_string())
            })
    }

    /// Apply the retention windows to in-memory and persisted logs
    pub async fn sweep_retention(&self) -> RetentionReport {
        self.sweeper.sweep().await
    }

    pub async fn queue_health(&self, name: &str) -> Option<QueueHealth> {
        match self.queues.get(name) {
            Some(record) => record.health().await,
            None => None,
        }
    }

    /// Health of every monitored queue, sorted by name
    pub async fn all_health(&self) -> Vec<QueueHealth> {
        self.queues.all_health().await
    }

    pub async fn active_alerts(&self, name: &str) -> MonitorResult<Vec<AlertEvent>> {
        let record = self.record(name)?;
        let state = record.state().lock().await;
        if state.removed {
            return Err(MonitorError::QueueNotFound(name.to_string()));
        }
        Ok(state.alerts.active())
    }

    /// Resolved alerts of a queue, most recent first
    pub async fn alert_history(&self, name: &str) -> MonitorResult<Vec<AlertEvent>> {
        let record = self.record(name)?;
        let state = record.state().lock().await;
        if state.removed {
            return Err(MonitorError::QueueNotFound(name.to_string()));
        }
        Ok(state.alerts.resolved())
    }

    /// Up to `n` most recent samples of a queue, newest first
    pub async fn recent_samples(&self, name: &str, n: usize) -> MonitorResult<Vec<QueueMetrics>> {
        let record = self.record(name)?;
        let state = record.state().lock().await;
        if state.removed {
            return Err(MonitorError::QueueNotFound(name.to_string()));
        }
        Ok(state.history.recent(n))
    }

    pub fn global_summary(&self) -> GlobalSummary {
        self.aggregator.latest()
    }

    pub fn alert_rules(&self) -> Vec<AlertRule> {
        self.alerts.rules()
    }

    /// Enable or disable an alert rule; `false` for an unknown id
    pub fn set_rule_enabled(&self, rule_id: &str, enabled: bool) -> bool {
        self.alerts.set_rule_enabled(rule_id, enabled)
    }

    pub fn queue_names(&self) -> Vec<String> {
        self.queues.names()
    }

    pub fn render_text(&self) -> MonitorResult<String> {
        Ok(self.exporter.render_text()?)
    }

    pub async fn render_json(&self) -> MonitorResult<String> {
        Ok(self.exporter.render_json().await?)
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        self.exporter.snapshot().await
    }

    pub fn exporter(&self) -> &MetricsExporter {
        &self.exporter
    }

    /// Registry backing [`render_text`](Self::render_text), for embedding
    /// into an existing exposition endpoint
    pub fn metrics_registry(&self) -> &MetricsRegistry {
        &self.metrics
    }
}

impl Drop for QueueMonitor {
    fn drop(&mut self) {
        if let Some(token) = self.running_slot().take() {
            token.cancel();
        }
    }
}
