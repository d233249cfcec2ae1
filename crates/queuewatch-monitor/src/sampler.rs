//! Sampling passes
//!
//! A pass fans out one task per registered queue. Each task fetches counts
//! and workers under the configured timeout, then commits under the queue's
//! record lock: derive metrics, classify, evaluate alerts, update health and
//! history, mirror into the exporter. The persisted copy of the sample is
//! written after the record lock is released. A failure degrades only that
//! queue for the tick. The fleet summary is refreshed once every task has
//! finished.

use crate::aggregator::GlobalAggregator;
use crate::alerts::{AlertEngine, AlertTransition};
use crate::clock::MonotonicClock;
use crate::events::MonitorEvent;
use crate::exporter::MetricsExporter;
use crate::history::HistoryStore;
use crate::registry::{QueueRecord, QueueRegistry};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use queuewatch_core::{
    AlertEvent, DerivedMetrics, GlobalSummary, JobQueue, MonitorConfig, QueueHealth,
    QueueMetrics, SampleMetrics, SourceError, SourceResult, Thresholds, WorkerMetrics,
    WorkerRegistry, classify,
};
use queuewatch_observability::FetchSource;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Derive rates and latencies from the current sample and the samples before
/// it (newest first).
///
/// Counts in the window are differences of the cumulative counters between
/// the current sample and the oldest previous one. `observed_mean_ms` is the
/// mean of job durations seen on the event stream since the last tick and
/// enters the processing-time smoothing as one extra value.
pub fn derive_metrics(
    current: &SampleMetrics,
    previous: &[QueueMetrics],
    observed_mean_ms: Option<f64>,
) -> DerivedMetrics {
    let mut derived = DerivedMetrics::default();

    let smoothing: Vec<f64> = previous
        .iter()
        .map(|m| m.derived.average_processing_time_ms)
        .chain(observed_mean_ms)
        .filter(|v| v.is_finite())
        .collect();
    if !smoothing.is_empty() {
        let total: f64 = smoothing.iter().sum();
        derived.average_processing_time_ms = total / smoothing.len() as f64;
    }

    if let Some(oldest) = previous.last() {
        let completed = current.completed.saturating_sub(oldest.sample.completed);
        let failed = current.failed.saturating_sub(oldest.sample.failed);
        let finished = completed + failed;
        if finished > 0 {
            derived.error_rate_pct = failed as f64 / finished as f64 * 100.0;
        }

        let window_secs = (current.timestamp - oldest.sample.timestamp)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        if window_secs > 0.0 {
            derived.throughput_per_sec = completed as f64 / window_secs;
            derived.processing_rate_per_min = derived.throughput_per_sec * 60.0;
        }
    }

    if current.active > 0 {
        derived.lag_ms =
            current.waiting as f64 / current.active as f64 * derived.average_processing_time_ms;
    }

    derived
}

/// Outcome of one queue within a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueOutcome {
    Committed,
    /// Count fetch failed, previous health retained
    Degraded,
    /// Removed or superseded while the pass ran
    Discarded,
}

/// Summary of a completed pass
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    pub committed: usize,
    pub degraded: usize,
    pub discarded: usize,
    pub summary: GlobalSummary,
    pub duration: Duration,
}

/// Worker figures of one queue for one tick
#[derive(Debug)]
struct WorkerFetch {
    /// `None` keeps the previous figures
    metrics: Option<WorkerMetrics>,
    /// Failed registry calls, one fetch error each
    errors: usize,
}

/// Drives sampling passes over every registered queue
#[derive(Clone)]
pub struct MetricsSampler {
    registry: Arc<QueueRegistry>,
    workers: Arc<dyn WorkerRegistry>,
    history: Arc<HistoryStore>,
    alerts: Arc<AlertEngine>,
    exporter: Arc<MetricsExporter>,
    aggregator: Arc<GlobalAggregator>,
    events: broadcast::Sender<MonitorEvent>,
    clock: Arc<MonotonicClock>,
    thresholds: Thresholds,
    alerting_enabled: bool,
    history_window: usize,
    fetch_timeout: Duration,
}

impl MetricsSampler {
    pub fn new(
        config: &MonitorConfig,
        registry: Arc<QueueRegistry>,
        workers: Arc<dyn WorkerRegistry>,
        history: Arc<HistoryStore>,
        alerts: Arc<AlertEngine>,
        exporter: Arc<MetricsExporter>,
        aggregator: Arc<GlobalAggregator>,
        events: broadcast::Sender<MonitorEvent>,
        clock: Arc<MonotonicClock>,
    ) -> Self {
        Self {
            registry,
            workers,
            history,
            alerts,
            exporter,
            aggregator,
            events,
            clock,
            thresholds: config.thresholds.clone(),
            alerting_enabled: config.alerting_enabled,
            history_window: config.history_window,
            fetch_timeout: config.fetch_timeout(),
        }
    }

    /// Run one full pass
    pub async fn run_pass(&self) -> PassReport {
        let started = Instant::now();
        let records = self.registry.snapshot();
        debug!(queues = records.len(), "Starting sampling pass");

        let mut tasks = JoinSet::new();
        for record in records {
            let sampler = self.clone();
            tasks.spawn(async move { sampler.sample_queue(record).await });
        }

        let (mut committed, mut degraded, mut discarded) = (0, 0, 0);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(QueueOutcome::Committed) => committed += 1,
                Ok(QueueOutcome::Degraded) => degraded += 1,
                Ok(QueueOutcome::Discarded) => discarded += 1,
                Err(e) => {
                    warn!(error = %e, "Queue sampling task failed");
                    self.exporter.metrics().record_collection_error();
                    degraded += 1;
                }
            }
        }

        let health = self.registry.all_health().await;
        let summary = self.aggregator.refresh(&health, self.clock.now()).await;
        self.exporter.metrics().record_global(&summary);

        let duration = started.elapsed();
        self.exporter.metrics().observe_collection_duration(duration);
        let _ = self.events.send(MonitorEvent::PassCompleted {
            summary: summary.clone(),
            duration,
        });
        debug!(
            committed,
            degraded,
            discarded,
            duration_ms = duration.as_millis() as u64,
            "Sampling pass complete"
        );

        PassReport {
            committed,
            degraded,
            discarded,
            summary,
            duration,
        }
    }

    async fn sample_queue(&self, record: Arc<QueueRecord>) -> QueueOutcome {
        let name = record.name();
        let timestamp = self.clock.now();

        let (counts, workers) = tokio::join!(
            self.fetch_counts(record.handle().as_ref(), timestamp),
            self.fetch_workers(name),
        );

        match counts {
            Ok(sample) => self.commit(&record, sample, workers, timestamp).await,
            Err(e) => {
                warn!(
                    queue = %name,
                    error = %e,
                    "Failed to fetch queue counts, keeping previous health"
                );
                let state = record.state().lock().await;
                if state.removed {
                    return QueueOutcome::Discarded;
                }
                let metrics = self.exporter.metrics();
                metrics.record_fetch_error(name, FetchSource::Queue);
                for _ in 0..workers.errors {
                    metrics.record_fetch_error(name, FetchSource::Workers);
                }
                QueueOutcome::Degraded
            }
        }
    }

    async fn fetch_counts(
        &self,
        queue: &dyn JobQueue,
        timestamp: DateTime<Utc>,
    ) -> SourceResult<SampleMetrics> {
        let fetch = async {
            tokio::try_join!(
                queue.waiting_count(),
                queue.active_count(),
                queue.completed_count(),
                queue.failed_count(),
                queue.delayed_count(),
                queue.is_paused(),
            )
        };
        let (waiting, active, completed, failed, delayed, paused) =
            tokio::time::timeout(self.fetch_timeout, fetch)
                .await
                .map_err(|_| SourceError::Timeout(self.fetch_timeout))??;

        Ok(SampleMetrics {
            waiting,
            active,
            completed,
            failed,
            delayed,
            paused,
            timestamp,
        })
    }

    /// Workers whose status cannot be read are left out of the figures. When
    /// none can be read the previous figures are kept.
    async fn fetch_workers(&self, queue: &str) -> WorkerFetch {
        let fetch = async {
            let ids = self.workers.list_workers(queue).await?;
            let statuses = join_all(ids.iter().map(|id| self.workers.worker_status(id))).await;
            Ok::<_, SourceError>(ids.into_iter().zip(statuses).collect::<Vec<_>>())
        };
        let statuses = match tokio::time::timeout(self.fetch_timeout, fetch).await {
            Ok(Ok(statuses)) => statuses,
            Ok(Err(e)) => return self.worker_fetch_failed(queue, &e),
            Err(_) => {
                let timeout = SourceError::Timeout(self.fetch_timeout);
                return self.worker_fetch_failed(queue, &timeout);
            }
        };

        let (mut total, mut active, mut errors) = (0u32, 0u32, 0usize);
        for (id, status) in &statuses {
            match status {
                Ok(status) => {
                    total = total.saturating_add(1);
                    if status.is_active() {
                        active = active.saturating_add(1);
                    }
                }
                Err(e) => {
                    warn!(
                        queue = %queue,
                        worker = %id,
                        error = %e,
                        "Failed to fetch worker status"
                    );
                    errors += 1;
                }
            }
        }

        if errors > 0 && errors == statuses.len() {
            warn!(
                queue = %queue,
                workers = errors,
                "No worker status readable, keeping previous figures"
            );
            return WorkerFetch {
                metrics: None,
                errors,
            };
        }
        WorkerFetch {
            metrics: Some(WorkerMetrics::from_counts(total, active)),
            errors,
        }
    }

    fn worker_fetch_failed(&self, queue: &str, error: &SourceError) -> WorkerFetch {
        warn!(queue = %queue, error = %error, "Failed to fetch workers, keeping previous figures");
        WorkerFetch {
            metrics: None,
            errors: 1,
        }
    }

    async fn commit(
        &self,
        record: &QueueRecord,
        sample: SampleMetrics,
        workers: WorkerFetch,
        timestamp: DateTime<Utc>,
    ) -> QueueOutcome {
        let name = record.name();
        let persistence = record.persistence().lock().await;
        let mut state = record.state().lock().await;

        if state.removed {
            debug!(queue = %name, "Queue removed during pass, discarding sample");
            return QueueOutcome::Discarded;
        }
        for _ in 0..workers.errors {
            self.exporter
                .metrics()
                .record_fetch_error(name, FetchSource::Workers);
        }
        if timestamp <= state.health.last_updated {
            debug!(queue = %name, "Newer sample already committed, discarding");
            return QueueOutcome::Discarded;
        }

        let workers = workers.metrics.unwrap_or(state.health.workers);
        let previous = state.history.recent(self.history_window);
        let derived = derive_metrics(&sample, &previous, record.timings().drain_mean_ms());
        let status = classify(&sample, &derived, &workers, &self.thresholds);
        let metrics = QueueMetrics { sample, derived };

        let transitions = if self.alerting_enabled {
            self.alerts
                .evaluate(&mut state.alerts, name, &metrics, &workers, timestamp)
        } else {
            Vec::new()
        };

        let health = QueueHealth {
            queue_name: name.to_string(),
            status,
            metrics: metrics.clone(),
            workers,
            last_updated: timestamp,
            active_alerts: state.alerts.active(),
        };
        if health.status != state.health.status {
            info!(
                queue = %name,
                from = %state.health.status,
                to = %health.status,
                "Queue health changed"
            );
        }
        state.health = health.clone();
        state.history.append(metrics.clone());
        self.exporter.record_commit(&health, &transitions);
        drop(state);

        let resolved: Vec<&AlertEvent> = transitions
            .iter()
            .filter_map(|t| match t {
                AlertTransition::Resolved(alert) => Some(alert),
                _ => None,
            })
            .collect();
        self.history.append(name, &metrics).await;
        for alert in resolved {
            self.history.append_alert(name, alert).await;
        }
        drop(persistence);

        self.alerts.notify(&transitions);
        self.announce(transitions);
        QueueOutcome::Committed
    }

    fn announce(&self, transitions: Vec<AlertTransition>) {
        for transition in transitions {
            let event = match transition {
                AlertTransition::Triggered(alert) => {
                    info!(
                        queue = %alert.queue_name,
                        metric = %alert.metric,
                        severity = %alert.severity,
                        value = alert.triggered_value,
                        threshold = alert.threshold,
                        "Alert triggered"
                    );
                    MonitorEvent::AlertTriggered(alert)
                }
                AlertTransition::Updated { alert, previous } => {
                    info!(
                        queue = %alert.queue_name,
                        metric = %alert.metric,
                        from = %previous,
                        to = %alert.severity,
                        "Alert severity changed"
                    );
                    MonitorEvent::AlertUpdated { alert, previous }
                }
                AlertTransition::Resolved(alert) => {
                    info!(
                        queue = %alert.queue_name,
                        metric = %alert.metric,
                        value = alert.current_value,
                        "Alert resolved"
                    );
                    MonitorEvent::AlertResolved(alert)
                }
            };
            let _ = self.events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn sample_at(ts: DateTime<Utc>, completed: u64, failed: u64) -> SampleMetrics {
        SampleMetrics {
            completed,
            failed,
            ..SampleMetrics::empty(ts)
        }
    }

    fn row(sample: SampleMetrics, avg_ms: f64) -> QueueMetrics {
        QueueMetrics {
            sample,
            derived: DerivedMetrics {
                average_processing_time_ms: avg_ms,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_empty_history_derives_zero() {
        let derived = derive_metrics(&sample_at(Utc::now(), 500, 20), &[], None);
        assert_eq!(derived, DerivedMetrics::default());
    }

    #[test]
    fn test_window_rates() {
        let now = Utc::now();
        let previous = vec![
            row(sample_at(now - ChronoDuration::seconds(30), 150, 5), 0.0),
            row(sample_at(now - ChronoDuration::seconds(60), 100, 0), 0.0),
        ];
        let current = sample_at(now, 190, 10);
        let derived = derive_metrics(&current, &previous, None);

        // 90 completed and 10 failed over 60 seconds
        assert!((derived.throughput_per_sec - 1.5).abs() < 1e-9);
        assert!((derived.processing_rate_per_min - 90.0).abs() < 1e-9);
        assert!((derived.error_rate_pct - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_counter_reset_saturates() {
        let now = Utc::now();
        let previous = vec![row(sample_at(now - ChronoDuration::seconds(30), 1000, 50), 0.0)];
        let derived = derive_metrics(&sample_at(now, 10, 1), &previous, None);
        assert_eq!(derived.throughput_per_sec, 0.0);
        assert_eq!(derived.error_rate_pct, 0.0);
    }

    #[test]
    fn test_zero_span_yields_zero_rates() {
        let now = Utc::now();
        let previous = vec![row(sample_at(now, 0, 0), 0.0)];
        let derived = derive_metrics(&sample_at(now, 100, 0), &previous, None);
        assert_eq!(derived.throughput_per_sec, 0.0);
        assert_eq!(derived.processing_rate_per_min, 0.0);
    }

    #[test]
    fn test_processing_time_smoothing_and_lag() {
        let now = Utc::now();
        let previous = vec![
            row(sample_at(now - ChronoDuration::seconds(30), 0, 0), 200.0),
            row(sample_at(now - ChronoDuration::seconds(60), 0, 0), 100.0),
        ];
        let mut current = sample_at(now, 0, 0);
        current.waiting = 40;
        current.active = 4;

        let derived = derive_metrics(&current, &previous, None);
        assert!((derived.average_processing_time_ms - 150.0).abs() < 1e-9);
        assert!((derived.lag_ms - 1500.0).abs() < 1e-9);

        let derived = derive_metrics(&current, &previous, Some(600.0));
        assert!((derived.average_processing_time_ms - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_observation_without_history() {
        let derived = derive_metrics(&sample_at(Utc::now(), 0, 0), &[], Some(250.0));
        assert_eq!(derived.average_processing_time_ms, 250.0);
        assert_eq!(derived.throughput_per_sec, 0.0);
    }
}
