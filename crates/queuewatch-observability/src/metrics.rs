//! Monitor metrics
//!
//! Every monitor owns its own [`MetricsRegistry`], so several monitors can
//! live in one process without clobbering each other's series.

use crate::COLLECTION_BUCKETS;
use chrono::Utc;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramOpts, Opts, Registry,
    TextEncoder,
};
use queuewatch_core::{AlertSeverity, GlobalSummary, JobEventKind, MetricKey, QueueHealth};
use std::time::Duration;
use thiserror::Error;

const JOB_STATES: [&str; 5] = ["waiting", "active", "completed", "failed", "delayed"];
const WORKER_STATES: [&str; 3] = ["total", "active", "idle"];
const JOB_EVENTS: [JobEventKind; 6] = [
    JobEventKind::Waiting,
    JobEventKind::Active,
    JobEventKind::Completed,
    JobEventKind::Failed,
    JobEventKind::Stalled,
    JobEventKind::Progress,
];
const SEVERITIES: [AlertSeverity; 2] = [AlertSeverity::Warning, AlertSeverity::Critical];

/// Which collaborator a failed fetch was aimed at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
    Queue,
    Workers,
}

impl FetchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchSource::Queue => "queue",
            FetchSource::Workers => "workers",
        }
    }
}

/// Per-queue and fleet-wide series
#[derive(Debug, Clone)]
pub struct MonitorMetrics {
    // Per-queue gauges, cardinality: queues x labels
    pub queue_jobs: GaugeVec,
    pub queue_paused: GaugeVec,
    pub queue_processing_rate_per_min: GaugeVec,
    pub queue_avg_processing_time_ms: GaugeVec,
    pub queue_error_rate_pct: GaugeVec,
    pub queue_throughput_per_sec: GaugeVec,
    pub queue_lag_ms: GaugeVec,
    pub queue_workers: GaugeVec,
    pub queue_worker_utilization_pct: GaugeVec,
    pub queue_health_status: GaugeVec,
    pub queue_active_alerts: GaugeVec,

    // Counters
    pub job_events_total: CounterVec,
    pub alerts_triggered_total: CounterVec,
    pub alerts_resolved_total: CounterVec,
    pub fetch_errors_total: CounterVec,
    pub collection_errors_total: Counter,

    pub collection_duration_seconds: Histogram,

    // Fleet summary, cardinality: 1 each
    pub global_queues: Gauge,
    pub global_jobs: Gauge,
    pub global_workers: Gauge,
    pub global_throughput_per_sec: Gauge,
    pub global_error_rate_pct: Gauge,
    pub global_avg_queue_depth: Gauge,
    pub global_healthy_queues: Gauge,
    pub global_unhealthy_queues: Gauge,
}

fn queue_gauge(registry: &Registry, name: &str, help: &str) -> Result<GaugeVec, MetricsError> {
    labelled_gauge(registry, name, help, &["queue"])
}

fn labelled_gauge(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<GaugeVec, MetricsError> {
    let gauge = GaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

fn counter_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<CounterVec, MetricsError> {
    let counter = CounterVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn gauge(registry: &Registry, name: &str, help: &str) -> Result<Gauge, MetricsError> {
    let gauge = Gauge::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

impl MonitorMetrics {
    fn register(registry: &Registry) -> Result<Self, MetricsError> {
        let collection_errors_total = Counter::with_opts(Opts::new(
            "collection_errors_total",
            "Sampling passes that failed outright",
        ))?;
        registry.register(Box::new(collection_errors_total.clone()))?;

        let collection_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "collection_duration_seconds",
                "Duration of a full sampling pass in seconds",
            )
            .buckets(COLLECTION_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(collection_duration_seconds.clone()))?;

        Ok(Self {
            queue_jobs: labelled_gauge(
                registry,
                "queue_jobs",
                "Jobs per queue by state",
                &["queue", "state"],
            )?,
            queue_paused: queue_gauge(registry, "queue_paused", "1 when the queue is paused")?,
            queue_processing_rate_per_min: queue_gauge(
                registry,
                "queue_processing_rate_per_min",
                "Jobs completed per minute over the sampling window",
            )?,
            queue_avg_processing_time_ms: queue_gauge(
                registry,
                "queue_avg_processing_time_ms",
                "Smoothed average job processing time in milliseconds",
            )?,
            queue_error_rate_pct: queue_gauge(
                registry,
                "queue_error_rate_pct",
                "Failed jobs as a percentage of finished jobs in the window",
            )?,
            queue_throughput_per_sec: queue_gauge(
                registry,
                "queue_throughput_per_sec",
                "Jobs completed per second over the sampling window",
            )?,
            queue_lag_ms: queue_gauge(
                registry,
                "queue_lag_ms",
                "Estimated wait for a newly enqueued job in milliseconds",
            )?,
            queue_workers: labelled_gauge(
                registry,
                "queue_workers",
                "Workers per queue by state",
                &["queue", "state"],
            )?,
            queue_worker_utilization_pct: queue_gauge(
                registry,
                "queue_worker_utilization_pct",
                "Percentage of workers currently busy",
            )?,
            queue_health_status: queue_gauge(
                registry,
                "queue_health_status",
                "Queue health: 0 unknown, 1 healthy, 2 warning, 3 critical",
            )?,
            queue_active_alerts: queue_gauge(
                registry,
                "queue_active_alerts",
                "Currently active alerts per queue",
            )?,
            job_events_total: counter_vec(
                registry,
                "job_events_total",
                "Job lifecycle events observed per queue",
                &["queue", "event"],
            )?,
            alerts_triggered_total: counter_vec(
                registry,
                "alerts_triggered_total",
                "Alerts triggered by queue, metric and severity",
                &["queue", "metric", "severity"],
            )?,
            alerts_resolved_total: counter_vec(
                registry,
                "alerts_resolved_total",
                "Alerts resolved by queue and metric",
                &["queue", "metric"],
            )?,
            fetch_errors_total: counter_vec(
                registry,
                "fetch_errors_total",
                "Failed collaborator fetches by queue and source",
                &["queue", "source"],
            )?,
            collection_errors_total,
            collection_duration_seconds,
            global_queues: gauge(registry, "global_queues", "Monitored queues")?,
            global_jobs: gauge(registry, "global_jobs", "Jobs across all queues")?,
            global_workers: gauge(registry, "global_workers", "Workers across all queues")?,
            global_throughput_per_sec: gauge(
                registry,
                "global_throughput_per_sec",
                "Summed throughput across all queues",
            )?,
            global_error_rate_pct: gauge(
                registry,
                "global_error_rate_pct",
                "Mean error rate across all queues",
            )?,
            global_avg_queue_depth: gauge(
                registry,
                "global_avg_queue_depth",
                "Mean waiting jobs per queue",
            )?,
            global_healthy_queues: gauge(
                registry,
                "global_healthy_queues",
                "Queues currently healthy",
            )?,
            global_unhealthy_queues: gauge(
                registry,
                "global_unhealthy_queues",
                "Queues currently not healthy",
            )?,
        })
    }
}

/// Owned Prometheus registry holding one monitor's series
#[derive(Debug)]
pub struct MetricsRegistry {
    metrics: MonitorMetrics,
    prometheus_registry: Registry,
}

impl MetricsRegistry {
    /// Create a registry whose series are prefixed with `namespace_`
    pub fn new(namespace: &str) -> Result<Self, MetricsError> {
        let prometheus_registry = Registry::new_custom(Some(namespace.to_string()), None)?;
        let metrics = MonitorMetrics::register(&prometheus_registry)?;
        Ok(Self {
            metrics,
            prometheus_registry,
        })
    }

    pub fn metrics(&self) -> &MonitorMetrics {
        &self.metrics
    }

    /// Get Prometheus registry for metrics export
    pub fn prometheus_registry(&self) -> &Registry {
        &self.prometheus_registry
    }

    /// Mirror a committed health snapshot into the per-queue gauges
    pub fn record_queue(&self, health: &QueueHealth) {
        let m = &self.metrics;
        let q = health.queue_name.as_str();
        let sample = &health.metrics.sample;
        let derived = &health.metrics.derived;

        let counts = [
            sample.waiting,
            sample.active,
            sample.completed,
            sample.failed,
            sample.delayed,
        ];
        for (state, count) in JOB_STATES.into_iter().zip(counts) {
            m.queue_jobs.with_label_values(&[q, state]).set(count as f64);
        }
        m.queue_paused
            .with_label_values(&[q])
            .set(if sample.paused { 1.0 } else { 0.0 });

        m.queue_processing_rate_per_min
            .with_label_values(&[q])
            .set(derived.processing_rate_per_min);
        m.queue_avg_processing_time_ms
            .with_label_values(&[q])
            .set(derived.average_processing_time_ms);
        m.queue_error_rate_pct
            .with_label_values(&[q])
            .set(derived.error_rate_pct);
        m.queue_throughput_per_sec
            .with_label_values(&[q])
            .set(derived.throughput_per_sec);
        m.queue_lag_ms.with_label_values(&[q]).set(derived.lag_ms);

        let workers = &health.workers;
        let worker_counts = [workers.total, workers.active, workers.idle];
        for (state, count) in WORKER_STATES.into_iter().zip(worker_counts) {
            m.queue_workers
                .with_label_values(&[q, state])
                .set(f64::from(count));
        }
        m.queue_worker_utilization_pct
            .with_label_values(&[q])
            .set(workers.utilization_pct);

        m.queue_health_status
            .with_label_values(&[q])
            .set(health.status.gauge_value());
        m.queue_active_alerts
            .with_label_values(&[q])
            .set(health.active_alerts.len() as f64);
    }

    pub fn record_job_event(&self, queue: &str, event: JobEventKind) {
        self.metrics
            .job_events_total
            .with_label_values(&[queue, event.as_str()])
            .inc();
    }

    pub fn record_alert_triggered(&self, queue: &str, metric: MetricKey, severity: AlertSeverity) {
        self.metrics
            .alerts_triggered_total
            .with_label_values(&[queue, metric.as_str(), severity.as_str()])
            .inc();
    }

    pub fn record_alert_resolved(&self, queue: &str, metric: MetricKey) {
        self.metrics
            .alerts_resolved_total
            .with_label_values(&[queue, metric.as_str()])
            .inc();
    }

    pub fn record_fetch_error(&self, queue: &str, source: FetchSource) {
        self.metrics
            .fetch_errors_total
            .with_label_values(&[queue, source.as_str()])
            .inc();
    }

    pub fn record_collection_error(&self) {
        self.metrics.collection_errors_total.inc();
    }

    pub fn observe_collection_duration(&self, duration: Duration) {
        self.metrics
            .collection_duration_seconds
            .observe(duration.as_secs_f64());
    }

    pub fn record_global(&self, summary: &GlobalSummary) {
        let m = &self.metrics;
        m.global_queues.set(summary.total_queues as f64);
        m.global_jobs.set(summary.total_jobs as f64);
        m.global_workers.set(summary.total_workers as f64);
        m.global_throughput_per_sec.set(summary.global_throughput);
        m.global_error_rate_pct.set(summary.global_error_rate);
        m.global_avg_queue_depth.set(summary.average_queue_depth);
        m.global_healthy_queues.set(summary.healthy_queues as f64);
        m.global_unhealthy_queues.set(summary.unhealthy_queues as f64);
    }

    /// Drop every series labelled with `queue`
    pub fn remove_queue(&self, queue: &str) {
        let m = &self.metrics;
        for state in JOB_STATES {
            let _ = m.queue_jobs.remove_label_values(&[queue, state]);
        }
        for state in WORKER_STATES {
            let _ = m.queue_workers.remove_label_values(&[queue, state]);
        }
        for series in [
            &m.queue_paused,
            &m.queue_processing_rate_per_min,
            &m.queue_avg_processing_time_ms,
            &m.queue_error_rate_pct,
            &m.queue_throughput_per_sec,
            &m.queue_lag_ms,
            &m.queue_worker_utilization_pct,
            &m.queue_health_status,
            &m.queue_active_alerts,
        ] {
            let _ = series.remove_label_values(&[queue]);
        }
        for event in JOB_EVENTS {
            let _ = m
                .job_events_total
                .remove_label_values(&[queue, event.as_str()]);
        }
        for metric in MetricKey::ALL {
            for severity in SEVERITIES {
                let _ = m.alerts_triggered_total.remove_label_values(&[
                    queue,
                    metric.as_str(),
                    severity.as_str(),
                ]);
            }
            let _ = m
                .alerts_resolved_total
                .remove_label_values(&[queue, metric.as_str()]);
        }
        for source in [FetchSource::Queue, FetchSource::Workers] {
            let _ = m
                .fetch_errors_total
                .remove_label_values(&[queue, source.as_str()]);
        }
    }

    /// Plaintext exposition with a millisecond timestamp on every sample line
    pub fn render_text(&self) -> Result<String, MetricsError> {
        let families = self.prometheus_registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        let body = String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))?;

        let timestamp = Utc::now().timestamp_millis();
        let mut output = String::with_capacity(body.len() + body.lines().count() * 15);
        for line in body.lines() {
            output.push_str(line);
            if !line.is_empty() && !line.starts_with('#') {
                output.push(' ');
                output.push_str(&timestamp.to_string());
            }
            output.push('\n');
        }
        Ok(output)
    }
}

/// Metrics system errors
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("Metrics encoding error: {0}")]
    Encoding(String),
}
