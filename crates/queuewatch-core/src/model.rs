//! Queue health data model
//!
//! Plain serde types describing what the monitor samples, derives, classifies
//! and alerts on. Every type serializes with camelCase keys so the JSON
//! snapshot matches the wire shape consumed by dashboards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum accepted queue name length
pub const MAX_QUEUE_NAME_LEN: usize = 128;

/// Validate a queue name before it is used as a map key, label value and
/// store key component.
pub fn validate_queue_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("queue name cannot be empty".to_string());
    }
    if name.len() > MAX_QUEUE_NAME_LEN {
        return Err(format!(
            "queue name too long: {} characters (max {})",
            name.len(),
            MAX_QUEUE_NAME_LEN
        ));
    }
    if name.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(format!("queue name contains invalid characters: '{}'", name));
    }
    Ok(())
}

/// Health classification of a single queue.
///
/// Ordering is significant: `Critical > Warning > Healthy > Unknown`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// No successful sample yet
    #[default]
    Unknown,
    Healthy,
    Warning,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Critical => "critical",
        }
    }

    /// Numeric encoding used by the `queue_health_status` gauge
    pub fn gauge_value(&self) -> f64 {
        match self {
            HealthStatus::Unknown => 0.0,
            HealthStatus::Healthy => 1.0,
            HealthStatus::Warning => 2.0,
            HealthStatus::Critical => 3.0,
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw counts read from a queue during one tick. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleMetrics {
    pub waiting: u64,
    pub active: u64,
    pub completed: u64,
    pub failed: u64,
    pub delayed: u64,
    pub paused: bool,
    pub timestamp: DateTime<Utc>,
}

impl SampleMetrics {
    /// All-zero sample, used before the first successful fetch
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            waiting: 0,
            active: 0,
            completed: 0,
            failed: 0,
            delayed: 0,
            paused: false,
            timestamp,
        }
    }

    /// Every job the queue currently knows about, in any state
    pub fn total_jobs(&self) -> u64 {
        self.waiting
            .saturating_add(self.active)
            .saturating_add(self.completed)
            .saturating_add(self.failed)
            .saturating_add(self.delayed)
    }
}

/// Rates and latencies computed from a rolling window of samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedMetrics {
    pub processing_rate_per_min: f64,
    pub average_processing_time_ms: f64,
    pub error_rate_pct: f64,
    pub throughput_per_sec: f64,
    pub lag_ms: f64,
}

/// One history row: the raw sample together with what was derived from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMetrics {
    #[serde(flatten)]
    pub sample: SampleMetrics,
    #[serde(flatten)]
    pub derived: DerivedMetrics,
}

impl QueueMetrics {
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            sample: SampleMetrics::empty(timestamp),
            derived: DerivedMetrics::default(),
        }
    }
}

/// Worker pool figures sourced from the worker registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerMetrics {
    pub total: u32,
    pub active: u32,
    pub idle: u32,
    pub utilization_pct: f64,
}

impl WorkerMetrics {
    pub fn from_counts(total: u32, active: u32) -> Self {
        let active = active.min(total);
        let utilization_pct = if total > 0 {
            f64::from(active) / f64::from(total) * 100.0
        } else {
            0.0
        };
        Self {
            total,
            active,
            idle: total - active,
            utilization_pct,
        }
    }
}

/// Current health snapshot of one monitored queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueHealth {
    pub queue_name: String,
    pub status: HealthStatus,
    pub metrics: QueueMetrics,
    pub workers: WorkerMetrics,
    pub last_updated: DateTime<Utc>,
    pub active_alerts: Vec<AlertEvent>,
}

impl QueueHealth {
    /// Initial snapshot for a freshly registered queue
    pub fn unknown(queue_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            queue_name: queue_name.into(),
            status: HealthStatus::Unknown,
            metrics: QueueMetrics::empty(now),
            workers: WorkerMetrics::default(),
            last_updated: now,
            active_alerts: Vec::new(),
        }
    }
}

/// Metric categories alerts are keyed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MetricKey {
    QueueDepth,
    ErrorRate,
    ProcessingTime,
    Lag,
    WorkerUtilization,
}

impl MetricKey {
    pub const ALL: [MetricKey; 5] = [
        MetricKey::QueueDepth,
        MetricKey::ErrorRate,
        MetricKey::ProcessingTime,
        MetricKey::Lag,
        MetricKey::WorkerUtilization,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::QueueDepth => "queueDepth",
            MetricKey::ErrorRate => "errorRate",
            MetricKey::ProcessingTime => "processingTime",
            MetricKey::Lag => "lag",
            MetricKey::WorkerUtilization => "workerUtilization",
        }
    }

    /// Human readable rule name
    pub fn display_name(&self) -> &'static str {
        match self {
            MetricKey::QueueDepth => "Queue depth",
            MetricKey::ErrorRate => "Error rate",
            MetricKey::ProcessingTime => "Processing time",
            MetricKey::Lag => "Queue lag",
            MetricKey::WorkerUtilization => "Worker utilization",
        }
    }

    /// Extract the value this key is evaluated against
    pub fn value_of(&self, metrics: &QueueMetrics, workers: &WorkerMetrics) -> f64 {
        match self {
            MetricKey::QueueDepth => metrics.sample.waiting as f64,
            MetricKey::ErrorRate => metrics.derived.error_rate_pct,
            MetricKey::ProcessingTime => metrics.derived.average_processing_time_ms,
            MetricKey::Lag => metrics.derived.lag_ms,
            MetricKey::WorkerUtilization => workers.utilization_pct,
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alert severity, ordered `Critical > Warning`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Warning => "warning",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Warning/critical bounds for one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
    pub warning: f64,
    pub critical: f64,
}

impl ThresholdPair {
    pub const fn new(warning: f64, critical: f64) -> Self {
        Self { warning, critical }
    }

    /// Highest threshold met by `value`, if any
    pub fn level(&self, value: f64) -> Option<AlertSeverity> {
        if value >= self.critical {
            Some(AlertSeverity::Critical)
        } else if value >= self.warning {
            Some(AlertSeverity::Warning)
        } else {
            None
        }
    }

    pub fn bound(&self, severity: AlertSeverity) -> f64 {
        match severity {
            AlertSeverity::Warning => self.warning,
            AlertSeverity::Critical => self.critical,
        }
    }
}

/// Alerting rule. Only `enabled` changes at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRule {
    pub id: String,
    pub name: String,
    pub metric: MetricKey,
    pub thresholds: ThresholdPair,
    pub enabled: bool,
}

/// A threshold breach for one (queue, metric) key.
///
/// Created on breach, mutated in place on severity changes and resolved
/// exactly once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub id: String,
    pub rule_id: String,
    pub queue_name: String,
    pub metric: MetricKey,
    pub severity: AlertSeverity,
    pub triggered_value: f64,
    pub current_value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
    pub acknowledged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AlertEvent {
    pub fn is_active(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// Body delivered to the external alert sink when an alert triggers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertNotification {
    pub rule_id: String,
    pub rule_name: String,
    pub metric: MetricKey,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
    pub queue_name: String,
    pub severity: AlertSeverity,
}

impl AlertNotification {
    pub fn from_alert(alert: &AlertEvent, rule_name: impl Into<String>) -> Self {
        Self {
            rule_id: alert.rule_id.clone(),
            rule_name: rule_name.into(),
            metric: alert.metric,
            value: alert.triggered_value,
            threshold: alert.threshold,
            timestamp: alert.timestamp,
            queue_name: alert.queue_name.clone(),
            severity: alert.severity,
        }
    }
}

/// Fleet-wide summary, recomputed wholesale after every pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSummary {
    pub total_queues: usize,
    pub total_jobs: u64,
    pub total_workers: u64,
    pub global_throughput: f64,
    pub global_error_rate: f64,
    pub average_queue_depth: f64,
    pub healthy_queues: usize,
    pub unhealthy_queues: usize,
    pub timestamp: DateTime<Utc>,
}

impl GlobalSummary {
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            total_queues: 0,
            total_jobs: 0,
            total_workers: 0,
            global_throughput: 0.0,
            global_error_rate: 0.0,
            average_queue_depth: 0.0,
            healthy_queues: 0,
            unhealthy_queues: 0,
            timestamp,
        }
    }
}

/// Job lifecycle events forwarded from a queue's emitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobEventKind {
    Waiting,
    Active,
    Completed,
    Failed,
    Stalled,
    Progress,
}

impl JobEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobEventKind::Waiting => "waiting",
            JobEventKind::Active => "active",
            JobEventKind::Completed => "completed",
            JobEventKind::Failed => "failed",
            JobEventKind::Stalled => "stalled",
            JobEventKind::Progress => "progress",
        }
    }
}
