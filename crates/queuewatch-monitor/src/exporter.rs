//! Metrics exposition
//!
//! The exporter mirrors committed state into the monitor's Prometheus
//! registry and renders both pull formats: plaintext exposition and a JSON
//! snapshot. Rendering only reads; series are written from sampling passes
//! and queue lifecycle calls.

use crate::aggregator::GlobalAggregator;
use crate::alerts::{AlertEngine, AlertTransition};
use crate::registry::QueueRegistry;
use queuewatch_core::{AlertEvent, AlertRule, GlobalSummary, QueueHealth};
use queuewatch_observability::{MetricsError, MetricsRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Structured snapshot returned by [`MetricsExporter::render_json`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub queues: Vec<QueueHealth>,
    pub summary: GlobalSummary,
    pub rules: Vec<AlertRule>,
    pub active_alerts: Vec<AlertEvent>,
}

pub struct MetricsExporter {
    metrics: Arc<MetricsRegistry>,
    queues: Arc<QueueRegistry>,
    aggregator: Arc<GlobalAggregator>,
    alerts: Arc<AlertEngine>,
}

impl MetricsExporter {
    pub fn new(
        metrics: Arc<MetricsRegistry>,
        queues: Arc<QueueRegistry>,
        aggregator: Arc<GlobalAggregator>,
        alerts: Arc<AlertEngine>,
    ) -> Self {
        Self {
            metrics,
            queues,
            aggregator,
            alerts,
        }
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    /// Mirror one committed queue update
    pub fn record_commit(&self, health: &QueueHealth, transitions: &[AlertTransition]) {
        self.metrics.record_queue(health);
        for transition in transitions {
            match transition {
                AlertTransition::Triggered(alert) => {
                    self.metrics
                        .record_alert_triggered(&alert.queue_name, alert.metric, alert.severity)
                }
                // Escalation counts as a new trigger at the new severity
                AlertTransition::Updated { alert, .. } => {
                    self.metrics
                        .record_alert_triggered(&alert.queue_name, alert.metric, alert.severity)
                }
                AlertTransition::Resolved(alert) => self
                    .metrics
                    .record_alert_resolved(&alert.queue_name, alert.metric),
            }
        }
    }

    /// Plaintext exposition
    pub fn render_text(&self) -> Result<String, MetricsError> {
        self.metrics.render_text()
    }

    /// Health of every queue, the latest summary, rules and active alerts
    pub async fn snapshot(&self) -> MetricsSnapshot {
        let queues = self.queues.all_health().await;
        let active_alerts = queues
            .iter()
            .flat_map(|h| h.active_alerts.iter().cloned())
            .collect();
        MetricsSnapshot {
            queues,
            summary: self.aggregator.latest(),
            rules: self.alerts.rules(),
            active_alerts,
        }
    }

    /// JSON rendering of [`snapshot`](Self::snapshot)
    pub async fn render_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use queuewatch_core::{
        AlertSeverity, HealthStatus, MetricKey, MetricsStore, Thresholds,
    };
    use queuewatch_store::InMemoryStore;
    use std::time::Duration;
    use tokio_util::task::TaskTracker;

    fn exporter() -> MetricsExporter {
        let store: Arc<dyn MetricsStore> = Arc::new(InMemoryStore::new());
        MetricsExporter::new(
            Arc::new(MetricsRegistry::new("qw").unwrap()),
            Arc::new(QueueRegistry::new()),
            Arc::new(GlobalAggregator::new(
                store,
                "qw",
                "test",
                Duration::from_secs(60),
                Duration::from_secs(1),
            )),
            Arc::new(AlertEngine::new(
                Thresholds::default().default_rules(),
                None,
                Duration::from_secs(1),
                TaskTracker::new(),
            )),
        )
    }

    fn alert(queue: &str) -> AlertEvent {
        AlertEvent {
            id: "a1".to_string(),
            rule_id: "queue-depth".to_string(),
            queue_name: queue.to_string(),
            metric: MetricKey::QueueDepth,
            severity: AlertSeverity::Critical,
            triggered_value: 6000.0,
            current_value: 6000.0,
            threshold: 5000.0,
            timestamp: Utc::now(),
            acknowledged: false,
            resolved_at: None,
        }
    }

    #[test]
    fn test_commit_is_rendered() {
        let exporter = exporter();
        let mut health = QueueHealth::unknown("orders", Utc::now());
        health.status = HealthStatus::Critical;
        health.metrics.sample.waiting = 6000;

        exporter.record_commit(&health, &[AlertTransition::Triggered(alert("orders"))]);
        let text = exporter.render_text().unwrap();

        assert!(text.contains("qw_queue_jobs{queue=\"orders\",state=\"waiting\"} 6000 "));
        assert!(text.contains("qw_queue_health_status{queue=\"orders\"} 3 "));
        let triggered = text
            .lines()
            .find(|l| l.starts_with("qw_alerts_triggered_total{"))
            .unwrap();
        assert!(triggered.contains("severity=\"critical\""));
        assert!(triggered.contains("} 1 "));
    }

    #[tokio::test]
    async fn test_snapshot_without_queues() {
        let exporter = exporter();
        let snapshot = exporter.snapshot().await;
        assert!(snapshot.queues.is_empty());
        assert!(snapshot.active_alerts.is_empty());
        assert_eq!(snapshot.rules.len(), 5);
        assert_eq!(snapshot.summary.total_queues, 0);

        let json = exporter.render_json().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value.get("activeAlerts").is_some());
        assert!(value.get("summary").is_some());
    }
}
