//! Alert evaluation
//!
//! One alert may be active per `(queue, metric)` key. A breach opens it at the
//! highest severity met, severity changes update it in place, and it resolves
//! only once the value drops below the *warning* bound.

use chrono::{DateTime, Utc};
use queuewatch_core::{
    AlertEvent, AlertNotification, AlertRule, AlertSeverity, AlertSink, MetricKey, QueueMetrics,
    WorkerMetrics,
};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Active and resolved alerts of one queue
#[derive(Debug, Clone)]
pub struct AlertLog {
    active: BTreeMap<MetricKey, AlertEvent>,
    resolved: VecDeque<AlertEvent>,
    limit: usize,
}

impl AlertLog {
    pub fn new(limit: usize) -> Self {
        Self {
            active: BTreeMap::new(),
            resolved: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn active(&self) -> Vec<AlertEvent> {
        self.active.values().cloned().collect()
    }

    pub fn active_for(&self, metric: MetricKey) -> Option<&AlertEvent> {
        self.active.get(&metric)
    }

    /// Resolved alerts, most recently resolved first
    pub fn resolved(&self) -> Vec<AlertEvent> {
        self.resolved.iter().cloned().collect()
    }

    /// Mark an alert acknowledged; repeat calls still return `true`
    pub fn acknowledge(&mut self, alert_id: &str) -> bool {
        let found = self
            .active
            .values_mut()
            .chain(self.resolved.iter_mut())
            .find(|a| a.id == alert_id);
        match found {
            Some(alert) => {
                alert.acknowledged = true;
                true
            }
            None => false,
        }
    }

    fn record_resolved(&mut self, alert: AlertEvent) {
        self.resolved.push_front(alert);
        self.resolved.truncate(self.limit);
    }

    /// Drop resolved alerts that resolved before `cutoff`
    pub fn sweep(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.resolved.len();
        self.resolved
            .retain(|a| a.resolved_at.unwrap_or(a.timestamp) >= cutoff);
        before - self.resolved.len()
    }

    pub fn clear(&mut self) {
        self.active.clear();
        self.resolved.clear();
    }
}

/// Lifecycle change produced by one evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum AlertTransition {
    Triggered(AlertEvent),
    Updated {
        alert: AlertEvent,
        previous: AlertSeverity,
    },
    Resolved(AlertEvent),
}

/// Evaluates alert rules and forwards triggered alerts to the sink
pub struct AlertEngine {
    rules: RwLock<Vec<AlertRule>>,
    sink: Option<Arc<dyn AlertSink>>,
    sink_timeout: Duration,
    tracker: TaskTracker,
}

impl AlertEngine {
    pub fn new(
        rules: Vec<AlertRule>,
        sink: Option<Arc<dyn AlertSink>>,
        sink_timeout: Duration,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            rules: RwLock::new(rules),
            sink,
            sink_timeout,
            tracker,
        }
    }

    pub fn rules(&self) -> Vec<AlertRule> {
        self.rules
            .read()
            .map(|rules| rules.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Enable or disable a rule; returns `false` for an unknown id
    pub fn set_rule_enabled(&self, rule_id: &str, enabled: bool) -> bool {
        let mut rules = self.rules.write().unwrap_or_else(|e| e.into_inner());
        match rules.iter_mut().find(|r| r.id == rule_id) {
            Some(rule) => {
                rule.enabled = enabled;
                info!(rule_id = %rule_id, enabled, "Alert rule toggled");
                true
            }
            None => false,
        }
    }

    /// Evaluate every rule against one queue's fresh metrics
    pub fn evaluate(
        &self,
        log: &mut AlertLog,
        queue: &str,
        metrics: &QueueMetrics,
        workers: &WorkerMetrics,
        now: DateTime<Utc>,
    ) -> Vec<AlertTransition> {
        let mut transitions = Vec::new();

        for rule in self.rules() {
            let value = rule.metric.value_of(metrics, workers);
            let level = if rule.enabled {
                rule.thresholds.level(value)
            } else {
                None
            };

            match (log.active.remove(&rule.metric), level) {
                (None, Some(severity)) => {
                    let alert = AlertEvent {
                        id: uuid::Uuid::new_v4().to_string(),
                        rule_id: rule.id.clone(),
                        queue_name: queue.to_string(),
                        metric: rule.metric,
                        severity,
                        triggered_value: value,
                        current_value: value,
                        threshold: rule.thresholds.bound(severity),
                        timestamp: now,
                        acknowledged: false,
                        resolved_at: None,
                    };
                    log.active.insert(rule.metric, alert.clone());
                    transitions.push(AlertTransition::Triggered(alert));
                }
                (Some(mut alert), Some(severity)) => {
                    alert.current_value = value;
                    if alert.severity != severity {
                        let previous = alert.severity;
                        alert.severity = severity;
                        alert.threshold = rule.thresholds.bound(severity);
                        alert.triggered_value = value;
                        transitions.push(AlertTransition::Updated {
                            alert: alert.clone(),
                            previous,
                        });
                    }
                    log.active.insert(rule.metric, alert);
                }
                (Some(mut alert), None) => {
                    alert.current_value = value;
                    alert.resolved_at = Some(now);
                    log.record_resolved(alert.clone());
                    transitions.push(AlertTransition::Resolved(alert));
                }
                (None, None) => {}
            }
        }

        transitions
    }

    /// Forward newly triggered alerts to the sink without waiting for delivery
    pub fn notify(&self, transitions: &[AlertTransition]) {
        let Some(sink) = &self.sink else {
            return;
        };
        let rules = self.rules();

        for transition in transitions {
            let AlertTransition::Triggered(alert) = transition else {
                continue;
            };
            let rule_name = rules
                .iter()
                .find(|r| r.id == alert.rule_id)
                .map(|r| r.name.clone())
                .unwrap_or_else(|| alert.metric.display_name().to_string());
            let notification = AlertNotification::from_alert(alert, rule_name);
            let sink = sink.clone();
            let timeout = self.sink_timeout;

            self.tracker.spawn(async move {
                match tokio::time::timeout(timeout, sink.deliver(&notification)).await {
                    Ok(Ok(())) => debug!(
                        queue = %notification.queue_name,
                        rule_id = %notification.rule_id,
                        "Alert notification delivered"
                    ),
                    Ok(Err(e)) => warn!(
                        queue = %notification.queue_name,
                        rule_id = %notification.rule_id,
                        error = %e,
                        "Alert notification failed"
                    ),
                    Err(_) => warn!(
                        queue = %notification.queue_name,
                        rule_id = %notification.rule_id,
                        timeout_ms = timeout.as_millis() as u64,
                        "Alert notification timed out"
                    ),
                }
            });
        }
    }
}
