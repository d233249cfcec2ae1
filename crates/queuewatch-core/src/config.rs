//! # Monitor Configuration
//!
//! `MonitorConfig` can be built in code, parsed from TOML, and overridden from
//! the environment. Every value has a default; `validate()` must pass before a
//! monitor is constructed so that bad thresholds fail fast.
//!
//! ## Environment Variables
//!
//! - `QUEUEWATCH_METRICS_INTERVAL_MS` - Sampling interval (default: 30000)
//! - `QUEUEWATCH_ALERTING_ENABLED` - Enable alert evaluation (default: true)
//! - `QUEUEWATCH_FETCH_TIMEOUT_MS` - Timeout for every external call (default: 5000)
//! - `QUEUEWATCH_METRICS_RETENTION_DAYS` - History retention (default: 7)
//! - `QUEUEWATCH_ALERTS_RETENTION_DAYS` - Resolved alert retention (default: 30)
//! - `QUEUEWATCH_WEBHOOK_URL` - Alert webhook endpoint (default: unset)
//! - `QUEUEWATCH_NAMESPACE` - Metrics namespace and store key prefix (default: "queuewatch")

use crate::error::ConfigError;
use crate::model::{AlertRule, MetricKey, ThresholdPair};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Per-metric warning/critical thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Waiting jobs
    pub queue_depth: ThresholdPair,
    /// Percent of finished jobs that failed
    pub error_rate: ThresholdPair,
    /// Smoothed average processing time in ms
    pub processing_time: ThresholdPair,
    /// Estimated wait for a new job in ms
    pub lag: ThresholdPair,
    /// Percent of workers busy
    pub worker_utilization: ThresholdPair,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            queue_depth: ThresholdPair::new(1000.0, 5000.0),
            error_rate: ThresholdPair::new(5.0, 10.0),
            processing_time: ThresholdPair::new(30_000.0, 60_000.0),
            lag: ThresholdPair::new(60_000.0, 300_000.0),
            worker_utilization: ThresholdPair::new(80.0, 95.0),
        }
    }
}

impl Thresholds {
    pub fn for_metric(&self, metric: MetricKey) -> ThresholdPair {
        match metric {
            MetricKey::QueueDepth => self.queue_depth,
            MetricKey::ErrorRate => self.error_rate,
            MetricKey::ProcessingTime => self.processing_time,
            MetricKey::Lag => self.lag,
            MetricKey::WorkerUtilization => self.worker_utilization,
        }
    }

    /// One enabled rule per metric key
    pub fn default_rules(&self) -> Vec<AlertRule> {
        MetricKey::ALL
            .iter()
            .map(|metric| AlertRule {
                id: rule_id(*metric).to_string(),
                name: metric.display_name().to_string(),
                metric: *metric,
                thresholds: self.for_metric(*metric),
                enabled: true,
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for metric in MetricKey::ALL {
            let pair = self.for_metric(metric);
            let name = metric.as_str();

            if !pair.warning.is_finite() || !pair.critical.is_finite() {
                return Err(ConfigError::InvalidThreshold {
                    metric: name,
                    message: "thresholds must be finite numbers".to_string(),
                });
            }
            if pair.warning < 0.0 || pair.critical < 0.0 {
                return Err(ConfigError::InvalidThreshold {
                    metric: name,
                    message: "thresholds cannot be negative".to_string(),
                });
            }
            if pair.warning > pair.critical {
                return Err(ConfigError::InvalidThreshold {
                    metric: name,
                    message: format!(
                        "warning ({}) must not exceed critical ({})",
                        pair.warning, pair.critical
                    ),
                });
            }
            if matches!(metric, MetricKey::ErrorRate | MetricKey::WorkerUtilization)
                && pair.critical > 100.0
            {
                return Err(ConfigError::InvalidThreshold {
                    metric: name,
                    message: format!("percentage threshold {} exceeds 100", pair.critical),
                });
            }
        }
        Ok(())
    }
}

fn rule_id(metric: MetricKey) -> &'static str {
    match metric {
        MetricKey::QueueDepth => "queue-depth",
        MetricKey::ErrorRate => "error-rate",
        MetricKey::ProcessingTime => "processing-time",
        MetricKey::Lag => "lag",
        MetricKey::WorkerUtilization => "worker-utilization",
    }
}

/// Retention windows for persisted history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub metrics_days: u32,
    pub alerts_days: u32,
    pub sweep_interval_ms: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            metrics_days: 7,
            alerts_days: 30,
            sweep_interval_ms: 60 * 60 * 1000,
        }
    }
}

impl RetentionConfig {
    pub fn metrics_retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.metrics_days))
    }

    pub fn alerts_retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.alerts_days))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Alert webhook settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout_ms: default_timeout_ms(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_timeout_ms() -> u64 {
    5_000
}

/// Complete monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub metrics_interval_ms: u64,
    pub alerting_enabled: bool,
    pub thresholds: Thresholds,
    pub retention: RetentionConfig,
    /// Samples kept per queue
    pub history_limit: usize,
    /// Samples used to derive rates
    pub history_window: usize,
    /// Resolved alerts kept per queue
    pub alert_history_limit: usize,
    pub fetch_timeout_ms: u64,
    pub summary_ttl_secs: u64,
    pub instance_id: String,
    pub namespace: String,
    pub webhook: Option<WebhookConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            metrics_interval_ms: 30_000,
            alerting_enabled: true,
            thresholds: Thresholds::default(),
            retention: RetentionConfig::default(),
            history_limit: 1000,
            history_window: 10,
            alert_history_limit: 500,
            fetch_timeout_ms: default_timeout_ms(),
            summary_ttl_secs: 60,
            instance_id: uuid::Uuid::new_v4().simple().to_string(),
            namespace: "queuewatch".to_string(),
            webhook: None,
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string; missing keys take defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `QUEUEWATCH_*` environment overrides on top of this config
    pub fn apply_env_overrides(mut self) -> Result<Self, ConfigError> {
        if let Some(ms) = get_env_u64("QUEUEWATCH_METRICS_INTERVAL_MS")? {
            self.metrics_interval_ms = ms;
        }
        if let Some(enabled) = get_env_bool("QUEUEWATCH_ALERTING_ENABLED")? {
            self.alerting_enabled = enabled;
        }
        if let Some(ms) = get_env_u64("QUEUEWATCH_FETCH_TIMEOUT_MS")? {
            self.fetch_timeout_ms = ms;
        }
        if let Some(days) = get_env_u32("QUEUEWATCH_METRICS_RETENTION_DAYS")? {
            self.retention.metrics_days = days;
        }
        if let Some(days) = get_env_u32("QUEUEWATCH_ALERTS_RETENTION_DAYS")? {
            self.retention.alerts_days = days;
        }
        if let Some(url) = get_env_string("QUEUEWATCH_WEBHOOK_URL") {
            let timeout_ms = self
                .webhook
                .as_ref()
                .map(|w| w.timeout_ms)
                .unwrap_or_else(default_timeout_ms);
            self.webhook = Some(WebhookConfig { url, timeout_ms });
        }
        if let Some(namespace) = get_env_string("QUEUEWATCH_NAMESPACE") {
            self.namespace = namespace;
        }
        Ok(self)
    }

    pub fn metrics_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_interval_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn summary_ttl(&self) -> Duration {
        Duration::from_secs(self.summary_ttl_secs)
    }

    /// Validate every field; called by the monitor constructor
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;

        if self.metrics_interval_ms == 0 {
            return Err(invalid("metrics_interval_ms", "must be greater than zero"));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(invalid("fetch_timeout_ms", "must be greater than zero"));
        }
        if self.retention.metrics_days == 0 {
            return Err(invalid("retention.metrics_days", "must be at least 1"));
        }
        if self.retention.alerts_days == 0 {
            return Err(invalid("retention.alerts_days", "must be at least 1"));
        }
        if self.retention.sweep_interval_ms == 0 {
            return Err(invalid(
                "retention.sweep_interval_ms",
                "must be greater than zero",
            ));
        }
        if self.history_window == 0 {
            return Err(invalid("history_window", "must be at least 1"));
        }
        if self.history_limit < self.history_window {
            return Err(invalid(
                "history_limit",
                "must be at least as large as history_window",
            ));
        }
        if self.alert_history_limit == 0 {
            return Err(invalid("alert_history_limit", "must be at least 1"));
        }
        if self.instance_id.trim().is_empty() {
            return Err(invalid("instance_id", "cannot be empty"));
        }
        if !is_valid_namespace(&self.namespace) {
            return Err(invalid(
                "namespace",
                "must match [a-zA-Z_][a-zA-Z0-9_]* and not be empty",
            ));
        }
        if let Some(webhook) = &self.webhook {
            let parsed = url::Url::parse(&webhook.url)
                .map_err(|e| invalid("webhook.url", &format!("'{}': {}", webhook.url, e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(invalid("webhook.url", "scheme must be http or https"));
            }
            if webhook.timeout_ms == 0 {
                return Err(invalid("webhook.timeout_ms", "must be greater than zero"));
            }
        }
        Ok(())
    }
}

fn invalid(field: &'static str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        message: message.to_string(),
    }
}

fn is_valid_namespace(namespace: &str) -> bool {
    let mut chars = namespace.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn get_env_string(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn get_env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match env::var(key) {
        Ok(val) => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!(
                    "invalid boolean value '{val}', expected true/false/1/0/yes/no/on/off"
                ),
            }),
        },
        Err(_) => Ok(None),
    }
}

fn get_env_u64(key: &str) -> Result<Option<u64>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid u64 value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}

fn get_env_u32(key: &str) -> Result<Option<u32>, ConfigError> {
    match env::var(key) {
        Ok(val) => val
            .parse::<u32>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid u32 value '{val}': {e}"),
            }),
        Err(_) => Ok(None),
    }
}
