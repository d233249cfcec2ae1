//! Sample history
//!
//! [`HistoryLog`] is the authoritative, in-memory, per-queue log that derived
//! metrics are computed from. [`HistoryStore`] mirrors samples and resolved
//! alerts into the persistent store under `{namespace}:metrics:{queue}` and
//! `{namespace}:alerts:{queue}`. Store failures are logged and never surface
//! to the sampler.

use chrono::{DateTime, Utc};
use queuewatch_core::{AlertEvent, MetricsStore, QueueMetrics, StoreError, StoreResult};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Bounded, most-recent-first log of samples for one queue
#[derive(Debug, Clone)]
pub struct HistoryLog {
    samples: VecDeque<QueueMetrics>,
    limit: usize,
}

impl HistoryLog {
    pub fn new(limit: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    /// Prepend a sample, evicting the oldest beyond the limit
    pub fn append(&mut self, metrics: QueueMetrics) {
        self.samples.push_front(metrics);
        self.samples.truncate(self.limit);
    }

    /// Up to `n` most recent samples, newest first
    pub fn recent(&self, n: usize) -> Vec<QueueMetrics> {
        self.samples.iter().take(n).cloned().collect()
    }

    pub fn latest(&self) -> Option<&QueueMetrics> {
        self.samples.front()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drop samples older than `cutoff`, returning how many were removed
    pub fn sweep(&mut self, cutoff: DateTime<Utc>) -> usize {
        let keep = self
            .samples
            .iter()
            .take_while(|m| m.sample.timestamp >= cutoff)
            .count();
        let removed = self.samples.len() - keep;
        self.samples.truncate(keep);
        removed
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

/// What a persisted retention sweep removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PersistedSweep {
    pub samples_removed: usize,
    pub alerts_removed: usize,
}

/// Persistent mirror of per-queue history and resolved alerts
pub struct HistoryStore {
    store: Arc<dyn MetricsStore>,
    namespace: String,
    history_limit: usize,
    alert_limit: usize,
    timeout: Duration,
}

impl HistoryStore {
    pub fn new(
        store: Arc<dyn MetricsStore>,
        namespace: impl Into<String>,
        history_limit: usize,
        alert_limit: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            history_limit,
            alert_limit,
            timeout,
        }
    }

    pub fn metrics_key(&self, queue: &str) -> String {
        format!("{}:metrics:{}", self.namespace, queue)
    }

    pub fn alerts_key(&self, queue: &str) -> String {
        format!("{}:alerts:{}", self.namespace, queue)
    }

    async fn bounded<T>(&self, fut: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }

    /// Persist a committed sample; failures are logged
    pub async fn append(&self, queue: &str, metrics: &QueueMetrics) {
        let result = async {
            let json = serde_json::to_string(metrics)?;
            self.bounded(
                self.store
                    .push_front(&self.metrics_key(queue), json, self.history_limit),
            )
            .await
        }
        .await;
        if let Err(e) = result {
            warn!(queue = %queue, error = %e, "Failed to persist metrics sample");
        }
    }

    /// Persist a resolved alert; failures are logged
    pub async fn append_alert(&self, queue: &str, alert: &AlertEvent) {
        let result = async {
            let json = serde_json::to_string(alert)?;
            self.bounded(
                self.store
                    .push_front(&self.alerts_key(queue), json, self.alert_limit),
            )
            .await
        }
        .await;
        if let Err(e) = result {
            warn!(
                queue = %queue,
                alert_id = %alert.id,
                error = %e,
                "Failed to persist resolved alert"
            );
        }
    }

    /// Up to `n` most recent persisted samples; empty on any failure
    #[cfg(test)]
    pub(crate) async fn recent_samples(&self, queue: &str, n: usize) -> Vec<QueueMetrics> {
        if n == 0 {
            return Vec::new();
        }
        let key = self.metrics_key(queue);
        match self
            .bounded(self.store.range(&key, 0, n as isize - 1))
            .await
        {
            Ok(rows) => rows
                .iter()
                .filter_map(|row| serde_json::from_str(row).ok())
                .collect(),
            Err(e) => {
                warn!(queue = %queue, error = %e, "Failed to read persisted history");
                Vec::new()
            }
        }
    }

    /// Apply retention cutoffs to both persisted lists of a queue.
    ///
    /// Lists are newest first, so everything from the first expired or
    /// unreadable entry onwards is trimmed. An emptied list loses its key.
    pub async fn sweep(
        &self,
        queue: &str,
        metrics_cutoff: DateTime<Utc>,
        alerts_cutoff: DateTime<Utc>,
    ) -> PersistedSweep {
        let samples_removed = self
            .sweep_list::<QueueMetrics>(&self.metrics_key(queue), |m| {
                m.sample.timestamp >= metrics_cutoff
            })
            .await;
        let alerts_removed = self
            .sweep_list::<AlertEvent>(&self.alerts_key(queue), |a| {
                a.resolved_at.unwrap_or(a.timestamp) >= alerts_cutoff
            })
            .await;
        PersistedSweep {
            samples_removed,
            alerts_removed,
        }
    }

    async fn sweep_list<T: DeserializeOwned>(&self, key: &str, keep: impl Fn(&T) -> bool) -> usize {
        let rows = match self.bounded(self.store.range(key, 0, -1)).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(key = %key, error = %e, "Retention sweep failed to read list");
                return 0;
            }
        };
        let retained = rows
            .iter()
            .take_while(|row| {
                serde_json::from_str::<T>(row)
                    .map(|item| keep(&item))
                    .unwrap_or(false)
            })
            .count();
        if retained == rows.len() {
            return 0;
        }
        if let Err(e) = self.bounded(self.store.trim(key, retained)).await {
            warn!(key = %key, error = %e, "Retention sweep failed to trim list");
            return 0;
        }
        debug!(key = %key, removed = rows.len() - retained, "Swept persisted entries");
        rows.len() - retained
    }

    /// Delete both persisted lists of a queue
    pub async fn purge(&self, queue: &str) {
        for key in [self.metrics_key(queue), self.alerts_key(queue)] {
            if let Err(e) = self.bounded(self.store.delete(&key)).await {
                warn!(queue = %queue, key = %key, error = %e, "Failed to purge persisted history");
            }
        }
    }
}
