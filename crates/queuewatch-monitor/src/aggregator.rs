//! Fleet-wide summary
//!
//! Recomputed from scratch after every pass and published to the store under
//! `{namespace}:summary:{instance_id}` with a short TTL. Instances publish
//! independently; nothing merges summaries across instances. Passes may
//! overlap, so a summary older than the last one published is kept out of
//! both the in-memory copy and the store.

use chrono::{DateTime, Utc};
use queuewatch_core::{GlobalSummary, MetricsStore, QueueHealth, StoreError};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, warn};

/// Fold per-queue health into a summary
pub fn fold(health: &[QueueHealth], now: DateTime<Utc>) -> GlobalSummary {
    let total_queues = health.len();
    if total_queues == 0 {
        return GlobalSummary::empty(now);
    }

    let total_jobs = health
        .iter()
        .map(|h| h.metrics.sample.total_jobs())
        .fold(0u64, u64::saturating_add);
    let total_workers = health.iter().map(|h| u64::from(h.workers.total)).sum();
    let global_throughput = health
        .iter()
        .map(|h| h.metrics.derived.throughput_per_sec)
        .sum();
    let error_sum: f64 = health.iter().map(|h| h.metrics.derived.error_rate_pct).sum();
    let depth_sum: f64 = health.iter().map(|h| h.metrics.sample.waiting as f64).sum();
    let healthy_queues = health.iter().filter(|h| h.status.is_healthy()).count();

    GlobalSummary {
        total_queues,
        total_jobs,
        total_workers,
        global_throughput,
        global_error_rate: error_sum / total_queues as f64,
        average_queue_depth: depth_sum / total_queues as f64,
        healthy_queues,
        unhealthy_queues: total_queues - healthy_queues,
        timestamp: now,
    }
}

pub struct GlobalAggregator {
    store: Arc<dyn MetricsStore>,
    key: String,
    ttl: Duration,
    timeout: Duration,
    latest: RwLock<GlobalSummary>,
    /// Timestamp of the newest summary handed to the store
    published: tokio::sync::Mutex<Option<DateTime<Utc>>>,
}

impl GlobalAggregator {
    pub fn new(
        store: Arc<dyn MetricsStore>,
        namespace: &str,
        instance_id: &str,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            key: format!("{}:summary:{}", namespace, instance_id),
            ttl,
            timeout,
            latest: RwLock::new(GlobalSummary::empty(Utc::now())),
            published: tokio::sync::Mutex::new(None),
        }
    }

    /// Most recently computed summary
    pub fn latest(&self) -> GlobalSummary {
        self.latest
            .read()
            .map(|s| s.clone())
            .unwrap_or_else(|e| e.into_inner().clone())
    }

    /// Recompute, remember and publish the summary
    pub async fn refresh(&self, health: &[QueueHealth], now: DateTime<Utc>) -> GlobalSummary {
        let summary = fold(health, now);
        {
            let mut latest = self.latest.write().unwrap_or_else(|e| e.into_inner());
            if summary.timestamp >= latest.timestamp {
                *latest = summary.clone();
            }
        }

        let mut published = self.published.lock().await;
        if published.is_some_and(|newest| summary.timestamp < newest) {
            debug!(key = %self.key, "Newer summary already published, skipping");
            return summary;
        }
        *published = Some(summary.timestamp);
        if let Err(e) = self.publish(&summary).await {
            warn!(key = %self.key, error = %e, "Failed to publish global summary");
        }
        summary
    }

    async fn publish(&self, summary: &GlobalSummary) -> Result<(), StoreError> {
        let json = serde_json::to_string(summary)?;
        tokio::time::timeout(
            self.timeout,
            self.store.set_with_ttl(&self.key, json, self.ttl),
        )
        .await
        .map_err(|_| StoreError::Timeout(self.timeout))??;
        debug!(key = %self.key, queues = summary.total_queues, "Published global summary");
        Ok(())
    }
}
