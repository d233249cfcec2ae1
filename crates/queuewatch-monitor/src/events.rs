//! Domain events broadcast to monitor subscribers

use queuewatch_core::{AlertEvent, AlertSeverity, GlobalSummary, JobEventKind};
use serde::Serialize;
use std::time::Duration;

/// Everything a [`QueueMonitor`](crate::QueueMonitor) announces.
///
/// Delivered over a `tokio::sync::broadcast` channel; slow subscribers lag
/// and miss events rather than slowing the monitor down.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MonitorEvent {
    /// Job lifecycle event forwarded from a queue
    #[serde(rename_all = "camelCase")]
    Job {
        queue: String,
        job_id: String,
        event: JobEventKind,
    },
    AlertTriggered(AlertEvent),
    AlertUpdated {
        alert: AlertEvent,
        previous: AlertSeverity,
    },
    AlertResolved(AlertEvent),
    QueueAdded {
        queue: String,
    },
    QueueRemoved {
        queue: String,
    },
    PassCompleted {
        summary: GlobalSummary,
        duration: Duration,
    },
}
