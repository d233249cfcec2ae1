//! `queuewatch simulate`: drive a monitor over a fleet of mock queues

use crate::CliError;
use queuewatch_core::MonitorConfig;
use queuewatch_monitor::QueueMonitor;
use queuewatch_testing::{MockQueue, StaticWorkerRegistry};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

pub struct SimulateOptions {
    pub queues: usize,
    pub ticks: usize,
    pub format: OutputFormat,
    pub tick_delay: Duration,
}

/// Move one queue's counts a step in a random direction and emit the
/// matching job events
fn drift(queue: &MockQueue, tick: usize) {
    let mut rng = rand::rng();
    let enqueued: u64 = rng.random_range(0..80);
    let finished: u64 = rng.random_range(0..60);
    let failed: u64 = if rng.random_bool(0.2) {
        rng.random_range(0..6)
    } else {
        0
    };
    let active: u64 = rng.random_range(0..8);
    let durations: Vec<u64> = (0..active).map(|_| rng.random_range(20..900)).collect();

    queue.update(|counts| {
        counts.waiting = (counts.waiting + enqueued).saturating_sub(finished);
        counts.active = active;
        counts.completed += finished;
        counts.failed += failed;
        counts.delayed = enqueued / 10;
    });

    for (i, duration_ms) in durations.into_iter().enumerate() {
        let job_id = format!("{}-{}-{}", queue.name(), tick, i);
        queue.emit_active(&job_id);
        queue.emit_completed(&job_id, Some(Duration::from_millis(duration_ms)));
    }
}

pub async fn run(config: MonitorConfig, options: SimulateOptions) -> Result<String, CliError> {
    let workers = Arc::new(StaticWorkerRegistry::new());
    let monitor = QueueMonitor::builder(config)
        .worker_registry(workers.clone())
        .build()?;

    let mut queues = Vec::with_capacity(options.queues);
    for i in 0..options.queues {
        let name = format!("queue-{}", i + 1);
        let queue = MockQueue::shared(name.clone());
        workers.set_workers(&name, 4, (i % 5) as u32);
        monitor.add_queue(name, queue.clone()).await?;
        queues.push(queue);
    }

    for tick in 0..options.ticks {
        for queue in &queues {
            drift(queue, tick);
        }
        let report = monitor.collect_now().await?;
        info!(
            tick = tick + 1,
            committed = report.committed,
            healthy = report.summary.healthy_queues,
            unhealthy = report.summary.unhealthy_queues,
            "Simulated pass"
        );
        if !options.tick_delay.is_zero() {
            tokio::time::sleep(options.tick_delay).await;
        }
    }

    let output = match options.format {
        OutputFormat::Text => monitor.render_text()?,
        OutputFormat::Json => monitor.render_json().await?,
    };
    Ok(output)
}
