use chrono::{Duration as ChronoDuration, Utc};
use queuewatch_core::{
    AlertSeverity, HealthStatus, JobEventKind, MetricKey, MetricsStore, MonitorConfig,
    QueueMetrics,
};
use queuewatch_monitor::{MonitorError, MonitorEvent, QueueMonitor};
use queuewatch_store::InMemoryStore;
use queuewatch_testing::{
    DelayedStore, MockCounts, MockQueue, RecordingAlertSink, StaticWorkerRegistry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn config() -> MonitorConfig {
    MonitorConfig {
        namespace: "qw".to_string(),
        instance_id: "test".to_string(),
        ..MonitorConfig::default()
    }
}

async fn monitor_with(queue: &Arc<MockQueue>, config: MonitorConfig) -> QueueMonitor {
    let monitor = QueueMonitor::new(config).unwrap();
    monitor.add_queue(queue.name(), queue.clone()).await.unwrap();
    monitor
}

#[tokio::test]
async fn error_rate_escalates_then_resolves_once() {
    let queue = MockQueue::shared("payments");
    let monitor = monitor_with(
        &queue,
        MonitorConfig {
            history_window: 1,
            ..config()
        },
    )
    .await;
    let mut events = monitor.subscribe();

    monitor.collect_now().await.unwrap();

    queue.set_completed(94);
    queue.set_failed(6);
    monitor.collect_now().await.unwrap();
    let active = monitor.active_alerts("payments").await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].metric, MetricKey::ErrorRate);
    assert_eq!(active[0].severity, AlertSeverity::Warning);
    let alert_id = active[0].id.clone();

    queue.set_completed(174);
    queue.set_failed(26);
    monitor.collect_now().await.unwrap();
    let active = monitor.active_alerts("payments").await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, alert_id);
    assert_eq!(active[0].severity, AlertSeverity::Critical);
    assert_eq!(active[0].threshold, 10.0);

    queue.set_completed(274);
    monitor.collect_now().await.unwrap();
    assert!(monitor.active_alerts("payments").await.unwrap().is_empty());
    let resolved = monitor.alert_history("payments").await.unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].id, alert_id);
    assert!(resolved[0].resolved_at.is_some());

    let (mut triggered, mut updated, mut resolved_events) = (0, 0, 0);
    while let Ok(event) = events.try_recv() {
        match event {
            MonitorEvent::AlertTriggered(_) => triggered += 1,
            MonitorEvent::AlertUpdated { previous, .. } => {
                assert_eq!(previous, AlertSeverity::Warning);
                updated += 1;
            }
            MonitorEvent::AlertResolved(_) => resolved_events += 1,
            _ => {}
        }
    }
    assert_eq!((triggered, updated, resolved_events), (1, 1, 1));
}

#[tokio::test]
async fn removal_during_pass_discards_result() {
    let queue = MockQueue::shared("orders");
    queue.set_waiting(6000);
    queue.set_delay(Some(Duration::from_millis(200)));
    let monitor = Arc::new(monitor_with(&queue, config()).await);

    let pass = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.collect_now().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    monitor.remove_queue("orders").await.unwrap();

    let report = pass.await.unwrap().unwrap();
    assert_eq!(report.committed, 0);
    assert!(monitor.queue_health("orders").await.is_none());
    assert!(matches!(
        monitor.active_alerts("orders").await,
        Err(MonitorError::QueueNotFound(_))
    ));
    assert!(!monitor.render_text().unwrap().contains("queue=\"orders\""));
    assert_eq!(queue.listener_count(), 0);
}

#[tokio::test]
async fn removal_during_failing_fetch_leaves_no_series() {
    let queue = MockQueue::shared("orders");
    queue.set_failing(true);
    queue.set_delay(Some(Duration::from_millis(200)));
    let monitor = Arc::new(monitor_with(&queue, config()).await);

    let pass = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.collect_now().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    monitor.remove_queue("orders").await.unwrap();

    let report = pass.await.unwrap().unwrap();
    assert_eq!(report.discarded, 1);
    assert_eq!(report.degraded, 0);
    assert!(!monitor.render_text().unwrap().contains("queue=\"orders\""));
}

#[tokio::test]
async fn older_sample_never_overwrites_newer() {
    let queue = MockQueue::shared("orders");
    queue.set_waiting(10);
    queue.set_delay(Some(Duration::from_millis(300)));
    let monitor = Arc::new(monitor_with(&queue, config()).await);

    // The slow pass takes its timestamp first but reads its counts last
    let slow_pass = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.collect_now().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    queue.set_delay(None);
    let fast = monitor.collect_now().await.unwrap();
    assert_eq!(fast.committed, 1);
    queue.set_waiting(9000);

    let slow = slow_pass.await.unwrap().unwrap();
    assert_eq!(slow.committed, 0);
    assert_eq!(slow.discarded, 1);

    let health = monitor.queue_health("orders").await.unwrap();
    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(health.metrics.sample.waiting, 10);
    assert!(health.active_alerts.is_empty());
    assert!(monitor.active_alerts("orders").await.unwrap().is_empty());
    assert_eq!(monitor.recent_samples("orders", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn stop_lets_inflight_pass_commit() {
    let queue = MockQueue::shared("orders");
    queue.set_waiting(42);
    queue.set_delay(Some(Duration::from_millis(300)));
    let monitor = monitor_with(&queue, config()).await;

    monitor.start().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stopping = Instant::now();
    monitor.stop().await;
    assert!(stopping.elapsed() >= Duration::from_millis(200));

    let health = monitor.queue_health("orders").await.unwrap();
    assert_eq!(health.status, HealthStatus::Healthy);
    assert_eq!(health.metrics.sample.waiting, 42);
    assert_eq!(monitor.recent_samples("orders", 10).await.unwrap().len(), 1);
}

#[tokio::test]
async fn slow_store_does_not_block_reads() {
    let store = InMemoryStore::new();
    let delayed = Arc::new(DelayedStore::new(
        Arc::new(store.clone()),
        Duration::from_millis(800),
    ));
    let queue = MockQueue::shared("orders");
    queue.set_waiting(6000);
    let monitor = Arc::new(
        QueueMonitor::builder(config())
            .store(delayed.clone())
            .build()
            .unwrap(),
    );
    monitor.add_queue("orders", queue.clone()).await.unwrap();

    let pass = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.collect_now().await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(delayed.writes(), 1);

    let reading = Instant::now();
    let health = monitor.queue_health("orders").await.unwrap();
    let alert_id = monitor.active_alerts("orders").await.unwrap()[0].id.clone();
    assert!(monitor.acknowledge_alert("orders", &alert_id).await.unwrap());
    monitor.render_json().await.unwrap();
    assert!(reading.elapsed() < Duration::from_millis(300));
    assert_eq!(health.status, HealthStatus::Critical);
    assert_eq!(health.metrics.sample.waiting, 6000);

    assert_eq!(pass.await.unwrap().unwrap().committed, 1);
    assert_eq!(store.list_len("qw:metrics:orders").await, 1);
}

#[tokio::test]
async fn removal_purges_after_inflight_write() {
    let store = InMemoryStore::new();
    let delayed = Arc::new(DelayedStore::new(
        Arc::new(store.clone()),
        Duration::from_millis(300),
    ));
    let queue = MockQueue::shared("orders");
    let monitor = Arc::new(
        QueueMonitor::builder(config())
            .store(delayed.clone())
            .build()
            .unwrap(),
    );
    monitor.add_queue("orders", queue.clone()).await.unwrap();

    let pass = {
        let monitor = monitor.clone();
        tokio::spawn(async move { monitor.collect_now().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(delayed.writes(), 1);
    monitor.remove_queue("orders").await.unwrap();

    assert!(!store.contains_key("qw:metrics:orders").await);
    assert_eq!(pass.await.unwrap().unwrap().committed, 1);
    assert!(!store.contains_key("qw:metrics:orders").await);
}

#[tokio::test]
async fn fetch_failure_keeps_previous_health() {
    let queue = MockQueue::shared("orders");
    queue.set_waiting(10);
    let monitor = monitor_with(&queue, config()).await;

    monitor.collect_now().await.unwrap();
    let before = monitor.queue_health("orders").await.unwrap();
    assert_eq!(before.status, HealthStatus::Healthy);

    queue.set_failing(true);
    queue.set_waiting(9000);
    let report = monitor.collect_now().await.unwrap();
    assert_eq!(report.degraded, 1);
    assert_eq!(monitor.queue_health("orders").await.unwrap(), before);

    let text = monitor.render_text().unwrap();
    let line = text
        .lines()
        .find(|l| l.starts_with("qw_fetch_errors_total{") && l.contains("source=\"queue\""))
        .unwrap();
    assert!(line.contains("} 1 "));
}

#[tokio::test]
async fn slow_queue_times_out_without_blocking_others() {
    let slow = MockQueue::shared("slow");
    slow.set_delay(Some(Duration::from_millis(500)));
    let fast = MockQueue::shared("fast");
    fast.set_waiting(3);

    let monitor = QueueMonitor::new(MonitorConfig {
        fetch_timeout_ms: 50,
        ..config()
    })
    .unwrap();
    monitor.add_queue("slow", slow.clone()).await.unwrap();
    monitor.add_queue("fast", fast.clone()).await.unwrap();

    let report = monitor.collect_now().await.unwrap();
    assert_eq!(report.committed, 1);
    assert_eq!(report.degraded, 1);
    assert_eq!(
        monitor.queue_health("slow").await.unwrap().status,
        HealthStatus::Unknown
    );
    assert_eq!(
        monitor.queue_health("fast").await.unwrap().metrics.sample.waiting,
        3
    );
}

#[tokio::test]
async fn worker_failure_keeps_previous_workers() {
    let queue = MockQueue::shared("orders");
    let workers = Arc::new(StaticWorkerRegistry::new());
    workers.set_workers("orders", 4, 2);
    let monitor = QueueMonitor::builder(config())
        .worker_registry(workers.clone())
        .build()
        .unwrap();
    monitor.add_queue("orders", queue.clone()).await.unwrap();

    monitor.collect_now().await.unwrap();
    let health = monitor.queue_health("orders").await.unwrap();
    assert_eq!(health.workers.total, 4);
    assert_eq!(health.workers.active, 2);
    assert_eq!(health.workers.utilization_pct, 50.0);

    workers.set_failing(true);
    queue.set_waiting(25);
    let report = monitor.collect_now().await.unwrap();
    assert_eq!(report.committed, 1);

    let health = monitor.queue_health("orders").await.unwrap();
    assert_eq!(health.metrics.sample.waiting, 25);
    assert_eq!(health.workers.total, 4);
    assert!(
        monitor
            .render_text()
            .unwrap()
            .lines()
            .any(|l| l.starts_with("qw_fetch_errors_total{") && l.contains("source=\"workers\""))
    );
}

#[tokio::test]
async fn unreadable_worker_status_is_reported() {
    let queue = MockQueue::shared("orders");
    let workers = Arc::new(StaticWorkerRegistry::new());
    workers.set_workers("orders", 4, 2);
    let monitor = QueueMonitor::builder(config())
        .worker_registry(workers.clone())
        .build()
        .unwrap();
    monitor.add_queue("orders", queue.clone()).await.unwrap();

    let fetch_errors = |monitor: &QueueMonitor| {
        monitor
            .render_text()
            .unwrap()
            .lines()
            .find(|l| l.starts_with("qw_fetch_errors_total{") && l.contains("source=\"workers\""))
            .map(|l| l.to_string())
    };

    // One active and one idle worker cannot be read
    workers.fail_status("orders-worker-1");
    workers.fail_status("orders-worker-3");
    let report = monitor.collect_now().await.unwrap();
    assert_eq!(report.committed, 1);
    let health = monitor.queue_health("orders").await.unwrap();
    assert_eq!(health.workers.total, 2);
    assert_eq!(health.workers.active, 1);
    assert_eq!(health.workers.idle, 1);
    assert!(fetch_errors(&monitor).unwrap().contains("} 2 "));

    // None readable: previous figures stay
    workers.fail_status("orders-worker-0");
    workers.fail_status("orders-worker-2");
    queue.set_waiting(7);
    monitor.collect_now().await.unwrap();
    let health = monitor.queue_health("orders").await.unwrap();
    assert_eq!(health.metrics.sample.waiting, 7);
    assert_eq!(health.workers.total, 2);
    assert_eq!(health.workers.active, 1);
    assert!(fetch_errors(&monitor).unwrap().contains("} 6 "));
}

#[tokio::test]
async fn paused_queue_is_warning() {
    let queue = MockQueue::shared("reports");
    queue.set_paused(true);
    let monitor = monitor_with(&queue, config()).await;

    monitor.collect_now().await.unwrap();
    assert_eq!(
        monitor.queue_health("reports").await.unwrap().status,
        HealthStatus::Warning
    );
}

#[tokio::test]
async fn acknowledge_is_idempotent() {
    let queue = MockQueue::shared("orders");
    queue.set_waiting(2000);
    let monitor = monitor_with(&queue, config()).await;
    monitor.collect_now().await.unwrap();

    let alert_id = monitor.active_alerts("orders").await.unwrap()[0].id.clone();
    assert!(monitor.acknowledge_alert("orders", &alert_id).await.unwrap());
    assert!(monitor.acknowledge_alert("orders", &alert_id).await.unwrap());
    assert!(!monitor.acknowledge_alert("orders", "nope").await.unwrap());
    assert!(monitor.active_alerts("orders").await.unwrap()[0].acknowledged);
    assert!(
        monitor.queue_health("orders").await.unwrap().active_alerts[0].acknowledged
    );

    // Acknowledgement survives escalation
    queue.set_waiting(7000);
    monitor.collect_now().await.unwrap();
    let active = monitor.active_alerts("orders").await.unwrap();
    assert_eq!(active[0].severity, AlertSeverity::Critical);
    assert!(active[0].acknowledged);

    assert!(matches!(
        monitor.acknowledge_alert("missing", &alert_id).await,
        Err(MonitorError::QueueNotFound(_))
    ));
}

#[tokio::test]
async fn disabled_rule_resolves_active_alert() {
    let queue = MockQueue::shared("orders");
    queue.set_waiting(6000);
    let monitor = monitor_with(&queue, config()).await;
    monitor.collect_now().await.unwrap();
    assert_eq!(monitor.active_alerts("orders").await.unwrap().len(), 1);

    assert!(monitor.set_rule_enabled("queue-depth", false));
    assert!(!monitor.set_rule_enabled("no-such-rule", false));
    monitor.collect_now().await.unwrap();

    assert!(monitor.active_alerts("orders").await.unwrap().is_empty());
    assert_eq!(monitor.alert_history("orders").await.unwrap().len(), 1);
    assert!(
        !monitor
            .alert_rules()
            .iter()
            .find(|r| r.id == "queue-depth")
            .unwrap()
            .enabled
    );
}

#[tokio::test]
async fn triggered_alerts_reach_the_sink() {
    let queue = MockQueue::shared("orders");
    queue.set_waiting(6000);
    let sink = Arc::new(RecordingAlertSink::new());
    let monitor = QueueMonitor::builder(config())
        .alert_sink(sink.clone())
        .build()
        .unwrap();
    monitor.add_queue("orders", queue.clone()).await.unwrap();

    monitor.collect_now().await.unwrap();
    assert!(sink.wait_for_attempts(1, Duration::from_secs(2)).await);

    let notification = &sink.notifications()[0];
    assert_eq!(notification.rule_id, "queue-depth");
    assert_eq!(notification.rule_name, "Queue depth");
    assert_eq!(notification.metric, MetricKey::QueueDepth);
    assert_eq!(notification.value, 6000.0);
    assert_eq!(notification.threshold, 5000.0);

    // Still active on the next pass: nothing new is delivered
    monitor.collect_now().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sink.attempts(), 1);
}

#[tokio::test]
async fn failing_sink_does_not_affect_sampling() {
    let queue = MockQueue::shared("orders");
    queue.set_waiting(6000);
    let sink = Arc::new(RecordingAlertSink::failing());
    let monitor = QueueMonitor::builder(config())
        .alert_sink(sink.clone())
        .build()
        .unwrap();
    monitor.add_queue("orders", queue.clone()).await.unwrap();

    let report = monitor.collect_now().await.unwrap();
    assert_eq!(report.committed, 1);
    assert!(sink.wait_for_attempts(1, Duration::from_secs(2)).await);
    assert_eq!(monitor.active_alerts("orders").await.unwrap().len(), 1);
}

#[tokio::test]
async fn job_events_are_forwarded_and_timed() {
    let queue = MockQueue::shared("orders");
    let monitor = monitor_with(&queue, config()).await;
    let mut events = monitor.subscribe();

    queue.emit_waiting("1");
    queue.emit_active("1");
    queue.emit_completed("1", Some(Duration::from_millis(250)));
    queue.emit_stalled("2");

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let MonitorEvent::Job { queue, event, .. } = event {
            assert_eq!(queue, "orders");
            kinds.push(event);
        }
    }
    assert_eq!(
        kinds,
        vec![
            JobEventKind::Waiting,
            JobEventKind::Active,
            JobEventKind::Completed,
            JobEventKind::Stalled,
        ]
    );

    monitor.collect_now().await.unwrap();
    let health = monitor.queue_health("orders").await.unwrap();
    assert_eq!(health.metrics.derived.average_processing_time_ms, 250.0);

    let text = monitor.render_text().unwrap();
    assert!(
        text.lines()
            .any(|l| l.starts_with("qw_job_events_total{") && l.contains("event=\"completed\""))
    );
}

#[tokio::test]
async fn history_is_persisted_and_swept() {
    let store = InMemoryStore::new();
    let queue = MockQueue::shared("orders");
    queue.set_counts(MockCounts {
        waiting: 5,
        completed: 10,
        ..Default::default()
    });
    let monitor = QueueMonitor::builder(config())
        .store(Arc::new(store.clone()))
        .build()
        .unwrap();
    monitor.add_queue("orders", queue.clone()).await.unwrap();

    monitor.collect_now().await.unwrap();
    monitor.collect_now().await.unwrap();
    assert_eq!(store.list_len("qw:metrics:orders").await, 2);
    assert_eq!(monitor.recent_samples("orders", 10).await.unwrap().len(), 2);
    assert!(store.contains_key("qw:summary:test").await);

    // Put an entry older than the retention window at the tail
    let fresh = store.range("qw:metrics:orders", 0, -1).await.unwrap();
    let mut stale = QueueMetrics::empty(Utc::now() - ChronoDuration::days(30));
    stale.sample.waiting = 1;
    store.delete("qw:metrics:orders").await.unwrap();
    store
        .push_front("qw:metrics:orders", serde_json::to_string(&stale).unwrap(), 100)
        .await
        .unwrap();
    for row in fresh.iter().rev() {
        store
            .push_front("qw:metrics:orders", row.clone(), 100)
            .await
            .unwrap();
    }
    assert_eq!(store.list_len("qw:metrics:orders").await, 3);

    let report = monitor.sweep_retention().await;
    assert_eq!(report.persisted_samples_removed, 1);
    assert_eq!(report.samples_removed, 0);
    assert_eq!(store.list_len("qw:metrics:orders").await, 2);

    monitor.remove_queue("orders").await.unwrap();
    assert!(!store.contains_key("qw:metrics:orders").await);
}
