//! Health classification
//!
//! A pure function of one sample, its derived metrics, the worker figures and
//! the configured thresholds.

use crate::config::Thresholds;
use crate::model::{
    DerivedMetrics, HealthStatus, MetricKey, QueueMetrics, SampleMetrics, WorkerMetrics,
};

/// Classify a queue.
///
/// A paused queue is always `Warning`, even when a metric breaches its
/// critical threshold. Otherwise the worst breached level wins.
pub fn classify(
    sample: &SampleMetrics,
    derived: &DerivedMetrics,
    workers: &WorkerMetrics,
    thresholds: &Thresholds,
) -> HealthStatus {
    if sample.paused {
        return HealthStatus::Warning;
    }

    let metrics = QueueMetrics {
        sample: sample.clone(),
        derived: *derived,
    };
    let values = MetricKey::ALL.map(|metric| {
        (
            metric.value_of(&metrics, workers),
            thresholds.for_metric(metric),
        )
    });

    if values.iter().any(|(value, pair)| *value >= pair.critical) {
        HealthStatus::Critical
    } else if values.iter().any(|(value, pair)| *value >= pair.warning) {
        HealthStatus::Warning
    } else {
        HealthStatus::Healthy
    }
}

/// Classify a stored history row
pub fn classify_metrics(
    metrics: &QueueMetrics,
    workers: &WorkerMetrics,
    thresholds: &Thresholds,
) -> HealthStatus {
    classify(&metrics.sample, &metrics.derived, workers, thresholds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ThresholdPair;
    use chrono::Utc;
    use proptest::prelude::*;

    fn sample(waiting: u64, paused: bool) -> SampleMetrics {
        SampleMetrics {
            waiting,
            paused,
            ..SampleMetrics::empty(Utc::now())
        }
    }

    #[test]
    fn test_empty_metrics_are_healthy() {
        let status = classify(
            &sample(0, false),
            &DerivedMetrics::default(),
            &WorkerMetrics::default(),
            &Thresholds::default(),
        );
        assert_eq!(status, HealthStatus::Healthy);
    }

    #[test]
    fn test_orders_backlog_is_critical() {
        let thresholds = Thresholds {
            queue_depth: ThresholdPair::new(1000.0, 5000.0),
            ..Default::default()
        };
        let status = classify(
            &sample(6000, false),
            &DerivedMetrics::default(),
            &WorkerMetrics::default(),
            &thresholds,
        );
        assert_eq!(status, HealthStatus::Critical);
    }

    #[test]
    fn test_paused_overrides_critical() {
        let derived = DerivedMetrics {
            error_rate_pct: 90.0,
            ..Default::default()
        };
        let status = classify(
            &sample(100_000, true),
            &derived,
            &WorkerMetrics::from_counts(10, 10),
            &Thresholds::default(),
        );
        assert_eq!(status, HealthStatus::Warning);
    }

    #[test]
    fn test_single_warning_metric() {
        let derived = DerivedMetrics {
            lag_ms: 61_000.0,
            ..Default::default()
        };
        let status = classify(
            &sample(0, false),
            &derived,
            &WorkerMetrics::default(),
            &Thresholds::default(),
        );
        assert_eq!(status, HealthStatus::Warning);
    }

    #[test]
    fn test_worker_utilization_critical() {
        let status = classify(
            &sample(0, false),
            &DerivedMetrics::default(),
            &WorkerMetrics::from_counts(20, 20),
            &Thresholds::default(),
        );
        assert_eq!(status, HealthStatus::Critical);
    }

    fn derived_strategy() -> impl Strategy<Value = DerivedMetrics> {
        (
            0.0..10_000.0f64,
            0.0..200_000.0f64,
            0.0..100.0f64,
            0.0..1_000.0f64,
            0.0..1_000_000.0f64,
        )
            .prop_map(|(rate, avg, err, tput, lag)| DerivedMetrics {
                processing_rate_per_min: rate,
                average_processing_time_ms: avg,
                error_rate_pct: err,
                throughput_per_sec: tput,
                lag_ms: lag,
            })
    }

    proptest! {
        #[test]
        fn paused_is_always_warning(
            waiting in 0u64..1_000_000,
            derived in derived_strategy(),
            total in 0u32..100,
            active in 0u32..100,
        ) {
            let status = classify(
                &sample(waiting, true),
                &derived,
                &WorkerMetrics::from_counts(total, active),
                &Thresholds::default(),
            );
            prop_assert_eq!(status, HealthStatus::Warning);
        }

        #[test]
        fn critical_depth_is_always_critical(
            waiting in 5_000u64..10_000_000,
            derived in derived_strategy(),
            total in 0u32..100,
            active in 0u32..100,
        ) {
            let status = classify(
                &sample(waiting, false),
                &derived,
                &WorkerMetrics::from_counts(total, active),
                &Thresholds::default(),
            );
            prop_assert_eq!(status, HealthStatus::Critical);
        }

        #[test]
        fn classification_is_deterministic(
            waiting in 0u64..10_000,
            paused in any::<bool>(),
            derived in derived_strategy(),
        ) {
            let s = sample(waiting, paused);
            let workers = WorkerMetrics::default();
            let thresholds = Thresholds::default();
            let first = classify(&s, &derived, &workers, &thresholds);
            let second = classify(&s, &derived, &workers, &thresholds);
            prop_assert_eq!(first, second);
            prop_assert_ne!(first, HealthStatus::Unknown);
        }
    }
}
