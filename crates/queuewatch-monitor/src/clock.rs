//! Strictly increasing wall clock for last-writer-wins ordering

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// Hands out UTC timestamps with microsecond resolution, each strictly
/// later than the previous one even if the system clock steps backwards.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last_micros: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> DateTime<Utc> {
        let wall = Utc::now().timestamp_micros();
        let mut current = self.last_micros.load(Ordering::Relaxed);
        loop {
            let next = wall.max(current + 1);
            match self.last_micros.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return DateTime::from_timestamp_micros(next).unwrap_or_else(Utc::now),
                Err(actual) => current = actual,
            }
        }
    }
}
