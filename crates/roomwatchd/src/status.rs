//! Process-lifetime counters, shared across tasks and logged
//! periodically. Operators observe faults here and in the logs; there
//! is no interactive surface.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic counters for the whole daemon. All increments are
/// relaxed; these are observability numbers, not synchronization.
pub struct MonitorStatus {
    started: Instant,
    pub ticks: AtomicU64,
    pub readings: AtomicU64,
    pub alerts_fired: AtomicU64,
    pub alerts_suppressed: AtomicU64,
    pub alerts_dropped: AtomicU64,
    pub deliveries_failed: AtomicU64,
    pub sensor_faults: AtomicU64,
    pub capture_faults: AtomicU64,
    pub tick_errors: AtomicU64,
}

/// Point-in-time copy for logging and tests.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub uptime_secs: u64,
    pub ticks: u64,
    pub readings: u64,
    pub alerts_fired: u64,
    pub alerts_suppressed: u64,
    pub alerts_dropped: u64,
    pub deliveries_failed: u64,
    pub sensor_faults: u64,
    pub capture_faults: u64,
    pub tick_errors: u64,
}

impl MonitorStatus {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            ticks: AtomicU64::new(0),
            readings: AtomicU64::new(0),
            alerts_fired: AtomicU64::new(0),
            alerts_suppressed: AtomicU64::new(0),
            alerts_dropped: AtomicU64::new(0),
            deliveries_failed: AtomicU64::new(0),
            sensor_faults: AtomicU64::new(0),
            capture_faults: AtomicU64::new(0),
            tick_errors: AtomicU64::new(0),
        }
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            ticks: self.ticks.load(Ordering::Relaxed),
            readings: self.readings.load(Ordering::Relaxed),
            alerts_fired: self.alerts_fired.load(Ordering::Relaxed),
            alerts_suppressed: self.alerts_suppressed.load(Ordering::Relaxed),
            alerts_dropped: self.alerts_dropped.load(Ordering::Relaxed),
            deliveries_failed: self.deliveries_failed.load(Ordering::Relaxed),
            sensor_faults: self.sensor_faults.load(Ordering::Relaxed),
            capture_faults: self.capture_faults.load(Ordering::Relaxed),
            tick_errors: self.tick_errors.load(Ordering::Relaxed),
        }
    }
}

impl Default for MonitorStatus {
    fn default() -> Self {
        Self::new()
    }
}
