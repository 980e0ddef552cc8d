//! Clock abstraction so cooldown and cadence logic can be driven by a
//! test clock instead of real sleeps.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Time source for the pipeline. `monotonic` is used for cooldown and
/// cadence arithmetic, `wall` for timestamps on records and archives.
pub trait Clock: Send + Sync {
    /// Monotonic time since an arbitrary fixed origin.
    fn monotonic(&self) -> Duration;

    /// Current wall-clock time.
    fn wall(&self) -> DateTime<Utc>;
}

/// Production clock backed by `Instant` and `Utc::now`.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually-advanced clock for tests.
pub struct FakeClock {
    now: Mutex<Duration>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn monotonic(&self) -> Duration {
        *self.now.lock().unwrap()
    }

    fn wall(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
