//! Time sources.
//!
//! Grace deadlines run on monotonic time, boundary events and session ids on
//! wall-clock time. Both come from one reading so tests can drive them
//! together.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// A single reading of both clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockReading {
    /// Monotonic time, used for deadlines
    pub monotonic: Instant,
    /// Wall-clock milliseconds since the Unix epoch
    pub epoch_ms: i64,
}

impl ClockReading {
    /// Wall-clock seconds since the Unix epoch
    pub fn epoch_secs(&self) -> i64 {
        self.epoch_ms.div_euclid(1000)
    }
}

/// Source of clock readings
pub trait Clock: Send + Sync {
    fn now(&self) -> ClockReading;
}

/// Real system clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> ClockReading {
        ClockReading {
            monotonic: Instant::now(),
            epoch_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Manually advanced clock for tests and replays
///
/// Clones share the same reading.
#[derive(Debug, Clone)]
pub struct ManualClock {
    reading: Arc<Mutex<ClockReading>>,
}

impl ManualClock {
    /// Start at the current instant with the given wall-clock time
    pub fn starting_at(epoch_ms: i64) -> Self {
        Self {
            reading: Arc::new(Mutex::new(ClockReading {
                monotonic: Instant::now(),
                epoch_ms,
            })),
        }
    }

    /// Move both clocks forward
    pub fn advance(&self, by: Duration) {
        let mut reading = self.lock();
        reading.monotonic += by;
        reading.epoch_ms = reading.epoch_ms.saturating_add(by.as_millis() as i64);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClockReading> {
        // A poisoned reading is still a valid reading
        self.reading
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> ClockReading {
        *self.lock()
    }
}
