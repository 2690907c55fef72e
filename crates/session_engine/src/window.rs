//! Time-bounded pre-roll window.
//!
//! Holds the most recent frames so a drive start can include the seconds of
//! telemetry leading up to it. Eviction is by age relative to the newest
//! push, not by count.

use std::collections::VecDeque;
use std::fmt;

use contracts::Frame;

/// Ordered buffer of `(timestamp_ms, frame)` pairs trimmed to a fixed horizon
pub struct PreRollWindow {
    entries: VecDeque<(i64, Frame)>,
    horizon_ms: i64,
}

impl fmt::Debug for PreRollWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreRollWindow")
            .field("len", &self.entries.len())
            .field("horizon_ms", &self.horizon_ms)
            .field("oldest", &self.oldest_timestamp())
            .field("newest", &self.newest_timestamp())
            .finish()
    }
}

impl PreRollWindow {
    /// Create a window with the given horizon in milliseconds
    pub fn new(horizon_ms: i64) -> Self {
        Self {
            entries: VecDeque::new(),
            horizon_ms: horizon_ms.max(0),
        }
    }

    /// Create a window from a horizon in seconds
    pub fn from_seconds(seconds: f64) -> Self {
        Self::new((seconds * 1000.0) as i64)
    }

    /// Append a frame, then evict from the front everything older than the horizon
    ///
    /// Push order is assumed non-decreasing in time. An out-of-order push is
    /// kept; trimming only ever looks at the front.
    #[inline]
    pub fn push(&mut self, timestamp_ms: i64, frame: Frame) {
        self.entries.push_back((timestamp_ms, frame));

        let cutoff = timestamp_ms.saturating_sub(self.horizon_ms);
        while let Some((front_ts, _)) = self.entries.front() {
            if *front_ts < cutoff {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Take every retained frame in push order, leaving the window empty
    pub fn drain(&mut self) -> Vec<Frame> {
        self.entries.drain(..).map(|(_, frame)| frame).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Horizon in milliseconds
    pub fn horizon_ms(&self) -> i64 {
        self.horizon_ms
    }

    /// Timestamp of the oldest retained frame
    pub fn oldest_timestamp(&self) -> Option<i64> {
        self.entries.front().map(|(ts, _)| *ts)
    }

    /// Timestamp of the newest retained frame
    pub fn newest_timestamp(&self) -> Option<i64> {
        self.entries.back().map(|(ts, _)| *ts)
    }
}
