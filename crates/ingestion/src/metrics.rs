//! Per-stream counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Stream transport counters, shared by clones of a stream handle
#[derive(Debug, Default)]
pub struct StreamMetrics {
    /// Entries returned by `read_batch`
    pub entries_read: AtomicU64,

    /// Entries acknowledged
    pub entries_acked: AtomicU64,

    /// Entries appended through this handle
    pub entries_published: AtomicU64,

    /// Failed reads
    pub read_errors: AtomicU64,

    /// Failed acknowledgments
    pub ack_errors: AtomicU64,
}

impl StreamMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_read(&self, count: usize) {
        self.entries_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_acked(&self, count: usize) {
        self.entries_acked.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_published(&self) {
        self.entries_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_error(&self) {
        self.read_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack_error(&self) {
        self.ack_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot
    pub fn snapshot(&self) -> StreamMetricsSnapshot {
        StreamMetricsSnapshot {
            entries_read: self.entries_read.load(Ordering::Relaxed),
            entries_acked: self.entries_acked.load(Ordering::Relaxed),
            entries_published: self.entries_published.load(Ordering::Relaxed),
            read_errors: self.read_errors.load(Ordering::Relaxed),
            ack_errors: self.ack_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`StreamMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamMetricsSnapshot {
    pub entries_read: u64,
    pub entries_acked: u64,
    pub entries_published: u64,
    pub read_errors: u64,
    pub ack_errors: u64,
}

impl StreamMetricsSnapshot {
    /// Entries read but not yet acknowledged (redeliveries count twice)
    pub fn unacked(&self) -> u64 {
        self.entries_read.saturating_sub(self.entries_acked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot() {
        let metrics = StreamMetrics::new();
        metrics.record_read(10);
        metrics.record_acked(7);
        metrics.record_read_error();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.entries_read, 10);
        assert_eq!(snapshot.unacked(), 3);
        assert_eq!(snapshot.read_errors, 1);
        assert_eq!(snapshot.ack_errors, 0);
    }
}
