//! Streamer metrics
//!
//! Prometheus-facing recorders plus an in-memory aggregator used for the
//! end-of-run summary.

use contracts::BoundaryKind;
use metrics::{counter, gauge, histogram};

/// Record a batch read from the stream
pub fn record_entries_read(stream: &str, count: usize) {
    counter!("can_streamer_entries_read_total", "stream" => stream.to_string())
        .increment(count as u64);
    histogram!("can_streamer_batch_size").record(count as f64);
}

/// Record entries acknowledged to the stream
pub fn record_entries_acked(stream: &str, count: usize) {
    counter!("can_streamer_entries_acked_total", "stream" => stream.to_string())
        .increment(count as u64);
}

/// Record telemetry frames forwarded to sinks
pub fn record_frames_forwarded(count: usize) {
    counter!("can_streamer_frames_forwarded_total").increment(count as u64);
}

/// Record a boundary event emission
pub fn record_boundary_event(kind: BoundaryKind) {
    counter!(
        "can_streamer_boundary_events_total",
        "type" => kind.as_str()
    )
    .increment(1);
}

/// Record a sink delivery attempt
pub fn record_delivery(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "can_streamer_deliveries_total",
        "sink" => sink_name.to_string(),
        "status" => status
    )
    .increment(1);
}

/// Record sink send latency
pub fn record_send_latency_ms(latency_ms: f64) {
    histogram!("can_streamer_send_latency_ms").record(latency_ms);
}

/// Record a transport error (read / ack)
pub fn record_stream_error(stream: &str, operation: &'static str) {
    counter!(
        "can_streamer_stream_errors_total",
        "stream" => stream.to_string(),
        "operation" => operation
    )
    .increment(1);
}

/// Record the current drive state (0 = idle, 1 = active, 2 = stop pending)
pub fn record_drive_state(code: u8) {
    gauge!("can_streamer_drive_state").set(code as f64);
}

/// Record pre-roll window depth
pub fn record_pre_roll_depth(depth: usize) {
    gauge!("can_streamer_pre_roll_depth").set(depth as f64);
}

/// In-memory aggregation of a streamer run
#[derive(Debug, Clone, Default)]
pub struct StreamerMetricsAggregator {
    /// Loop iterations
    pub iterations: u64,

    /// Entries read from the stream
    pub entries_read: u64,

    /// Entries acknowledged
    pub entries_acked: u64,

    /// Telemetry frames forwarded
    pub frames_forwarded: u64,

    /// drive:start events
    pub sessions_started: u64,

    /// drive:stop events
    pub sessions_stopped: u64,

    /// Failed deliveries (batches left unacknowledged)
    pub delivery_failures: u64,

    /// Per-delivery latency
    pub send_latency_ms: RunningStats,
}

impl StreamerMetricsAggregator {
    /// Create new aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one boundary event
    pub fn add_boundary(&mut self, kind: BoundaryKind) {
        match kind {
            BoundaryKind::DriveStart => self.sessions_started += 1,
            BoundaryKind::DriveStop => self.sessions_stopped += 1,
        }
    }

    /// Produce a summary report
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            iterations: self.iterations,
            entries_read: self.entries_read,
            entries_acked: self.entries_acked,
            frames_forwarded: self.frames_forwarded,
            sessions_started: self.sessions_started,
            sessions_stopped: self.sessions_stopped,
            delivery_failures: self.delivery_failures,
            ack_rate: if self.entries_read > 0 {
                self.entries_acked as f64 / self.entries_read as f64 * 100.0
            } else {
                0.0
            },
            send_latency_ms: StatsSummary::from(&self.send_latency_ms),
        }
    }

    /// Reset statistics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Metrics summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub iterations: u64,
    pub entries_read: u64,
    pub entries_acked: u64,
    pub frames_forwarded: u64,
    pub sessions_started: u64,
    pub sessions_stopped: u64,
    pub delivery_failures: u64,
    pub ack_rate: f64,
    pub send_latency_ms: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Streamer Metrics Summary ===")?;
        writeln!(f, "Iterations: {}", self.iterations)?;
        writeln!(
            f,
            "Entries read/acked: {}/{} ({:.2}%)",
            self.entries_read, self.entries_acked, self.ack_rate
        )?;
        writeln!(f, "Frames forwarded: {}", self.frames_forwarded)?;
        writeln!(
            f,
            "Sessions started/stopped: {}/{}",
            self.sessions_started, self.sessions_stopped
        )?;
        writeln!(f, "Delivery failures: {}", self.delivery_failures)?;
        writeln!(f, "Send latency (ms): {}", self.send_latency_ms)?;
        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// Add a sample
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// Sample count
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// Standard deviation
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Minimum
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Maximum
    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_boundaries() {
        let mut aggregator = StreamerMetricsAggregator::new();
        aggregator.add_boundary(BoundaryKind::DriveStart);
        aggregator.add_boundary(BoundaryKind::DriveStop);
        aggregator.add_boundary(BoundaryKind::DriveStart);

        assert_eq!(aggregator.sessions_started, 2);
        assert_eq!(aggregator.sessions_stopped, 1);
    }

    #[test]
    fn test_summary_ack_rate() {
        let aggregator = StreamerMetricsAggregator {
            entries_read: 200,
            entries_acked: 150,
            ..Default::default()
        };
        let summary = aggregator.summary();
        assert!((summary.ack_rate - 75.0).abs() < 1e-10);
        let output = format!("{}", summary);
        assert!(output.contains("Entries read/acked: 200/150 (75.00%)"));
        assert!(output.contains("Send latency (ms): N/A"));
    }

    #[test]
    fn test_recorders_without_installed_recorder() {
        // metrics macros are no-ops until a recorder is installed
        record_entries_read("can:frames", 3);
        record_boundary_event(BoundaryKind::DriveStart);
        record_delivery("log", true);
        record_drive_state(1);
    }
}
