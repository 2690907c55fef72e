//! Synthetic CAN-like telemetry
//!
//! Produces a repeating 40 s drive cycle at 5 Hz so the streamer can be
//! exercised without a vehicle: idle, accelerating, cruising, braking.

use std::time::Duration;

use contracts::{Frame, TelemetryStream};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::memory::MemoryStream;

/// Time between generated frames
pub const FRAME_INTERVAL_MS: i64 = 200;

/// Length of one cycle phase
pub const PHASE_MS: i64 = 10_000;

/// Phase of the synthetic drive cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrivePhase {
    Idle,
    Accelerating,
    Cruising,
    Braking,
}

impl DrivePhase {
    /// Phase for a timestamp: `(ts / 10 s) % 4`
    pub fn at(timestamp_ms: i64) -> Self {
        match timestamp_ms.div_euclid(PHASE_MS).rem_euclid(4) {
            0 => Self::Idle,
            1 => Self::Accelerating,
            2 => Self::Cruising,
            _ => Self::Braking,
        }
    }
}

/// Synthetic telemetry source
#[derive(Debug, Clone)]
pub struct FakeTelemetry {
    timestamp_ms: i64,
    speed: f64,
    rpm: f64,
}

impl FakeTelemetry {
    /// Start just before `start_ms`; the first frame is one interval later
    pub fn new(start_ms: i64) -> Self {
        Self {
            timestamp_ms: start_ms,
            speed: 0.0,
            rpm: 0.0,
        }
    }

    /// Start at the current wall-clock time
    pub fn starting_now() -> Self {
        Self::new(chrono::Utc::now().timestamp_millis())
    }

    /// Advance one interval and produce the frame
    pub fn next_frame(&mut self) -> Frame {
        self.timestamp_ms += FRAME_INTERVAL_MS;

        match DrivePhase::at(self.timestamp_ms) {
            DrivePhase::Idle => {
                self.speed = 0.0;
                self.rpm = 0.0;
            }
            DrivePhase::Accelerating => {
                self.speed = (self.speed + 0.5).min(30.0);
                self.rpm = (self.rpm + 200.0).min(4000.0);
            }
            DrivePhase::Cruising => {
                self.speed = 30.0;
                self.rpm = 3500.0;
            }
            DrivePhase::Braking => {
                self.speed = (self.speed - 0.8).max(0.0);
                self.rpm = (self.rpm - 300.0).max(0.0);
            }
        }

        Frame::new()
            .with("ts_ms", self.timestamp_ms)
            .with("vehicle_speed", self.speed)
            .with("rpm", self.rpm)
            .with("can_id", 0x123)
            .with("raw_data", "01ABEF")
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn rpm(&self) -> f64 {
        self.rpm
    }
}

impl Iterator for FakeTelemetry {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        Some(self.next_frame())
    }
}

/// Feed a memory stream with synthetic frames in real time until shutdown
///
/// Frames are wrapped under `payload_field`, like a real producer would.
pub fn spawn_feeder(
    stream: MemoryStream,
    payload_field: String,
    mut telemetry: FakeTelemetry,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<u64> {
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(Duration::from_millis(FRAME_INTERVAL_MS as u64));
        let mut published = 0u64;
        info!(stream = stream.name(), "Synthetic telemetry feeder started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let frame = telemetry.next_frame();
                    stream.append_payload(&payload_field, &frame);
                    published += 1;
                    if published % 50 == 0 {
                        debug!(
                            published,
                            speed = telemetry.speed(),
                            rpm = telemetry.rpm(),
                            "Synthetic frames published"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(published, "Synthetic telemetry feeder stopped");
        published
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_cycle() {
        assert_eq!(DrivePhase::at(0), DrivePhase::Idle);
        assert_eq!(DrivePhase::at(10_000), DrivePhase::Accelerating);
        assert_eq!(DrivePhase::at(29_999), DrivePhase::Cruising);
        assert_eq!(DrivePhase::at(30_000), DrivePhase::Braking);
        assert_eq!(DrivePhase::at(40_000), DrivePhase::Idle);
    }

    #[test]
    fn test_frames_are_five_hertz() {
        let mut telemetry = FakeTelemetry::new(0);
        let first = telemetry.next_frame();
        let second = telemetry.next_frame();
        assert_eq!(first.timestamp_ms("ts_ms"), Some(200));
        assert_eq!(second.timestamp_ms("ts_ms"), Some(400));
        assert_eq!(first.number("can_id"), 291.0);
        assert_eq!(first.get("raw_data"), Some(&serde_json::json!("01ABEF")));
    }

    #[test]
    fn test_full_cycle_shape() {
        let frames: Vec<Frame> = FakeTelemetry::new(0).take(200).collect();
        let at = |ts: i64| &frames[(ts / FRAME_INTERVAL_MS - 1) as usize];

        assert_eq!(at(9_800).number("vehicle_speed"), 0.0);
        // 50 acceleration steps: rpm hits its cap, speed does not
        let accelerated = at(19_800);
        assert_eq!(accelerated.number("vehicle_speed"), 25.0);
        assert_eq!(accelerated.number("rpm"), 4000.0);
        assert_eq!(at(25_000).number("vehicle_speed"), 30.0);
        assert_eq!(at(25_000).number("rpm"), 3500.0);
        // braking floors at zero
        assert_eq!(at(39_800).number("vehicle_speed"), 0.0);
        assert_eq!(at(39_800).number("rpm"), 0.0);
    }

    #[tokio::test]
    async fn test_feeder_stops_on_shutdown() {
        let stream = MemoryStream::new("can:frames");
        let (tx, rx) = watch::channel(false);
        let handle = spawn_feeder(stream.clone(), "payload".into(), FakeTelemetry::new(0), rx);

        tokio::time::sleep(Duration::from_millis(450)).await;
        tx.send(true).unwrap();
        let published = handle.await.unwrap();

        assert!(published >= 1);
        assert_eq!(stream.len() as u64, published);
    }
}
