//! Outgoing records - what the streamer hands to sinks
//!
//! Boundary events are synthetic records, not telemetry frames.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Frame, SessionId};

/// Boundary event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundaryKind {
    /// IDLE -> ACTIVE
    #[serde(rename = "drive:start")]
    DriveStart,
    /// Grace period expired, or shutdown while driving
    #[serde(rename = "drive:stop")]
    DriveStop,
}

impl BoundaryKind {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DriveStart => "drive:start",
            Self::DriveStop => "drive:stop",
        }
    }
}

impl fmt::Display for BoundaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session boundary event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryEvent {
    #[serde(rename = "type")]
    pub kind: BoundaryKind,

    /// Session the boundary belongs to
    pub session: SessionId,

    /// Wall-clock emission time (ms since epoch)
    pub timestamp_ms: i64,

    /// Stable device identifier
    pub device_id: String,
}

/// A record handed to a sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutgoingRecord {
    Event(BoundaryEvent),
    Frame(Frame),
}

impl OutgoingRecord {
    /// Boundary event, if this record is one
    pub fn as_event(&self) -> Option<&BoundaryEvent> {
        match self {
            Self::Event(event) => Some(event),
            Self::Frame(_) => None,
        }
    }

    /// Telemetry frame, if this record is one
    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            Self::Frame(frame) => Some(frame),
            Self::Event(_) => None,
        }
    }
}

impl From<BoundaryEvent> for OutgoingRecord {
    fn from(event: BoundaryEvent) -> Self {
        Self::Event(event)
    }
}

impl From<Frame> for OutgoingRecord {
    fn from(frame: Frame) -> Self {
        Self::Frame(frame)
    }
}
