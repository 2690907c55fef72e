//! Drive session state machine.
//!
//! ```text
//!            active                    inactive
//!   IDLE ──────────────▶ ACTIVE ──────────────────▶ STOP_PENDING
//!    ▲   drive:start      ▲  │                          │  │
//!    │   + pre-roll       │  └── active: forward        │  │ grace expired
//!    │                    └──────── active ─────────────┘  │ drive:stop
//!    └─────────────────────────────────────────────────────┘
//! ```
//!
//! The machine owns the pre-roll window and the current session. It never
//! performs I/O; it returns the records to forward, each tagged with the
//! session it belongs to.

use std::time::{Duration, Instant};

use contracts::{
    ActivityConfig, BoundaryEvent, BoundaryKind, Frame, OutgoingRecord, SessionConfig, SessionId,
};
use tracing::{debug, info, instrument};

use crate::activity::is_active;
use crate::clock::ClockReading;
use crate::session_id::mint_session_id;
use crate::window::PreRollWindow;

/// Observable drive state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveState {
    /// Not driving; frames only feed the pre-roll window
    Idle,
    /// Driving; every frame is forwarded
    Active,
    /// Activity ceased; the session ends at `deadline` unless activity resumes
    ///
    /// `None` when the grace period reaches past the monotonic clock's range.
    StopPending { deadline: Option<Instant> },
}

impl DriveState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::StopPending { .. } => "stop_pending",
        }
    }

    /// Numeric code for the drive state gauge
    pub fn gauge_code(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Active => 1,
            Self::StopPending { .. } => 2,
        }
    }

    /// Whether a session is open
    pub fn is_driving(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

/// Internal state: a session exists exactly while driving
#[derive(Debug)]
enum Drive {
    Idle,
    Active {
        session: SessionId,
    },
    StopPending {
        session: SessionId,
        deadline: Option<Instant>,
    },
}

/// One outgoing record and the session it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct Emission {
    pub session: SessionId,
    pub record: OutgoingRecord,
}

/// Result of feeding the machine a frame or a timer tick
#[derive(Debug, Default)]
pub struct Step {
    /// Records to forward, in order
    pub emissions: Vec<Emission>,
    /// Boundary crossed during this step, if any
    pub boundary: Option<BoundaryKind>,
}

impl Step {
    /// Whether nothing is to be forwarded
    pub fn is_empty(&self) -> bool {
        self.emissions.is_empty()
    }

    /// Forwarded telemetry frames, in order
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.emissions.iter().filter_map(|e| e.record.as_frame())
    }

    /// Boundary events, in order
    pub fn events(&self) -> impl Iterator<Item = &BoundaryEvent> {
        self.emissions.iter().filter_map(|e| e.record.as_event())
    }

    fn forward(&mut self, session: &SessionId, frame: Frame) {
        self.emissions.push(Emission {
            session: session.clone(),
            record: OutgoingRecord::Frame(frame),
        });
    }

    fn boundary(
        &mut self,
        kind: BoundaryKind,
        session: &SessionId,
        device_id: &str,
        at: ClockReading,
    ) {
        self.boundary = Some(kind);
        self.emissions.push(Emission {
            session: session.clone(),
            record: OutgoingRecord::Event(BoundaryEvent {
                kind,
                session: session.clone(),
                timestamp_ms: at.epoch_ms,
                device_id: device_id.to_string(),
            }),
        });
        observability::record_boundary_event(kind);
    }
}

/// Session and drive-state owner
#[derive(Debug)]
pub struct SessionStateMachine {
    device_id: String,
    activity: ActivityConfig,
    grace: Duration,
    forward_trailing_inactive: bool,
    window: PreRollWindow,
    drive: Drive,
}

impl SessionStateMachine {
    /// Create a machine in `Idle` with an empty pre-roll window
    pub fn new(activity: ActivityConfig, session: &SessionConfig) -> Self {
        Self {
            device_id: session.device_id.clone(),
            activity,
            grace: session.grace_period(),
            forward_trailing_inactive: session.forward_trailing_inactive,
            window: PreRollWindow::new(session.pre_roll_ms()),
            drive: Drive::Idle,
        }
    }

    /// Current drive state
    pub fn state(&self) -> DriveState {
        match &self.drive {
            Drive::Idle => DriveState::Idle,
            Drive::Active { .. } => DriveState::Active,
            Drive::StopPending { deadline, .. } => DriveState::StopPending {
                deadline: *deadline,
            },
        }
    }

    /// Open session, if driving
    pub fn session(&self) -> Option<&SessionId> {
        match &self.drive {
            Drive::Idle => None,
            Drive::Active { session } | Drive::StopPending { session, .. } => Some(session),
        }
    }

    /// Pre-roll window (diagnostics)
    pub fn window(&self) -> &PreRollWindow {
        &self.window
    }

    /// Feed one frame with its resolved timestamp
    ///
    /// The frame always enters the pre-roll window first. On a drive start the
    /// drained window (which ends with this frame) is forwarded after the
    /// `drive:start` event.
    #[instrument(
        level = "trace",
        name = "state_machine_on_frame",
        skip(self, frame, at),
        fields(state = self.state().label())
    )]
    pub fn on_frame(&mut self, timestamp_ms: i64, frame: Frame, at: ClockReading) -> Step {
        let active = is_active(&frame, &self.activity);
        let mut step = Step::default();

        self.drive = match std::mem::replace(&mut self.drive, Drive::Idle) {
            Drive::Idle => {
                self.window.push(timestamp_ms, frame);
                if active {
                    let session = mint_session_id(&self.device_id, at.epoch_secs());
                    step.boundary(BoundaryKind::DriveStart, &session, &self.device_id, at);

                    let pre_roll = self.window.drain();
                    info!(
                        session = %session,
                        pre_roll_frames = pre_roll.len(),
                        trigger_ts_ms = timestamp_ms,
                        "Drive started"
                    );
                    for frame in pre_roll {
                        step.forward(&session, frame);
                    }
                    Drive::Active { session }
                } else {
                    Drive::Idle
                }
            }
            Drive::Active { session } => {
                self.window.push(timestamp_ms, frame.clone());
                step.forward(&session, frame);
                if active {
                    Drive::Active { session }
                } else {
                    let deadline = at.monotonic.checked_add(self.grace);
                    debug!(
                        session = %session,
                        grace_ms = self.grace.as_millis() as u64,
                        "Activity ceased, stop pending"
                    );
                    Drive::StopPending { session, deadline }
                }
            }
            Drive::StopPending { session, deadline } => {
                if active {
                    self.window.push(timestamp_ms, frame.clone());
                    step.forward(&session, frame);
                    debug!(session = %session, "Activity resumed within grace period");
                    Drive::Active { session }
                } else {
                    if self.forward_trailing_inactive {
                        self.window.push(timestamp_ms, frame.clone());
                        step.forward(&session, frame);
                    } else {
                        self.window.push(timestamp_ms, frame);
                    }
                    Drive::StopPending { session, deadline }
                }
            }
        };

        self.record_gauges();
        step
    }

    /// End the session if the grace deadline has passed
    ///
    /// Called once per loop iteration whether or not frames arrived.
    pub fn poll_timer(&mut self, at: ClockReading) -> Step {
        match &self.drive {
            Drive::StopPending {
                deadline: Some(deadline),
                ..
            } if at.monotonic >= *deadline => {
                self.stop(at, "grace period expired")
            }
            _ => Step::default(),
        }
    }

    /// Close an open session on process shutdown
    pub fn shutdown(&mut self, at: ClockReading) -> Step {
        if self.state().is_driving() {
            self.stop(at, "shutdown")
        } else {
            Step::default()
        }
    }

    fn stop(&mut self, at: ClockReading, reason: &'static str) -> Step {
        let mut step = Step::default();
        if let Drive::Active { session } | Drive::StopPending { session, .. } =
            std::mem::replace(&mut self.drive, Drive::Idle)
        {
            step.boundary(BoundaryKind::DriveStop, &session, &self.device_id, at);
            info!(session = %session, reason, "Drive stopped");
        }
        self.record_gauges();
        step
    }

    fn record_gauges(&self) {
        observability::record_drive_state(self.state().gauge_code());
        observability::record_pre_roll_depth(self.window.len());
    }
}
