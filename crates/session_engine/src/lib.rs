//! # Session Engine
//!
//! Drive-session detection over a telemetry stream.
//!
//! Responsibilities:
//! - Activity classification from loosely typed frames
//! - Time-bounded pre-roll window
//! - IDLE / ACTIVE / STOP_PENDING state machine with boundary events
//! - The ingest loop: read, classify, deliver, acknowledge
//!
//! ## Example
//!
//! ```ignore
//! use session_engine::Streamer;
//!
//! let mut streamer = Streamer::new(config, stream, sink);
//! streamer.start().await?;
//! streamer.run(shutdown_rx, None).await?;
//! println!("{}", streamer.stats().summary());
//! ```

mod activity;
mod clock;
mod error;
mod session_id;
mod state_machine;
mod streamer;
mod timestamp;
mod window;

pub use activity::is_active;
pub use clock::{Clock, ClockReading, ManualClock, SystemClock};
pub use error::{EngineError, Result};
pub use session_id::mint_session_id;
pub use state_machine::{DriveState, Emission, SessionStateMachine, Step};
pub use streamer::{DeliveryUnit, IterationReport, Outbox, Streamer, StreamerStats};
pub use timestamp::{resolve_timestamp, TimestampSource};
pub use window::PreRollWindow;
