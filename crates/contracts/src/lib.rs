//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the streamer workspace.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Frame timestamps are integer milliseconds since the Unix epoch (`ts_ms`)
//! - Grace-period deadlines are monotonic (`std::time::Instant`) and never leave the engine

mod config;
mod error;
mod frame;
mod record;
mod session_id;
mod sink;
mod stream;

pub use config::*;
pub use error::*;
pub use frame::*;
pub use record::*;
pub use session_id::SessionId;
pub use sink::*;
pub use stream::*;
