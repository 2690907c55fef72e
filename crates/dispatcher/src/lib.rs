//! # Dispatcher
//!
//! Delivers the streamer's outgoing records to downstream sinks.
//!
//! Responsibilities:
//! - Build sinks from `[[sinks]]` configuration
//! - Fan each delivery unit out to every sink, in order
//! - Surface any sink failure so acknowledgment is withheld
//! - Per-sink write/failure counters
//!
//! ## Usage Example
//!
//! ```ignore
//! use dispatcher::create_dispatcher;
//!
//! let mut dispatcher = create_dispatcher(&config.sinks)?;
//! dispatcher.send(&records, session.as_str()).await?;
//! dispatcher.close().await?;
//! ```

mod dispatcher;
mod error;
mod metrics;
pub mod sinks;

// Re-exports
pub use dispatcher::{create_dispatcher, create_sink, AnySink, Dispatcher};
pub use error::DispatcherError;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{FileSink, FileSinkConfig, HttpSink, HttpSinkConfig, LogSink};
