//! Sink implementations
//!
//! Contains LogSink, FileSink, and HttpSink.

mod file;
mod http;
mod log;

pub use self::file::{FileSink, FileSinkConfig};
pub use self::http::{HttpSink, HttpSinkConfig};
pub use self::log::LogSink;
