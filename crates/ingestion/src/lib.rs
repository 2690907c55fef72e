//! # Ingestion
//!
//! Upstream stream transports for the streamer.
//!
//! Responsibilities:
//! - Consumer-group stream readers behind `contracts::TelemetryStream`
//!   (in-memory, and Redis Streams with the `redis` feature)
//! - Envelope normalisation: JSON payload field or raw fields
//! - Synthetic telemetry for running without a vehicle
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{MemoryStream, FakeTelemetry, spawn_feeder};
//!
//! let stream = MemoryStream::new("can:frames");
//! let feeder = spawn_feeder(stream.clone(), "payload".into(), FakeTelemetry::starting_now(), shutdown_rx);
//!
//! let batch = stream.clone().read_batch(100, Duration::from_secs(2)).await?;
//! for entry in batch {
//!     let (frame, envelope) = ingestion::normalize(&entry.fields, "payload");
//! }
//! ```
//!
//! ## Redis
//!
//! ```ignore
//! use ingestion::RedisStream;
//!
//! let mut stream = RedisStream::connect(&config.stream).await?;
//! stream.ensure_group().await?;
//! ```

mod envelope;
mod error;
mod generator;
mod memory;
mod metrics;
#[cfg(feature = "redis")]
mod redis_stream;

// Re-exports
pub use envelope::{normalize, Envelope};
pub use error::{IngestionError, Result};
pub use generator::{spawn_feeder, DrivePhase, FakeTelemetry, FRAME_INTERVAL_MS, PHASE_MS};
pub use memory::MemoryStream;
pub use metrics::{StreamMetrics, StreamMetricsSnapshot};
#[cfg(feature = "redis")]
pub use redis_stream::{RedisPublisher, RedisStream};
