//! Engine error types

use contracts::ContractError;
use thiserror::Error;

/// Errors surfaced by the ingest loop
///
/// Sink delivery failures are not errors here: they are retained and retried
/// by the loop itself.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Consumer group setup failed
    #[error("startup failed: {0}")]
    Startup(#[source] ContractError),

    /// Batch read failed
    #[error("stream read failed: {0}")]
    Read(#[source] ContractError),

    /// Acknowledgment failed after a successful delivery
    #[error("acknowledgment failed: {0}")]
    Ack(#[source] ContractError),

    /// Sink close failed on shutdown
    #[error("sink close failed: {0}")]
    SinkClose(#[source] ContractError),
}

impl EngineError {
    /// Whether the loop should keep running after this error
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Read(source) | Self::Ack(source) => source.is_transient(),
            Self::Startup(_) | Self::SinkClose(_) => false,
        }
    }
}

/// Engine Result alias
pub type Result<T> = std::result::Result<T, EngineError>;
