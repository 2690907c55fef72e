//! Ingestion error types

use contracts::ContractError;
use thiserror::Error;

/// Ingestion errors outside the stream trait (connect, publish)
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Could not connect to the stream transport
    #[error("failed to connect to '{url}': {message}")]
    Connect {
        /// Transport URL
        url: String,
        /// Error message
        message: String,
    },

    /// Could not append an entry to the stream
    #[error("failed to publish to stream '{stream}': {message}")]
    Publish {
        /// Stream key
        stream: String,
        /// Error message
        message: String,
    },

    /// Frame could not be encoded as a payload
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<IngestionError> for ContractError {
    fn from(err: IngestionError) -> Self {
        match err {
            IngestionError::Connect { url, message } => ContractError::StreamConnection {
                stream: url,
                message,
            },
            other => ContractError::Other(other.to_string()),
        }
    }
}

/// Ingestion Result alias
pub type Result<T> = std::result::Result<T, IngestionError>;
