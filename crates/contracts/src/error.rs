//! Layered error definitions
//!
//! Categorized by source: config / stream / sink

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Stream Errors =====
    /// Stream transport connection error
    #[error("stream '{stream}' connection error: {message}")]
    StreamConnection { stream: String, message: String },

    /// Consumer group creation failed for a reason other than "already exists"
    #[error("stream '{stream}' group '{group}' creation error: {message}")]
    GroupCreate {
        stream: String,
        group: String,
        message: String,
    },

    /// Batch read error
    #[error("stream '{stream}' read error: {message}")]
    StreamRead { stream: String, message: String },

    /// Acknowledgment error
    #[error("stream '{stream}' ack error for {count} entries: {message}")]
    StreamAck {
        stream: String,
        count: usize,
        message: String,
    },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink connection error
    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create stream read error
    pub fn stream_read(stream: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StreamRead {
            stream: stream.into(),
            message: message.into(),
        }
    }

    /// Create stream ack error
    pub fn stream_ack(stream: impl Into<String>, count: usize, message: impl Into<String>) -> Self {
        Self::StreamAck {
            stream: stream.into(),
            count,
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Whether the loop may keep running after this error
    pub fn is_transient(&self) -> bool {
        !matches!(
            self,
            Self::ConfigParse { .. } | Self::ConfigValidation { .. } | Self::GroupCreate { .. }
        )
    }
}
