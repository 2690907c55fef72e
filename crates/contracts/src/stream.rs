//! TelemetryStream trait - upstream consumer-group interface

use std::collections::HashMap;
use std::time::Duration;

use crate::ContractError;

/// One entry read from the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Transport entry id (e.g. `1700000000000-0`)
    pub id: String,

    /// Raw fields as written by the producer
    pub fields: HashMap<String, String>,
}

impl StreamEntry {
    /// Create a new entry
    pub fn new(id: impl Into<String>, fields: HashMap<String, String>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }
}

/// Durable stream read through a consumer group
#[trait_variant::make(TelemetryStream: Send)]
pub trait LocalTelemetryStream {
    /// Stream name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Create the consumer group if it does not exist yet
    ///
    /// Safe to call on every startup.
    ///
    /// # Errors
    /// Any transport error other than "group already exists".
    async fn ensure_group(&mut self) -> Result<(), ContractError>;

    /// Read up to `max_count` entries, blocking at most `block`
    ///
    /// Returns an empty batch on timeout.
    async fn read_batch(
        &mut self,
        max_count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, ContractError>;

    /// Mark entries as consumed. An empty slice is a no-op.
    async fn ack(&mut self, ids: &[String]) -> Result<(), ContractError>;
}
