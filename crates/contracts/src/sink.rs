//! TelemetrySink trait - downstream delivery interface
//!
//! Retries and batching limits are the sink's own concern. The streamer only
//! sees success or failure of one delivery unit.

use crate::{ContractError, OutgoingRecord};

/// Delivery sink trait
///
/// All sink implementations must implement this trait.
#[trait_variant::make(TelemetrySink: Send)]
pub trait LocalTelemetrySink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Deliver one ordered unit of records under a single partition key
    ///
    /// An empty slice is a successful no-op.
    ///
    /// # Errors
    /// Any unrecoverable delivery failure. It must not be swallowed: the
    /// caller withholds acknowledgment of the source entries on error.
    async fn send(
        &mut self,
        records: &[OutgoingRecord],
        partition_key: &str,
    ) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
