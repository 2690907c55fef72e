//! LogSink - logs delivery summaries via tracing

use contracts::{ContractError, OutgoingRecord, TelemetrySink};
use tracing::{info, instrument};

/// Sink that logs delivery summaries instead of forwarding anywhere
pub struct LogSink {
    name: String,
    deliveries: u64,
}

impl LogSink {
    /// Create a new LogSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            deliveries: 0,
        }
    }

    /// Deliveries logged so far
    pub fn deliveries(&self) -> u64 {
        self.deliveries
    }

    fn log_summary(&self, records: &[OutgoingRecord], partition_key: &str) {
        let frames = records.iter().filter(|r| r.as_frame().is_some()).count();
        let events: Vec<&str> = records
            .iter()
            .filter_map(OutgoingRecord::as_event)
            .map(|e| e.kind.as_str())
            .collect();

        info!(
            sink = %self.name,
            partition_key,
            records = records.len(),
            frames,
            events = ?events,
            "Delivery received"
        );
    }
}

impl TelemetrySink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "log_sink_send",
        skip(self, records),
        fields(sink = %self.name, records = records.len())
    )]
    async fn send(
        &mut self,
        records: &[OutgoingRecord],
        partition_key: &str,
    ) -> Result<(), ContractError> {
        if records.is_empty() {
            return Ok(());
        }
        self.log_summary(records, partition_key);
        self.deliveries += 1;
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, deliveries = self.deliveries, "LogSink closed");
        Ok(())
    }
}
