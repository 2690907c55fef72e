//! Dispatcher - ordered fan-out of each delivery to every configured sink

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use contracts::{ContractError, OutgoingRecord, SinkConfig, SinkType, TelemetrySink};

use crate::error::DispatcherError;
use crate::metrics::{MetricsSnapshot, SinkMetrics};
use crate::sinks::{FileSink, HttpSink, LogSink};

/// One configured sink
pub enum AnySink {
    Log(LogSink),
    File(FileSink),
    Http(HttpSink),
}

impl TelemetrySink for AnySink {
    fn name(&self) -> &str {
        match self {
            Self::Log(sink) => sink.name(),
            Self::File(sink) => sink.name(),
            Self::Http(sink) => sink.name(),
        }
    }

    async fn send(
        &mut self,
        records: &[OutgoingRecord],
        partition_key: &str,
    ) -> Result<(), ContractError> {
        match self {
            Self::Log(sink) => sink.send(records, partition_key).await,
            Self::File(sink) => sink.send(records, partition_key).await,
            Self::Http(sink) => sink.send(records, partition_key).await,
        }
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        match self {
            Self::Log(sink) => sink.close().await,
            Self::File(sink) => sink.close().await,
            Self::Http(sink) => sink.close().await,
        }
    }
}

impl From<LogSink> for AnySink {
    fn from(sink: LogSink) -> Self {
        Self::Log(sink)
    }
}

impl From<FileSink> for AnySink {
    fn from(sink: FileSink) -> Self {
        Self::File(sink)
    }
}

impl From<HttpSink> for AnySink {
    fn from(sink: HttpSink) -> Self {
        Self::Http(sink)
    }
}

/// Create a sink from configuration
pub fn create_sink(config: &SinkConfig) -> Result<AnySink, DispatcherError> {
    let sink = match config.sink_type {
        SinkType::Log => LogSink::new(&config.name).into(),
        SinkType::File => FileSink::from_params(&config.name, &config.params)
            .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?
            .into(),
        SinkType::Http => HttpSink::from_params(&config.name, &config.params)
            .map_err(|e| DispatcherError::sink_creation(&config.name, e))?
            .into(),
    };

    debug!(sink = %config.name, sink_type = ?config.sink_type, "Sink created");
    Ok(sink)
}

/// Sends every delivery to each sink in configuration order
///
/// Stops at the first failing sink and returns its error, so the caller
/// withholds acknowledgment. Sinks that already accepted the delivery will
/// see it again on retry.
pub struct Dispatcher {
    sinks: Vec<(AnySink, Arc<SinkMetrics>)>,
}

impl Dispatcher {
    /// Create with pre-built sinks
    pub fn with_sinks(sinks: Vec<AnySink>) -> Self {
        Self {
            sinks: sinks
                .into_iter()
                .map(|sink| (sink, Arc::new(SinkMetrics::new())))
                .collect(),
        }
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|(sink, _)| sink.name()).collect()
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.sinks
            .iter()
            .map(|(sink, metrics)| (sink.name().to_string(), metrics.snapshot()))
            .collect()
    }
}

impl TelemetrySink for Dispatcher {
    fn name(&self) -> &str {
        "dispatcher"
    }

    #[instrument(
        name = "dispatcher_send",
        skip(self, records),
        fields(sinks = self.sinks.len(), records = records.len())
    )]
    async fn send(
        &mut self,
        records: &[OutgoingRecord],
        partition_key: &str,
    ) -> Result<(), ContractError> {
        if records.is_empty() {
            return Ok(());
        }

        for (sink, metrics) in &mut self.sinks {
            match sink.send(records, partition_key).await {
                Ok(()) => metrics.inc_write_count(records.len()),
                Err(e) => {
                    metrics.inc_failure_count();
                    warn!(sink = %sink.name(), error = %e, "Sink rejected delivery");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Closes every sink, returning the first error after trying all
    async fn close(&mut self) -> Result<(), ContractError> {
        let mut first_error = None;
        for (sink, _) in &mut self.sinks {
            if let Err(e) = sink.close().await {
                warn!(sink = %sink.name(), error = %e, "Close failed");
                first_error.get_or_insert(e);
            }
        }
        info!(sinks = self.sinks.len(), "Dispatcher closed");
        first_error.map_or(Ok(()), Err)
    }
}

/// Create a dispatcher from sink configurations
///
/// An empty list yields a single log sink.
#[instrument(name = "create_dispatcher", skip(sink_configs), fields(sink_count = sink_configs.len()))]
pub fn create_dispatcher(sink_configs: &[SinkConfig]) -> Result<Dispatcher, DispatcherError> {
    let sinks = if sink_configs.is_empty() {
        vec![AnySink::from(LogSink::new("log"))]
    } else {
        sink_configs
            .iter()
            .map(create_sink)
            .collect::<Result<Vec<_>, _>>()?
    };

    let dispatcher = Dispatcher::with_sinks(sinks);
    info!(sinks = ?dispatcher.sink_names(), "Dispatcher ready");
    Ok(dispatcher)
}
