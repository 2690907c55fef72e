//! Redis Streams transport (consumer group)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use contracts::{ContractError, Frame, StreamConfig, StreamEntry, TelemetryStream};
use redis::aio::MultiplexedConnection;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, RedisError, Value};
use tracing::{debug, info, instrument, warn};

use crate::error::{IngestionError, Result};
use crate::metrics::StreamMetrics;

const NEW_ENTRIES: &str = ">";

/// Consumer-group reader over a Redis stream
///
/// After connecting, the consumer first replays its own pending entries
/// (delivered to this consumer name but never acknowledged), then switches to
/// new entries.
pub struct RedisStream {
    name: String,
    key: String,
    group: String,
    consumer: String,
    connection: MultiplexedConnection,
    metrics: Arc<StreamMetrics>,
    /// Last pending id replayed, `None` once caught up
    pending_cursor: Option<String>,
}

impl RedisStream {
    /// Connect using the stream settings
    #[instrument(name = "redis_stream_connect", skip(config), fields(url = %config.url))]
    pub async fn connect(config: &StreamConfig) -> Result<Self> {
        let connection = open_connection(&config.url).await?;
        info!(
            key = %config.key,
            group = %config.group,
            consumer = %config.consumer,
            "Connected to Redis"
        );
        Ok(Self {
            name: config.key.clone(),
            key: config.key.clone(),
            group: config.group.clone(),
            consumer: config.consumer.clone(),
            connection,
            metrics: Arc::new(StreamMetrics::new()),
            pending_cursor: Some("0".to_string()),
        })
    }

    /// Transport counters
    pub fn metrics(&self) -> &StreamMetrics {
        &self.metrics
    }

    async fn read_from(
        &mut self,
        id: &str,
        max_count: usize,
        block: Duration,
    ) -> std::result::Result<Vec<StreamEntry>, RedisError> {
        let mut options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(max_count);
        if id == NEW_ENTRIES && !block.is_zero() {
            options = options.block(block.as_millis() as usize);
        }

        let reply: Option<StreamReadReply> = self
            .connection
            .xread_options(&[self.key.as_str()], &[id], &options)
            .await?;

        let mut entries = Vec::new();
        for stream_key in reply.map(|r| r.keys).unwrap_or_default() {
            for stream_id in stream_key.ids {
                entries.push(StreamEntry::new(stream_id.id, decode_fields(stream_id.map)));
            }
        }
        Ok(entries)
    }
}

impl TelemetryStream for RedisStream {
    fn name(&self) -> &str {
        &self.name
    }

    /// `XGROUP CREATE <key> <group> $ MKSTREAM`, tolerating BUSYGROUP
    #[instrument(name = "redis_ensure_group", skip(self), fields(key = %self.key, group = %self.group))]
    async fn ensure_group(&mut self) -> std::result::Result<(), ContractError> {
        let result: std::result::Result<(), RedisError> = self
            .connection
            .xgroup_create_mkstream(&self.key, &self.group, "$")
            .await;

        match result {
            Ok(()) => {
                info!("Consumer group created");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!("Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(ContractError::GroupCreate {
                stream: self.key.clone(),
                group: self.group.clone(),
                message: e.to_string(),
            }),
        }
    }

    #[instrument(
        level = "debug",
        name = "redis_read_batch",
        skip(self),
        fields(key = %self.key, replaying = self.pending_cursor.is_some())
    )]
    async fn read_batch(
        &mut self,
        max_count: usize,
        block: Duration,
    ) -> std::result::Result<Vec<StreamEntry>, ContractError> {
        if let Some(cursor) = self.pending_cursor.clone() {
            let replay = self.read_from(&cursor, max_count, block).await.map_err(|e| {
                self.metrics.record_read_error();
                ContractError::stream_read(&self.key, e.to_string())
            })?;

            match replay.last() {
                Some(last) => {
                    debug!(count = replay.len(), "Replaying pending entries");
                    self.pending_cursor = Some(last.id.clone());
                    self.metrics.record_read(replay.len());
                    return Ok(replay);
                }
                None => {
                    info!("Pending entries replayed, reading new entries");
                    self.pending_cursor = None;
                }
            }
        }

        let entries = self
            .read_from(NEW_ENTRIES, max_count, block)
            .await
            .map_err(|e| {
                self.metrics.record_read_error();
                ContractError::stream_read(&self.key, e.to_string())
            })?;
        self.metrics.record_read(entries.len());
        Ok(entries)
    }

    async fn ack(&mut self, ids: &[String]) -> std::result::Result<(), ContractError> {
        if ids.is_empty() {
            return Ok(());
        }

        let result: std::result::Result<usize, RedisError> =
            self.connection.xack(&self.key, &self.group, ids).await;
        match result {
            Ok(acked) => {
                if acked != ids.len() {
                    warn!(requested = ids.len(), acked, "Some entries were already acknowledged");
                }
                self.metrics.record_acked(acked);
                Ok(())
            }
            Err(e) => {
                self.metrics.record_ack_error();
                Err(ContractError::stream_ack(&self.key, ids.len(), e.to_string()))
            }
        }
    }
}

/// Appends frames to a Redis stream (synthetic data, replays)
pub struct RedisPublisher {
    key: String,
    payload_field: String,
    connection: MultiplexedConnection,
    metrics: Arc<StreamMetrics>,
}

impl RedisPublisher {
    pub async fn connect(config: &StreamConfig) -> Result<Self> {
        Ok(Self {
            key: config.key.clone(),
            payload_field: config.payload_field.clone(),
            connection: open_connection(&config.url).await?,
            metrics: Arc::new(StreamMetrics::new()),
        })
    }

    /// `XADD <key> * <payload_field> <frame json>`, returning the entry id
    pub async fn publish(&mut self, frame: &Frame) -> Result<String> {
        let payload = serde_json::to_string(frame)?;
        let id: String = self
            .connection
            .xadd(&self.key, "*", &[(self.payload_field.as_str(), payload.as_str())])
            .await
            .map_err(|e| IngestionError::Publish {
                stream: self.key.clone(),
                message: e.to_string(),
            })?;
        self.metrics.record_published();
        Ok(id)
    }

    pub fn metrics(&self) -> &StreamMetrics {
        &self.metrics
    }
}

async fn open_connection(url: &str) -> Result<MultiplexedConnection> {
    let connect_err = |e: RedisError| IngestionError::Connect {
        url: url.to_string(),
        message: e.to_string(),
    };
    let client = redis::Client::open(url).map_err(connect_err)?;
    client
        .get_multiplexed_async_connection()
        .await
        .map_err(connect_err)
}

/// Redis field values to strings; non-string values are skipped
fn decode_fields(map: HashMap<String, Value>) -> HashMap<String, String> {
    map.into_iter()
        .filter_map(|(k, v)| redis::from_redis_value::<String>(&v).ok().map(|v| (k, v)))
        .collect()
}
