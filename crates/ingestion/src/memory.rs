//! In-memory consumer-group stream
//!
//! Used for tests and for running without Redis. Mirrors the consumer-group
//! behaviour the streamer relies on: entries are delivered once, stay pending
//! until acknowledged, and a fresh consumer handle re-reads its pending
//! entries before new ones.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::{ContractError, Frame, StreamEntry, TelemetryStream};
use tokio::sync::Notify;
use tracing::{debug, instrument, trace};

use crate::metrics::StreamMetrics;

/// Entries are addressed by absolute position; `pruned` entries below the
/// first pending or undelivered one have been dropped from the front.
#[derive(Debug, Default)]
struct Log {
    entries: VecDeque<StreamEntry>,
    pruned: usize,
    positions: HashMap<String, usize>,
    next_undelivered: usize,
    pending: BTreeSet<usize>,
    acked: usize,
    group_created: bool,
    fail_reads: usize,
    fail_acks: usize,
}

/// Shared in-memory stream handle
///
/// Clones share the same log. Each handle is one consumer; use
/// [`MemoryStream::reconnect`] to simulate a restarted consumer.
#[derive(Debug, Clone)]
pub struct MemoryStream {
    name: String,
    log: Arc<Mutex<Log>>,
    notify: Arc<Notify>,
    metrics: Arc<StreamMetrics>,
    /// Position in the pending set while replaying pending entries
    pending_cursor: Option<usize>,
}

impl Log {
    fn total(&self) -> usize {
        self.pruned + self.entries.len()
    }

    fn entry(&self, position: usize) -> &StreamEntry {
        &self.entries[position - self.pruned]
    }

    /// Drop the delivered and acknowledged prefix
    fn prune(&mut self) {
        let floor = self
            .pending
            .first()
            .map_or(self.next_undelivered, |&p| p.min(self.next_undelivered));
        while self.pruned < floor {
            if let Some(entry) = self.entries.pop_front() {
                self.positions.remove(&entry.id);
            }
            self.pruned += 1;
        }
    }
}

fn lock(log: &Mutex<Log>) -> MutexGuard<'_, Log> {
    log.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStream {
    /// Create an empty stream
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            log: Arc::new(Mutex::new(Log::default())),
            notify: Arc::new(Notify::new()),
            metrics: Arc::new(StreamMetrics::new()),
            pending_cursor: Some(0),
        }
    }

    /// New consumer handle on the same log that replays pending entries first
    pub fn reconnect(&self) -> Self {
        Self {
            pending_cursor: Some(0),
            ..self.clone()
        }
    }

    /// Append raw fields, returning the entry id
    pub fn append(&self, fields: HashMap<String, String>) -> String {
        let id = {
            let mut log = lock(&self.log);
            let position = log.total();
            let id = format!("{}-0", position + 1);
            log.positions.insert(id.clone(), position);
            log.entries.push_back(StreamEntry::new(id.clone(), fields));
            id
        };
        self.metrics.record_published();
        self.notify.notify_one();
        trace!(stream = %self.name, id = %id, "Entry appended");
        id
    }

    /// Append a frame wrapped as JSON under `payload_field`
    pub fn append_payload(&self, payload_field: &str, frame: &Frame) -> String {
        let payload = serde_json::Value::Object(frame.as_map().clone()).to_string();
        let mut fields = HashMap::new();
        fields.insert(payload_field.to_string(), payload);
        self.append(fields)
    }

    /// Total entries ever appended
    pub fn len(&self) -> usize {
        lock(&self.log).total()
    }

    /// Entries still held in memory (not yet pruned)
    pub fn retained_count(&self) -> usize {
        lock(&self.log).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries delivered but not yet acknowledged
    pub fn pending_count(&self) -> usize {
        lock(&self.log).pending.len()
    }

    /// Entries acknowledged so far
    pub fn acked_count(&self) -> usize {
        lock(&self.log).acked
    }

    /// Entries never delivered to any consumer
    pub fn undelivered_count(&self) -> usize {
        let log = lock(&self.log);
        log.total() - log.next_undelivered
    }

    /// Whether `ensure_group` has run
    pub fn group_created(&self) -> bool {
        lock(&self.log).group_created
    }

    /// Make the next `n` reads fail
    pub fn fail_next_reads(&self, n: usize) {
        lock(&self.log).fail_reads = n;
    }

    /// Make the next `n` acknowledgments fail
    pub fn fail_next_acks(&self, n: usize) {
        lock(&self.log).fail_acks = n;
    }

    /// Transport counters
    pub fn metrics(&self) -> &StreamMetrics {
        &self.metrics
    }

    fn take_batch(&mut self, max_count: usize) -> Vec<StreamEntry> {
        let mut log = lock(&self.log);

        if let Some(cursor) = self.pending_cursor {
            let positions: Vec<usize> = log.pending.range(cursor..).take(max_count).copied().collect();
            match positions.last() {
                Some(&last) => {
                    self.pending_cursor = Some(last + 1);
                    debug!(stream = %self.name, count = positions.len(), "Replaying pending entries");
                    return positions.iter().map(|&p| log.entry(p).clone()).collect();
                }
                None => self.pending_cursor = None,
            }
        }

        let start = log.next_undelivered;
        let end = (start + max_count).min(log.total());
        let batch: Vec<StreamEntry> = (start..end).map(|p| log.entry(p).clone()).collect();
        log.pending.extend(start..end);
        log.next_undelivered = end;
        batch
    }

    fn check_injected_failure(&self, reads: bool) -> Result<(), ContractError> {
        let mut log = lock(&self.log);
        let remaining = if reads {
            &mut log.fail_reads
        } else {
            &mut log.fail_acks
        };
        if *remaining == 0 {
            return Ok(());
        }
        *remaining -= 1;

        if reads {
            self.metrics.record_read_error();
            Err(ContractError::stream_read(&self.name, "injected read failure"))
        } else {
            self.metrics.record_ack_error();
            Err(ContractError::stream_ack(&self.name, 0, "injected ack failure"))
        }
    }
}

impl TelemetryStream for MemoryStream {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_group(&mut self) -> Result<(), ContractError> {
        lock(&self.log).group_created = true;
        Ok(())
    }

    #[instrument(
        level = "trace",
        name = "memory_stream_read",
        skip(self),
        fields(stream = %self.name)
    )]
    async fn read_batch(
        &mut self,
        max_count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, ContractError> {
        self.check_injected_failure(true)?;

        // Register interest before checking so an append in between is not missed
        let notify = Arc::clone(&self.notify);
        let notified = notify.notified();

        let mut batch = self.take_batch(max_count);
        if batch.is_empty() && !block.is_zero() {
            let _ = tokio::time::timeout(block, notified).await;
            batch = self.take_batch(max_count);
        }

        self.metrics.record_read(batch.len());
        Ok(batch)
    }

    async fn ack(&mut self, ids: &[String]) -> Result<(), ContractError> {
        if ids.is_empty() {
            return Ok(());
        }
        self.check_injected_failure(false).map_err(|_| {
            ContractError::stream_ack(&self.name, ids.len(), "injected ack failure")
        })?;

        let mut log = lock(&self.log);
        let mut acked = 0;
        for id in ids {
            if let Some(&position) = log.positions.get(id) {
                if log.pending.remove(&position) {
                    acked += 1;
                }
            }
        }
        log.acked += acked;
        log.prune();
        drop(log);

        self.metrics.record_acked(acked);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(speed: &str) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        fields.insert("vehicle_speed".to_string(), speed.to_string());
        fields
    }

    fn ids(entries: &[StreamEntry]) -> Vec<String> {
        entries.iter().map(|e| e.id.clone()).collect()
    }

    #[tokio::test]
    async fn test_delivers_each_entry_once() {
        let mut stream = MemoryStream::new("can:frames");
        stream.ensure_group().await.unwrap();
        for speed in ["1", "2", "3"] {
            stream.append(fields(speed));
        }

        let first = stream.read_batch(2, Duration::ZERO).await.unwrap();
        let second = stream.read_batch(2, Duration::ZERO).await.unwrap();
        let third = stream.read_batch(2, Duration::ZERO).await.unwrap();

        assert_eq!(ids(&first), vec!["1-0", "2-0"]);
        assert_eq!(ids(&second), vec!["3-0"]);
        assert!(third.is_empty());
        assert_eq!(stream.pending_count(), 3);
        assert!(stream.group_created());
    }

    #[tokio::test]
    async fn test_ack_clears_pending() {
        let mut stream = MemoryStream::new("can:frames");
        stream.append(fields("1"));
        stream.append(fields("2"));
        let batch = stream.read_batch(10, Duration::ZERO).await.unwrap();

        stream.ack(&ids(&batch)).await.unwrap();
        assert_eq!(stream.pending_count(), 0);
        assert_eq!(stream.acked_count(), 2);

        // Acking again is harmless
        stream.ack(&ids(&batch)).await.unwrap();
        assert_eq!(stream.acked_count(), 2);
        assert_eq!(stream.metrics().snapshot().entries_acked, 2);
    }

    #[tokio::test]
    async fn test_reconnect_replays_pending_first() {
        let mut stream = MemoryStream::new("can:frames");
        for speed in ["1", "2", "3"] {
            stream.append(fields(speed));
        }
        let batch = stream.read_batch(2, Duration::ZERO).await.unwrap();
        stream.ack(&ids(&batch[..1])).await.unwrap();

        let mut restarted = stream.reconnect();
        let replay = restarted.read_batch(10, Duration::ZERO).await.unwrap();
        assert_eq!(ids(&replay), vec!["2-0"]);

        let fresh = restarted.read_batch(10, Duration::ZERO).await.unwrap();
        assert_eq!(ids(&fresh), vec!["3-0"]);
    }

    #[tokio::test]
    async fn test_acked_prefix_is_pruned() {
        let mut stream = MemoryStream::new("can:frames");
        for speed in ["1", "2", "3", "4"] {
            stream.append(fields(speed));
        }
        let batch = stream.read_batch(3, Duration::ZERO).await.unwrap();

        // "2-0" still pending holds back everything from it onwards
        stream.ack(&[batch[0].id.clone(), batch[2].id.clone()]).await.unwrap();
        assert_eq!(stream.retained_count(), 3);

        stream.ack(&[batch[1].id.clone()]).await.unwrap();
        assert_eq!(stream.retained_count(), 1);
        assert_eq!(stream.len(), 4);
        assert_eq!(stream.undelivered_count(), 1);

        stream.append(fields("5"));
        let rest = stream.read_batch(10, Duration::ZERO).await.unwrap();
        assert_eq!(ids(&rest), vec!["4-0", "5-0"]);
        stream.ack(&ids(&rest)).await.unwrap();
        assert_eq!(stream.retained_count(), 0);
        assert_eq!(stream.acked_count(), 5);
    }

    #[tokio::test]
    async fn test_blocking_read_wakes_on_append() {
        let mut stream = MemoryStream::new("can:frames");
        let producer = stream.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.append(fields("5"));
        });

        let batch = stream.read_batch(10, Duration::from_secs(5)).await.unwrap();
        handle.await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test]
    async fn test_blocking_read_times_out_empty() {
        let mut stream = MemoryStream::new("can:frames");
        let batch = stream.read_batch(10, Duration::from_millis(10)).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let mut stream = MemoryStream::new("can:frames");
        stream.append(fields("1"));
        stream.fail_next_reads(1);
        assert!(stream.read_batch(10, Duration::ZERO).await.is_err());
        let batch = stream.read_batch(10, Duration::ZERO).await.unwrap();

        stream.fail_next_acks(1);
        let err = stream.ack(&ids(&batch)).await.unwrap_err();
        assert!(err.to_string().contains("1 entries"));
        assert_eq!(stream.pending_count(), 1);
        stream.ack(&ids(&batch)).await.unwrap();
        assert_eq!(stream.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_append_payload_wraps_frame() {
        let mut stream = MemoryStream::new("can:frames");
        stream.append_payload("payload", &Frame::new().with("rpm", 800));
        let batch = stream.read_batch(1, Duration::ZERO).await.unwrap();
        assert_eq!(batch[0].fields.get("payload").map(String::as_str), Some(r#"{"rpm":800}"#));
    }
}
