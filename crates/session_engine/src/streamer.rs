//! Ingest loop.
//!
//! One iteration reads a batch, runs every frame through the state machine,
//! hands the outgoing records to the sink and acknowledges the batch only if
//! every delivery unit went through. A failed delivery, or a failed ack of a
//! delivered batch, is kept and retried before anything new is read.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use contracts::{
    BoundaryKind, ContractError, OutgoingRecord, SessionId, StreamerConfig, TelemetrySink,
    TelemetryStream,
};
use ingestion::{normalize, Envelope};
use observability::StreamerMetricsAggregator;
use tokio::sync::watch;
use tracing::{debug, info, instrument, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::{EngineError, Result};
use crate::state_machine::{DriveState, SessionStateMachine, Step};
use crate::timestamp::{resolve_timestamp, TimestampSource};

/// Run statistics accumulated across iterations
pub type StreamerStats = StreamerMetricsAggregator;

/// Records sharing one partition key, sent in one `send` call
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryUnit {
    pub partition_key: SessionId,
    pub records: Vec<OutgoingRecord>,
}

/// Outgoing records of one iteration, grouped into delivery units
///
/// Consecutive records of the same session share a unit, so a batch that
/// stays within one session produces exactly one unit.
#[derive(Debug, Default)]
pub struct Outbox {
    units: VecDeque<DeliveryUnit>,
}

impl Outbox {
    /// Append every emission of a step
    pub fn extend(&mut self, step: Step) {
        for emission in step.emissions {
            match self.units.back_mut() {
                Some(unit) if unit.partition_key == emission.session => {
                    unit.records.push(emission.record)
                }
                _ => self.units.push_back(DeliveryUnit {
                    partition_key: emission.session,
                    records: vec![emission.record],
                }),
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Total records across units
    pub fn record_count(&self) -> usize {
        self.units.iter().map(|u| u.records.len()).sum()
    }

    pub fn units(&self) -> impl Iterator<Item = &DeliveryUnit> {
        self.units.iter()
    }
}

/// A delivery not yet fully accepted by the sink, with the entries it covers
///
/// An empty outbox means the records went through and only the ack is owed.
#[derive(Debug)]
struct PendingDelivery {
    outbox: Outbox,
    entry_ids: Vec<String>,
}

/// What one iteration did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IterationReport {
    /// Entries fetched from the stream
    pub entries_read: usize,
    /// Records accepted by the sink (frames and events)
    pub records_sent: usize,
    /// Telemetry frames among `records_sent`
    pub frames_forwarded: usize,
    /// Entries acknowledged
    pub acked: usize,
    /// Boundaries crossed, in order
    pub boundary_events: Vec<BoundaryKind>,
    /// A retained delivery was retried at the start of the iteration
    pub retried: bool,
    /// A delivery failed and is retained for the next iteration
    pub delivery_failed: bool,
}

impl IterationReport {
    /// Whether the iteration did anything worth logging
    pub fn has_activity(&self) -> bool {
        self.entries_read > 0 || self.records_sent > 0 || self.delivery_failed || self.retried
    }
}

/// Single sequential consumer: stream -> state machine -> sink -> ack
pub struct Streamer<S, K> {
    stream: S,
    sink: K,
    config: StreamerConfig,
    machine: SessionStateMachine,
    clock: Arc<dyn Clock>,
    pending: Option<PendingDelivery>,
    stats: StreamerStats,
}

impl<S, K> Streamer<S, K>
where
    S: TelemetryStream,
    K: TelemetrySink,
{
    /// Create a streamer on the system clock
    pub fn new(config: StreamerConfig, stream: S, sink: K) -> Self {
        let machine = SessionStateMachine::new(config.activity.clone(), &config.session);
        Self {
            stream,
            sink,
            config,
            machine,
            clock: Arc::new(SystemClock),
            pending: None,
            stats: StreamerStats::new(),
        }
    }

    /// Replace the clock (tests, replays)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> DriveState {
        self.machine.state()
    }

    /// Open session, if driving
    pub fn session(&self) -> Option<&SessionId> {
        self.machine.session()
    }

    pub fn stats(&self) -> &StreamerStats {
        &self.stats
    }

    /// Whether a failed delivery is waiting to be retried
    pub fn has_pending_delivery(&self) -> bool {
        self.pending.is_some()
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Create the consumer group if needed
    #[instrument(name = "streamer_start", skip(self), fields(stream = self.stream.name()))]
    pub async fn start(&mut self) -> Result<()> {
        self.stream
            .ensure_group()
            .await
            .map_err(EngineError::Startup)?;
        info!(
            stream = self.stream.name(),
            sink = self.sink.name(),
            device_id = %self.config.session.device_id,
            pre_roll_ms = self.machine.window().horizon_ms(),
            grace_s = self.config.session.inactive_grace_seconds,
            "Streamer started"
        );
        Ok(())
    }

    /// Run one iteration of the loop
    ///
    /// # Errors
    /// Stream read or acknowledgment failures. Sink failures are reported
    /// through `IterationReport::delivery_failed` instead.
    pub async fn run_iteration(&mut self) -> Result<IterationReport> {
        let mut report = IterationReport::default();
        self.stats.iterations += 1;

        if let Some(mut retained) = self.pending.take() {
            report.retried = true;
            if !self.deliver(&mut retained, &mut report).await {
                // The grace timer keeps running during a sink outage; a stop
                // is queued behind the retained records
                let expired = self.machine.poll_timer(self.clock.now());
                self.absorb(expired, &mut retained.outbox, &mut report);
                self.pending = Some(retained);
                self.idle().await;
                return Ok(report);
            }
            report.acked += self.settle(retained).await?;
        }

        let entries = match self
            .stream
            .read_batch(self.config.stream.batch_size, self.config.stream.block())
            .await
        {
            Ok(entries) => entries,
            Err(e) => {
                observability::record_stream_error(self.stream.name(), "read");
                return Err(EngineError::Read(e));
            }
        };
        report.entries_read = entries.len();
        self.stats.entries_read += entries.len() as u64;
        if !entries.is_empty() {
            observability::record_entries_read(self.stream.name(), entries.len());
        }

        let mut outbox = Outbox::default();
        let expired = self.machine.poll_timer(self.clock.now());
        self.absorb(expired, &mut outbox, &mut report);

        if entries.is_empty() && outbox.is_empty() {
            self.idle().await;
            return Ok(report);
        }

        let mut entry_ids = Vec::with_capacity(entries.len());
        for entry in entries {
            let (mut frame, envelope) = normalize(&entry.fields, &self.config.stream.payload_field);
            if envelope == Envelope::RawFallback {
                debug!(entry_id = %entry.id, "Payload is not a JSON object, using raw fields");
            }

            let at = self.clock.now();
            let (timestamp_ms, source) =
                resolve_timestamp(&mut frame, &self.config.activity.timestamp_field, at.epoch_ms);
            if source == TimestampSource::ReceiptTime {
                trace!(entry_id = %entry.id, "No timestamp, using receipt time");
            }

            let step = self.machine.on_frame(timestamp_ms, frame, at);
            self.absorb(step, &mut outbox, &mut report);
            entry_ids.push(entry.id);
        }

        let mut delivery = PendingDelivery { outbox, entry_ids };
        if self.deliver(&mut delivery, &mut report).await {
            report.acked += self.settle(delivery).await?;
        } else {
            self.pending = Some(delivery);
        }

        Ok(report)
    }

    /// Loop until shutdown is signalled or `max_iterations` is reached, then
    /// close the open session and the sink
    pub async fn run(
        &mut self,
        shutdown: watch::Receiver<bool>,
        max_iterations: Option<u64>,
    ) -> Result<()> {
        let mut completed = 0u64;
        loop {
            if *shutdown.borrow() {
                info!("Shutdown requested");
                break;
            }
            if max_iterations.is_some_and(|max| completed >= max) {
                info!(iterations = completed, "Iteration limit reached");
                break;
            }

            match self.run_iteration().await {
                Ok(report) if report.has_activity() => {
                    debug!(
                        entries = report.entries_read,
                        sent = report.records_sent,
                        acked = report.acked,
                        state = self.state().label(),
                        "Iteration complete"
                    );
                }
                Ok(_) => {}
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Iteration failed, continuing");
                    self.idle().await;
                }
                Err(e) => {
                    if let Err(close_err) = self.finish().await {
                        warn!(error = %close_err, "Shutdown after fatal error failed");
                    }
                    return Err(e);
                }
            }
            completed += 1;
        }

        self.finish().await
    }

    /// Emit the final `drive:stop` if driving, then close the sink
    ///
    /// Delivery here is best-effort: failures are logged, never returned.
    /// Entries left unacknowledged are redelivered on the next start.
    #[instrument(name = "streamer_finish", skip(self))]
    pub async fn finish(&mut self) -> Result<()> {
        let mut report = IterationReport::default();

        if let Some(mut retained) = self.pending.take() {
            if self.deliver(&mut retained, &mut report).await {
                if let Err(e) = self.acknowledge(&retained.entry_ids).await {
                    warn!(error = %e, "Final acknowledgment failed");
                }
            } else {
                warn!(
                    entries = retained.entry_ids.len(),
                    "Retained delivery still failing, entries left pending"
                );
            }
        }

        let mut outbox = Outbox::default();
        let stop = self.machine.shutdown(self.clock.now());
        self.absorb(stop, &mut outbox, &mut report);
        let mut delivery = PendingDelivery {
            outbox,
            entry_ids: Vec::new(),
        };
        if !self.deliver(&mut delivery, &mut report).await {
            warn!("Final drive:stop could not be delivered");
        }

        self.sink.close().await.map_err(EngineError::SinkClose)?;
        info!(
            iterations = self.stats.iterations,
            entries_read = self.stats.entries_read,
            entries_acked = self.stats.entries_acked,
            sessions = self.stats.sessions_started,
            "Streamer stopped"
        );
        Ok(())
    }

    fn absorb(&mut self, step: Step, outbox: &mut Outbox, report: &mut IterationReport) {
        if let Some(kind) = step.boundary {
            report.boundary_events.push(kind);
            self.stats.add_boundary(kind);
        }
        outbox.extend(step);
    }

    /// Send every unit in order, dropping each from the delivery once accepted
    ///
    /// Returns `false` on the first failure; the unsent remainder stays in
    /// `delivery`.
    async fn deliver(&mut self, delivery: &mut PendingDelivery, report: &mut IterationReport) -> bool {
        while let Some(unit) = delivery.outbox.units.front() {
            let started = Instant::now();
            let result = self
                .sink
                .send(&unit.records, unit.partition_key.as_str())
                .await;
            observability::record_delivery(self.sink.name(), result.is_ok());

            if let Err(e) = result {
                self.on_delivery_failure(&e, unit, report);
                return false;
            }

            let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
            observability::record_send_latency_ms(latency_ms);
            self.stats.send_latency_ms.push(latency_ms);

            let frames = unit.records.iter().filter(|r| r.as_frame().is_some()).count();
            report.records_sent += unit.records.len();
            report.frames_forwarded += frames;
            self.stats.frames_forwarded += frames as u64;
            observability::record_frames_forwarded(frames);

            delivery.outbox.units.pop_front();
        }
        true
    }

    fn on_delivery_failure(
        &mut self,
        error: &ContractError,
        unit: &DeliveryUnit,
        report: &mut IterationReport,
    ) {
        warn!(
            sink = self.sink.name(),
            partition_key = %unit.partition_key,
            records = unit.records.len(),
            error = %error,
            "Delivery failed, batch left unacknowledged"
        );
        report.delivery_failed = true;
        self.stats.delivery_failures += 1;
    }

    /// Ack a fully delivered batch; on failure its ids are retained so the
    /// next iteration acks them before reading
    async fn settle(&mut self, delivery: PendingDelivery) -> Result<usize> {
        match self.acknowledge(&delivery.entry_ids).await {
            Ok(acked) => Ok(acked),
            Err(e) => {
                warn!(
                    entries = delivery.entry_ids.len(),
                    error = %e,
                    "Acknowledgment failed, retrying next iteration"
                );
                self.pending = Some(PendingDelivery {
                    outbox: Outbox::default(),
                    entry_ids: delivery.entry_ids,
                });
                Err(e)
            }
        }
    }

    async fn acknowledge(&mut self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        if let Err(e) = self.stream.ack(ids).await {
            observability::record_stream_error(self.stream.name(), "ack");
            return Err(EngineError::Ack(e));
        }
        observability::record_entries_acked(self.stream.name(), ids.len());
        self.stats.entries_acked += ids.len() as u64;
        Ok(ids.len())
    }

    async fn idle(&self) {
        let pause = self.config.stream.idle_sleep();
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use contracts::{BoundaryEvent, Frame};
    use ingestion::MemoryStream;
    use std::sync::Mutex;
    use std::time::Duration;

    const T0: i64 = 1_700_000_000_000;

    /// Sink that records every delivery and can be told to fail
    #[derive(Clone, Default)]
    struct RecordingSink {
        sent: Arc<Mutex<Vec<(String, Vec<OutgoingRecord>)>>>,
        fail: Arc<Mutex<bool>>,
        closed: Arc<Mutex<bool>>,
    }

    impl RecordingSink {
        fn set_failing(&self, failing: bool) {
            *self.fail.lock().unwrap() = failing;
        }

        fn deliveries(&self) -> Vec<(String, Vec<OutgoingRecord>)> {
            self.sent.lock().unwrap().clone()
        }

        fn records(&self) -> Vec<OutgoingRecord> {
            self.deliveries()
                .into_iter()
                .flat_map(|(_, records)| records)
                .collect()
        }
    }

    impl TelemetrySink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(
            &mut self,
            records: &[OutgoingRecord],
            partition_key: &str,
        ) -> std::result::Result<(), ContractError> {
            if *self.fail.lock().unwrap() {
                return Err(ContractError::sink_write("recording", "unavailable"));
            }
            if !records.is_empty() {
                self.sent
                    .lock()
                    .unwrap()
                    .push((partition_key.to_string(), records.to_vec()));
            }
            Ok(())
        }

        async fn close(&mut self) -> std::result::Result<(), ContractError> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    fn config() -> StreamerConfig {
        let mut config = StreamerConfig::default();
        config.stream.block_ms = 5;
        config.stream.idle_sleep_ms = 0;
        config.session.device_id = "pi-01".into();
        config.session.pre_roll_seconds = 1.0;
        config.session.inactive_grace_seconds = 10.0;
        config
    }

    fn frame(ts: i64, speed: f64) -> Frame {
        Frame::new()
            .with("ts_ms", ts)
            .with("vehicle_speed", speed.to_string())
            .with("rpm", "0")
    }

    fn setup() -> (
        Streamer<MemoryStream, RecordingSink>,
        MemoryStream,
        RecordingSink,
        ManualClock,
    ) {
        let stream = MemoryStream::new("can:frames");
        let sink = RecordingSink::default();
        let clock = ManualClock::starting_at(T0);
        let streamer = Streamer::new(config(), stream.clone(), sink.clone())
            .with_clock(Arc::new(clock.clone()));
        (streamer, stream, sink, clock)
    }

    fn events(records: &[OutgoingRecord]) -> Vec<&BoundaryEvent> {
        records.iter().filter_map(|r| r.as_event()).collect()
    }

    #[tokio::test]
    async fn test_empty_iteration_acks_nothing() {
        let (mut streamer, stream, sink, _clock) = setup();
        streamer.start().await.unwrap();

        let report = streamer.run_iteration().await.unwrap();
        assert_eq!(report, IterationReport::default());
        assert!(sink.deliveries().is_empty());
        assert_eq!(stream.acked_count(), 0);
    }

    #[tokio::test]
    async fn test_idle_batch_is_acked_without_sending() {
        let (mut streamer, stream, sink, _clock) = setup();
        for ts in [0, 200, 400] {
            stream.append_payload("payload", &frame(ts, 0.0));
        }

        let report = streamer.run_iteration().await.unwrap();
        assert_eq!(report.entries_read, 3);
        assert_eq!(report.acked, 3);
        assert_eq!(report.records_sent, 0);
        assert!(sink.deliveries().is_empty());
        assert_eq!(stream.pending_count(), 0);
        assert_eq!(streamer.state(), DriveState::Idle);
    }

    #[tokio::test]
    async fn test_drive_start_batch_is_one_unit_tagged_with_session() {
        let (mut streamer, stream, sink, _clock) = setup();
        for ts in [0, 600, 1200] {
            stream.append_payload("payload", &frame(ts, 0.0));
        }
        stream.append_payload("payload", &frame(1400, 5.0));

        let report = streamer.run_iteration().await.unwrap();
        assert_eq!(report.boundary_events, vec![BoundaryKind::DriveStart]);
        assert_eq!(report.acked, 4);

        let deliveries = sink.deliveries();
        assert_eq!(deliveries.len(), 1);
        let session = streamer.session().unwrap().to_string();
        assert_eq!(deliveries[0].0, session);

        let records = &deliveries[0].1;
        assert_eq!(events(records).len(), 1);
        let timestamps: Vec<i64> = records
            .iter()
            .filter_map(|r| r.as_frame())
            .filter_map(|f| f.timestamp_ms("ts_ms"))
            .collect();
        assert_eq!(timestamps, vec![600, 1200, 1400]);
    }

    #[tokio::test]
    async fn test_sink_failure_withholds_ack_then_retries() {
        let (mut streamer, stream, sink, _clock) = setup();
        stream.append_payload("payload", &frame(0, 5.0));
        stream.append_payload("payload", &frame(200, 5.0));

        sink.set_failing(true);
        let report = streamer.run_iteration().await.unwrap();
        assert!(report.delivery_failed);
        assert_eq!(report.acked, 0);
        assert_eq!(stream.pending_count(), 2);
        assert!(streamer.has_pending_delivery());

        // Still failing: no new read, nothing acked
        stream.append_payload("payload", &frame(400, 5.0));
        let report = streamer.run_iteration().await.unwrap();
        assert!(report.retried && report.delivery_failed);
        assert_eq!(report.entries_read, 0);
        assert_eq!(stream.pending_count(), 2);

        sink.set_failing(false);
        let report = streamer.run_iteration().await.unwrap();
        assert!(report.retried);
        assert!(!report.delivery_failed);
        // 2 retained + 1 new
        assert_eq!(report.acked, 3);
        assert_eq!(stream.acked_count(), 3);
        assert_eq!(stream.pending_count(), 0);
        assert_eq!(events(&sink.records()).len(), 1);
        assert_eq!(streamer.stats().entries_acked, 3);
        assert_eq!(streamer.stats().delivery_failures, 2);
    }

    #[tokio::test]
    async fn test_failed_ack_is_retried_before_reading() {
        let (mut streamer, stream, sink, _clock) = setup();
        stream.append_payload("payload", &frame(0, 5.0));

        stream.fail_next_acks(1);
        let err = streamer.run_iteration().await.unwrap_err();
        assert!(matches!(err, EngineError::Ack(_)));
        assert!(err.is_transient());
        assert_eq!(sink.deliveries().len(), 1);
        assert_eq!(stream.pending_count(), 1);
        assert!(streamer.has_pending_delivery());

        stream.append_payload("payload", &frame(200, 5.0));
        let report = streamer.run_iteration().await.unwrap();
        assert!(report.retried);
        // 1 owed ack + 1 new entry
        assert_eq!(report.acked, 2);
        assert_eq!(stream.pending_count(), 0);
        assert_eq!(stream.acked_count(), 2);
        assert!(!streamer.has_pending_delivery());

        // Records of the first batch were not sent twice
        let records = sink.records();
        assert_eq!(events(&records).len(), 1);
        assert_eq!(records.iter().filter(|r| r.as_frame().is_some()).count(), 2);
    }

    #[tokio::test]
    async fn test_grace_timer_runs_during_sink_outage() {
        let (mut streamer, stream, sink, clock) = setup();
        stream.append_payload("payload", &frame(0, 5.0));
        streamer.run_iteration().await.unwrap();

        sink.set_failing(true);
        stream.append_payload("payload", &frame(200, 0.0));
        streamer.run_iteration().await.unwrap();
        assert!(streamer.has_pending_delivery());
        assert!(matches!(streamer.state(), DriveState::StopPending { .. }));

        clock.advance(Duration::from_secs(11));
        let stopped_at = clock.now().epoch_ms;
        let report = streamer.run_iteration().await.unwrap();
        assert!(report.delivery_failed);
        assert_eq!(report.boundary_events, vec![BoundaryKind::DriveStop]);
        assert_eq!(streamer.state(), DriveState::Idle);

        clock.advance(Duration::from_secs(30));
        sink.set_failing(false);
        let report = streamer.run_iteration().await.unwrap();
        assert_eq!(report.acked, 1);

        let records = sink.records();
        let stop_ts = events(&records)
            .into_iter()
            .find(|e| e.kind == BoundaryKind::DriveStop)
            .map(|e| e.timestamp_ms);
        assert_eq!(stop_ts, Some(stopped_at));
        // the stop follows the retained frame
        assert!(records.last().unwrap().as_event().is_some());
    }

    #[tokio::test]
    async fn test_timer_emits_stop_without_frames() {
        let (mut streamer, stream, sink, clock) = setup();
        stream.append_payload("payload", &frame(0, 5.0));
        stream.append_payload("payload", &frame(200, 0.0));
        streamer.run_iteration().await.unwrap();
        assert!(matches!(streamer.state(), DriveState::StopPending { .. }));

        clock.advance(Duration::from_secs(10));
        let report = streamer.run_iteration().await.unwrap();
        assert_eq!(report.entries_read, 0);
        assert_eq!(report.boundary_events, vec![BoundaryKind::DriveStop]);
        assert_eq!(report.acked, 0);
        assert_eq!(streamer.state(), DriveState::Idle);

        let records = sink.records();
        let kinds: Vec<_> = events(&records).iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![BoundaryKind::DriveStart, BoundaryKind::DriveStop]);
    }

    #[tokio::test]
    async fn test_stop_and_restart_in_one_batch_split_units() {
        let (mut streamer, stream, sink, clock) = setup();
        stream.append_payload("payload", &frame(0, 5.0));
        stream.append_payload("payload", &frame(200, 0.0));
        streamer.run_iteration().await.unwrap();
        let first = streamer.session().cloned().unwrap();

        clock.advance(Duration::from_secs(11));
        stream.append_payload("payload", &frame(11_200, 5.0));
        streamer.run_iteration().await.unwrap();
        let second = streamer.session().cloned().unwrap();
        assert_ne!(first, second);

        let deliveries = sink.deliveries();
        let keys: Vec<&str> = deliveries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            keys,
            vec![first.as_str(), first.as_str(), second.as_str()]
        );
    }

    #[tokio::test]
    async fn test_raw_fields_and_receipt_time_fallbacks() {
        let (mut streamer, stream, sink, _clock) = setup();
        let mut fields = std::collections::HashMap::new();
        fields.insert("vehicle_speed".to_string(), "12".to_string());
        stream.append(fields);

        streamer.run_iteration().await.unwrap();
        let records = sink.records();
        let frame = records.iter().find_map(|r| r.as_frame()).unwrap();
        assert_eq!(frame.timestamp_ms("ts_ms"), Some(T0));
    }

    #[tokio::test]
    async fn test_run_until_shutdown_emits_final_stop() {
        let (mut streamer, stream, sink, _clock) = setup();
        stream.append_payload("payload", &frame(0, 5.0));

        let (tx, rx) = watch::channel(false);
        streamer.run(rx.clone(), Some(3)).await.unwrap();
        let kinds: Vec<_> = events(&sink.records()).iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![BoundaryKind::DriveStart, BoundaryKind::DriveStop]);
        assert!(*sink.closed.lock().unwrap());

        // Already signalled: no iterations at all
        tx.send(true).unwrap();
        let before = streamer.stats().iterations;
        streamer.run(rx, None).await.unwrap();
        assert_eq!(streamer.stats().iterations, before);
    }

    #[tokio::test]
    async fn test_read_error_is_transient() {
        let (mut streamer, stream, _sink, _clock) = setup();
        stream.fail_next_reads(1);
        let err = streamer.run_iteration().await.unwrap_err();
        assert!(matches!(err, EngineError::Read(_)));
        assert!(err.is_transient());
        assert!(streamer.run_iteration().await.is_ok());
    }

    #[test]
    fn test_outbox_groups_consecutive_sessions() {
        use crate::state_machine::Emission;

        let a = SessionId::from("a");
        let b = SessionId::from("b");
        let emission = |session: &SessionId| Emission {
            session: session.clone(),
            record: OutgoingRecord::Frame(Frame::new()),
        };

        let mut outbox = Outbox::default();
        outbox.extend(Step {
            emissions: vec![emission(&a), emission(&a), emission(&b), emission(&a)],
            boundary: None,
        });

        let keys: Vec<&str> = outbox.units().map(|u| u.partition_key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "a"]);
        assert_eq!(outbox.record_count(), 4);
    }
}
