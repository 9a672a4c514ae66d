//! Log Processor (component C9): the Interaction Queue's single consumer.
//! Drains events in batches, folds them into per-interaction records,
//! writes through to the store, and retries on the registry's perf-window
//! and breaker state for terminal outcomes (spec §4.9).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use coordinator_core::clock::request_digest;
use coordinator_core::model::{InteractionRecord, InteractionState, ProgressEvent};
use coordinator_core::Clock;
use coordinator_registry::RegistryStore;
use coordinator_routing::breaker::{self, BreakerConfig};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::store::{append_dead_letter, DeadLetterEntry, Store};
use crate::types::{InteractionEvent, QueuedEvent};

/// Drain up to this many events per batch (spec §4.9).
pub const BATCH_MAX: usize = 100;
/// ...or wait at most this long for the batch to fill (spec §4.9).
pub const BATCH_WAIT: Duration = Duration::from_secs(1);
/// How long an out-of-order progress event waits for its `start` before
/// being dropped (spec §4.9: "buffer up to 5s awaiting start, then drop").
pub const PENDING_PROGRESS_TTL: Duration = Duration::from_secs(5);
/// Store-write attempts before an event is dead-lettered (spec §4 failure
/// table: "batch retried with backoff 3x").
pub const STORE_RETRY_ATTEMPTS: u32 = 3;

struct PendingProgress {
    events: Vec<ProgressEvent>,
    buffered_at: f64,
}

enum BatchResult {
    Batch(Vec<QueuedEvent>),
    Closed,
}

pub struct LogProcessor {
    store: Arc<Store>,
    registry: Arc<RegistryStore>,
    dead_letter_dir: PathBuf,
    clock: Arc<dyn Clock>,
    pending_progress: DashMap<String, PendingProgress>,
}

impl LogProcessor {
    pub fn new(store: Arc<Store>, registry: Arc<RegistryStore>, dead_letter_dir: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            registry,
            dead_letter_dir,
            clock,
            pending_progress: DashMap::new(),
        }
    }

    /// Run the drain loop forever, consuming `rx` until every producer
    /// handle is dropped.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<QueuedEvent>) {
        loop {
            match collect_batch(&mut rx, BATCH_MAX, BATCH_WAIT).await {
                BatchResult::Batch(batch) => self.apply_batch(batch).await,
                BatchResult::Closed => {
                    info!("log processor stopping: queue closed");
                    break;
                }
            }
        }
    }

    async fn apply_batch(&self, batch: Vec<QueuedEvent>) {
        for queued in batch {
            let original = queued.clone();
            if let Some(record) = self.apply_event(queued) {
                self.persist_with_retry(&record, &original).await;
            }
        }
        self.sweep_pending_progress();
    }

    fn apply_event(&self, queued: QueuedEvent) -> Option<InteractionRecord> {
        let received_ts = queued.received_ts;
        match queued.event {
            InteractionEvent::InteractionStart {
                interaction_id,
                mcp_id,
                client_id,
                metadata,
            } => self.apply_start(interaction_id, mcp_id, client_id, metadata, received_ts),
            InteractionEvent::InteractionProgress { interaction_id, payload } => {
                self.apply_progress(interaction_id, payload, received_ts)
            }
            InteractionEvent::InteractionComplete { interaction_id, result } => {
                self.apply_terminal(interaction_id, received_ts, true, Some(result), None)
            }
            InteractionEvent::InteractionError { interaction_id, error } => {
                self.apply_terminal(interaction_id, received_ts, false, None, Some(error))
            }
        }
    }

    fn apply_start(
        &self,
        interaction_id: String,
        mcp_id: String,
        client_id: String,
        metadata: std::collections::HashMap<String, serde_json::Value>,
        received_ts: f64,
    ) -> Option<InteractionRecord> {
        if let Some(existing) = self.store.get(&interaction_id) {
            if existing.state.is_terminal() {
                warn!(interaction_id, "duplicate start on a finished interaction, ignoring");
            } else {
                debug!(interaction_id, "start on in-flight interaction is an idempotent no-op");
            }
            return None;
        }

        let digest_source = serde_json::to_vec(&metadata).unwrap_or_default();
        let mut record = InteractionRecord {
            interaction_id: interaction_id.clone(),
            mcp_id,
            client_id,
            start_ts: received_ts,
            end_ts: None,
            state: InteractionState::Started,
            request_digest: request_digest(&digest_source, 64),
            progress_events: Vec::new(),
            result_payload: None,
            error_payload: None,
            metadata,
        };

        if let Some((_, buffered)) = self.pending_progress.remove(&interaction_id) {
            debug!(interaction_id, count = buffered.events.len(), "flushing buffered progress onto new record");
            record.progress_events = buffered.events;
            record.state = InteractionState::InProgress;
        }

        Some(record)
    }

    fn apply_progress(&self, interaction_id: String, payload: serde_json::Value, received_ts: f64) -> Option<InteractionRecord> {
        match self.store.get(&interaction_id) {
            Some(mut record) => {
                if record.state.is_terminal() {
                    warn!(interaction_id, "progress on a terminal interaction ignored");
                    return None;
                }
                record.progress_events.push(ProgressEvent { ts: received_ts, payload });
                record.state = InteractionState::InProgress;
                Some(record)
            }
            None => {
                warn!(interaction_id, "progress for unknown interaction, buffering pending start");
                self.pending_progress
                    .entry(interaction_id)
                    .or_insert_with(|| PendingProgress {
                        events: Vec::new(),
                        buffered_at: received_ts,
                    })
                    .events
                    .push(ProgressEvent { ts: received_ts, payload });
                None
            }
        }
    }

    fn apply_terminal(
        &self,
        interaction_id: String,
        received_ts: f64,
        success: bool,
        result: Option<serde_json::Value>,
        error_payload: Option<serde_json::Value>,
    ) -> Option<InteractionRecord> {
        let mut record = self.store.get(&interaction_id)?;
        if record.state.is_terminal() {
            // Idempotence: replays converge to the earliest terminal
            // timestamp (spec §4.9, §8 property 5).
            warn!(interaction_id, "duplicate terminal event, earliest terminal state retained");
            return None;
        }

        record.state = if success { InteractionState::Completed } else { InteractionState::Failed };
        record.end_ts = Some(received_ts);
        record.result_payload = result;
        record.error_payload = error_payload;

        let latency_ms = (received_ts - record.start_ts).max(0.0) * 1000.0;
        self.record_mcp_outcome(&record.mcp_id, success, latency_ms);

        Some(record)
    }

    fn record_mcp_outcome(&self, mcp_id: &str, success: bool, latency_ms: f64) {
        let now = self.clock.wall();
        let config = BreakerConfig::default();
        let result = self.registry.mutate(mcp_id, |d| {
            if success {
                d.perf_window.record_success(latency_ms);
                breaker::record_success(&mut d.breaker);
            } else {
                d.perf_window.record_failure(latency_ms);
                breaker::record_failure(&mut d.breaker, now, &config);
            }
        });
        if result.is_err() {
            debug!(mcp_id, "terminal interaction event for an mcp no longer in the registry");
        }
    }

    async fn persist_with_retry(&self, record: &InteractionRecord, original: &QueuedEvent) {
        let mut attempt = 0;
        loop {
            match self.store.upsert(record) {
                Ok(()) => return,
                Err(e) => {
                    attempt += 1;
                    if attempt >= STORE_RETRY_ATTEMPTS {
                        error!(
                            interaction_id = %record.interaction_id,
                            error = %e,
                            "store write failed after retries, writing dead letter"
                        );
                        let entry = DeadLetterEntry {
                            event: original.clone(),
                            reason: e.to_string(),
                            failed_at: self.clock.wall(),
                        };
                        if let Err(dl_err) = append_dead_letter(&self.dead_letter_dir, &entry) {
                            error!(error = %dl_err, "failed to write dead-letter entry");
                        }
                        return;
                    }
                    let backoff = Duration::from_millis(50 * 2u64.pow(attempt));
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    fn sweep_pending_progress(&self) {
        let now = self.clock.wall();
        let cutoff = PENDING_PROGRESS_TTL.as_secs_f64();
        let mut dropped = Vec::new();
        self.pending_progress.retain(|id, p| {
            let keep = now - p.buffered_at < cutoff;
            if !keep {
                dropped.push(id.clone());
            }
            keep
        });
        for id in dropped {
            warn!(interaction_id = %id, "dropped buffered progress events: start never arrived");
        }
    }

    /// Background sweeper: delete store records past retention (spec §4.9).
    pub async fn run_retention_sweeper(self: Arc<Self>, retention: Duration, period: Duration) {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            let dropped = self.store.sweep_retention(retention.as_secs_f64(), self.clock.wall());
            if dropped > 0 {
                info!(dropped, "retention sweep dropped old interaction records");
            }
        }
    }
}

async fn collect_batch(rx: &mut mpsc::Receiver<QueuedEvent>, max: usize, wait: Duration) -> BatchResult {
    let first = match rx.recv().await {
        Some(e) => e,
        None => return BatchResult::Closed,
    };
    let mut batch = vec![first];
    let deadline = tokio::time::Instant::now() + wait;

    while batch.len() < max {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Some(event)) => batch.push(event),
            Ok(None) | Err(_) => break,
        }
    }

    BatchResult::Batch(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InteractionQueue;
    use coordinator_core::clock::FakeClock;
    use coordinator_core::model::{McpDescriptorRequest, McpKind, PriorityTier, WorkflowMatch};
    use std::collections::BTreeSet;

    fn setup() -> (Arc<LogProcessor>, Arc<InteractionQueue>, Arc<FakeClock>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let clock = Arc::new(FakeClock::at(1_000_000));
        let store = Arc::new(Store::new(dir.path().join("interactions"), 1000));
        let registry = Arc::new(RegistryStore::new(clock.clone()));
        registry
            .register(McpDescriptorRequest {
                kind: McpKind::Adapter,
                endpoint: "http://a".into(),
                capabilities: BTreeSet::from(["ocr".to_string()]),
                workflows_supported: BTreeSet::from([WorkflowMatch::Tag("ocr".into())]),
                priority_tier: PriorityTier::Medium,
                declared_version: "1.0.0".into(),
                max_concurrent: None,
            })
            .unwrap();
        let processor = Arc::new(LogProcessor::new(store, registry, dir.path().to_path_buf(), clock.clone()));
        let queue = Arc::new(InteractionQueue::new(100));
        (processor, queue, clock, dir)
    }

    fn start(id: &str) -> InteractionEvent {
        InteractionEvent::InteractionStart {
            interaction_id: id.into(),
            mcp_id: "mcp_1".into(),
            client_id: "client_1".into(),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn full_lifecycle_produces_completed_record_with_ordered_progress() {
        let (processor, queue, clock, _dir) = setup();
        let rx = queue.take_receiver();
        let handle = tokio::spawn(processor.clone().run(rx));

        queue
            .enqueue(QueuedEvent { event: start("i1"), received_ts: clock.wall(), principal_hash: "h".into() })
            .await
            .unwrap();
        queue
            .enqueue(QueuedEvent {
                event: InteractionEvent::InteractionProgress { interaction_id: "i1".into(), payload: serde_json::json!({"p": 1}) },
                received_ts: clock.wall(),
                principal_hash: "h".into(),
            })
            .await
            .unwrap();
        queue
            .enqueue(QueuedEvent {
                event: InteractionEvent::InteractionComplete { interaction_id: "i1".into(), result: serde_json::json!({"ok": true}) },
                received_ts: clock.wall(),
                principal_hash: "h".into(),
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(queue);
        let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
    }

    #[tokio::test]
    async fn duplicate_complete_keeps_earliest_terminal_state() {
        let (processor, _queue, clock, _dir) = setup();
        processor.apply_start("i1".into(), "mcp_1".into(), "client_1".into(), Default::default(), clock.wall());
        let record = processor
            .apply_start("i1".into(), "mcp_1".into(), "client_1".into(), Default::default(), clock.wall())
            .unwrap();
        processor.store.upsert(&record).unwrap();

        let first = processor
            .apply_terminal("i1".into(), clock.wall(), true, Some(serde_json::json!({"v": 1})), None)
            .unwrap();
        processor.store.upsert(&first).unwrap();

        clock.advance(5_000);
        let second = processor.apply_terminal("i1".into(), clock.wall(), true, Some(serde_json::json!({"v": 2})), None);
        assert!(second.is_none());

        let stored = processor.store.get("i1").unwrap();
        assert_eq!(stored.result_payload, Some(serde_json::json!({"v": 1})));
    }

    #[tokio::test]
    async fn progress_before_start_is_buffered_then_flushed() {
        let (processor, _queue, clock, _dir) = setup();
        let dropped = processor.apply_progress("i1".into(), serde_json::json!({"p": 1}), clock.wall());
        assert!(dropped.is_none());
        assert_eq!(processor.pending_progress.len(), 1);

        let record = processor
            .apply_start("i1".into(), "mcp_1".into(), "client_1".into(), Default::default(), clock.wall())
            .unwrap();
        assert_eq!(record.progress_events.len(), 1);
        assert_eq!(record.state, InteractionState::InProgress);
        assert!(processor.pending_progress.is_empty());
    }

    #[tokio::test]
    async fn stale_buffered_progress_is_dropped_by_sweep() {
        let (processor, _queue, clock, _dir) = setup();
        processor.apply_progress("i1".into(), serde_json::json!({"p": 1}), clock.wall());
        clock.advance(PENDING_PROGRESS_TTL.as_millis() as u64 + 1_000);
        processor.sweep_pending_progress();
        assert!(processor.pending_progress.is_empty());
    }
}
