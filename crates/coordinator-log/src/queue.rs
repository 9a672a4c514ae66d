//! Interaction Queue (component C8): a bounded, back-pressured,
//! multi-producer single-consumer channel between the Ingestion API and the
//! Log Processor (spec §4.8, §5).

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::LogError;
use crate::types::QueuedEvent;

/// Default queue capacity (spec §4.8, `COORD_INGEST_QUEUE_CAP`).
pub const DEFAULT_CAPACITY: usize = 10_000;

/// How long a producer waits for a free slot before the Ingestion API gives
/// up and returns `unavailable` (spec §4.7, §4.8).
pub const PRODUCER_WAIT: Duration = Duration::from_millis(50);

/// Bounded MPSC queue of [`QueuedEvent`]s. The receiving half is handed to
/// exactly one [`crate::processor::LogProcessor`] — attempting to take it
/// twice panics, since a second consumer would break the single-consumer
/// ordering guarantee (spec §5).
pub struct InteractionQueue {
    tx: mpsc::Sender<QueuedEvent>,
    rx: Mutex<Option<mpsc::Receiver<QueuedEvent>>>,
    capacity: usize,
}

impl InteractionQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Approximate number of slots currently occupied.
    pub fn depth(&self) -> usize {
        self.capacity.saturating_sub(self.tx.capacity())
    }

    /// Enqueue `event`, waiting up to [`PRODUCER_WAIT`] for a free slot if
    /// the queue is momentarily full (spec §4.8). Returns
    /// [`LogError::QueueUnavailable`] if the wait expires.
    pub async fn enqueue(&self, event: QueuedEvent) -> Result<(), LogError> {
        match tokio::time::timeout(PRODUCER_WAIT, self.tx.send(event)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(LogError::QueueUnavailable), // receiver dropped
            Err(_) => Err(LogError::QueueUnavailable),
        }
    }

    /// Take ownership of the receiving half. Must be called exactly once,
    /// by the process that will run the Log Processor's drain loop.
    ///
    /// # Panics
    /// Panics if called more than once.
    pub fn take_receiver(&self) -> mpsc::Receiver<QueuedEvent> {
        self.rx
            .lock()
            .take()
            .expect("InteractionQueue::take_receiver called more than once")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::InteractionEvent;

    fn sample_event(id: &str) -> QueuedEvent {
        QueuedEvent {
            event: InteractionEvent::InteractionStart {
                interaction_id: id.to_string(),
                mcp_id: "mcp_1".into(),
                client_id: "client_1".into(),
                metadata: Default::default(),
            },
            received_ts: 0.0,
            principal_hash: "hash".into(),
        }
    }

    #[tokio::test]
    async fn enqueue_and_drain_round_trips() {
        let queue = InteractionQueue::new(4);
        queue.enqueue(sample_event("i1")).await.unwrap();
        assert_eq!(queue.depth(), 1);
        let mut rx = queue.take_receiver();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.event.interaction_id(), "i1");
    }

    #[tokio::test]
    async fn full_queue_rejects_after_wait_window() {
        let queue = InteractionQueue::new(1);
        queue.enqueue(sample_event("i1")).await.unwrap();
        let result = queue.enqueue(sample_event("i2")).await;
        assert!(matches!(result, Err(LogError::QueueUnavailable)));
    }

    #[test]
    #[should_panic(expected = "more than once")]
    fn taking_receiver_twice_panics() {
        let queue = InteractionQueue::new(4);
        let _first = queue.take_receiver();
        let _second = queue.take_receiver();
    }
}
