//! Ingestion API (component C7): validates event shape, attaches
//! server-received timestamp and principal hash, enqueues, and returns
//! `accepted` without waiting for the Log Processor to apply the event
//! (spec §4.7).

use std::sync::Arc;

use coordinator_core::clock::fingerprint;
use coordinator_core::Clock;
use serde::Serialize;
use tracing::debug;

use crate::error::LogError;
use crate::queue::InteractionQueue;
use crate::types::{InteractionEvent, QueuedEvent};

/// Result of a successful ingestion accept.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub accepted: bool,
    pub queued_position: usize,
}

pub struct IngestionApi {
    queue: Arc<InteractionQueue>,
    clock: Arc<dyn Clock>,
}

impl IngestionApi {
    pub fn new(queue: Arc<InteractionQueue>, clock: Arc<dyn Clock>) -> Self {
        Self { queue, clock }
    }

    /// Accept one event-plane submission. Never blocks beyond the queue's
    /// bounded back-pressure window (spec: "p99 <= 10ms excluding network").
    pub async fn submit(&self, event: InteractionEvent, principal: &str) -> Result<IngestOutcome, LogError> {
        let received_ts = self.clock.wall();
        let principal_hash = fingerprint(principal.as_bytes());
        let queued = QueuedEvent {
            event,
            received_ts,
            principal_hash,
        };
        self.queue.enqueue(queued).await?;
        let position = self.queue.depth();
        debug!(position, "interaction event accepted");
        Ok(IngestOutcome {
            accepted: true,
            queued_position: position,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordinator_core::clock::FakeClock;

    fn start_event(id: &str) -> InteractionEvent {
        InteractionEvent::InteractionStart {
            interaction_id: id.into(),
            mcp_id: "mcp_1".into(),
            client_id: "client_1".into(),
            metadata: Default::default(),
        }
    }

    #[tokio::test]
    async fn submit_accepts_and_enqueues() {
        let queue = Arc::new(InteractionQueue::new(10));
        let api = IngestionApi::new(queue.clone(), Arc::new(FakeClock::at(0)));
        let outcome = api.submit(start_event("i1"), "alice").await.unwrap();
        assert!(outcome.accepted);
        assert_eq!(queue.depth(), 1);
    }

    #[tokio::test]
    async fn submit_fails_unavailable_when_queue_stays_full() {
        let queue = Arc::new(InteractionQueue::new(1));
        let api = IngestionApi::new(queue.clone(), Arc::new(FakeClock::at(0)));
        api.submit(start_event("i1"), "alice").await.unwrap();
        let err = api.submit(start_event("i2"), "alice").await.unwrap_err();
        assert!(matches!(err, LogError::QueueUnavailable));
    }
}
