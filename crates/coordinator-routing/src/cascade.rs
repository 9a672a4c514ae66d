//! Cascade orchestration: ties the Routing Engine's `select` to the
//! Dispatcher, advancing through the ordered candidate list until one
//! succeeds or the list is exhausted (spec §4.5 step 5, §4.6, §6 `trail`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use coordinator_core::error::{ErrorKind, TrailEntry};
use coordinator_core::model::{BreakerState, RoutingRequest};
use coordinator_core::{CoordError, CoordResult};
use coordinator_registry::RegistryStore;
use serde_json::Value;
use tracing::{info, warn};

use crate::breaker::{self, BreakerConfig};
use crate::dispatcher::{DispatchError, Dispatcher};
use crate::engine::RoutingEngine;

/// The outcome of a successful cascade: which MCP served the request, its
/// response body, and how many prior candidates were attempted and failed.
#[derive(Debug, Clone)]
pub struct CascadeSuccess {
    pub mcp_id: String,
    pub result: Value,
    pub attempts: usize,
}

/// Runs `select` once, then walks the ordered candidates through `dispatch`,
/// folding each outcome back into the registry's breaker and perf-window
/// state, until one succeeds or every candidate has been tried.
pub struct Cascade {
    registry: Arc<RegistryStore>,
    engine: RoutingEngine,
    dispatcher: Dispatcher,
    breaker_config: BreakerConfig,
    clock: Arc<dyn coordinator_core::Clock>,
}

impl Cascade {
    pub fn new(
        registry: Arc<RegistryStore>,
        engine: RoutingEngine,
        dispatcher: Dispatcher,
        clock: Arc<dyn coordinator_core::Clock>,
    ) -> Self {
        Self {
            registry,
            engine,
            dispatcher,
            breaker_config: BreakerConfig::default(),
            clock,
        }
    }

    /// Run the full `/dispatch` contract for `payload` against `req`.
    ///
    /// A dispatch failure is only retried against the next candidate when it
    /// is non-deterministic (timeout, transport, overloaded, a 5xx remote
    /// error). A deterministic remote error — the MCP classifying the
    /// failure as e.g. invalid input, a client-side 4xx — is recorded
    /// against the breaker but surfaced to the caller immediately without
    /// cascading, per spec §4.6: "the error is surfaced to the caller
    /// without cascade if the MCP classifies it as deterministic".
    pub async fn dispatch(
        &self,
        req: &RoutingRequest,
        payload: &HashMap<String, Value>,
    ) -> CoordResult<CascadeSuccess> {
        let mut attempted = req.clone();
        let mut trail: Vec<TrailEntry> = Vec::new();
        let deadline = Duration::from_millis(req.deadline_ms.max(1));

        loop {
            let candidates = self.engine.select(&attempted);
            let mcp_id = match candidates.first() {
                Some(id) => id.clone(),
                None => {
                    if trail.is_empty() {
                        return Err(CoordError::NoCandidateAvailable);
                    }
                    return Err(CoordError::NoCandidateSucceeded { trail });
                }
            };

            let descriptor = match self.registry.get(&mcp_id) {
                Some(d) => d,
                None => {
                    // Deregistered between select and dispatch; skip without
                    // recording a trail entry since it was never attempted.
                    attempted.attempted_mcps.insert(mcp_id);
                    continue;
                }
            };

            let outcome = self
                .dispatcher
                .dispatch(
                    &mcp_id,
                    &descriptor.endpoint,
                    descriptor.max_concurrent,
                    payload,
                    deadline,
                )
                .await;

            match outcome.result {
                Ok(value) => {
                    self.record_success(&mcp_id, outcome.latency_ms);
                    info!(mcp_id, attempts = trail.len() + 1, "cascade dispatch succeeded");
                    return Ok(CascadeSuccess {
                        mcp_id,
                        result: value,
                        attempts: trail.len() + 1,
                    });
                }
                Err(DispatchError::RemoteError { message, deterministic: true }) => {
                    self.record_failure(&mcp_id, outcome.latency_ms);
                    warn!(mcp_id, "cascade dispatch attempt failed deterministically, surfacing without cascade");
                    return Err(CoordError::RemoteError(message));
                }
                Err(err) => {
                    let kind = dispatch_error_kind(&err);
                    self.record_failure(&mcp_id, outcome.latency_ms);
                    warn!(mcp_id, ?kind, "cascade dispatch attempt failed, trying next candidate");
                    trail.push(TrailEntry { mcp_id: mcp_id.clone(), error_kind: kind });
                    attempted.attempted_mcps.insert(mcp_id);
                }
            }
        }
    }

    fn record_success(&self, mcp_id: &str, latency_ms: f64) {
        let now = self.clock.wall();
        let _ = self.registry.mutate(mcp_id, |d| {
            d.perf_window.record_success(latency_ms);
            breaker::record_success(&mut d.breaker);
            let _ = now;
        });
    }

    fn record_failure(&self, mcp_id: &str, latency_ms: f64) {
        let now = self.clock.wall();
        let config = self.breaker_config;
        let _ = self.registry.mutate(mcp_id, |d| {
            d.perf_window.record_failure(latency_ms);
            breaker::record_failure(&mut d.breaker, now, &config);
            if d.breaker.state == BreakerState::Open {
                warn!(mcp_id, "breaker tripped open after dispatch failure");
            }
        });
    }
}

fn dispatch_error_kind(err: &DispatchError) -> ErrorKind {
    match err {
        DispatchError::Timeout => ErrorKind::DeadlineExceeded,
        DispatchError::Transport(_) | DispatchError::Overloaded => ErrorKind::Transport,
        DispatchError::RemoteError { .. } => ErrorKind::RemoteError,
        DispatchError::MalformedResponse(_) => ErrorKind::RemoteError,
        DispatchError::Canceled => ErrorKind::Transport,
    }
}
