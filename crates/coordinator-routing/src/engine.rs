//! Routing Engine `select` (component C5): the public contract over
//! scoring, filtering, and the circuit breaker.

use std::sync::Arc;

use coordinator_core::model::{McpDescriptor, PriorityTier, RoutingRequest};
use coordinator_registry::RegistryStore;
use tracing::debug;

use crate::breaker;
use crate::scoring::{self, Candidate};

pub struct RoutingEngine {
    registry: Arc<RegistryStore>,
    clock: Arc<dyn coordinator_core::Clock>,
}

impl RoutingEngine {
    pub fn new(registry: Arc<RegistryStore>, clock: Arc<dyn coordinator_core::Clock>) -> Self {
        Self { registry, clock }
    }

    /// Select an ordered list of candidate MCP ids for `req` (spec §4.5).
    ///
    /// Returns an empty `Vec` when nothing qualifies — that is not itself an
    /// error. Distinguishing "no candidate was ever available" from "every
    /// candidate was attempted and failed" requires the caller's cascade
    /// history (`req.attempted_mcps`), so [`Cascade::dispatch`] is what
    /// turns an empty result into `no_candidate_available` or
    /// `no_candidate_succeeded` with a trail.
    pub fn select(&self, req: &RoutingRequest) -> Vec<String> {
        let now = self.clock.wall();
        let mut snapshot: Vec<McpDescriptor> = Vec::new();

        for id in self.registry.ids() {
            // Refresh any Open->HalfOpen transition in place before reading
            // the descriptor for scoring (spec: breaker state is part of
            // the filter, and must reflect cooldown expiry at select time).
            let _ = self.registry.mutate(&id, |d| {
                breaker::refresh_for_selection(&mut d.breaker, now);
            });
            if let Some(d) = self.registry.get(&id) {
                snapshot.push(d);
            }
        }

        let filtered: Vec<&McpDescriptor> = snapshot.iter().filter(|d| scoring::passes_filter(d, req)).collect();

        let any_non_fallback_available = filtered.iter().any(|d| d.priority_tier != PriorityTier::Fallback);

        let candidates: Vec<Candidate> = filtered
            .iter()
            .map(|d| scoring::score(d, req, any_non_fallback_available))
            .collect();

        let ordered = scoring::order_candidates(candidates);
        if ordered.is_empty() {
            debug!("routing select found zero candidates");
        }
        ordered
    }
}
