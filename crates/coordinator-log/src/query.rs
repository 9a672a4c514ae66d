//! Query API (component C10): read-only access to the Interaction Record
//! store for history replay and windowed metrics (spec §4.10, §6
//! `/api/v2/interactions/history`, `/api/v2/interactions/metrics`).

use std::sync::Arc;

use coordinator_core::model::InteractionRecord;
use coordinator_core::Clock;

use crate::store::Store;
use crate::types::{HistoryFilter, MetricsSummary, MetricsWindow};

/// Default page size when a caller does not specify one.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;
/// Hard ceiling on a single history page, regardless of what's requested.
pub const MAX_HISTORY_LIMIT: usize = 500;

pub struct QueryApi {
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
}

impl QueryApi {
    pub fn new(store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Point lookup of a single interaction by id.
    pub fn get(&self, interaction_id: &str) -> Option<InteractionRecord> {
        self.store.get(interaction_id)
    }

    /// Most-recent-first page of interaction history, optionally scoped by
    /// `filter`. `limit` is clamped to [`MAX_HISTORY_LIMIT`].
    pub fn history(&self, filter: &HistoryFilter, limit: usize, offset: usize) -> Vec<InteractionRecord> {
        let bounded = if limit == 0 { DEFAULT_HISTORY_LIMIT } else { limit.min(MAX_HISTORY_LIMIT) };
        self.store.history(filter, bounded, offset)
    }

    /// Aggregate success/error rate and latency distribution over `window`,
    /// optionally scoped to one MCP.
    pub fn metrics(&self, mcp_id: Option<&str>, window: MetricsWindow) -> MetricsSummary {
        self.store.metrics(mcp_id, window, self.clock.wall())
    }
}
