//! Shared data model: MCP Descriptor, Interaction Record, Routing Request.
//!
//! Closed tagged variants are used throughout instead of untyped strings, so
//! an unmarshal of an unknown tag fails loudly rather than being silently
//! accepted (see spec §9, "Dynamic typing -> tagged variants").

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Kind of Model-Capability Provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpKind {
    WorkflowPrimary,
    Adapter,
    FallbackCreator,
    AiAssistant,
    ToolEngine,
}

/// Scheduling priority tier. Fallback tier is only considered once every
/// non-fallback candidate has been exhausted or is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityTier {
    High,
    Medium,
    Fallback,
}

/// Liveness status as tracked by the Health Monitor, plus the self-declared
/// `Degraded` state reported by an MCP via heartbeat metrics.
///
/// Open Question resolution (see DESIGN.md): this crate treats `Suspect` as
/// exclusively Health-Monitor-owned (soft TTL expiry) and `Degraded` as
/// exclusively self-declared by the MCP's own heartbeat payload. The two
/// never overlap in who sets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum McpStatus {
    Active,
    Degraded,
    Suspect,
    Dead,
}

/// Circuit breaker state for a single MCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// Workflow tag matcher: either a concrete tag or the wildcard.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkflowMatch {
    Tag(String),
    #[serde(rename = "*")]
    Wildcard,
}

impl WorkflowMatch {
    pub fn matches(&self, requested: Option<&str>) -> bool {
        match (self, requested) {
            (WorkflowMatch::Wildcard, _) => true,
            (WorkflowMatch::Tag(t), Some(r)) => t == r,
            (WorkflowMatch::Tag(_), None) => false,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, WorkflowMatch::Tag(_))
    }
}

/// Rolling per-MCP performance counters folded from heartbeats and terminal
/// dispatch/log outcomes.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PerfWindow {
    pub success: u64,
    pub failure: u64,
    pub avg_latency_ms: f64,
    /// Exponentially-weighted moving average load, normalized to [0, 1].
    pub ewma_load: f64,
}

impl PerfWindow {
    pub fn success_rate(&self) -> f64 {
        let total = self.success + self.failure;
        if total == 0 {
            0.0
        } else {
            self.success as f64 / total as f64
        }
    }

    /// Fold a new latency sample into the running average with a simple
    /// incremental mean (no windowing beyond the lifetime counters, per
    /// spec's "rolling counters" phrasing — a fixed-size ring is unnecessary
    /// complexity this service does not need).
    pub fn record_success(&mut self, latency_ms: f64) {
        self.success += 1;
        self.fold_latency(latency_ms);
    }

    pub fn record_failure(&mut self, latency_ms: f64) {
        self.failure += 1;
        self.fold_latency(latency_ms);
    }

    fn fold_latency(&mut self, latency_ms: f64) {
        let total = (self.success + self.failure) as f64;
        self.avg_latency_ms += (latency_ms - self.avg_latency_ms) / total;
    }

    /// Fold a self-reported load sample (0.0-1.0) with EWMA smoothing.
    pub fn record_load(&mut self, load: f64, alpha: f64) {
        self.ewma_load = alpha * load.clamp(0.0, 1.0) + (1.0 - alpha) * self.ewma_load;
    }
}

/// Breaker bookkeeping: consecutive-failure counter, the window it's scoped
/// to, and the current cooldown (which doubles each failed half-open probe).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakerCounters {
    pub state: BreakerState,
    pub consecutive_failures: u32,
    /// Unix-epoch seconds the window of consecutive failures started.
    pub window_start: f64,
    /// Unix-epoch seconds after which `Open` may transition to `HalfOpen`.
    pub open_until: f64,
    /// Current cooldown duration in seconds (doubles on a failed probe).
    pub cooldown_secs: f64,
}

impl Default for BreakerCounters {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            window_start: 0.0,
            open_until: 0.0,
            cooldown_secs: 0.0,
        }
    }
}

/// Immutable-once-registered descriptor for one MCP (except `status`,
/// `last_heartbeat`, `perf_window`, and `breaker`, which update in place).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpDescriptor {
    pub id: String,
    pub kind: McpKind,
    pub endpoint: String,
    pub capabilities: BTreeSet<String>,
    pub workflows_supported: BTreeSet<WorkflowMatch>,
    pub priority_tier: PriorityTier,
    pub declared_version: String,
    pub registered_at: f64,
    pub last_heartbeat: f64,
    pub status: McpStatus,
    pub breaker: BreakerCounters,
    pub perf_window: PerfWindow,
    /// Maximum concurrent in-flight dispatches (default 10, spec §5).
    pub max_concurrent: u32,
    /// Free-form pass-through for fields the Coordinator doesn't interpret.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl McpDescriptor {
    /// `status = dead` must imply `breaker.state = open` (spec §3 invariant).
    pub fn enforce_dead_breaker_invariant(&mut self) {
        if self.status == McpStatus::Dead {
            self.breaker.state = BreakerState::Open;
        }
    }

    pub fn is_selectable_status(&self) -> bool {
        matches!(self.status, McpStatus::Active | McpStatus::Degraded)
    }
}

/// Request payload clients submit when registering an MCP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpDescriptorRequest {
    pub kind: McpKind,
    pub endpoint: String,
    pub capabilities: BTreeSet<String>,
    pub workflows_supported: BTreeSet<WorkflowMatch>,
    pub priority_tier: PriorityTier,
    pub declared_version: String,
    #[serde(default)]
    pub max_concurrent: Option<u32>,
}

/// Interaction lifecycle state. Transitions are monotonic:
/// `Started -> InProgress* -> (Completed | Failed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionState {
    Started,
    InProgress,
    Completed,
    Failed,
}

impl InteractionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, InteractionState::Completed | InteractionState::Failed)
    }
}

/// One ordered progress update within an interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub ts: f64,
    pub payload: serde_json::Value,
}

/// Append-only record of a single client-originated interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub interaction_id: String,
    pub mcp_id: String,
    pub client_id: String,
    pub start_ts: f64,
    pub end_ts: Option<f64>,
    pub state: InteractionState,
    pub request_digest: String,
    pub progress_events: Vec<ProgressEvent>,
    pub result_payload: Option<serde_json::Value>,
    pub error_payload: Option<serde_json::Value>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Ephemeral request passed into the Routing Engine's `select`.
#[derive(Debug, Clone, Default)]
pub struct RoutingRequest {
    pub workflow_tag: Option<String>,
    pub capability_tags: BTreeSet<String>,
    pub client_priority: Option<PriorityTier>,
    pub attempted_mcps: BTreeSet<String>,
    pub deadline_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dead_status_forces_breaker_open() {
        let mut d = sample_descriptor();
        d.status = McpStatus::Dead;
        d.breaker.state = BreakerState::Closed;
        d.enforce_dead_breaker_invariant();
        assert_eq!(d.breaker.state, BreakerState::Open);
    }

    #[test]
    fn wildcard_matches_any_workflow() {
        assert!(WorkflowMatch::Wildcard.matches(Some("ocr")));
        assert!(WorkflowMatch::Wildcard.matches(None));
    }

    #[test]
    fn exact_tag_requires_match() {
        let tag = WorkflowMatch::Tag("ocr".into());
        assert!(tag.matches(Some("ocr")));
        assert!(!tag.matches(Some("code_gen")));
        assert!(!tag.matches(None));
    }

    #[test]
    fn success_rate_is_zero_with_no_data() {
        assert_eq!(PerfWindow::default().success_rate(), 0.0);
    }

    fn sample_descriptor() -> McpDescriptor {
        McpDescriptor {
            id: "mcp_1".into(),
            kind: McpKind::Adapter,
            endpoint: "http://a".into(),
            capabilities: BTreeSet::new(),
            workflows_supported: BTreeSet::new(),
            priority_tier: PriorityTier::Medium,
            declared_version: "1.0.0".into(),
            registered_at: 0.0,
            last_heartbeat: 0.0,
            status: McpStatus::Active,
            breaker: BreakerCounters::default(),
            perf_window: PerfWindow::default(),
            max_concurrent: 10,
            metadata: HashMap::new(),
        }
    }
}
