//! Routing Engine scoring (spec §4.5 steps 1-6).

use coordinator_core::model::{BreakerState, McpDescriptor, McpStatus, PriorityTier, RoutingRequest};

/// A scored candidate, ready for sorting into the cascade order.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub mcp_id: String,
    pub score: f64,
    pub avg_latency_ms: f64,
    pub registered_at: f64,
    pub non_fallback: bool,
}

/// Whether `mcp` passes the hard filter (step 1): live status, breaker not
/// open, workflow match, full capability coverage. Assumes the breaker has
/// already been refreshed for selection (see `breaker::refresh_for_selection`).
pub fn passes_filter(mcp: &McpDescriptor, req: &RoutingRequest) -> bool {
    if !mcp.is_selectable_status() {
        return false;
    }
    if mcp.breaker.state == BreakerState::Open {
        return false;
    }
    if req.attempted_mcps.contains(&mcp.id) {
        return false;
    }
    let workflow_ok = mcp
        .workflows_supported
        .iter()
        .any(|w| w.matches(req.workflow_tag.as_deref()));
    if !workflow_ok {
        return false;
    }
    req.capability_tags.is_subset(&mcp.capabilities)
}

/// Score a single filtered candidate (spec §4.5 steps 3 and 5).
///
/// `any_non_fallback_available` gates the "fallback only when all else
/// failed" rule: a fallback-tier MCP scores 0 unless the non-fallback tier
/// is empty post-filter.
pub fn score(mcp: &McpDescriptor, req: &RoutingRequest, any_non_fallback_available: bool) -> Candidate {
    let non_fallback = mcp.priority_tier != PriorityTier::Fallback;

    let score = if !non_fallback && any_non_fallback_available {
        0.0
    } else {
        let mut s = 0.0;

        let exact_match = mcp
            .workflows_supported
            .iter()
            .any(|w| w.is_exact() && w.matches(req.workflow_tag.as_deref()));
        if exact_match {
            s += 40.0;
        }

        if req.capability_tags.is_subset(&mcp.capabilities) && !req.capability_tags.is_empty() {
            s += 30.0;
        }
        let extra = mcp.capabilities.difference(&req.capability_tags).count();
        s -= 5.0 * extra as f64;

        s += 20.0 * mcp.perf_window.success_rate();
        s += 10.0 * (1.0 - mcp.perf_window.ewma_load.clamp(0.0, 1.0));

        if mcp.status == McpStatus::Degraded {
            s -= 5.0;
        }

        s += match mcp.priority_tier {
            PriorityTier::High => 15.0,
            PriorityTier::Medium => 5.0,
            PriorityTier::Fallback => 0.0,
        };

        s
    };

    Candidate {
        mcp_id: mcp.id.clone(),
        score,
        avg_latency_ms: mcp.perf_window.avg_latency_ms,
        registered_at: mcp.registered_at,
        non_fallback,
    }
}

/// Order candidates for the cascade: tier split (non-fallback first), then
/// descending score, then ascending latency, then ascending `registered_at`,
/// then lexicographic id (spec §4.5 steps 2 and 4).
pub fn order_candidates(mut candidates: Vec<Candidate>) -> Vec<String> {
    candidates.sort_by(|a, b| {
        b.non_fallback
            .cmp(&a.non_fallback)
            .then(b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
            .then(a.avg_latency_ms.partial_cmp(&b.avg_latency_ms).unwrap_or(std::cmp::Ordering::Equal))
            .then(a.registered_at.partial_cmp(&b.registered_at).unwrap_or(std::cmp::Ordering::Equal))
            .then(a.mcp_id.cmp(&b.mcp_id))
    });
    candidates.into_iter().map(|c| c.mcp_id).collect()
}
