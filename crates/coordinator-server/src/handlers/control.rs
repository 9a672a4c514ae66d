//! Control Plane API (C11): registration, deregistration, heartbeat,
//! registry listing, aggregate health, and admin stats (spec §4.11, §6,
//! SPEC_FULL.md §11 for `/health` and `/stats` shapes).

use axum::extract::{Query, State};
use coordinator_core::model::{BreakerState, McpDescriptorRequest, McpKind, McpStatus, PriorityTier, WorkflowMatch};
use coordinator_core::CoordError;
use coordinator_registry::RegistryFilter;
use coordinator_registry::health::HeartbeatMetrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::auth::AuthenticatedPrincipal;
use crate::response::{ApiError, ApiJson, ApiResponse};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub mcp_id: String,
    pub config: RegisterConfig,
}

#[derive(Debug, Serialize)]
pub struct RegisterConfig {
    pub heartbeat_period_s: u64,
    pub ingestion_endpoint: String,
}

pub async fn register(
    State(state): State<AppState>,
    _auth: AuthenticatedPrincipal,
    ApiJson(req): ApiJson<McpDescriptorRequest>,
) -> Result<ApiResponse<RegisterResponse>, ApiError> {
    let mcp_id = state.registry.register(req).map_err(CoordError::from)?;
    Ok(ApiResponse(RegisterResponse {
        mcp_id,
        config: RegisterConfig {
            heartbeat_period_s: state.config.heartbeat_soft.as_secs() / 3,
            ingestion_endpoint: "/api/v2/interactions".into(),
        },
    }))
}

#[derive(Debug, Deserialize)]
pub struct DeregisterRequest {
    pub mcp_id: String,
}

pub async fn deregister(
    State(state): State<AppState>,
    _auth: AuthenticatedPrincipal,
    ApiJson(req): ApiJson<DeregisterRequest>,
) -> Result<ApiResponse<()>, ApiError> {
    state.registry.deregister(&req.mcp_id).map_err(CoordError::from)?;
    Ok(ApiResponse(()))
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub mcp_id: String,
    #[serde(default)]
    pub metrics: Option<HeartbeatMetrics>,
}

pub async fn heartbeat(
    State(state): State<AppState>,
    _auth: AuthenticatedPrincipal,
    ApiJson(req): ApiJson<HeartbeatRequest>,
) -> Result<ApiResponse<()>, ApiError> {
    state.health.heartbeat(&req.mcp_id, req.metrics).map_err(CoordError::from)?;
    Ok(ApiResponse(()))
}

#[derive(Debug, Deserialize)]
pub struct RegistryQuery {
    pub status: Option<McpStatus>,
    pub kind: Option<McpKind>,
}

/// Public view of a descriptor with `endpoint` redacted (spec §6: "sensitive
/// fields redacted").
#[derive(Debug, Serialize)]
pub struct PublicMcpDescriptor {
    pub id: String,
    pub kind: McpKind,
    pub capabilities: BTreeSet<String>,
    pub workflows_supported: BTreeSet<WorkflowMatch>,
    pub priority_tier: PriorityTier,
    pub declared_version: String,
    pub registered_at: f64,
    pub last_heartbeat: f64,
    pub status: McpStatus,
    pub breaker_state: BreakerState,
}

impl From<coordinator_core::model::McpDescriptor> for PublicMcpDescriptor {
    fn from(d: coordinator_core::model::McpDescriptor) -> Self {
        Self {
            id: d.id,
            kind: d.kind,
            capabilities: d.capabilities,
            workflows_supported: d.workflows_supported,
            priority_tier: d.priority_tier,
            declared_version: d.declared_version,
            registered_at: d.registered_at,
            last_heartbeat: d.last_heartbeat,
            status: d.status,
            breaker_state: d.breaker.state,
        }
    }
}

pub async fn get_registry(
    State(state): State<AppState>,
    _auth: AuthenticatedPrincipal,
    Query(q): Query<RegistryQuery>,
) -> Result<ApiResponse<Vec<PublicMcpDescriptor>>, ApiError> {
    let filter = RegistryFilter {
        status: q.status,
        kind: q.kind,
    };
    let entries = state.registry.list(&filter).into_iter().map(PublicMcpDescriptor::from).collect();
    Ok(ApiResponse(entries))
}

#[derive(Debug, Serialize)]
pub struct McpCountsByStatus {
    pub total: usize,
    pub active: usize,
    pub degraded: usize,
    pub suspect: usize,
    pub dead: usize,
}

#[derive(Debug, Serialize)]
pub struct QueueHealth {
    pub depth: usize,
    pub capacity: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub mcps: McpCountsByStatus,
    pub queue: QueueHealth,
    pub uptime_s: f64,
}

pub async fn get_health(State(state): State<AppState>, _auth: AuthenticatedPrincipal) -> ApiResponse<HealthResponse> {
    let all = state.registry.list(&RegistryFilter::default());
    let mut counts = McpCountsByStatus {
        total: all.len(),
        active: 0,
        degraded: 0,
        suspect: 0,
        dead: 0,
    };
    for d in &all {
        match d.status {
            McpStatus::Active => counts.active += 1,
            McpStatus::Degraded => counts.degraded += 1,
            McpStatus::Suspect => counts.suspect += 1,
            McpStatus::Dead => counts.dead += 1,
        }
    }
    let status = if counts.dead > 0 || counts.suspect > 0 { "degraded" } else { "ok" };

    ApiResponse(HealthResponse {
        status,
        mcps: counts,
        queue: QueueHealth {
            depth: state.queue.depth(),
            capacity: state.queue.capacity(),
        },
        uptime_s: state.clock.wall() - state.started_at,
    })
}

#[derive(Debug, Serialize)]
pub struct McpStats {
    pub mcp_id: String,
    pub status: McpStatus,
    pub breaker_state: BreakerState,
    pub consecutive_failures: u32,
    pub success: u64,
    pub failure: u64,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub ewma_load: f64,
}

pub async fn get_stats(State(state): State<AppState>, _auth: AuthenticatedPrincipal) -> ApiResponse<Vec<McpStats>> {
    let stats = state
        .registry
        .list(&RegistryFilter::default())
        .into_iter()
        .map(|d| McpStats {
            mcp_id: d.id,
            status: d.status,
            breaker_state: d.breaker.state,
            consecutive_failures: d.breaker.consecutive_failures,
            success: d.perf_window.success,
            failure: d.perf_window.failure,
            success_rate: d.perf_window.success_rate(),
            avg_latency_ms: d.perf_window.avg_latency_ms,
            ewma_load: d.perf_window.ewma_load,
        })
        .collect();
    ApiResponse(stats)
}
