//! Routing plane: the `/api/v1/dispatch` endpoint (spec §4.5, §4.6, §6).

use std::collections::{BTreeSet, HashMap};

use axum::extract::State;
use coordinator_core::model::{PriorityTier, RoutingRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::AuthenticatedPrincipal;
use crate::response::{ApiError, ApiJson, ApiResponse};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    #[serde(default, rename = "workflow")]
    pub workflow_tag: Option<String>,
    #[serde(default, rename = "capabilities")]
    pub capability_tags: BTreeSet<String>,
    #[serde(default)]
    pub client_priority: Option<PriorityTier>,
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default)]
    pub payload: HashMap<String, Value>,
}

fn default_deadline_ms() -> u64 {
    5_000
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    pub mcp_id: String,
    pub result: Value,
    pub attempts: usize,
}

pub async fn dispatch(
    State(state): State<AppState>,
    _auth: AuthenticatedPrincipal,
    ApiJson(req): ApiJson<DispatchRequest>,
) -> Result<ApiResponse<DispatchResponse>, ApiError> {
    let routing_request = RoutingRequest {
        workflow_tag: req.workflow_tag,
        capability_tags: req.capability_tags,
        client_priority: req.client_priority,
        attempted_mcps: BTreeSet::new(),
        deadline_ms: req.deadline_ms,
    };

    let success = state.cascade.dispatch(&routing_request, &req.payload).await?;

    Ok(ApiResponse(DispatchResponse {
        mcp_id: success.mcp_id,
        result: success.result,
        attempts: success.attempts,
    }))
}
