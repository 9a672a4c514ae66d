//! Event plane: `/api/v2/interactions` ingestion, `/api/v2/interactions/history`,
//! and `/api/v2/interactions/metrics` (spec §4.7, §4.9, §4.10, §6).

use axum::extract::{Query, State};
use coordinator_core::model::InteractionRecord;
use coordinator_core::CoordError;
use coordinator_log::{HistoryFilter, IngestOutcome, InteractionEvent, MetricsSummary, MetricsWindow};
use serde::Deserialize;

use crate::auth::AuthenticatedPrincipal;
use crate::response::{ApiError, ApiJson, ApiResponse};
use crate::state::AppState;

pub async fn submit(
    State(state): State<AppState>,
    AuthenticatedPrincipal(principal): AuthenticatedPrincipal,
    ApiJson(event): ApiJson<InteractionEvent>,
) -> Result<ApiResponse<IngestOutcome>, ApiError> {
    let outcome = state.ingest.submit(event, &principal.name).await.map_err(CoordError::from)?;
    Ok(ApiResponse(outcome))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub mcp_id: Option<String>,
    pub client_id: Option<String>,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

pub async fn history(
    State(state): State<AppState>,
    _auth: AuthenticatedPrincipal,
    Query(q): Query<HistoryQuery>,
) -> ApiResponse<Vec<InteractionRecord>> {
    let filter = HistoryFilter {
        mcp_id: q.mcp_id,
        client_id: q.client_id,
    };
    ApiResponse(state.query.history(&filter, q.limit, q.offset))
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub mcp_id: Option<String>,
    #[serde(default = "default_window")]
    pub window: MetricsWindow,
}

fn default_window() -> MetricsWindow {
    MetricsWindow::OneHour
}

pub async fn metrics(
    State(state): State<AppState>,
    _auth: AuthenticatedPrincipal,
    Query(q): Query<MetricsQuery>,
) -> ApiResponse<MetricsSummary> {
    ApiResponse(state.query.metrics(q.mcp_id.as_deref(), q.window))
}
