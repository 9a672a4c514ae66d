//! Wire shapes for the event plane (spec §4.7, §6 `/api/v2/interactions`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One of the four event-plane action shapes. Closed tagged variant: an
/// unknown `action` fails to deserialize rather than being silently
/// accepted (spec §9, "Dynamic typing -> tagged variants").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InteractionEvent {
    InteractionStart {
        interaction_id: String,
        mcp_id: String,
        client_id: String,
        #[serde(default)]
        metadata: HashMap<String, Value>,
    },
    InteractionProgress {
        interaction_id: String,
        payload: Value,
    },
    InteractionComplete {
        interaction_id: String,
        result: Value,
    },
    InteractionError {
        interaction_id: String,
        error: Value,
    },
}

impl InteractionEvent {
    pub fn interaction_id(&self) -> &str {
        match self {
            InteractionEvent::InteractionStart { interaction_id, .. }
            | InteractionEvent::InteractionProgress { interaction_id, .. }
            | InteractionEvent::InteractionComplete { interaction_id, .. }
            | InteractionEvent::InteractionError { interaction_id, .. } => interaction_id,
        }
    }

    pub fn action_name(&self) -> &'static str {
        match self {
            InteractionEvent::InteractionStart { .. } => "interaction_start",
            InteractionEvent::InteractionProgress { .. } => "interaction_progress",
            InteractionEvent::InteractionComplete { .. } => "interaction_complete",
            InteractionEvent::InteractionError { .. } => "interaction_error",
        }
    }
}

/// An event as it sits on the queue: the client-submitted action plus what
/// the Ingestion API attached at accept time (spec §4.7: "attaches server-
/// received timestamp and authenticated principal hash").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedEvent {
    pub event: InteractionEvent,
    pub received_ts: f64,
    pub principal_hash: String,
}

/// Optional filter for [`crate::query::QueryApi::history`].
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub mcp_id: Option<String>,
    pub client_id: Option<String>,
}

/// Aggregation window for [`crate::query::QueryApi::metrics`] (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricsWindow {
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "24h")]
    TwentyFourHours,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
}

impl MetricsWindow {
    pub fn as_secs(self) -> f64 {
        match self {
            MetricsWindow::OneHour => 3_600.0,
            MetricsWindow::TwentyFourHours => 86_400.0,
            MetricsWindow::SevenDays => 7.0 * 86_400.0,
            MetricsWindow::ThirtyDays => 30.0 * 86_400.0,
        }
    }
}

/// Aggregated metrics for a window (spec §4.10, §8 property 7).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MetricsSummary {
    pub count: u64,
    pub success_rate: f64,
    pub error_rate: f64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
}
