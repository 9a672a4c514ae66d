//! HTTP surface: wires the Control Plane, Routing Plane, and Event Plane
//! handlers onto one [`axum::Router`] sharing [`AppState`] (spec §6).

pub mod auth;
pub mod config;
pub mod crash;
pub mod handlers;
pub mod response;
pub mod state;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full router. Split out of `main` so integration tests can
/// construct the same surface with a test-wired [`AppState`].
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/register", post(handlers::control::register))
        .route("/api/v1/deregister", post(handlers::control::deregister))
        .route("/api/v1/heartbeat", post(handlers::control::heartbeat))
        .route("/api/v1/registry", get(handlers::control::get_registry))
        .route("/api/v1/stats", get(handlers::control::get_stats))
        .route("/api/v1/health", get(handlers::control::get_health))
        .route("/api/v1/dispatch", post(handlers::routing::dispatch))
        .route("/api/v2/interactions", post(handlers::events::submit))
        .route("/api/v2/interactions/history", get(handlers::events::history))
        .route("/api/v2/interactions/metrics", get(handlers::events::metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
