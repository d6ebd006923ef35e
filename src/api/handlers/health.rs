//! Health check endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::api::server::AppState;
use crate::models::RelayStatus;

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "fallwatch"
        })),
    )
}

/// Relay status: hub binding and live connection counts
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(RelayStatus {
        hub_initialized: state.hub.is_initialized(),
        transport_path: state.hub.transport().map(|t| t.path.clone()),
        connections: state.hub.connection_count(),
        polling_sessions: state.sessions.len(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}
