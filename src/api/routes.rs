//! API route definitions

use axum::routing::{get, post};
use axum::Router;

use super::handlers;
use super::realtime;
use super::server::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    let transport_path = state
        .hub
        .transport()
        .map(|t| t.path.clone())
        .unwrap_or_else(|| state.config.realtime.path.clone());

    Router::new()
        // Health check (no auth required)
        .route("/health", get(handlers::health::health_check))
        .route("/api/status", get(handlers::health::status))
        // Webhook ingestion (authenticated by the WebhookCaller extractor)
        .route("/api/alert/notify", post(handlers::alert::notify))
        .route("/api/alert/update", post(handlers::alert::update))
        // Push channel, kept apart from application routes
        .nest(&transport_path, realtime::router())
        .with_state(state)
}
