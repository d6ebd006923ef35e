//! Push channel transports
//!
//! Everything here is mounted under the hub's reserved path prefix:
//!
//! - `GET  {prefix}/ws` WebSocket stream
//! - `POST {prefix}/poll` open a long-polling session
//! - `GET  {prefix}/poll/:sid` long-poll queued events
//! - `DELETE {prefix}/poll/:sid` close the session

pub mod polling;
pub mod websocket;

pub use polling::{PollHandshake, PollingSessions};

use axum::routing::{get, post};
use axum::Router;

use super::server::AppState;

/// Routes for both transports, relative to the path prefix
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(websocket::alerts_ws))
        .route("/poll", post(polling::open_session))
        .route(
            "/poll/:sid",
            get(polling::poll_session).delete(polling::close_session),
        )
}
