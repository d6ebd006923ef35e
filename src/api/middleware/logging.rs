//! Request logging middleware

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Request logging middleware
pub struct RequestLogging;

impl RequestLogging {
    /// Log method, path, status and latency of each request
    pub async fn log_request(req: Request<Body>, next: Next) -> Response {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let start = Instant::now();

        debug!(%method, %path, "request started");

        let response = next.run(req).await;

        let elapsed = start.elapsed();
        let status = response.status();

        if status.is_server_error() {
            warn!(%method, %path, status = status.as_u16(), ?elapsed, "request failed");
        } else {
            info!(%method, %path, status = status.as_u16(), ?elapsed, "request completed");
        }

        response
    }
}
