//! Alert ingestion webhook
//!
//! The external detection system reports new and updated alerts here; each
//! accepted request is relayed to every connected dashboard client.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use tracing::info;

use crate::api::middleware::WebhookCaller;
use crate::api::server::AppState;
use crate::error::{FallwatchError, Result};
use crate::models::{Alert, AlertEvent, AlertPayload};

/// Webhook response
#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    pub success: bool,
    pub message: &'static str,
    pub alert: Alert,
    /// Number of connections the event was queued for
    pub delivered: usize,
}

/// Relay a newly created alert
pub async fn notify(
    State(state): State<AppState>,
    caller: WebhookCaller,
    body: std::result::Result<Json<AlertPayload>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let payload = accept(&state, body)?;
    let alert = payload.into_alert()?;

    info!(alert_id = %alert.id, credential = ?caller.credential, "Alert received");

    let report = state.hub.publish(AlertEvent::NewAlert(alert.clone()));

    Ok(Json(NotifyResponse {
        success: true,
        message: "Alert notified to all clients",
        alert,
        delivered: report.delivered,
    }))
}

/// Relay a change to an existing alert
pub async fn update(
    State(state): State<AppState>,
    caller: WebhookCaller,
    body: std::result::Result<Json<AlertPayload>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let payload = accept(&state, body)?;
    let alert = payload.into_update()?;

    info!(
        alert_id = %alert.id,
        status = %alert.status,
        credential = ?caller.credential,
        "Alert update received"
    );

    let report = state.hub.publish(AlertEvent::AlertUpdate(alert.clone()));

    Ok(Json(NotifyResponse {
        success: true,
        message: "Alert update notified to all clients",
        alert,
        delivered: report.delivered,
    }))
}

fn accept(
    state: &AppState,
    body: std::result::Result<Json<AlertPayload>, JsonRejection>,
) -> Result<AlertPayload> {
    if !state.hub.is_initialized() {
        return Err(FallwatchError::HubNotInitialized);
    }

    let Json(payload) = body.map_err(|e| FallwatchError::InvalidRequest(e.body_text()))?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::api::realtime::PollingSessions;
    use crate::api::routes::create_router;
    use crate::api::server::AppState;
    use crate::config::Config;
    use crate::hub::{BroadcastHub, Connection, TransportConfig, TransportKind};
    use crate::models::AlertStatus;

    const SECRET: &str = "webhook-secret";

    fn app_with(hub: BroadcastHub) -> Router {
        let mut config = Config::default();
        config.webhook.api_key = Some(SECRET.to_string());
        create_router(AppState::new(config, hub, PollingSessions::new()))
    }

    fn initialized_hub() -> BroadcastHub {
        let hub = BroadcastHub::new();
        hub.initialize(TransportConfig::default());
        hub
    }

    fn post(uri: &str) -> axum::http::request::Builder {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_notify_with_api_key_publishes() {
        let hub = initialized_hub();
        let (connection, mut rx) = Connection::new(TransportKind::WebSocket, 8);
        hub.on_connect(connection).unwrap();

        let body = json!({ "id": "1", "title": "Fall Detected", "location": "Room 12" }).to_string();
        let request = post("/api/alert/notify")
            .header("x-api-key", SECRET)
            .body(Body::from(body))
            .unwrap();

        let (status, json) = send(app_with(hub), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["message"], "Alert notified to all clients");
        assert_eq!(json["alert"]["status"], "unhandled");
        assert_eq!(json["alert"]["timeAgo"], "just now");
        assert_eq!(json["delivered"], 1);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind(), "new-alert");
        assert_eq!(event.alert().id, "1");
        assert_eq!(event.alert().location, "Room 12");
    }

    #[tokio::test]
    async fn test_notify_with_session_cookie() {
        let body = "{}".to_string();
        let request = post("/api/alert/notify")
            .header(header::COOKIE, "theme=dark; auth-token=opaque")
            .body(Body::from(body))
            .unwrap();

        let (status, json) = send(app_with(initialized_hub()), request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["alert"]["title"], "New Alert");
        assert!(json["alert"]["id"].as_str().unwrap().starts_with("alert-"));
    }

    #[tokio::test]
    async fn test_notify_without_credentials_is_unauthorized() {
        let hub = initialized_hub();
        let (connection, mut rx) = Connection::new(TransportKind::WebSocket, 8);
        hub.on_connect(connection).unwrap();

        let body = "{}".to_string();
        let request = post("/api/alert/notify")
            .body(Body::from(body))
            .unwrap();

        let (status, json) = send(app_with(hub), request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Unauthorized: Missing API key or token");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_notify_wrong_key_rejected_even_with_cookie() {
        let body = "{}".to_string();
        let request = post("/api/alert/notify")
            .header("x-api-key", "wrong")
            .header(header::COOKIE, "auth-token=opaque")
            .body(Body::from(body))
            .unwrap();

        let (status, json) = send(app_with(initialized_hub()), request).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Unauthorized: Invalid API key");
    }

    #[tokio::test]
    async fn test_notify_malformed_json_is_bad_request() {
        let body = "{\"id\": ".to_string();
        let request = post("/api/alert/notify")
            .header("x-api-key", SECRET)
            .body(Body::from(body))
            .unwrap();

        let (status, _) = send(app_with(initialized_hub()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_notify_before_hub_initialized() {
        let body = "{}".to_string();
        let request = post("/api/alert/notify")
            .header("x-api-key", SECRET)
            .body(Body::from(body))
            .unwrap();

        let (status, _) = send(app_with(BroadcastHub::new()), request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_update_publishes_alert_update() {
        let hub = initialized_hub();
        let (connection, mut rx) = Connection::new(TransportKind::Polling, 8);
        hub.on_connect(connection).unwrap();

        let body = json!({ "id": "2", "status": "resolved" }).to_string();
        let request = post("/api/alert/update")
            .header("x-api-key", SECRET)
            .body(Body::from(body))
            .unwrap();

        let (status, _) = send(app_with(hub), request).await;
        assert_eq!(status, StatusCode::OK);

        let event = rx.try_recv().unwrap();
        assert_eq!(event.kind(), "alert-update");
        assert_eq!(event.alert().status, AlertStatus::Resolved);
    }

    #[tokio::test]
    async fn test_update_without_id_is_bad_request() {
        let body = json!({ "status": "resolved" }).to_string();
        let request = post("/api/alert/update")
            .header("x-api-key", SECRET)
            .body(Body::from(body))
            .unwrap();

        let (status, _) = send(app_with(initialized_hub()), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
