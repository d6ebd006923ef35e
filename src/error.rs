use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for the Fallwatch relay
#[derive(Error, Debug)]
pub enum FallwatchError {
    // Hub errors
    #[error("Broadcast hub not initialized")]
    HubNotInitialized,

    #[error("Polling session not found: {sid}")]
    SessionNotFound { sid: String },

    // Webhook authentication errors
    #[error("Unauthorized: Missing API key or token")]
    MissingCredentials,

    #[error("Unauthorized: Invalid API key")]
    InvalidApiKey,

    // Request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid alert status: {0}")]
    InvalidStatus(String),

    // Subscriber errors
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Unexpected response status from relay: {0}")]
    UnexpectedStatus(u16),

    #[error("Operation timed out")]
    Timeout,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(String),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Fallwatch operations
pub type Result<T> = std::result::Result<T, FallwatchError>;

impl FallwatchError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            FallwatchError::InvalidRequest(_)
            | FallwatchError::InvalidStatus(_)
            | FallwatchError::Serialization(_)
            | FallwatchError::InvalidConfig(_) => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            FallwatchError::MissingCredentials | FallwatchError::InvalidApiKey => {
                StatusCode::UNAUTHORIZED
            }

            // 404 Not Found
            FallwatchError::SessionNotFound { .. } => StatusCode::NOT_FOUND,

            // 502 Bad Gateway
            FallwatchError::ConnectionFailed(_) | FallwatchError::UnexpectedStatus(_) => {
                StatusCode::BAD_GATEWAY
            }

            // 503 Service Unavailable
            FallwatchError::HubNotInitialized => StatusCode::SERVICE_UNAVAILABLE,

            // 504 Gateway Timeout
            FallwatchError::Timeout => StatusCode::GATEWAY_TIMEOUT,

            // 500 Internal Server Error
            FallwatchError::Io(_) | FallwatchError::Http(_) | FallwatchError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

// Implement IntoResponse for API error responses
impl IntoResponse for FallwatchError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

// Convert from hyper errors
impl From<hyper::Error> for FallwatchError {
    fn from(err: hyper::Error) -> Self {
        FallwatchError::Http(err.to_string())
    }
}

// Convert from WebSocket client errors
impl From<tokio_tungstenite::tungstenite::Error> for FallwatchError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        FallwatchError::ConnectionFailed(err.to_string())
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for FallwatchError {
    fn from(err: url::ParseError) -> Self {
        FallwatchError::InvalidConfig(format!("invalid URL: {}", err))
    }
}
