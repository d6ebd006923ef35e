//! CORS middleware configuration
//!
//! Dashboard origins must be listed explicitly since the push channel and
//! the webhook accept credentials.

use axum::http::header;
use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::CorsLayer;
use tracing::debug;

use super::webhook_auth::API_KEY_HEADER;

/// Create a CORS layer with the specified allowed origins
///
/// An empty list allows the local dashboard dev server only.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = if allowed_origins.is_empty() {
        debug!("CORS: No origins specified, allowing localhost only");
        vec![
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ]
    } else {
        debug!("CORS: Allowing origins: {:?}", allowed_origins);
        allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect()
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static(API_KEY_HEADER),
        ])
        .allow_credentials(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use tower::ServiceExt;

    async fn allowed_origin(origins: &[String], origin: &str) -> Option<String> {
        let app = axum::Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(cors_layer(origins));

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::GET)
                    .uri("/")
                    .header("Origin", origin)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        response
            .headers()
            .get("access-control-allow-origin")
            .map(|v| v.to_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_cors_empty_origins_allows_localhost() {
        assert_eq!(
            allowed_origin(&[], "http://localhost:3000").await.as_deref(),
            Some("http://localhost:3000")
        );
    }

    #[tokio::test]
    async fn test_cors_empty_origins_blocks_other_origins() {
        assert!(allowed_origin(&[], "https://example.com").await.is_none());
    }

    #[tokio::test]
    async fn test_cors_with_origins_allows_configured() {
        let origins = vec![
            "https://dashboard.example.com".to_string(),
            "https://ops.example.com".to_string(),
        ];

        assert_eq!(
            allowed_origin(&origins, "https://ops.example.com")
                .await
                .as_deref(),
            Some("https://ops.example.com")
        );
        assert!(allowed_origin(&origins, "http://localhost:3000")
            .await
            .is_none());
    }
}
