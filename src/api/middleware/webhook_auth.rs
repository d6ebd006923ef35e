//! Webhook authentication
//!
//! Ingestion requests authenticate with the shared secret in `x-api-key` or
//! with the dashboard session cookie. The cookie value is opaque here; it is
//! issued and checked by the external backend.

use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use subtle::ConstantTimeEq;
use tracing::{debug, warn};

use crate::api::server::AppState;
use crate::config::WebhookConfig;
use crate::error::{FallwatchError, Result};

/// Header carrying the webhook shared secret
pub const API_KEY_HEADER: &str = "x-api-key";

/// How a webhook caller proved itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookCredential {
    ApiKey,
    SessionCookie,
}

/// Decide whether a webhook request is authorized.
///
/// A configured secret that does not match the supplied key rejects the
/// request even when a session cookie is present.
pub fn authorize(
    config: &WebhookConfig,
    api_key: Option<&str>,
    session_token: Option<&str>,
) -> Result<WebhookCredential> {
    let api_key = api_key.filter(|k| !k.is_empty());
    let session_token = session_token.filter(|t| !t.is_empty());

    if api_key.is_none() && session_token.is_none() {
        return Err(FallwatchError::MissingCredentials);
    }

    if let Some(supplied) = api_key {
        match config.api_key.as_deref() {
            Some(expected) if bool::from(supplied.as_bytes().ct_eq(expected.as_bytes())) => {
                return Ok(WebhookCredential::ApiKey);
            }
            Some(_) => {
                warn!("Webhook rejected: API key mismatch");
                return Err(FallwatchError::InvalidApiKey);
            }
            None => {
                debug!("Webhook API key supplied but no secret is configured");
            }
        }
    }

    match session_token {
        Some(_) => Ok(WebhookCredential::SessionCookie),
        None => Err(FallwatchError::InvalidApiKey),
    }
}

/// Find a cookie value in a `Cookie` header
pub fn cookie_value<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        if key == name {
            Some(value.trim_matches('"'))
        } else {
            None
        }
    })
}

/// Extractor for authorized webhook requests
#[derive(Debug, Clone, Copy)]
pub struct WebhookCaller {
    pub credential: WebhookCredential,
}

#[axum::async_trait]
impl FromRequestParts<AppState> for WebhookCaller {
    type Rejection = FallwatchError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let webhook = &state.config.webhook;

        let api_key = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok());

        let session_token = parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|cookies| cookie_value(cookies, &webhook.session_cookie));

        let credential = authorize(webhook, api_key, session_token)?;
        debug!(credential = ?credential, "Webhook caller authorized");

        Ok(WebhookCaller { credential })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(api_key: Option<&str>) -> WebhookConfig {
        WebhookConfig {
            api_key: api_key.map(str::to_string),
            session_cookie: "auth-token".to_string(),
        }
    }

    #[test]
    fn test_missing_credentials() {
        let err = authorize(&config(Some("secret")), None, None).unwrap_err();
        assert!(matches!(err, FallwatchError::MissingCredentials));

        let err = authorize(&config(None), Some(""), Some("")).unwrap_err();
        assert!(matches!(err, FallwatchError::MissingCredentials));
    }

    #[test]
    fn test_matching_api_key() {
        let credential = authorize(&config(Some("secret")), Some("secret"), None).unwrap();
        assert_eq!(credential, WebhookCredential::ApiKey);
    }

    #[test]
    fn test_mismatched_api_key_wins_over_cookie() {
        let err = authorize(&config(Some("secret")), Some("wrong"), Some("token")).unwrap_err();
        assert!(matches!(err, FallwatchError::InvalidApiKey));
    }

    #[test]
    fn test_session_cookie_alone() {
        let credential = authorize(&config(Some("secret")), None, Some("token")).unwrap();
        assert_eq!(credential, WebhookCredential::SessionCookie);
    }

    #[test]
    fn test_api_key_without_configured_secret() {
        let err = authorize(&config(None), Some("anything"), None).unwrap_err();
        assert!(matches!(err, FallwatchError::InvalidApiKey));

        let credential = authorize(&config(None), Some("anything"), Some("token")).unwrap();
        assert_eq!(credential, WebhookCredential::SessionCookie);
    }

    #[test]
    fn test_cookie_value_parsing() {
        let header = "theme=dark; auth-token=abc123; other=1";
        assert_eq!(cookie_value(header, "auth-token"), Some("abc123"));
        assert_eq!(cookie_value(header, "missing"), None);
        assert_eq!(cookie_value("auth-token=\"quoted\"", "auth-token"), Some("quoted"));
        assert_eq!(cookie_value("garbage", "auth-token"), None);
    }
}
