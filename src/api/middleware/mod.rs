//! API middleware

mod cors;
mod logging;
mod webhook_auth;

pub use cors::cors_layer;
pub use logging::RequestLogging;
pub use webhook_auth::{authorize, cookie_value, WebhookCaller, WebhookCredential, API_KEY_HEADER};
