//! HTTP surface of the relay
//!
//! Serves the alert ingestion webhook, status endpoints and the push channel
//! transports on one listener.

pub mod handlers;
pub mod middleware;
pub mod realtime;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
