//! Fallwatch - Real-time Fall Alert Relay
//!
//! Relays fall-detection alerts from an external detection system to every
//! connected monitoring dashboard.
//!
//! ## Features
//!
//! - Authenticated webhook ingestion with permissive payload defaults
//! - Broadcast hub fanning events out to all live clients
//! - WebSocket transport with long-polling fallback on one reserved path
//! - Reconnecting client subscriber with swappable handlers
//! - Local alert list reconciliation (dedup, prepend, replace)

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod hub;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{FallwatchError, Result};
pub use hub::BroadcastHub;
