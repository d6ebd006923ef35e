//! API server using Axum
//!
//! One listener serves the ingestion webhook, status routes and, under the
//! hub's reserved prefix, the push channel transports.

use std::net::SocketAddr;
use std::time::Instant;

use axum::Router;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::config::{ApiServerConfig, Config};
use crate::error::{FallwatchError, Result};
use crate::hub::BroadcastHub;

use super::middleware::{cors_layer, RequestLogging};
use super::realtime::PollingSessions;
use super::routes;

/// Shared state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub hub: BroadcastHub,
    pub sessions: PollingSessions,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: Config, hub: BroadcastHub, sessions: PollingSessions) -> Self {
        Self {
            config,
            hub,
            sessions,
            started_at: Instant::now(),
        }
    }
}

/// API server
pub struct ApiServer {
    config: ApiServerConfig,
    state: AppState,
}

impl ApiServer {
    /// Create a new API server and bind the hub to its transport path
    pub fn new(full_config: Config, hub: BroadcastHub, sessions: PollingSessions) -> Self {
        hub.initialize(full_config.realtime.transport());

        Self {
            config: full_config.api.clone(),
            state: AppState::new(full_config, hub, sessions),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router
    pub fn build_router(&self) -> Router {
        let cors = cors_layer(&self.config.cors_origins);

        routes::create_router(self.state.clone())
            .layer(axum::middleware::from_fn(RequestLogging::log_request))
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|_| {
                FallwatchError::InvalidConfig(format!(
                    "invalid listen address {}:{}",
                    self.config.host, self.config.port
                ))
            })?;

        let router = self.build_router();

        info!("API server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            })
            .await
            .map_err(|e| FallwatchError::Internal(e.to_string()))?;

        info!("API server shut down");
        Ok(())
    }
}
