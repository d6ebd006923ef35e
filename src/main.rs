//! Fallwatch Relay Server - Entry Point
//!
//! Starts the HTTP server with the broadcast hub and the polling session
//! reaper, with graceful shutdown support.

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fallwatch::api::realtime::PollingSessions;
use fallwatch::api::ApiServer;
use fallwatch::config::{Config, LogConfig};
use fallwatch::hub::BroadcastHub;
use fallwatch::services::{SessionReaper, SessionReaperConfig, SessionReaperHandle};

#[tokio::main]
async fn main() -> fallwatch::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    init_tracing(&config.log);
    info!("Starting Fallwatch relay");

    let hub = BroadcastHub::new();
    let sessions = PollingSessions::new();

    // Create API server (binds the hub to its transport path)
    let api_server = ApiServer::new(config.clone(), hub.clone(), sessions.clone());

    // Start polling session reaper
    let (reaper_handle, reaper_shutdown) = SessionReaperHandle::new();
    let reaper = SessionReaper::new(
        hub.clone(),
        sessions.clone(),
        SessionReaperConfig::from_realtime(&config.realtime),
    );
    let reaper_task = tokio::spawn(async move {
        reaper.run(reaper_shutdown).await;
    });

    // Create shutdown channel
    let (shutdown_tx, _) = watch::channel(false);
    let api_shutdown = shutdown_tx.subscribe();

    let api_task = tokio::spawn(async move {
        if let Err(e) = api_server.run(api_shutdown).await {
            error!("API server error: {}", e);
        }
    });

    info!(
        "Relay started on {} (push channel at {})",
        config.api_addr(),
        config.realtime.path
    );

    // Wait for shutdown signal
    shutdown_signal().await;
    info!("Shutdown signal received");

    // Release connections so open sockets and long-polls finish
    hub.shutdown();
    let _ = shutdown_tx.send(true);
    reaper_handle.shutdown();

    let _ = tokio::join!(api_task, reaper_task);

    info!("Fallwatch relay stopped");
    Ok(())
}

/// Install the tracing subscriber selected by the log config
fn init_tracing(log: &LogConfig) {
    let json = log.format.eq_ignore_ascii_case("json");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("fallwatch={},tower_http=info", log.level).into()
            }),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
