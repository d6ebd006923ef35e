//! alert-watch - terminal consumer of the relay's alert stream
//!
//! Subscribes to a running relay, keeps the reconciled alert list and logs
//! every change. Exits on Ctrl+C or once reconnection attempts run out.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use parking_lot::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use url::Url;

use fallwatch::client::{AlertHandlers, AlertList, AlertSubscriber, SubscriberConfig, SubscriberState};
use fallwatch::hub::TransportKind;
use fallwatch::models::AlertEvent;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "alert_watch=info,fallwatch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = subscriber_config_from_env()?;
    info!("Watching alerts from {}{}", config.url, config.path);

    let list = Arc::new(Mutex::new(AlertList::new()));
    let subscriber = AlertSubscriber::connect(config, handlers_for(list.clone()));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted");
        }
        _ = subscriber.wait_for_state(|s| *s == SubscriberState::Disconnected) => {
            warn!("Relay unreachable, giving up");
        }
    }

    subscriber.close().await;

    let list = list.lock();
    info!(
        "{} alerts received, {} unhandled",
        list.len(),
        list.unhandled_count()
    );
    Ok(())
}

fn handlers_for(list: Arc<Mutex<AlertList>>) -> AlertHandlers {
    let on_new = list.clone();
    let on_update = list;

    AlertHandlers::new()
        .on_new_alert(move |alert| {
            let id = alert.id.clone();
            let mut list = on_new.lock();
            if list.apply(AlertEvent::NewAlert(alert)) {
                info!(alert_id = %id, total = list.len(), unhandled = list.unhandled_count(), "New alert");
            }
        })
        .on_alert_update(move |alert| {
            let id = alert.id.clone();
            let status = alert.status;
            let mut list = on_update.lock();
            if list.apply(AlertEvent::AlertUpdate(alert)) {
                info!(alert_id = %id, %status, unhandled = list.unhandled_count(), "Alert updated");
            }
        })
}

fn subscriber_config_from_env() -> anyhow::Result<SubscriberConfig> {
    let raw_url = env::var("FALLWATCH_URL").unwrap_or_else(|_| "http://localhost:3000".into());
    let url = Url::parse(&raw_url).with_context(|| format!("FALLWATCH_URL is invalid: {}", raw_url))?;

    let mut config = SubscriberConfig::new(url);

    if let Ok(path) = env::var("FALLWATCH_PATH") {
        config.path = path;
    }
    if let Ok(attempts) = env::var("FALLWATCH_RECONNECT_ATTEMPTS") {
        config.max_reconnect_attempts = attempts
            .parse()
            .context("FALLWATCH_RECONNECT_ATTEMPTS must be a number")?;
    }
    if let Ok(delay) = env::var("FALLWATCH_RECONNECT_DELAY_MS") {
        let millis: u64 = delay
            .parse()
            .context("FALLWATCH_RECONNECT_DELAY_MS must be a number")?;
        config.reconnect_delay = Duration::from_millis(millis);
    }
    if let Ok(raw) = env::var("FALLWATCH_TRANSPORTS") {
        let mut transports = Vec::new();
        for name in raw.split(',').filter(|s| !s.trim().is_empty()) {
            match TransportKind::from_str(name) {
                Some(kind) => transports.push(kind),
                None => bail!("unknown transport in FALLWATCH_TRANSPORTS: {}", name),
            }
        }
        if transports.is_empty() {
            bail!("FALLWATCH_TRANSPORTS must name at least one transport");
        }
        config.transports = transports;
    }

    Ok(config)
}
