//! Alert subscriber
//!
//! Keeps one logical subscription to the relay for the lifetime of a UI
//! session. The connection is established once and re-established on
//! failure with a bounded, fixed-delay retry policy. Handlers live in a
//! swappable cell that is read for every event, so replacing them never
//! touches the connection.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

use super::transport::{open_stream, EventStream};
use crate::hub::{TransportKind, DEFAULT_TRANSPORT_PATH};
use crate::models::{Alert, AlertEvent};

/// Callback invoked with a pushed alert
pub type AlertHandler = Arc<dyn Fn(Alert) + Send + Sync>;

/// Handlers for the two pushed event kinds
#[derive(Clone, Default)]
pub struct AlertHandlers {
    pub on_new_alert: Option<AlertHandler>,
    pub on_alert_update: Option<AlertHandler>,
}

impl AlertHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_new_alert(mut self, handler: impl Fn(Alert) + Send + Sync + 'static) -> Self {
        self.on_new_alert = Some(Arc::new(handler));
        self
    }

    pub fn on_alert_update(mut self, handler: impl Fn(Alert) + Send + Sync + 'static) -> Self {
        self.on_alert_update = Some(Arc::new(handler));
        self
    }

    fn dispatch(&self, event: AlertEvent) {
        let (handler, alert) = match event {
            AlertEvent::NewAlert(alert) => (&self.on_new_alert, alert),
            AlertEvent::AlertUpdate(alert) => (&self.on_alert_update, alert),
        };
        if let Some(handler) = handler {
            handler(alert);
        }
    }
}

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Base URL of the relay, e.g. `http://localhost:3000`
    pub url: Url,
    /// Path prefix of the push channel
    pub path: String,
    /// Transports to try, in order, on every connection attempt
    pub transports: Vec<TransportKind>,
    /// Reconnection attempts after a failure before giving up
    pub max_reconnect_attempts: u32,
    /// Fixed delay between attempts
    pub reconnect_delay: Duration,
    /// A WebSocket silent for this long is treated as lost. Must exceed the
    /// relay's ping interval.
    pub read_timeout: Duration,
}

impl SubscriberConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            path: DEFAULT_TRANSPORT_PATH.to_string(),
            transports: vec![TransportKind::WebSocket, TransportKind::Polling],
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(1),
            read_timeout: Duration::from_secs(45),
        }
    }
}

/// Observable connection state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriberState {
    Connecting,
    Connected(TransportKind),
    Reconnecting { attempt: u32 },
    /// Retries exhausted; stays here until the subscriber is recreated
    Disconnected,
    Closed,
}

/// Long-lived subscription to the relay's alert events
pub struct AlertSubscriber {
    handlers: Arc<ArcSwap<AlertHandlers>>,
    state: watch::Receiver<SubscriberState>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AlertSubscriber {
    /// Start the subscription. Must be called within a tokio runtime.
    pub fn connect(config: SubscriberConfig, handlers: AlertHandlers) -> Self {
        let handlers = Arc::new(ArcSwap::from_pointee(handlers));
        let (state_tx, state) = watch::channel(SubscriberState::Connecting);
        let (shutdown_tx, shutdown) = watch::channel(false);

        let task = tokio::spawn(run_subscription(
            config,
            handlers.clone(),
            state_tx,
            shutdown,
        ));

        Self {
            handlers,
            state,
            shutdown_tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Replace the handlers; takes effect from the next event on
    pub fn set_handlers(&self, handlers: AlertHandlers) {
        self.handlers.store(Arc::new(handlers));
    }

    pub fn state(&self) -> SubscriberState {
        self.state.borrow().clone()
    }

    /// Wait until the state satisfies `predicate`.
    ///
    /// Returns `None` if the subscription task ended first.
    pub async fn wait_for_state(
        &self,
        predicate: impl FnMut(&SubscriberState) -> bool,
    ) -> Option<SubscriberState> {
        let mut state = self.state.clone();
        let reached = state.wait_for(predicate).await.ok().map(|s| s.clone());
        reached
    }

    /// Close the subscription. Later calls return immediately.
    pub async fn close(&self) {
        let task = self.task.lock().take();
        let Some(task) = task else {
            return;
        };

        let _ = self.shutdown_tx.send(true);
        if let Err(e) = task.await {
            if !e.is_cancelled() {
                error!("Alert subscription task failed: {}", e);
            }
        }
    }
}

impl Drop for AlertSubscriber {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

enum StreamEnd {
    Shutdown,
    Lost(String),
}

async fn run_subscription(
    config: SubscriberConfig,
    handlers: Arc<ArcSwap<AlertHandlers>>,
    state: watch::Sender<SubscriberState>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut failures: u32 = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let opened = tokio::select! {
            opened = open_stream(
                &config.url,
                &config.path,
                &config.transports,
                config.read_timeout,
            ) => opened,
            _ = shutdown.changed() => break,
        };

        match opened {
            Ok(mut stream) => {
                failures = 0;
                let transport = stream.transport();
                state.send_replace(SubscriberState::Connected(transport));
                info!(transport = %transport, "Alert channel connected");

                match pump(stream.as_mut(), &handlers, &mut shutdown).await {
                    StreamEnd::Shutdown => {
                        stream.close().await;
                        break;
                    }
                    StreamEnd::Lost(reason) => {
                        warn!(transport = %transport, "Alert channel disconnected: {}", reason);
                    }
                }
            }
            Err(e) => {
                error!("Alert channel connection error: {}", e);
            }
        }

        failures += 1;
        if failures > config.max_reconnect_attempts {
            error!(
                "Giving up on alert channel after {} reconnection attempts",
                config.max_reconnect_attempts
            );
            state.send_replace(SubscriberState::Disconnected);
            return;
        }

        state.send_replace(SubscriberState::Reconnecting { attempt: failures });
        debug!(
            attempt = failures,
            delay = ?config.reconnect_delay,
            "Reconnecting alert channel"
        );

        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    state.send_replace(SubscriberState::Closed);
    info!("Alert channel closed");
}

async fn pump(
    stream: &mut dyn EventStream,
    handlers: &ArcSwap<AlertHandlers>,
    shutdown: &mut watch::Receiver<bool>,
) -> StreamEnd {
    loop {
        tokio::select! {
            next = stream.next_event() => match next {
                Ok(Some(event)) => {
                    debug!(kind = event.kind(), alert_id = %event.alert().id, "Alert event received");
                    handlers.load().dispatch(event);
                }
                Ok(None) => return StreamEnd::Lost("closed by relay".into()),
                Err(e) => return StreamEnd::Lost(e.to_string()),
            },
            _ = shutdown.changed() => return StreamEnd::Shutdown,
        }
    }
}
