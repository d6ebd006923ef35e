//! WebSocket transport
//!
//! Each socket is registered with the hub as one connection. Queued events
//! are written as JSON text frames and the socket is pinged on an interval;
//! the socket is unregistered when either side goes away or the peer stays
//! silent past the heartbeat window.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, warn};

use crate::api::server::AppState;
use crate::error::{FallwatchError, Result};
use crate::hub::{BroadcastHub, Connection, ConnectionId, TransportKind};

#[derive(Debug, Clone, Copy)]
struct Heartbeat {
    interval: Duration,
    idle_timeout: Duration,
}

/// Unregisters the connection when dropped
struct Registration {
    hub: BroadcastHub,
    id: ConnectionId,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.hub.on_disconnect(&self.id);
    }
}

/// WebSocket upgrade handler for the alert stream
pub async fn alerts_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<impl IntoResponse> {
    let buffer = state
        .hub
        .transport()
        .map(|t| t.buffer_size)
        .ok_or(FallwatchError::HubNotInitialized)?;

    let heartbeat = Heartbeat {
        interval: state.config.realtime.ping_interval(),
        idle_timeout: state.config.realtime.peer_idle_timeout(),
    };

    Ok(ws.on_upgrade(move |socket| handle_alerts_ws(socket, state.hub, buffer, heartbeat)))
}

/// Handle WebSocket connection for the alert stream
async fn handle_alerts_ws(
    socket: WebSocket,
    hub: BroadcastHub,
    buffer: usize,
    heartbeat: Heartbeat,
) {
    let (connection, mut rx) = Connection::new(TransportKind::WebSocket, buffer);
    let id = match hub.on_connect(connection) {
        Ok(id) => id,
        Err(e) => {
            warn!("Rejecting WebSocket client: {}", e);
            return;
        }
    };
    let _registration = Registration { hub, id };

    let (mut sender, mut receiver) = socket.split();

    // Write queued events and pings to the socket
    let mut send_task = tokio::spawn(async move {
        let mut ping = interval(heartbeat.interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ping.tick().await; // Skip immediate tick

        loop {
            tokio::select! {
                event = rx.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            if sender.send(Message::Text(json)).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Failed to serialize alert event: {}", e);
                        }
                    }
                }
                _ = ping.tick() => {
                    if sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sender.close().await;
    });

    // Any inbound frame, pongs included, proves the peer is alive
    let mut receive_task = tokio::spawn(async move {
        loop {
            let msg = match tokio::time::timeout(heartbeat.idle_timeout, receiver.next()).await {
                Ok(Some(msg)) => msg,
                Ok(None) => break,
                Err(_) => {
                    warn!(connection_id = %id, "Alerts WebSocket peer timed out");
                    break;
                }
            };

            match msg {
                Ok(Message::Close(_)) => {
                    debug!(connection_id = %id, "Alerts WebSocket received close");
                    break;
                }
                Err(e) => {
                    debug!(connection_id = %id, "Alerts WebSocket error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => receive_task.abort(),
        _ = &mut receive_task => send_task.abort(),
    }
}
