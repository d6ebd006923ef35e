//! Long-polling transport
//!
//! Fallback for clients that cannot hold a WebSocket open. A client opens a
//! session, then repeatedly long-polls it; each poll returns every event
//! queued since the previous one. A session is a regular hub connection
//! whose outbound queue is drained by poll requests instead of a socket.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tracing::{debug, info};

use crate::api::server::AppState;
use crate::error::{FallwatchError, Result};
use crate::hub::{BroadcastHub, Connection, ConnectionId, TransportKind};
use crate::models::AlertEvent;

/// Handshake returned when a polling session is opened
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollHandshake {
    pub sid: String,
    pub poll_timeout_ms: u64,
}

struct PollSession {
    rx: tokio::sync::Mutex<mpsc::Receiver<AlertEvent>>,
    last_seen: Mutex<Instant>,
}

impl PollSession {
    fn touch(&self) {
        *self.last_seen.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_seen.lock().elapsed()
    }
}

/// Open polling sessions, keyed by their hub connection id
#[derive(Clone, Default)]
pub struct PollingSessions {
    sessions: Arc<DashMap<ConnectionId, Arc<PollSession>>>,
}

impl PollingSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Register a new polling connection with the hub
    pub fn open(&self, hub: &BroadcastHub) -> Result<ConnectionId> {
        let buffer = hub
            .transport()
            .map(|t| t.buffer_size)
            .ok_or(FallwatchError::HubNotInitialized)?;

        let (connection, rx) = Connection::new(TransportKind::Polling, buffer);
        let id = hub.on_connect(connection)?;

        self.sessions.insert(
            id,
            Arc::new(PollSession {
                rx: tokio::sync::Mutex::new(rx),
                last_seen: Mutex::new(Instant::now()),
            }),
        );

        Ok(id)
    }

    /// Wait up to `timeout` for events on a session.
    ///
    /// Returns as soon as at least one event is queued, together with any
    /// others already waiting. Returns an empty batch when the wait times out.
    pub async fn poll(
        &self,
        hub: &BroadcastHub,
        id: &ConnectionId,
        timeout: Duration,
    ) -> Result<Vec<AlertEvent>> {
        let session = self
            .sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FallwatchError::SessionNotFound { sid: id.to_string() })?;

        let mut rx = session.rx.try_lock().map_err(|_| {
            FallwatchError::InvalidRequest("a poll is already in progress for this session".into())
        })?;
        session.touch();

        let mut events = Vec::new();
        let mut closed = false;

        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(event)) => {
                events.push(event);
                loop {
                    match rx.try_recv() {
                        Ok(event) => events.push(event),
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Disconnected) => {
                            closed = true;
                            break;
                        }
                    }
                }
            }
            Ok(None) => closed = true,
            Err(_) => {}
        }

        session.touch();
        drop(rx);

        if closed {
            // The hub released this connection (shutdown or write failure).
            self.sessions.remove(id);
            hub.on_disconnect(id);
            if events.is_empty() {
                return Err(FallwatchError::SessionNotFound { sid: id.to_string() });
            }
        }

        Ok(events)
    }

    /// Close a session. Returns whether it existed.
    pub fn close(&self, hub: &BroadcastHub, id: &ConnectionId) -> bool {
        let existed = self.sessions.remove(id).is_some();
        hub.on_disconnect(id);
        existed
    }

    /// Close sessions that have not been polled within `idle_timeout`.
    ///
    /// Sessions with a poll in flight are never reaped.
    pub fn reap_idle(&self, hub: &BroadcastHub, idle_timeout: Duration) -> usize {
        let expired: Vec<ConnectionId> = self
            .sessions
            .iter()
            .filter(|entry| {
                let session = entry.value();
                session.idle_for() > idle_timeout && session.rx.try_lock().is_ok()
            })
            .map(|entry| *entry.key())
            .collect();

        for id in &expired {
            debug!(connection_id = %id, "Reaping idle polling session");
            self.close(hub, id);
        }

        expired.len()
    }
}

fn parse_sid(sid: &str) -> Result<ConnectionId> {
    ConnectionId::parse(sid).ok_or_else(|| FallwatchError::SessionNotFound {
        sid: sid.to_string(),
    })
}

/// Open a polling session
pub async fn open_session(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let id = state.sessions.open(&state.hub)?;
    info!(connection_id = %id, "Polling session opened");

    Ok((
        StatusCode::CREATED,
        Json(PollHandshake {
            sid: id.to_string(),
            poll_timeout_ms: state.config.realtime.poll_timeout().as_millis() as u64,
        }),
    ))
}

/// Long-poll a session for queued events
pub async fn poll_session(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<impl IntoResponse> {
    let id = parse_sid(&sid)?;
    let events = state
        .sessions
        .poll(&state.hub, &id, state.config.realtime.poll_timeout())
        .await?;

    Ok(Json(events))
}

/// Close a session
pub async fn close_session(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<impl IntoResponse> {
    let id = parse_sid(&sid)?;
    if !state.sessions.close(&state.hub, &id) {
        return Err(FallwatchError::SessionNotFound { sid });
    }

    Ok(StatusCode::NO_CONTENT)
}
