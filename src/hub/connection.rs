//! Registry entries for live client channels

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::AlertEvent;

/// Opaque identifier of one live client channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transport a client is attached through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    WebSocket,
    Polling,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::WebSocket => "websocket",
            TransportKind::Polling => "polling",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "websocket" | "ws" => Some(TransportKind::WebSocket),
            "polling" | "poll" => Some(TransportKind::Polling),
            _ => None,
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Hub-side handle of one client channel
///
/// Holds the sending half of the connection's bounded outbound queue. The
/// transport task owns the receiving half and writes queued events to the
/// client. Dropping the handle closes the queue.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    transport: TransportKind,
    connected_at: Instant,
    tx: mpsc::Sender<AlertEvent>,
}

impl Connection {
    /// Create a connection with an outbound queue of `buffer` events
    pub fn new(transport: TransportKind, buffer: usize) -> (Self, mpsc::Receiver<AlertEvent>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let connection = Self {
            id: ConnectionId::new(),
            transport,
            connected_at: Instant::now(),
            tx,
        };
        (connection, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Enqueue an event without waiting
    pub(crate) fn try_deliver(
        &self,
        event: AlertEvent,
    ) -> std::result::Result<(), mpsc::error::TrySendError<AlertEvent>> {
        self.tx.try_send(event)
    }
}
