//! Broadcast hub
//!
//! Holds the registry of live client channels and fans alert events out to
//! all of them. The hub is constructed explicitly and shared through
//! [`AppState`](crate::api::server::AppState); it starts accepting clients
//! once [`BroadcastHub::initialize`] has been called.

mod connection;

pub use connection::{Connection, ConnectionId, TransportKind};

use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use crate::error::{FallwatchError, Result};
use crate::models::AlertEvent;

/// Default path prefix reserved for the push channel
pub const DEFAULT_TRANSPORT_PATH: &str = "/socket.io";

/// Default number of events buffered per connection
pub const DEFAULT_CONNECTION_BUFFER: usize = 256;

/// Transport binding chosen at initialization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// Path prefix for the push channel, kept apart from application routes
    pub path: String,
    /// Outbound queue size per connection
    pub buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_TRANSPORT_PATH.to_string(),
            buffer_size: DEFAULT_CONNECTION_BUFFER,
        }
    }
}

/// Outcome of a single publish call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// Connections the event was queued for
    pub delivered: usize,
    /// Connections that could not take the event and were unregistered
    pub removed: usize,
}

struct HubInner {
    transport: OnceLock<TransportConfig>,
    connections: DashMap<ConnectionId, Connection>,
}

/// Process-wide fan-out point for alert events
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    /// Create an uninitialized hub
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                transport: OnceLock::new(),
                connections: DashMap::new(),
            }),
        }
    }

    /// Bind the hub to its transport and start accepting connections.
    ///
    /// Only the first call takes effect; later calls return the transport
    /// already in use.
    pub fn initialize(&self, transport: TransportConfig) -> &TransportConfig {
        let mut fresh = false;
        let active = self.inner.transport.get_or_init(|| {
            fresh = true;
            transport.clone()
        });

        if fresh {
            info!(
                path = %active.path,
                buffer_size = active.buffer_size,
                "Broadcast hub initialized"
            );
        } else if *active != transport {
            debug!(
                path = %active.path,
                "Broadcast hub already initialized, ignoring new transport config"
            );
        }

        active
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.transport.get().is_some()
    }

    /// Transport binding, if initialized
    pub fn transport(&self) -> Option<&TransportConfig> {
        self.inner.transport.get()
    }

    /// Register a connection for future broadcasts
    pub fn on_connect(&self, connection: Connection) -> Result<ConnectionId> {
        if !self.is_initialized() {
            return Err(FallwatchError::HubNotInitialized);
        }

        let id = connection.id();
        let transport = connection.transport();
        self.inner.connections.insert(id, connection);

        info!(connection_id = %id, transport = %transport, "Client connected");
        Ok(id)
    }

    /// Remove a connection. Returns whether it was still registered.
    pub fn on_disconnect(&self, id: &ConnectionId) -> bool {
        match self.inner.connections.remove(id) {
            Some((_, connection)) => {
                info!(
                    connection_id = %id,
                    transport = %connection.transport(),
                    connected_for = ?connection.connected_at().elapsed(),
                    "Client disconnected"
                );
                true
            }
            None => false,
        }
    }

    pub fn is_connected(&self, id: &ConnectionId) -> bool {
        self.inner.connections.contains_key(id)
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    /// Queue an event for every registered connection without waiting.
    ///
    /// Iterates a snapshot of the registry, so connects and disconnects
    /// during fan-out do not affect this call.
    pub fn publish(&self, event: AlertEvent) -> PublishReport {
        let mut report = PublishReport::default();

        if !self.is_initialized() {
            warn!(
                kind = event.kind(),
                alert_id = %event.alert().id,
                "Broadcast hub not initialized, dropping event"
            );
            return report;
        }

        let snapshot: Vec<Connection> = self
            .inner
            .connections
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for connection in snapshot {
            match connection.try_deliver(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    // A full queue counts as a failed write
                    warn!(
                        connection_id = %connection.id(),
                        "Connection buffer full, disconnecting client"
                    );
                    if self.on_disconnect(&connection.id()) {
                        report.removed += 1;
                    }
                }
                Err(TrySendError::Closed(_)) => {
                    if self.on_disconnect(&connection.id()) {
                        report.removed += 1;
                    }
                }
            }
        }

        info!(
            kind = event.kind(),
            alert_id = %event.alert().id,
            delivered = report.delivered,
            removed = report.removed,
            "Published alert event"
        );

        report
    }

    /// Drop every connection; their transports close as their queues drain.
    pub fn shutdown(&self) {
        let count = self.inner.connections.len();
        self.inner.connections.clear();
        info!("Broadcast hub shut down, released {} connections", count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Alert, AlertStatus};

    fn alert(id: &str) -> Alert {
        Alert {
            id: id.to_string(),
            title: "Fall Detected".to_string(),
            status: AlertStatus::Unhandled,
            description: String::new(),
            time_ago: "just now".to_string(),
            location: "Room 101".to_string(),
        }
    }

    fn initialized_hub() -> BroadcastHub {
        let hub = BroadcastHub::new();
        hub.initialize(TransportConfig::default());
        hub
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let hub = BroadcastHub::new();
        assert!(!hub.is_initialized());

        let first = hub.initialize(TransportConfig::default()).clone();
        let second = hub.initialize(TransportConfig {
            path: "/other".to_string(),
            buffer_size: 4,
        });

        assert_eq!(&first, second);
        assert_eq!(hub.transport().unwrap().path, DEFAULT_TRANSPORT_PATH);
    }

    #[test]
    fn test_connect_before_initialize_is_rejected() {
        let hub = BroadcastHub::new();
        let (connection, _rx) = Connection::new(TransportKind::WebSocket, 8);

        let err = hub.on_connect(connection).unwrap_err();
        assert!(matches!(err, FallwatchError::HubNotInitialized));
        assert_eq!(hub.connection_count(), 0);
    }

    #[test]
    fn test_publish_uninitialized_is_noop() {
        let hub = BroadcastHub::new();
        let report = hub.publish(AlertEvent::NewAlert(alert("1")));
        assert_eq!(report, PublishReport::default());
    }

    #[test]
    fn test_publish_with_no_connections() {
        let hub = initialized_hub();
        let report = hub.publish(AlertEvent::NewAlert(alert("1")));
        assert_eq!(report.delivered, 0);
    }

    #[test]
    fn test_publish_reaches_every_connection_once() {
        let hub = initialized_hub();
        let mut receivers = Vec::new();
        for _ in 0..5 {
            let (connection, rx) = Connection::new(TransportKind::WebSocket, 8);
            hub.on_connect(connection).unwrap();
            receivers.push(rx);
        }

        let event = AlertEvent::NewAlert(alert("1"));
        let report = hub.publish(event.clone());
        assert_eq!(report.delivered, 5);

        for rx in receivers.iter_mut() {
            assert_eq!(rx.try_recv().unwrap(), event);
            assert!(rx.try_recv().is_err());
        }
    }

    #[test]
    fn test_disconnected_connection_misses_event() {
        let hub = initialized_hub();
        let (kept, mut kept_rx) = Connection::new(TransportKind::WebSocket, 8);
        let (gone, mut gone_rx) = Connection::new(TransportKind::Polling, 8);
        hub.on_connect(kept).unwrap();
        let gone_id = hub.on_connect(gone).unwrap();

        assert!(hub.on_disconnect(&gone_id));
        assert!(!hub.on_disconnect(&gone_id));

        hub.publish(AlertEvent::NewAlert(alert("1")));

        assert!(kept_rx.try_recv().is_ok());
        assert!(gone_rx.try_recv().is_err());
    }

    #[test]
    fn test_closed_connection_is_removed_during_publish() {
        let hub = initialized_hub();
        let (live, mut live_rx) = Connection::new(TransportKind::WebSocket, 8);
        let (dead, dead_rx) = Connection::new(TransportKind::WebSocket, 8);
        hub.on_connect(live).unwrap();
        let dead_id = hub.on_connect(dead).unwrap();
        drop(dead_rx);

        let report = hub.publish(AlertEvent::NewAlert(alert("1")));

        assert_eq!(report.delivered, 1);
        assert_eq!(report.removed, 1);
        assert!(!hub.is_connected(&dead_id));
        assert!(live_rx.try_recv().is_ok());
    }

    #[test]
    fn test_full_buffer_disconnects_slow_client() {
        let hub = initialized_hub();
        let (slow, mut slow_rx) = Connection::new(TransportKind::WebSocket, 1);
        let slow_id = hub.on_connect(slow).unwrap();
        let (live, mut live_rx) = Connection::new(TransportKind::WebSocket, 8);
        hub.on_connect(live).unwrap();

        hub.publish(AlertEvent::NewAlert(alert("1")));
        let report = hub.publish(AlertEvent::NewAlert(alert("2")));

        assert_eq!(report.delivered, 1);
        assert_eq!(report.removed, 1);
        assert!(!hub.is_connected(&slow_id));
        assert_eq!(hub.connection_count(), 1);

        // The slow client still drains what it was sent, then sees the end
        assert_eq!(slow_rx.try_recv().unwrap().alert().id, "1");
        assert!(matches!(
            slow_rx.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
        ));

        assert_eq!(live_rx.try_recv().unwrap().alert().id, "1");
        assert_eq!(live_rx.try_recv().unwrap().alert().id, "2");
    }

    #[test]
    fn test_events_arrive_in_publish_order() {
        let hub = initialized_hub();
        let (connection, mut rx) = Connection::new(TransportKind::WebSocket, 16);
        hub.on_connect(connection).unwrap();

        hub.publish(AlertEvent::NewAlert(alert("1")));
        hub.publish(AlertEvent::AlertUpdate(alert("1")));
        hub.publish(AlertEvent::NewAlert(alert("2")));

        let kinds: Vec<(&str, String)> = (0..3)
            .map(|_| {
                let event = rx.try_recv().unwrap();
                (event.kind(), event.alert().id.clone())
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("new-alert", "1".to_string()),
                ("alert-update", "1".to_string()),
                ("new-alert", "2".to_string()),
            ]
        );
    }

    #[test]
    fn test_shutdown_closes_connections() {
        let hub = initialized_hub();
        let (connection, mut rx) = Connection::new(TransportKind::WebSocket, 8);
        hub.on_connect(connection).unwrap();

        hub.shutdown();

        assert_eq!(hub.connection_count(), 0);
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::mpsc::error::TryRecvError::Disconnected)
        ));
    }
}
