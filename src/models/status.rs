use serde::{Deserialize, Serialize};

/// Relay status report
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelayStatus {
    /// Whether the broadcast hub is accepting connections
    pub hub_initialized: bool,
    /// Path prefix of the push channel
    pub transport_path: Option<String>,
    /// Live connections across all transports
    pub connections: usize,
    /// Open long-polling sessions
    pub polling_sessions: usize,
    /// Seconds since the server started
    pub uptime_secs: u64,
}
