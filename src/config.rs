use crate::error::{FallwatchError, Result};
use crate::hub::{TransportConfig, DEFAULT_CONNECTION_BUFFER, DEFAULT_TRANSPORT_PATH};
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// HTTP server configuration
    pub api: ApiServerConfig,
    /// Push channel configuration
    pub realtime: RealtimeConfig,
    /// Alert webhook authentication
    pub webhook: WebhookConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port for the HTTP server (default: 3000)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Allowed CORS origins (comma-separated, empty = localhost only)
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Path prefix reserved for the push channel (default: /socket.io)
    pub path: String,
    /// Events buffered per connection; a client that falls this far behind
    /// is disconnected
    pub buffer_size: usize,
    /// How long a long-poll request waits for an event, in seconds
    pub poll_timeout_secs: u64,
    /// Polling sessions idle longer than this are closed, in seconds
    pub session_idle_secs: u64,
    /// Interval between server pings on WebSocket connections, in seconds
    pub ping_interval_secs: u64,
    /// Extra silence tolerated after a missed ping before a WebSocket peer is
    /// dropped, in seconds
    pub ping_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Shared secret expected in the x-api-key header
    pub api_key: Option<String>,
    /// Name of the session cookie accepted as an alternative credential
    pub session_cookie: String,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            api: ApiServerConfig {
                port: get_env_or("PORT", "3000").parse().map_err(|_| {
                    FallwatchError::InvalidConfig("PORT must be a valid port number".into())
                })?,
                host: get_env_or("HOST", "0.0.0.0"),
                cors_origins: get_env_or("CORS_ORIGINS", "")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            realtime: RealtimeConfig {
                path: normalize_path(&get_env_or("REALTIME_PATH", DEFAULT_TRANSPORT_PATH))?,
                buffer_size: get_env_or(
                    "REALTIME_BUFFER_SIZE",
                    &DEFAULT_CONNECTION_BUFFER.to_string(),
                )
                .parse()
                .map_err(|_| {
                    FallwatchError::InvalidConfig(
                        "REALTIME_BUFFER_SIZE must be a valid number".into(),
                    )
                })?,
                poll_timeout_secs: get_env_or("REALTIME_POLL_TIMEOUT_SECS", "25")
                    .parse()
                    .map_err(|_| {
                        FallwatchError::InvalidConfig(
                            "REALTIME_POLL_TIMEOUT_SECS must be a valid number".into(),
                        )
                    })?,
                session_idle_secs: get_env_or("REALTIME_SESSION_IDLE_SECS", "60")
                    .parse()
                    .map_err(|_| {
                        FallwatchError::InvalidConfig(
                            "REALTIME_SESSION_IDLE_SECS must be a valid number".into(),
                        )
                    })?,
                ping_interval_secs: get_env_or("REALTIME_PING_INTERVAL_SECS", "25")
                    .parse()
                    .map_err(|_| {
                        FallwatchError::InvalidConfig(
                            "REALTIME_PING_INTERVAL_SECS must be a valid number".into(),
                        )
                    })?,
                ping_timeout_secs: get_env_or("REALTIME_PING_TIMEOUT_SECS", "20")
                    .parse()
                    .map_err(|_| {
                        FallwatchError::InvalidConfig(
                            "REALTIME_PING_TIMEOUT_SECS must be a valid number".into(),
                        )
                    })?,
            },
            webhook: WebhookConfig {
                api_key: env::var("WEBHOOK_API_KEY")
                    .ok()
                    .filter(|key| !key.is_empty()),
                session_cookie: get_env_or("SESSION_COOKIE_NAME", "auth-token"),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "json"),
            },
        })
    }

    /// Get the HTTP server address
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

impl RealtimeConfig {
    /// Transport binding handed to the hub at startup
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            path: self.path.clone(),
            buffer_size: self.buffer_size,
        }
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.session_idle_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }

    /// Longest silence from a WebSocket peer before it is dropped
    pub fn peer_idle_timeout(&self) -> Duration {
        self.ping_interval() + Duration::from_secs(self.ping_timeout_secs)
    }
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
            cors_origins: Vec::new(),
        }
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            session_cookie: "auth-token".to_string(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_TRANSPORT_PATH.to_string(),
            buffer_size: DEFAULT_CONNECTION_BUFFER,
            poll_timeout_secs: 25,
            session_idle_secs: 60,
            ping_interval_secs: 25,
            ping_timeout_secs: 20,
        }
    }
}

/// Ensure the push channel path starts with '/' and has no trailing '/'
fn normalize_path(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Err(FallwatchError::InvalidConfig(
            "REALTIME_PATH must not be the root path".into(),
        ));
    }

    let path = format!("/{}", trimmed);
    if path == "/api" || path.starts_with("/api/") {
        return Err(FallwatchError::InvalidConfig(
            "REALTIME_PATH must not overlap the /api routes".into(),
        ));
    }

    Ok(path)
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
