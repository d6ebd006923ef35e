use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{FallwatchError, Result};

/// Handling status of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    #[default]
    Unhandled,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Unhandled => "unhandled",
            AlertStatus::Resolved => "resolved",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "unhandled" => Some(AlertStatus::Unhandled),
            "resolved" => Some(AlertStatus::Resolved),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fall-detection alert as relayed to dashboard clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub title: String,
    pub status: AlertStatus,
    pub description: String,
    /// Relative-time label, e.g. "2 min ago"
    pub time_ago: String,
    pub location: String,
}

/// Event pushed to every connected client
///
/// Serialized as `{"kind": "new-alert", "alert": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "alert", rename_all = "kebab-case")]
pub enum AlertEvent {
    NewAlert(Alert),
    AlertUpdate(Alert),
}

impl AlertEvent {
    /// Wire name of the event
    pub fn kind(&self) -> &'static str {
        match self {
            AlertEvent::NewAlert(_) => "new-alert",
            AlertEvent::AlertUpdate(_) => "alert-update",
        }
    }

    pub fn alert(&self) -> &Alert {
        match self {
            AlertEvent::NewAlert(alert) | AlertEvent::AlertUpdate(alert) => alert,
        }
    }
}

pub const DEFAULT_ALERT_TITLE: &str = "New Alert";
pub const DEFAULT_TIME_AGO: &str = "just now";

/// Permissive webhook body; every field may be omitted
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    pub id: Option<String>,
    pub title: Option<String>,
    pub status: Option<String>,
    pub description: Option<String>,
    pub time_ago: Option<String>,
    pub location: Option<String>,
}

impl AlertPayload {
    /// Build an alert, filling missing or empty fields with defaults.
    ///
    /// A status outside `unhandled`/`resolved` is rejected.
    pub fn into_alert(mut self) -> Result<Alert> {
        let id = non_empty(self.id.take()).unwrap_or_else(generate_alert_id);
        self.build(id)
    }

    /// Build an alert for an update event, where the id must be supplied.
    pub fn into_update(mut self) -> Result<Alert> {
        let id = non_empty(self.id.take()).ok_or_else(|| {
            FallwatchError::InvalidRequest("alert update requires an id".into())
        })?;
        self.build(id)
    }

    fn build(self, id: String) -> Result<Alert> {
        let status = match non_empty(self.status) {
            Some(raw) => {
                AlertStatus::from_str(&raw).ok_or(FallwatchError::InvalidStatus(raw))?
            }
            None => AlertStatus::default(),
        };

        Ok(Alert {
            id,
            title: non_empty(self.title).unwrap_or_else(|| DEFAULT_ALERT_TITLE.to_string()),
            status,
            description: self.description.unwrap_or_default(),
            time_ago: non_empty(self.time_ago).unwrap_or_else(|| DEFAULT_TIME_AGO.to_string()),
            location: self.location.unwrap_or_default(),
        })
    }
}

/// Time-based identifier for alerts that arrive without one
pub fn generate_alert_id() -> String {
    format!("alert-{}", Utc::now().timestamp_millis())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}
