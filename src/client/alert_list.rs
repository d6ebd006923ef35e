//! Local alert list fed by pushed events

use crate::models::{Alert, AlertEvent, AlertStatus};

/// Most-recent-first list of alerts, unique by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertList {
    alerts: Vec<Alert>,
}

impl AlertList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an initial list, e.g. fetched from the backend.
    ///
    /// Later duplicates of an id are discarded.
    pub fn from_alerts(alerts: Vec<Alert>) -> Self {
        let mut list = Self::new();
        for alert in alerts {
            if list.get(&alert.id).is_none() {
                list.alerts.push(alert);
            }
        }
        list
    }

    /// Apply a pushed event. Returns whether the list changed.
    pub fn apply(&mut self, event: AlertEvent) -> bool {
        match event {
            AlertEvent::NewAlert(alert) => self.insert_new(alert),
            AlertEvent::AlertUpdate(alert) => self.replace(alert),
        }
    }

    /// Prepend an alert unless one with the same id is already listed
    pub fn insert_new(&mut self, alert: Alert) -> bool {
        if self.get(&alert.id).is_some() {
            return false;
        }
        self.alerts.insert(0, alert);
        true
    }

    /// Replace the alert with the same id in place.
    ///
    /// Updates for unknown ids are dropped rather than inserted.
    pub fn replace(&mut self, alert: Alert) -> bool {
        match self.alerts.iter_mut().find(|a| a.id == alert.id) {
            Some(existing) => {
                *existing = alert;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Alert> {
        self.alerts.iter().find(|a| a.id == id)
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    pub fn unhandled_count(&self) -> usize {
        self.alerts
            .iter()
            .filter(|a| a.status == AlertStatus::Unhandled)
            .count()
    }

    /// Alerts in display order
    pub fn iter(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter()
    }

    pub fn as_slice(&self) -> &[Alert] {
        &self.alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(id: &str, status: AlertStatus) -> Alert {
        Alert {
            id: id.to_string(),
            title: "Fall Detected".to_string(),
            status,
            description: "Motion sensor triggered".to_string(),
            time_ago: "just now".to_string(),
            location: "Room 3".to_string(),
        }
    }

    #[test]
    fn test_duplicate_new_alert_is_ignored() {
        let mut list = AlertList::new();

        assert!(list.apply(AlertEvent::NewAlert(alert("1", AlertStatus::Unhandled))));
        assert!(!list.apply(AlertEvent::NewAlert(alert("1", AlertStatus::Unhandled))));

        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_new_alerts_are_prepended() {
        let mut list = AlertList::new();
        list.apply(AlertEvent::NewAlert(alert("1", AlertStatus::Unhandled)));
        list.apply(AlertEvent::NewAlert(alert("2", AlertStatus::Unhandled)));

        let ids: Vec<&str> = list.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["2", "1"]);
    }

    #[test]
    fn test_update_replaces_existing_entry() {
        let mut list = AlertList::new();
        list.apply(AlertEvent::NewAlert(alert("1", AlertStatus::Unhandled)));
        list.apply(AlertEvent::NewAlert(alert("2", AlertStatus::Unhandled)));

        assert!(list.apply(AlertEvent::AlertUpdate(alert("2", AlertStatus::Resolved))));

        assert_eq!(list.len(), 2);
        assert_eq!(list.get("2").unwrap().status, AlertStatus::Resolved);
        assert_eq!(list.as_slice()[0].id, "2");
        assert_eq!(list.unhandled_count(), 1);
    }

    #[test]
    fn test_update_for_unknown_id_is_dropped() {
        let mut list = AlertList::new();
        list.apply(AlertEvent::NewAlert(alert("1", AlertStatus::Unhandled)));

        assert!(!list.apply(AlertEvent::AlertUpdate(alert("9", AlertStatus::Resolved))));

        assert_eq!(list.len(), 1);
        assert!(list.get("9").is_none());
    }

    #[test]
    fn test_from_alerts_dedups() {
        let list = AlertList::from_alerts(vec![
            alert("1", AlertStatus::Unhandled),
            alert("2", AlertStatus::Resolved),
            alert("1", AlertStatus::Resolved),
        ]);

        assert_eq!(list.len(), 2);
        assert_eq!(list.get("1").unwrap().status, AlertStatus::Unhandled);
    }
}
