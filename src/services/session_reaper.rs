//! Polling session reaper
//!
//! Closes long-polling sessions whose client stopped polling, so abandoned
//! sessions do not stay registered with the hub.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, instrument};

use crate::api::realtime::PollingSessions;
use crate::config::RealtimeConfig;
use crate::hub::BroadcastHub;

/// Session reaper configuration
#[derive(Clone)]
pub struct SessionReaperConfig {
    /// Sessions idle longer than this are closed
    pub idle_timeout: Duration,
    /// How often to scan for idle sessions
    pub check_interval: Duration,
}

impl SessionReaperConfig {
    /// Derive the reaper settings from the realtime config.
    ///
    /// The idle timeout never drops below the long-poll timeout, otherwise a
    /// client between two polls could be reaped.
    pub fn from_realtime(realtime: &RealtimeConfig) -> Self {
        let idle_timeout = realtime
            .session_idle_timeout()
            .max(realtime.poll_timeout() + Duration::from_secs(5));
        Self {
            idle_timeout,
            check_interval: (idle_timeout / 2).max(Duration::from_secs(1)),
        }
    }
}

impl Default for SessionReaperConfig {
    fn default() -> Self {
        Self::from_realtime(&RealtimeConfig::default())
    }
}

/// Background service closing idle polling sessions
pub struct SessionReaper {
    hub: BroadcastHub,
    sessions: PollingSessions,
    config: SessionReaperConfig,
}

impl SessionReaper {
    pub fn new(hub: BroadcastHub, sessions: PollingSessions, config: SessionReaperConfig) -> Self {
        Self {
            hub,
            sessions,
            config,
        }
    }

    /// Run until shutdown is signalled
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting polling session reaper (idle timeout: {:?})",
            self.config.idle_timeout
        );

        let mut ticker = interval(self.config.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // Skip immediate tick

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep();
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("Polling session reaper shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Close every idle session once
    pub fn sweep(&self) -> usize {
        let reaped = self.sessions.reap_idle(&self.hub, self.config.idle_timeout);
        if reaped > 0 {
            info!("Closed {} idle polling sessions", reaped);
        } else {
            debug!("No idle polling sessions");
        }
        reaped
    }
}

/// Handle for stopping the session reaper
pub struct SessionReaperHandle {
    shutdown_tx: watch::Sender<bool>,
}

impl SessionReaperHandle {
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { shutdown_tx: tx }, rx)
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

impl Default for SessionReaperHandle {
    fn default() -> Self {
        Self::new().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::TransportConfig;

    #[test]
    fn test_config_from_realtime() {
        let config = SessionReaperConfig::default();
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
        assert_eq!(config.check_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_idle_timeout_covers_poll_timeout() {
        let realtime = RealtimeConfig {
            poll_timeout_secs: 30,
            session_idle_secs: 10,
            ..RealtimeConfig::default()
        };
        let config = SessionReaperConfig::from_realtime(&realtime);
        assert_eq!(config.idle_timeout, Duration::from_secs(35));
    }

    #[tokio::test]
    async fn test_sweep_closes_idle_sessions() {
        let hub = BroadcastHub::new();
        hub.initialize(TransportConfig::default());
        let sessions = PollingSessions::new();
        let id = sessions.open(&hub).unwrap();

        let reaper = SessionReaper::new(
            hub.clone(),
            sessions.clone(),
            SessionReaperConfig {
                idle_timeout: Duration::from_millis(10),
                check_interval: Duration::from_millis(10),
            },
        );

        tokio::time::sleep(Duration::from_millis(25)).await;
        assert_eq!(reaper.sweep(), 1);
        assert!(!hub.is_connected(&id));
        assert!(sessions.is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let hub = BroadcastHub::new();
        let reaper = SessionReaper::new(hub, PollingSessions::new(), SessionReaperConfig::default());
        let (handle, shutdown) = SessionReaperHandle::new();

        let task = tokio::spawn(async move { reaper.run(shutdown).await });
        handle.shutdown();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("reaper did not stop")
            .unwrap();
    }
}
