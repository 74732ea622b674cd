//! # Connectivity Module
//!
//! Online/offline state, typed transition events and queue replay.
//!
//! This module handles:
//! - Tracking the current connectivity state
//! - Broadcasting `WentOnline` / `WentOffline` transitions
//! - Probing the backend where the runtime has no connectivity signals
//! - Draining the offline queue after reconnecting

pub mod probe;
pub mod replay;

use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::info;

/// Buffered transitions per subscriber before it starts lagging
const EVENT_CAPACITY: usize = 16;

/// A change in connectivity state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    WentOnline,
    WentOffline,
}

/// Shared view of whether the backend is reachable.
///
/// Cloning yields another handle to the same state.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    state: Arc<watch::Sender<bool>>,
    events: broadcast::Sender<ConnectivityEvent>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (state, _) = watch::channel(initially_online);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Arc::new(state),
            events,
        }
    }

    pub fn is_online(&self) -> bool {
        *self.state.borrow()
    }

    /// Feed a connectivity signal from the runtime or a probe
    ///
    /// Returns the transition it caused; repeating the current state emits
    /// nothing.
    pub fn set_online(&self, online: bool) -> Option<ConnectivityEvent> {
        let changed = self.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if !changed {
            return None;
        }

        let event = if online {
            ConnectivityEvent::WentOnline
        } else {
            ConnectivityEvent::WentOffline
        };
        info!("Connectivity changed: {:?}", event);
        // No subscribers is fine
        let _ = self.events.send(event);
        Some(event)
    }

    /// Receive every subsequent transition
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectivityEvent> {
        self.events.subscribe()
    }

    /// Observe the current state
    pub fn watch_state(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        assert!(ConnectivityMonitor::new(true).is_online());
        assert!(!ConnectivityMonitor::new(false).is_online());
    }

    #[test]
    fn test_transitions_emit_events() {
        let monitor = ConnectivityMonitor::new(true);
        let mut events = monitor.subscribe();

        assert_eq!(monitor.set_online(false), Some(ConnectivityEvent::WentOffline));
        assert_eq!(monitor.set_online(true), Some(ConnectivityEvent::WentOnline));

        assert_eq!(events.try_recv().unwrap(), ConnectivityEvent::WentOffline);
        assert_eq!(events.try_recv().unwrap(), ConnectivityEvent::WentOnline);
    }

    #[test]
    fn test_repeated_state_is_silent() {
        let monitor = ConnectivityMonitor::new(true);
        let mut events = monitor.subscribe();
        assert_eq!(monitor.set_online(true), None);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_clones_share_state() {
        let monitor = ConnectivityMonitor::new(true);
        let other = monitor.clone();
        other.set_online(false);
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn test_watch_state_sees_change() {
        let monitor = ConnectivityMonitor::new(false);
        let mut state = monitor.watch_state();
        monitor.set_online(true);
        state.changed().await.unwrap();
        assert!(*state.borrow());
    }
}
