use tokio::sync::{broadcast, watch};
use tracing::info;

/// A reachability transition reported by the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReachabilityEvent {
    BecameReachable,
    BecameUnreachable,
}

/// Tracks best-effort network reachability and raises one event per actual
/// transition. The signal is a hint from the host, not a verified round
/// trip to the gateway; the engine attempts-then-falls-back regardless.
pub struct ConnectivityMonitor {
    state: watch::Sender<bool>,
    events: broadcast::Sender<ReachabilityEvent>,
}

impl ConnectivityMonitor {
    pub fn new(initially_reachable: bool) -> Self {
        let (state, _) = watch::channel(initially_reachable);
        let (events, _) = broadcast::channel(16);
        Self { state, events }
    }

    pub fn is_reachable(&self) -> bool {
        *self.state.borrow()
    }

    /// Read-only observable of the current reachability flag.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.state.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReachabilityEvent> {
        self.events.subscribe()
    }

    /// Apply a host report. Redundant reports are absorbed; an event fires
    /// only when the flag actually flips.
    pub fn set_reachable(&self, reachable: bool) {
        let changed = self.state.send_if_modified(|current| {
            if *current == reachable {
                false
            } else {
                *current = reachable;
                true
            }
        });

        if changed {
            let event = if reachable {
                info!("network became reachable");
                ReachabilityEvent::BecameReachable
            } else {
                info!("network became unreachable");
                ReachabilityEvent::BecameUnreachable
            };
            let _ = self.events.send(event);
        }
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

    #[tokio::test]
    async fn test_one_event_per_transition() {
        let monitor = ConnectivityMonitor::new(false);
        let mut events = monitor.subscribe();

        monitor.set_reachable(true);
        monitor.set_reachable(true);
        monitor.set_reachable(false);

        assert_eq!(events.recv().await.unwrap(), ReachabilityEvent::BecameReachable);
        assert_eq!(events.recv().await.unwrap(), ReachabilityEvent::BecameUnreachable);
        assert!(events.try_recv().is_err());
        assert!(!monitor.is_reachable());
    }

    #[tokio::test]
    async fn test_watch_tracks_current_value() {
        let monitor = ConnectivityMonitor::new(true);
        let watcher = monitor.watch();
        assert!(*watcher.borrow());

        monitor.set_reachable(false);
        assert!(!*watcher.borrow());
    }
}
