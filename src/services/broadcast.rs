//! Snapshot fan-out over tokio channels

use tokio::sync::{broadcast, watch};
use tracing::debug;

use super::ports::StatusBroadcast;
use crate::state::TimerSnapshot;

/// Publishes every snapshot on a broadcast channel and keeps the latest one
/// in a watch channel for late subscribers
#[derive(Debug)]
pub struct ChannelBroadcaster {
    events_tx: broadcast::Sender<TimerSnapshot>,
    latest_tx: watch::Sender<TimerSnapshot>,
    /// Keep the receiver alive to prevent channel closure
    _latest_rx: watch::Receiver<TimerSnapshot>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel(capacity);
        let (latest_tx, latest_rx) = watch::channel(TimerSnapshot::inactive());
        Self {
            events_tx,
            latest_tx,
            _latest_rx: latest_rx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimerSnapshot> {
        self.events_tx.subscribe()
    }

    pub fn watch(&self) -> watch::Receiver<TimerSnapshot> {
        self.latest_tx.subscribe()
    }

    pub fn latest(&self) -> TimerSnapshot {
        self.latest_tx.borrow().clone()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

impl StatusBroadcast for ChannelBroadcaster {
    fn broadcast(&self, snapshot: &TimerSnapshot) {
        // No subscribers is the common case, not an error
        if self.events_tx.send(snapshot.clone()).is_err() {
            debug!("No snapshot subscribers");
        }
        self.latest_tx.send_replace(snapshot.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::TimerStatus;

    #[tokio::test]
    async fn subscribers_and_watchers_see_snapshots() {
        let broadcaster = ChannelBroadcaster::default();
        let mut rx = broadcaster.subscribe();

        let snapshot = TimerSnapshot {
            active: true,
            status: Some(TimerStatus::Active),
            remaining_seconds: Some(12),
            ..TimerSnapshot::inactive()
        };
        broadcaster.broadcast(&snapshot);

        assert_eq!(rx.recv().await.unwrap(), snapshot);
        assert_eq!(broadcaster.latest(), snapshot);
        assert_eq!(*broadcaster.watch().borrow(), snapshot);
    }
}
