//! Fan-out of task state changes to any number of listeners.

use tokio::sync::broadcast;

use super::TaskSnapshot;

/// Broadcaster for task state changes using a tokio broadcast channel.
///
/// Cheap to clone; every clone publishes into the same channel. Receivers that
/// fall behind see `Lagged` and should resynchronise from a full snapshot.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<TaskSnapshot>,
}

impl ChangeFeed {
    /// Create a new feed with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a change to all current subscribers.
    pub fn publish(&self, snapshot: TaskSnapshot) {
        // No subscribers is fine
        let _ = self.sender.send(snapshot);
    }

    /// Subscribe to future changes.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskSnapshot> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}
