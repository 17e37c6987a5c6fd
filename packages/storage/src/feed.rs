// ABOUTME: Broadcast feed of document writes
// ABOUTME: The onChange trigger source that change listeners subscribe to

use tokio::sync::broadcast;
use tracing::trace;

use crate::DocumentChange;

/// Events buffered per subscriber before it starts lagging
pub const CHANGE_FEED_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<DocumentChange>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DocumentChange> {
        self.sender.subscribe()
    }

    /// Publish a change; no-op writes and writes nobody listens to are dropped
    pub fn publish(&self, change: DocumentChange) {
        if change.is_noop() {
            return;
        }
        let collection = change.collection;
        if self.sender.send(change).is_err() {
            trace!("No change subscribers for {}", collection);
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}
