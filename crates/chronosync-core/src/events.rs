//! Data event channel
//!
//! Write side is held by the node; any number of observers subscribe.

use crate::types::DataEvent;
use tokio::sync::broadcast;

/// Default buffered events per subscriber before it starts lagging
pub const DEFAULT_EVENT_CAPACITY: usize = 4096;

/// Broadcast channel for publish/receive notifications
#[derive(Clone, Debug)]
pub struct EventChannel {
    tx: broadcast::Sender<DataEvent>,
}

impl EventChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<DataEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, returning how many subscribers received it
    pub fn emit(&self, event: DataEvent) -> usize {
        // No subscribers is fine: nobody is instrumenting this node
        self.tx.send(event).unwrap_or(0)
    }
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
