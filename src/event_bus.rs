//! Cluster event bus.
//! Fan-out delivery of `ClusterEvent`s to independent subscribers; the kill
//! service and every termination watcher hold their own subscription.

use tokio::sync::broadcast;
use tracing::trace;

use crate::types::ClusterEvent;

/// Shared publish/subscribe handle over the cluster event stream.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ClusterEvent>,
}

impl EventBus {
    /// Create a bus whose per-subscriber ring holds `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    /// Returns the number of subscribers that received it.
    pub fn publish(&self, event: ClusterEvent) -> usize {
        trace!(instance_id = %event.instance_id(), "publishing cluster event");
        // send only fails when there are no subscribers, which is fine: the
        // event simply has no audience.
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
