//! Termination watcher.
//! Watches the event bus until every instance in a given set has been
//! observed terminal, then resolves a one-shot completion.

use std::collections::BTreeSet;

use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

use crate::event_bus::EventBus;
use crate::types::InstanceId;

/// One-shot handle resolving once all watched instances are terminal.
///
/// Completions signal success-or-never: no failure is ever delivered through
/// them, so callers impose their own deadline. Dropping (or `cancel`ing) the
/// handle releases the underlying subscription without affecting the kills.
pub struct KillCompletion {
    rx: oneshot::Receiver<()>,
}

impl KillCompletion {
    /// Wait for every watched instance to be observed terminal.
    /// Returns `false` if the watcher was torn down before resolving
    /// (bus shut down), which only happens when the process is stopping.
    pub async fn wait(self) -> bool {
        self.rx.await.is_ok()
    }

    /// Give up waiting. The kills keep running; only the subscription is
    /// released.
    pub fn cancel(self) {}

    /// Pre-resolved completion for an empty watch set.
    fn resolved() -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(());
        Self { rx }
    }
}

/// Subscribe to the bus and resolve once every id in `ids` has appeared in a
/// terminal event. The subscription is taken synchronously, before this
/// function returns, so events published right after registration cannot be
/// missed. An empty set resolves immediately.
pub fn watch_terminations(
    ids: impl IntoIterator<Item = InstanceId>,
    bus: &EventBus,
) -> KillCompletion {
    let mut remaining: BTreeSet<InstanceId> = ids.into_iter().collect();
    if remaining.is_empty() {
        return KillCompletion::resolved();
    }

    let mut rx = bus.subscribe();
    let (done_tx, done_rx) = oneshot::channel();

    tokio::spawn(async move {
        let mut done_tx = done_tx;
        loop {
            tokio::select! {
                // Caller dropped the completion: release the subscription.
                _ = done_tx.closed() => {
                    debug!(remaining = remaining.len(), "termination watch cancelled");
                    return;
                }
                event = rx.recv() => match event {
                    Ok(event) if event.is_terminal() => {
                        if remaining.remove(event.instance_id()) && remaining.is_empty() {
                            let _ = done_tx.send(());
                            return;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        // Terminal events for watched ids may have been
                        // dropped from the ring; keep watching, the ids that
                        // already went terminal stay terminal.
                        warn!(missed, "termination watch lagged behind the event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(
                            remaining = remaining.len(),
                            "event bus closed before watch resolved"
                        );
                        return;
                    }
                },
            }
        }
    });

    KillCompletion { rx: done_rx }
}
