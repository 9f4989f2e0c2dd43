//! Armed/disarmed periodic ticker.
//! While armed, delivers a tick message into a mailbox at a fixed interval.
//! Arming and cancelling are both idempotent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Periodic tick source feeding a worker mailbox.
pub struct RetryTimer<M: Send + 'static> {
    interval: Duration,
    tx: mpsc::Sender<M>,
    make_tick: Arc<dyn Fn() -> M + Send + Sync>,
    task: Option<JoinHandle<()>>,
}

impl<M: Send + 'static> RetryTimer<M> {
    pub fn new(
        interval: Duration,
        tx: mpsc::Sender<M>,
        make_tick: impl Fn() -> M + Send + Sync + 'static,
    ) -> Self {
        Self {
            interval,
            tx,
            make_tick: Arc::new(make_tick),
            task: None,
        }
    }

    /// Arm the timer. A no-op when already armed; the first tick fires one
    /// full interval after arming.
    pub fn setup(&mut self) {
        if self.is_armed() {
            return;
        }
        let interval = self.interval;
        let tx = self.tx.clone();
        let make_tick = self.make_tick.clone();
        self.task = Some(tokio::spawn(async move {
            loop {
                sleep(interval).await;
                if tx.send(make_tick()).await.is_err() {
                    break;
                }
            }
        }));
    }

    /// Disarm the timer. A no-op when not armed.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl<M: Send + 'static> Drop for RetryTimer<M> {
    fn drop(&mut self) {
        self.cancel();
    }
}
