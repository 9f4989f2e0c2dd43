//! Kill service core.
//! A single mailbox worker drives submitted instances to a terminal state:
//! it issues kills to the scheduler driver in bounded chunks, watches the
//! cluster event stream for confirmations, retries unacknowledged kills and
//! force-expunges instances the driver cannot make progress on.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::buffer::derive_capacities;
use crate::clock::{Clock, Timestamp};
use crate::counts::{KillCounts, KillCountsSnapshot};
use crate::driver::DriverHolder;
use crate::event_bus::EventBus;
use crate::retry_timer::RetryTimer;
use crate::state_op::StateOpProcessor;
use crate::types::{ClusterEvent, Instance, InstanceId, TaskId};
use crate::watcher::{watch_terminations, KillCompletion};

/// Kill scheduling parameters.
#[derive(Debug, Clone)]
pub struct KillPolicy {
    /// Maximum number of concurrently in-flight kills.
    pub chunk_size: usize,
    /// Minimum age before an unacknowledged kill is re-issued.
    pub retry_timeout: Duration,
    /// Attempt budget before an entry is expunged instead of re-issued.
    /// `None` means retries are unbounded.
    pub retry_max: Option<u32>,
}

impl Default for KillPolicy {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            retry_timeout: Duration::from_secs(10),
            retry_max: None,
        }
    }
}

/// Entry tracked for one instance between submission and its terminal event.
#[derive(Debug, Clone)]
struct ToKill {
    instance_id: InstanceId,
    task_ids: Vec<TaskId>,
    instance: Option<Instance>,
    attempts: u32,
    issued_at: Timestamp,
}

impl ToKill {
    fn from_instance(instance: Instance) -> Self {
        Self {
            instance_id: instance.id.clone(),
            task_ids: instance.non_terminal_task_ids(),
            instance: Some(instance),
            attempts: 0,
            issued_at: Timestamp::ZERO,
        }
    }

    fn from_unknown_task(task_id: TaskId) -> Self {
        Self {
            instance_id: task_id.instance_id.clone(),
            task_ids: vec![task_id],
            instance: None,
            attempts: 0,
            issued_at: Timestamp::ZERO,
        }
    }
}

/// Point-in-time view of the worker's tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KillServiceStats {
    pub pending: usize,
    pub in_flight: usize,
    pub timer_armed: bool,
}

enum KillMessage {
    Kill(Vec<ToKill>),
    KillUnknown(TaskId),
    Terminal(InstanceId),
    RetryTick,
    Query(oneshot::Sender<KillServiceStats>),
    Shutdown,
}

/// Handle to a running kill service.
pub struct KillService {
    tx: mpsc::Sender<KillMessage>,
    bus: EventBus,
    counts: Arc<KillCounts>,
    worker: JoinHandle<()>,
    forwarder: JoinHandle<()>,
}

impl KillService {
    /// Start the worker and its event subscription.
    ///
    /// The subscription is taken before this returns, so terminal events
    /// published from here on are seen by the worker.
    pub fn spawn(
        policy: KillPolicy,
        bus: EventBus,
        driver: DriverHolder,
        state_ops: Arc<dyn StateOpProcessor>,
        clock: Clock,
    ) -> Self {
        let caps = derive_capacities(policy.chunk_size);
        let (tx, rx) = mpsc::channel(caps.mailbox);
        let counts = Arc::new(KillCounts::new());

        let forwarder = tokio::spawn(forward_terminal_events(bus.subscribe(), tx.clone()));

        let timer = RetryTimer::new(policy.retry_timeout, tx.clone(), || KillMessage::RetryTick);
        let worker = KillWorker {
            policy,
            driver,
            state_ops,
            clock,
            counts: counts.clone(),
            pending: BTreeMap::new(),
            in_flight: BTreeMap::new(),
            timer,
        };
        let worker = tokio::spawn(worker.run(rx));

        Self {
            tx,
            bus,
            counts,
            worker,
            forwarder,
        }
    }

    /// Submit instances to be killed.
    ///
    /// The returned completion resolves once every listed instance has been
    /// observed terminal on the bus; it is bound before the submission is
    /// enqueued, so a confirmation racing this call cannot be lost. A fresh
    /// submission for an already-tracked instance replaces it and resets its
    /// attempt count.
    pub async fn kill_instances(&self, instances: Vec<Instance>) -> KillCompletion {
        let completion = watch_terminations(instances.iter().map(|i| i.id.clone()), &self.bus);
        self.counts.record_instances_submitted(instances.len() as u64);
        let entries = instances.into_iter().map(ToKill::from_instance).collect();
        if self.tx.send(KillMessage::Kill(entries)).await.is_err() {
            warn!("kill service is stopped; dropping kill submission");
        }
        completion
    }

    /// Fire-and-forget kill for a task with no known instance snapshot.
    pub async fn kill_unknown_task(&self, task_id: TaskId) {
        self.counts.record_unknown_task_submitted();
        if self.tx.send(KillMessage::KillUnknown(task_id)).await.is_err() {
            warn!("kill service is stopped; dropping unknown-task kill");
        }
    }

    /// Query the worker's table sizes and timer state.
    /// Ordered with respect to earlier submissions from the same caller.
    pub async fn stats(&self) -> KillServiceStats {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(KillMessage::Query(reply_tx)).await.is_err() {
            return KillServiceStats::default();
        }
        reply_rx.await.unwrap_or_default()
    }

    pub fn counts(&self) -> KillCountsSnapshot {
        self.counts.snapshot()
    }

    /// Stop the worker. Unfinished kills are logged and dropped; they must
    /// be resubmitted by the next incarnation.
    pub async fn shutdown(self) {
        self.forwarder.abort();
        let _ = self.tx.send(KillMessage::Shutdown).await;
        let _ = self.worker.await;
    }
}

/// Bridge terminal events from the bus into the worker mailbox.
async fn forward_terminal_events(
    mut rx: broadcast::Receiver<ClusterEvent>,
    tx: mpsc::Sender<KillMessage>,
) {
    loop {
        match rx.recv().await {
            Ok(event) if event.is_terminal() => {
                let id = event.instance_id().clone();
                if tx.send(KillMessage::Terminal(id)).await.is_err() {
                    return;
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                // A dropped confirmation leaves its entry in flight; the
                // retry path will expunge it eventually.
                warn!(missed, "kill service lagged behind the event bus");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

struct KillWorker {
    policy: KillPolicy,
    driver: DriverHolder,
    state_ops: Arc<dyn StateOpProcessor>,
    clock: Clock,
    counts: Arc<KillCounts>,
    pending: BTreeMap<InstanceId, ToKill>,
    in_flight: BTreeMap<InstanceId, ToKill>,
    timer: RetryTimer<KillMessage>,
}

impl KillWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<KillMessage>) {
        while let Some(message) = rx.recv().await {
            match message {
                KillMessage::Kill(entries) => self.on_kill(entries),
                KillMessage::KillUnknown(task_id) => self.on_kill_unknown(task_id),
                KillMessage::Terminal(instance_id) => self.on_terminal(instance_id),
                KillMessage::RetryTick => self.on_retry_tick(),
                KillMessage::Query(reply) => {
                    let _ = reply.send(self.stats());
                }
                KillMessage::Shutdown => break,
            }
        }

        self.timer.cancel();
        if !self.pending.is_empty() || !self.in_flight.is_empty() {
            warn!(
                pending = ?self.pending.keys().collect::<Vec<_>>(),
                in_flight = ?self.in_flight.keys().collect::<Vec<_>>(),
                "kill service stopping with unfinished kills; they must be resubmitted"
            );
        } else {
            info!("kill service stopped");
        }
    }

    fn on_kill(&mut self, entries: Vec<ToKill>) {
        for entry in entries {
            // The caller's fresh snapshot is authoritative: it replaces any
            // prior entry in either table and discards its attempt count.
            self.in_flight.remove(&entry.instance_id);
            debug!(
                instance_id = %entry.instance_id,
                tasks = entry.task_ids.len(),
                "kill queued"
            );
            self.pending.insert(entry.instance_id.clone(), entry);
        }
        self.dispatch();
    }

    fn on_kill_unknown(&mut self, task_id: TaskId) {
        info!(task_id = %task_id, "kill queued for task with no known instance");
        let entry = ToKill::from_unknown_task(task_id);
        self.in_flight.remove(&entry.instance_id);
        self.pending.insert(entry.instance_id.clone(), entry);
        self.dispatch();
    }

    fn on_terminal(&mut self, instance_id: InstanceId) {
        let was_pending = self.pending.remove(&instance_id).is_some();
        let was_in_flight = self.in_flight.remove(&instance_id).is_some();
        if !(was_pending || was_in_flight) {
            // Not ours; other subsystems share the event stream.
            return;
        }
        self.counts.record_terminal_event();
        debug!(instance_id = %instance_id, "instance confirmed terminal");
        self.dispatch();
    }

    fn on_retry_tick(&mut self) {
        let now = self.clock.now();
        let timeout_ms = self.policy.retry_timeout.as_millis() as u64;
        let due: Vec<InstanceId> = self
            .in_flight
            .iter()
            .filter(|(_, e)| now.millis_since(e.issued_at) >= timeout_ms)
            .map(|(id, _)| id.clone())
            .collect();

        for instance_id in due {
            let attempts = self.in_flight[&instance_id].attempts;
            if self.policy.retry_max.is_some_and(|max| attempts >= max) {
                // Out of attempts: take the instance out of authoritative
                // state instead. The entry stays in flight until the
                // resulting terminal event clears it.
                warn!(
                    instance_id = %instance_id,
                    attempts,
                    "kill attempts exhausted; expunging from authoritative state"
                );
                self.counts.record_exhausted();
                self.force_expunge(&instance_id);
                continue;
            }
            let entry = self
                .in_flight
                .remove(&instance_id)
                .expect("due entry present");
            debug!(
                instance_id = %instance_id,
                attempt = entry.attempts + 1,
                "retrying unacknowledged kill"
            );
            self.counts.record_retry();
            self.issue(entry);
        }
        self.sync_timer();
    }

    /// Move pending entries into flight, up to the chunk budget.
    /// Selection is ascending instance id, so it is deterministic for a
    /// given table state.
    fn dispatch(&mut self) {
        let budget = self
            .policy
            .chunk_size
            .saturating_sub(self.in_flight.len());
        if budget > 0 {
            let selected: Vec<InstanceId> =
                self.pending.keys().take(budget).cloned().collect();
            for instance_id in selected {
                let entry = self
                    .pending
                    .remove(&instance_id)
                    .expect("selected entry present");
                self.issue(entry);
            }
        }
        self.sync_timer();
    }

    /// Issue one entry: a driver kill per live task, or a force-expunge when
    /// the driver cannot help (lost instance, or nothing left to kill).
    fn issue(&mut self, mut entry: ToKill) {
        let lost = entry.instance.as_ref().is_some_and(Instance::is_lost);
        let all_terminal = entry.task_ids.is_empty();
        if lost || all_terminal {
            info!(
                instance_id = %entry.instance_id,
                lost,
                "instance not killable through the driver; expunging from authoritative state"
            );
            self.force_expunge(&entry.instance_id);
        } else {
            match self.driver.current() {
                Some(driver) => {
                    for task_id in &entry.task_ids {
                        debug!(
                            task_id = %task_id,
                            attempt = entry.attempts + 1,
                            "issuing kill to driver"
                        );
                        if let Err(err) = driver.kill_task(task_id) {
                            warn!(task_id = %task_id, "driver rejected kill: {err:#}");
                        }
                    }
                    self.counts.record_driver_kill(entry.task_ids.len() as u64);
                }
                None => {
                    debug!(
                        instance_id = %entry.instance_id,
                        "no driver attached; kill stays in flight for retry"
                    );
                }
            }
        }

        entry.attempts += 1;
        entry.issued_at = self.clock.now();
        self.in_flight.insert(entry.instance_id.clone(), entry);
    }

    fn force_expunge(&self, instance_id: &InstanceId) {
        self.counts.record_expunge();
        if let Err(err) = self.state_ops.force_expunge(instance_id) {
            error!(instance_id = %instance_id, "force expunge failed: {err:#}");
        }
    }

    /// The retry timer is armed exactly while kills are in flight.
    fn sync_timer(&mut self) {
        if self.in_flight.is_empty() {
            self.timer.cancel();
        } else {
            self.timer.setup();
        }
    }

    fn stats(&self) -> KillServiceStats {
        KillServiceStats {
            pending: self.pending.len(),
            in_flight: self.in_flight.len(),
            timer_armed: self.timer.is_armed(),
        }
    }
}
