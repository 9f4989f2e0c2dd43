//! In-process simulated cluster.
//! Backs the smoke binary and integration tests: a shared instance table, a
//! driver with deterministic lossiness, and state ops that expunge by
//! removing the instance and publishing the matching terminal event.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::debug;

use crate::driver::DriverClient;
use crate::event_bus::EventBus;
use crate::state_op::StateOpProcessor;
use crate::types::{ClusterEvent, Condition, Instance, InstanceId, Task, TaskId};

/// Shared authoritative instance table plus the bus events are published on.
#[derive(Clone)]
pub struct SimCluster {
    instances: Arc<Mutex<BTreeMap<InstanceId, Instance>>>,
    bus: EventBus,
}

impl SimCluster {
    pub fn new(bus: EventBus) -> Self {
        Self {
            instances: Arc::new(Mutex::new(BTreeMap::new())),
            bus,
        }
    }

    pub fn register(&self, instance: Instance) {
        self.instances
            .lock()
            .expect("sim cluster poisoned")
            .insert(instance.id.clone(), instance);
    }

    pub fn instance(&self, id: &InstanceId) -> Option<Instance> {
        self.instances
            .lock()
            .expect("sim cluster poisoned")
            .get(id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.instances.lock().expect("sim cluster poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, id: &InstanceId) -> Option<Instance> {
        self.instances
            .lock()
            .expect("sim cluster poisoned")
            .remove(id)
    }

    fn kill_task_in_table(&self, task_id: &TaskId) -> TaskKillOutcome {
        let mut table = self.instances.lock().expect("sim cluster poisoned");
        let Some(instance) = table.get_mut(&task_id.instance_id) else {
            return TaskKillOutcome::UnknownInstance;
        };
        if let Some(task) = instance.tasks.get_mut(task_id) {
            task.condition = Condition::Killed;
        }
        if instance.tasks.values().all(Task::is_terminal) {
            table.remove(&task_id.instance_id);
            TaskKillOutcome::InstanceTerminal
        } else {
            TaskKillOutcome::TaskKilled
        }
    }
}

enum TaskKillOutcome {
    TaskKilled,
    InstanceTerminal,
    UnknownInstance,
}

/// Driver that kills tasks in the shared table and publishes the terminal
/// event once an instance has no live tasks left. Every `drop_every`-th kill
/// is silently lost to model an unreliable scheduler link.
pub struct SimDriver {
    cluster: SimCluster,
    drop_every: Option<u64>,
    kills_attempted: AtomicU64,
    kills_dropped: AtomicU64,
}

impl SimDriver {
    pub fn new(cluster: SimCluster, drop_every: Option<u64>) -> Self {
        Self {
            cluster,
            drop_every: drop_every.filter(|&n| n > 0),
            kills_attempted: AtomicU64::new(0),
            kills_dropped: AtomicU64::new(0),
        }
    }

    pub fn kills_attempted(&self) -> u64 {
        self.kills_attempted.load(Ordering::SeqCst)
    }

    pub fn kills_dropped(&self) -> u64 {
        self.kills_dropped.load(Ordering::SeqCst)
    }
}

impl DriverClient for SimDriver {
    fn kill_task(&self, task_id: &TaskId) -> Result<()> {
        let nth = self.kills_attempted.fetch_add(1, Ordering::SeqCst) + 1;
        if self.drop_every.is_some_and(|k| nth % k == 0) {
            // Accepted but never delivered; the caller only learns through
            // the missing terminal event.
            self.kills_dropped.fetch_add(1, Ordering::SeqCst);
            debug!(task_id = %task_id, "sim driver dropped kill");
            return Ok(());
        }

        match self.cluster.kill_task_in_table(task_id) {
            TaskKillOutcome::InstanceTerminal => {
                self.cluster.bus.publish(ClusterEvent::InstanceChanged {
                    instance_id: task_id.instance_id.clone(),
                    condition: Condition::Killed,
                });
            }
            TaskKillOutcome::UnknownInstance => {
                self.cluster
                    .bus
                    .publish(ClusterEvent::UnknownInstanceTerminated {
                        instance_id: task_id.instance_id.clone(),
                    });
            }
            TaskKillOutcome::TaskKilled => {}
        }
        Ok(())
    }
}

/// State ops that expunge by dropping the instance from the table and
/// publishing the terminal event the authoritative state change produces.
pub struct SimStateOps {
    cluster: SimCluster,
}

impl SimStateOps {
    pub fn new(cluster: SimCluster) -> Self {
        Self { cluster }
    }
}

impl StateOpProcessor for SimStateOps {
    fn force_expunge(&self, instance_id: &InstanceId) -> Result<()> {
        let event = match self.cluster.remove(instance_id) {
            Some(_) => ClusterEvent::InstanceChanged {
                instance_id: instance_id.clone(),
                condition: Condition::Gone,
            },
            None => ClusterEvent::UnknownInstanceTerminated {
                instance_id: instance_id.clone(),
            },
        };
        self.cluster.bus.publish(event);
        Ok(())
    }
}

/// A running instance with `tasks` live tasks, named `<name>.task-<n>`.
pub fn running_instance(name: &str, tasks: usize) -> Instance {
    let id = InstanceId::from(name);
    let tasks = (0..tasks)
        .map(|n| Task {
            id: TaskId::new(name, format!("{name}.task-{n}")),
            condition: Condition::Running,
        })
        .collect();
    Instance::new(id, Condition::Running, tasks)
}

/// An instance the cluster has lost contact with.
pub fn lost_instance(name: &str) -> Instance {
    let id = InstanceId::from(name);
    let tasks = vec![Task {
        id: TaskId::new(name, format!("{name}.task-0")),
        condition: Condition::Running,
    }];
    Instance::new(id, Condition::UnreachableInactive, tasks)
}
