use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a scheduling instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifier of a single task, carrying both the owning instance id and the
/// id the scheduler driver understands.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId {
    pub instance_id: InstanceId,
    pub driver_task_id: String,
}

impl TaskId {
    pub fn new(instance_id: impl Into<String>, driver_task_id: impl Into<String>) -> Self {
        Self {
            instance_id: InstanceId(instance_id.into()),
            driver_task_id: driver_task_id.into(),
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.driver_task_id)
    }
}

/// Condition of an instance or task as reported by the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Provisioned,
    Staging,
    Running,
    Killing,
    Finished,
    Failed,
    Killed,
    Error,
    Gone,
    Dropped,
    Unreachable,
    UnreachableInactive,
    Unknown,
}

impl Condition {
    /// Returns `true` for conditions an instance cannot recover from.
    /// `Unreachable` alone is not terminal, only `UnreachableInactive` is.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Condition::Finished
                | Condition::Failed
                | Condition::Killed
                | Condition::Error
                | Condition::Gone
                | Condition::Dropped
                | Condition::UnreachableInactive
                | Condition::Unknown
        )
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Read-only snapshot of a single task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub condition: Condition,
}

impl Task {
    pub fn is_terminal(&self) -> bool {
        self.condition.is_terminal()
    }
}

/// Read-only snapshot of an instance, supplied by the caller at submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub condition: Condition,
    pub tasks: BTreeMap<TaskId, Task>,
}

impl Instance {
    pub fn new(id: InstanceId, condition: Condition, tasks: Vec<Task>) -> Self {
        let tasks = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        Self {
            id,
            condition,
            tasks,
        }
    }

    pub fn is_gone(&self) -> bool {
        self.condition == Condition::Gone
    }

    pub fn is_unknown(&self) -> bool {
        self.condition == Condition::Unknown
    }

    pub fn is_dropped(&self) -> bool {
        self.condition == Condition::Dropped
    }

    pub fn is_unreachable(&self) -> bool {
        self.condition == Condition::Unreachable
    }

    pub fn is_unreachable_inactive(&self) -> bool {
        self.condition == Condition::UnreachableInactive
    }

    /// The cluster has lost contact with this instance; the driver cannot be
    /// relied on to deliver a kill for it.
    pub fn is_lost(&self) -> bool {
        self.is_gone()
            || self.is_unknown()
            || self.is_dropped()
            || self.is_unreachable()
            || self.is_unreachable_inactive()
    }

    /// Task ids that still need a kill issued.
    pub fn non_terminal_task_ids(&self) -> Vec<TaskId> {
        self.tasks
            .values()
            .filter(|t| !t.is_terminal())
            .map(|t| t.id.clone())
            .collect()
    }
}

/// Event published on the cluster event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterEvent {
    InstanceChanged {
        instance_id: InstanceId,
        condition: Condition,
    },
    UnknownInstanceTerminated {
        instance_id: InstanceId,
    },
}

impl ClusterEvent {
    pub fn instance_id(&self) -> &InstanceId {
        match self {
            ClusterEvent::InstanceChanged { instance_id, .. } => instance_id,
            ClusterEvent::UnknownInstanceTerminated { instance_id } => instance_id,
        }
    }

    /// Whether this event proves the instance reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        match self {
            ClusterEvent::InstanceChanged { condition, .. } => condition.is_terminal(),
            ClusterEvent::UnknownInstanceTerminated { .. } => true,
        }
    }
}
