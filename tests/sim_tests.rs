//! Tests for the simulated cluster.

use std::sync::Arc;

use taskreaper::driver::DriverClient;
use taskreaper::event_bus::EventBus;
use taskreaper::sim::{lost_instance, running_instance, SimCluster, SimDriver, SimStateOps};
use taskreaper::state_op::StateOpProcessor;
use taskreaper::types::{ClusterEvent, Condition, InstanceId, TaskId};

#[tokio::test]
async fn killing_the_last_task_publishes_instance_changed() {
    let bus = EventBus::new(32);
    let cluster = SimCluster::new(bus.clone());
    cluster.register(running_instance("web_0", 1));

    let mut rx = bus.subscribe();
    let driver = SimDriver::new(cluster.clone(), None);
    driver
        .kill_task(&TaskId::new("web_0", "web_0.task-0"))
        .unwrap();

    assert_eq!(
        rx.recv().await.unwrap(),
        ClusterEvent::InstanceChanged {
            instance_id: InstanceId::from("web_0"),
            condition: Condition::Killed,
        }
    );
    assert!(cluster.is_empty());
}

#[tokio::test]
async fn partial_kills_publish_nothing() {
    let bus = EventBus::new(32);
    let cluster = SimCluster::new(bus.clone());
    cluster.register(running_instance("web_0", 2));

    let mut rx = bus.subscribe();
    let driver = SimDriver::new(cluster.clone(), None);
    driver
        .kill_task(&TaskId::new("web_0", "web_0.task-0"))
        .unwrap();

    assert!(rx.try_recv().is_err());
    assert_eq!(cluster.len(), 1);

    driver
        .kill_task(&TaskId::new("web_0", "web_0.task-1"))
        .unwrap();
    assert!(rx.recv().await.unwrap().is_terminal());
    assert!(cluster.is_empty());
}

#[tokio::test]
async fn killing_an_unknown_instance_publishes_unknown_terminated() {
    let bus = EventBus::new(32);
    let cluster = SimCluster::new(bus.clone());

    let mut rx = bus.subscribe();
    let driver = SimDriver::new(cluster.clone(), None);
    driver
        .kill_task(&TaskId::new("ghost", "ghost.task-0"))
        .unwrap();

    assert_eq!(
        rx.recv().await.unwrap(),
        ClusterEvent::UnknownInstanceTerminated {
            instance_id: InstanceId::from("ghost"),
        }
    );
}

#[tokio::test]
async fn drop_every_loses_kills_deterministically() {
    let bus = EventBus::new(32);
    let cluster = SimCluster::new(bus.clone());
    cluster.register(running_instance("web_0", 1));

    // Every second kill is lost: the second call is a silent no-op.
    let driver = SimDriver::new(cluster.clone(), Some(2));
    driver
        .kill_task(&TaskId::new("web_0", "web_0.task-0"))
        .unwrap();
    assert_eq!(driver.kills_attempted(), 1);
    assert_eq!(driver.kills_dropped(), 0);
    assert!(cluster.is_empty());

    cluster.register(running_instance("web_1", 1));
    driver
        .kill_task(&TaskId::new("web_1", "web_1.task-0"))
        .unwrap();
    assert_eq!(driver.kills_attempted(), 2);
    assert_eq!(driver.kills_dropped(), 1);
    assert_eq!(cluster.len(), 1, "dropped kill must leave the task running");
}

#[tokio::test]
async fn expunge_of_a_known_instance_publishes_gone() {
    let bus = EventBus::new(32);
    let cluster = SimCluster::new(bus.clone());
    cluster.register(lost_instance("stray_0"));

    let mut rx = bus.subscribe();
    let state_ops = SimStateOps::new(cluster.clone());
    state_ops.force_expunge(&InstanceId::from("stray_0")).unwrap();

    assert_eq!(
        rx.recv().await.unwrap(),
        ClusterEvent::InstanceChanged {
            instance_id: InstanceId::from("stray_0"),
            condition: Condition::Gone,
        }
    );
    assert!(cluster.is_empty());
}

#[tokio::test]
async fn expunge_of_an_unknown_instance_publishes_unknown_terminated() {
    let bus = EventBus::new(32);
    let cluster = SimCluster::new(bus.clone());

    let mut rx = bus.subscribe();
    let state_ops = SimStateOps::new(cluster.clone());
    state_ops.force_expunge(&InstanceId::from("ghost")).unwrap();

    assert_eq!(
        rx.recv().await.unwrap(),
        ClusterEvent::UnknownInstanceTerminated {
            instance_id: InstanceId::from("ghost"),
        }
    );
}

#[test]
fn fleet_helpers_build_expected_shapes() {
    let running = running_instance("web_0", 3);
    assert_eq!(running.id, InstanceId::from("web_0"));
    assert_eq!(running.tasks.len(), 3);
    assert!(!running.is_lost());
    assert_eq!(running.non_terminal_task_ids().len(), 3);

    let lost = lost_instance("stray_0");
    assert!(lost.is_lost());
    assert!(lost.is_unreachable_inactive());
    assert_eq!(lost.tasks.len(), 1);
}

#[test]
fn sim_driver_is_shareable_across_threads() {
    fn assert_driver_client<T: DriverClient + 'static>(_: &Arc<T>) {}
    let bus = EventBus::new(32);
    let cluster = SimCluster::new(bus);
    let driver = Arc::new(SimDriver::new(cluster, None));
    assert_driver_client(&driver);
}
