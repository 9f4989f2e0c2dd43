//! Tests for the cluster event bus.

use taskreaper::event_bus::EventBus;
use taskreaper::types::{ClusterEvent, Condition, InstanceId};

fn changed(id: &str, condition: Condition) -> ClusterEvent {
    ClusterEvent::InstanceChanged {
        instance_id: InstanceId::from(id),
        condition,
    }
}

#[tokio::test]
async fn every_subscriber_sees_every_event() {
    let bus = EventBus::new(32);
    let mut subscribers: Vec<_> = (0..3).map(|_| bus.subscribe()).collect();

    bus.publish(changed("a", Condition::Killed));
    bus.publish(changed("b", Condition::Failed));

    for rx in &mut subscribers {
        assert_eq!(
            rx.recv().await.unwrap().instance_id(),
            &InstanceId::from("a")
        );
        assert_eq!(
            rx.recv().await.unwrap().instance_id(),
            &InstanceId::from("b")
        );
    }
}

#[tokio::test]
async fn subscriber_count_tracks_subscriptions() {
    let bus = EventBus::new(32);
    assert_eq!(bus.subscriber_count(), 0);

    let rx1 = bus.subscribe();
    let rx2 = bus.subscribe();
    assert_eq!(bus.subscriber_count(), 2);

    drop(rx1);
    drop(rx2);
    assert_eq!(bus.subscriber_count(), 0);
}

#[tokio::test]
async fn publish_reports_audience_size() {
    let bus = EventBus::new(32);
    assert_eq!(bus.publish(changed("a", Condition::Killed)), 0);

    let _rx = bus.subscribe();
    assert_eq!(bus.publish(changed("a", Condition::Killed)), 1);
}

#[tokio::test]
async fn cloned_handles_share_the_stream() {
    let bus = EventBus::new(32);
    let clone = bus.clone();
    let mut rx = clone.subscribe();

    bus.publish(changed("a", Condition::Gone));
    assert_eq!(
        rx.recv().await.unwrap(),
        changed("a", Condition::Gone)
    );
}

#[tokio::test]
async fn slow_subscribers_observe_lag_not_blockage() {
    // Tiny ring: the publisher must never block, the slow reader gets a
    // lag error instead.
    let bus = EventBus::new(1);
    let mut rx = bus.subscribe();

    for n in 0..10 {
        bus.publish(changed(&format!("i{n}"), Condition::Killed));
    }

    match rx.recv().await {
        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
            assert!(missed > 0);
        }
        other => panic!("expected lag, got {other:?}"),
    }
}
