//! Tests for channel capacity derivation.

use taskreaper::buffer::{
    derive_capacities, scaled_capacity, total_buffer_memory, validate_capacities,
    ChannelCapacities, BUS_EVENT_FLOOR, MAILBOX_FLOOR,
};

#[test]
fn small_chunks_hit_the_floors() {
    let caps = derive_capacities(1);
    assert_eq!(caps.mailbox, MAILBOX_FLOOR);
    assert_eq!(caps.bus_events, BUS_EVENT_FLOOR);
}

#[test]
fn large_chunks_scale_past_the_floors() {
    let caps = derive_capacities(1000);
    assert_eq!(caps.mailbox, 4000);
    assert_eq!(caps.bus_events, 8000);
}

#[test]
fn zero_chunk_is_treated_as_one() {
    assert_eq!(derive_capacities(0), derive_capacities(1));
}

#[test]
fn scaled_capacity_applies_floor() {
    assert_eq!(scaled_capacity(10, 4, 100), 100);
    assert_eq!(scaled_capacity(100, 4, 100), 400);
}

#[test]
fn scaled_capacity_saturates() {
    assert_eq!(scaled_capacity(usize::MAX, 2, 0), usize::MAX);
}

#[test]
fn validate_accepts_derived_capacities() {
    let caps = derive_capacities(100);
    assert!(validate_capacities(&caps).is_ok());
}

#[test]
fn validate_rejects_zero_and_excessive() {
    let zero_mailbox = ChannelCapacities {
        mailbox: 0,
        bus_events: 256,
    };
    assert!(validate_capacities(&zero_mailbox).is_err());

    let zero_bus = ChannelCapacities {
        mailbox: 64,
        bus_events: 0,
    };
    assert!(validate_capacities(&zero_bus).is_err());

    let huge = ChannelCapacities {
        mailbox: 2_000_000,
        bus_events: 256,
    };
    assert!(validate_capacities(&huge).is_err());
}

#[test]
fn memory_estimate_counts_both_channels() {
    let caps = ChannelCapacities {
        mailbox: 100,
        bus_events: 300,
    };
    assert_eq!(total_buffer_memory(&caps), 400 * 256);
}

#[test]
fn default_for_testing_is_valid() {
    assert!(validate_capacities(&ChannelCapacities::default_for_testing()).is_ok());
}
