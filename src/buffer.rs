//! Channel capacity calculations for the kill service.
//! Derives mailbox and event-ring sizes from the kill chunk size.

// ============================================================================
// Constants
// ============================================================================

/// Multiplier for the worker mailbox relative to the chunk size.
pub const MAILBOX_MULTIPLIER: usize = 4;

/// Minimum floor for the worker mailbox.
pub const MAILBOX_FLOOR: usize = 64;

/// Multiplier for the event-bus ring relative to the chunk size.
pub const BUS_EVENT_MULTIPLIER: usize = 8;

/// Minimum floor for the event-bus ring.
pub const BUS_EVENT_FLOOR: usize = 256;

// ============================================================================
// Types
// ============================================================================

/// Calculated channel capacities for a service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelCapacities {
    /// Capacity of the worker mailbox.
    pub mailbox: usize,
    /// Capacity of each subscriber's event-bus ring.
    pub bus_events: usize,
}

impl ChannelCapacities {
    /// Create default capacities (for testing).
    pub fn default_for_testing() -> Self {
        Self {
            mailbox: 64,
            bus_events: 256,
        }
    }
}

// ============================================================================
// Functions
// ============================================================================

/// Derive channel capacities from the kill chunk size.
/// A burst of one full chunk of confirmations plus resubmissions must fit
/// without stalling the publishers.
pub fn derive_capacities(chunk_size: usize) -> ChannelCapacities {
    let chunk = chunk_size.max(1);
    ChannelCapacities {
        mailbox: scaled_capacity(chunk, MAILBOX_MULTIPLIER, MAILBOX_FLOOR),
        bus_events: scaled_capacity(chunk, BUS_EVENT_MULTIPLIER, BUS_EVENT_FLOOR),
    }
}

/// Calculate scaled capacity with a floor constraint.
/// Returns: max(chunk * multiplier, floor)
pub fn scaled_capacity(chunk: usize, multiplier: usize, floor: usize) -> usize {
    chunk.saturating_mul(multiplier).max(floor)
}

/// Validate capacities are within reasonable bounds.
pub fn validate_capacities(caps: &ChannelCapacities) -> Result<(), &'static str> {
    const MAX_CAPACITY: usize = 1_000_000;

    if caps.mailbox == 0 {
        return Err("mailbox must be > 0");
    }
    if caps.bus_events == 0 {
        return Err("bus_events must be > 0");
    }
    if caps.mailbox > MAX_CAPACITY {
        return Err("mailbox exceeds maximum");
    }
    if caps.bus_events > MAX_CAPACITY {
        return Err("bus_events exceeds maximum");
    }

    Ok(())
}

/// Calculate total buffered memory in bytes (assuming 256 bytes per message).
pub fn total_buffer_memory(caps: &ChannelCapacities) -> usize {
    const MESSAGE_SIZE_BYTES: usize = 256;
    (caps.mailbox + caps.bus_events) * MESSAGE_SIZE_BYTES
}
