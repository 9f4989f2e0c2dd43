//! Authoritative-state operations.
//! The one operation the kill service needs: removing an instance directly
//! from authoritative state when the driver cannot make progress on it.

use anyhow::Result;

use crate::types::InstanceId;

/// Capability to expunge an instance from authoritative state.
///
/// Best-effort: the service does not act on the return value beyond logging.
/// A successful expunge is expected to surface later as a terminal event on
/// the bus, which is what actually clears the entry.
pub trait StateOpProcessor: Send + Sync {
    fn force_expunge(&self, instance_id: &InstanceId) -> Result<()>;
}
