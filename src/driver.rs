//! Scheduler driver capability.
//! Kills are issued best-effort through whatever driver is currently
//! attached; delivery is never guaranteed and failures are only logged.

use std::sync::{Arc, RwLock};

use anyhow::Result;

use crate::types::TaskId;

/// Outbound capability to the cluster scheduler.
///
/// `kill_task` must be quick and non-blocking; implementations that talk to
/// a remote scheduler hand the request off to their own machinery rather
/// than awaiting delivery.
pub trait DriverClient: Send + Sync {
    fn kill_task(&self, task_id: &TaskId) -> Result<()>;
}

/// Holder for the currently attached driver.
///
/// The driver comes and goes with the scheduler connection, so the service
/// reads it at each issuance instead of capturing it once. An empty holder
/// makes kill issuance a silent no-op; the retry loop revisits the entry.
#[derive(Clone, Default)]
pub struct DriverHolder {
    inner: Arc<RwLock<Option<Arc<dyn DriverClient>>>>,
}

impl DriverHolder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, driver: Arc<dyn DriverClient>) {
        *self.inner.write().expect("driver holder poisoned") = Some(driver);
    }

    pub fn detach(&self) {
        *self.inner.write().expect("driver holder poisoned") = None;
    }

    pub fn current(&self) -> Option<Arc<dyn DriverClient>> {
        self.inner.read().expect("driver holder poisoned").clone()
    }
}
