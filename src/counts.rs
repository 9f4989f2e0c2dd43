//! Operation counters for the kill service.
//! Cheap atomics bumped from the worker, snapshotted for logs and smoke
//! runs.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters over the life of a service.
#[derive(Debug, Default)]
pub struct KillCounts {
    instances_submitted: AtomicU64,
    unknown_tasks_submitted: AtomicU64,
    driver_kills: AtomicU64,
    expunges: AtomicU64,
    retries: AtomicU64,
    exhausted: AtomicU64,
    terminal_events: AtomicU64,
}

impl KillCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_instances_submitted(&self, n: u64) {
        self.instances_submitted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_unknown_task_submitted(&self) {
        self.unknown_tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_driver_kill(&self, tasks: u64) {
        self.driver_kills.fetch_add(tasks, Ordering::Relaxed);
    }

    pub fn record_expunge(&self) {
        self.expunges.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_terminal_event(&self) {
        self.terminal_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> KillCountsSnapshot {
        KillCountsSnapshot {
            instances_submitted: self.instances_submitted.load(Ordering::Relaxed),
            unknown_tasks_submitted: self.unknown_tasks_submitted.load(Ordering::Relaxed),
            driver_kills: self.driver_kills.load(Ordering::Relaxed),
            expunges: self.expunges.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            terminal_events: self.terminal_events.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KillCountsSnapshot {
    pub instances_submitted: u64,
    pub unknown_tasks_submitted: u64,
    pub driver_kills: u64,
    pub expunges: u64,
    pub retries: u64,
    pub exhausted: u64,
    pub terminal_events: u64,
}
