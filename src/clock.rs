//! Injectable time source.
//! The service reads time through a `Clock` handle so the retry protocol can
//! be tested against a manually advanced source.

use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Milliseconds since the clock's origin. The zero value means "never".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Saturating difference, in milliseconds.
    pub fn millis_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, d: Duration) -> Timestamp {
        Timestamp(self.0.saturating_add(d.as_millis() as u64))
    }
}

#[derive(Clone)]
enum Source {
    /// Monotonic, anchored at clock creation. Starts at 1ms so that a real
    /// reading can never collide with `Timestamp::ZERO`.
    System(Instant),
    Manual(Arc<AtomicU64>),
}

/// Cheap cloneable time handle.
#[derive(Clone)]
pub struct Clock {
    source: Source,
}

impl Clock {
    /// Monotonic clock anchored at the moment of creation.
    pub fn system() -> Self {
        Self {
            source: Source::System(Instant::now()),
        }
    }

    pub fn now(&self) -> Timestamp {
        match &self.source {
            Source::System(origin) => Timestamp(origin.elapsed().as_millis() as u64 + 1),
            Source::Manual(now_ms) => Timestamp(now_ms.load(Ordering::SeqCst)),
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

/// Manually advanced clock for tests. Hand out `clock()` handles and drive
/// time with `advance`/`set`.
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now_ms: Arc::new(AtomicU64::new(start.0)),
        }
    }

    pub fn clock(&self) -> Clock {
        Clock {
            source: Source::Manual(self.now_ms.clone()),
        }
    }

    pub fn advance(&self, d: Duration) {
        self.now_ms
            .fetch_add(d.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, t: Timestamp) {
        self.now_ms.store(t.0, Ordering::SeqCst);
    }

    pub fn now(&self) -> Timestamp {
        Timestamp(self.now_ms.load(Ordering::SeqCst))
    }
}
