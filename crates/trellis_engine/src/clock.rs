//! Session clocks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::config::ClockType;

/// Time source of one working memory, measured from session creation.
#[derive(Debug)]
pub struct SessionClock {
    kind: ClockType,
    started: Instant,
    /// Pseudo clock offset in nanoseconds.
    offset: AtomicU64,
}

impl SessionClock {
    /// Creates a clock of the given kind, starting at zero.
    #[must_use]
    pub fn new(kind: ClockType) -> Self {
        Self {
            kind,
            started: Instant::now(),
            offset: AtomicU64::new(0),
        }
    }

    /// Returns the clock kind.
    #[must_use]
    pub fn kind(&self) -> ClockType {
        self.kind
    }

    /// Returns the current session time.
    #[must_use]
    pub fn now(&self) -> Duration {
        match self.kind {
            ClockType::Realtime => self.started.elapsed(),
            ClockType::Pseudo => Duration::from_nanos(self.offset.load(Ordering::Acquire)),
        }
    }

    /// Advances a pseudo clock. Returns false on a realtime clock, which
    /// cannot be moved.
    pub fn advance(&self, by: Duration) -> bool {
        if self.kind != ClockType::Pseudo {
            return false;
        }
        let nanos = u64::try_from(by.as_nanos()).unwrap_or(u64::MAX);
        self.offset
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(nanos))
            })
            .is_ok()
    }
}
