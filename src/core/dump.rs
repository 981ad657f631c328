//! Rate limiting for diagnostic dumps.
//!
//! Stalls tend to cascade: when one unit misses its soft timeout, its
//! neighbours usually follow. A dump per stall would add load exactly when
//! the process can least afford it, so dumps are throttled to one per
//! interval, and concurrent callers race on a single compare-and-swap.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::core::clock::{self, Millis, UNSET};

/// Lock-free "at most once per interval" gate.
#[derive(Debug)]
pub(crate) struct DumpThrottle {
    interval: Millis,
    last: AtomicU64,
}

impl DumpThrottle {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval: clock::millis(interval),
            last: AtomicU64::new(UNSET),
        }
    }

    /// Returns `true` for exactly one caller per interval.
    pub(crate) fn try_acquire(&self, now: Millis) -> bool {
        let last = self.last.load(Ordering::Acquire);
        if last != UNSET && now < last.saturating_add(self.interval) {
            return false;
        }
        self.last
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
