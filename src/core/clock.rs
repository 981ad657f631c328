//! Millisecond monotonic clock shared by a registry and its contexts.
//!
//! Instants are plain `u64` milliseconds so they fit in atomics and can be
//! updated by heartbeats without locking. The value `0` is reserved for
//! "unset", so readings start at 1.
//!
//! Built on [`tokio::time::Instant`]: under a paused tokio clock
//! (`start_paused = true`) readings follow `tokio::time::advance`.

use std::time::Duration;

use tokio::time::Instant;

/// Absolute instant in milliseconds since the clock's origin (plus one).
pub(crate) type Millis = u64;

/// Sentinel for "no instant".
pub(crate) const UNSET: Millis = 0;

/// Sentinel for "never": a soft timeout that was not yet armed.
pub(crate) const NEVER: Millis = u64::MAX;

#[derive(Clone, Copy, Debug)]
pub(crate) struct Clock {
    origin: Instant,
}

impl Clock {
    pub(crate) fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Current reading; always `>= 1`.
    pub(crate) fn now(&self) -> Millis {
        millis(self.origin.elapsed()).saturating_add(1)
    }
}

/// Converts a duration into whole milliseconds, saturating.
#[inline]
pub(crate) fn millis(d: Duration) -> Millis {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Converts a millisecond count back into a duration.
#[inline]
pub(crate) fn duration(ms: Millis) -> Duration {
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_follows_paused_time() {
        let clock = Clock::new();
        let t0 = clock.now();
        assert_eq!(t0, 1);

        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(clock.now(), t0 + 250);
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::MAX), u64::MAX);
        assert_eq!(millis(Duration::from_micros(2500)), 2);
    }
}
