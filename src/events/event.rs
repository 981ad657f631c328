//! # Runtime events emitted by the guardian.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Registration events**: units entering or leaving supervision
//! - **Supervision events**: soft/hard timeouts, recoveries, hook outcomes
//! - **Scheduler events**: late checks, driver lifecycle, state dumps
//! - **Subscriber events**: overflow and panics inside subscribers
//!
//! The [`Event`] struct carries additional metadata such as timestamps, unit name,
//! reasons, lateness and configured timeouts.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use guardvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::SoftTimeout)
//!     .with_unit("worker-1")
//!     .with_late(Duration::from_millis(1200))
//!     .with_timeout(Duration::from_secs(5));
//!
//! assert_eq!(ev.kind, EventKind::SoftTimeout);
//! assert_eq!(ev.unit.as_deref(), Some("worker-1"));
//! assert_eq!(ev.late_ms, Some(1200));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `unit`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `unit`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Registration events ===
    /// Unit registered (or re-registered with new parameters).
    ///
    /// Sets:
    /// - `unit`: unit name
    /// - `timeout_ms`: configured timeout
    UnitAdded,

    /// Unit removed from supervision (remove, release or termination).
    ///
    /// Sets:
    /// - `unit`: unit name
    UnitRemoved,

    // === Supervision events ===
    /// Unit missed its soft timeout; recovery has been started.
    ///
    /// Sets:
    /// - `unit`: unit name
    /// - `late_ms`: how long ago the soft timeout elapsed
    /// - `timeout_ms`: current timeout of the unit
    SoftTimeout,

    /// Unit heartbeated while recovering and is healthy again.
    ///
    /// Sets:
    /// - `unit`: unit name
    Recovered,

    /// Unit missed its hard timeout; termination has been started.
    ///
    /// Sets:
    /// - `unit`: unit name
    /// - `late_ms`: how long ago the hard timeout elapsed
    /// - `timeout_ms`: current timeout of the unit
    HardTimeout,

    /// A `recover()`/`terminate()` hook returned an error.
    ///
    /// Sets:
    /// - `unit`: unit name
    /// - `reason`: hook name and error message
    HookFailed,

    /// A `recover()`/`terminate()` hook panicked.
    ///
    /// Sets:
    /// - `unit`: unit name
    /// - `reason`: hook name and panic message
    HookPanicked,

    // === Scheduler events ===
    /// The check ran far behind schedule; no unit was inspected.
    ///
    /// Sets:
    /// - `late_ms`: scheduler lag
    CheckLate,

    /// A context was observed in a state the scan never leaves it in.
    ///
    /// Sets:
    /// - `unit`: unit name
    /// - `reason`: observed state
    InconsistentState,

    /// Rate-limited diagnostic dump of all supervised units.
    ///
    /// Sets:
    /// - `reason`: the dump text
    StateDump,

    /// Periodic driver started.
    DriverStarted,

    /// Periodic driver stopped (cancelled); all units were released.
    DriverStopped,
}

impl EventKind {
    /// Returns a short stable label (kebab-case) for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            EventKind::SubscriberPanicked => "subscriber-panicked",
            EventKind::SubscriberOverflow => "subscriber-overflow",
            EventKind::UnitAdded => "unit-added",
            EventKind::UnitRemoved => "unit-removed",
            EventKind::SoftTimeout => "soft-timeout",
            EventKind::Recovered => "recovered",
            EventKind::HardTimeout => "hard-timeout",
            EventKind::HookFailed => "hook-failed",
            EventKind::HookPanicked => "hook-panicked",
            EventKind::CheckLate => "check-late",
            EventKind::InconsistentState => "inconsistent-state",
            EventKind::StateDump => "state-dump",
            EventKind::DriverStarted => "driver-started",
            EventKind::DriverStopped => "driver-stopped",
        }
    }

    /// Severity of this kind of event.
    pub fn severity(&self) -> Severity {
        match self {
            EventKind::UnitAdded
            | EventKind::UnitRemoved
            | EventKind::DriverStarted
            | EventKind::DriverStopped => Severity::Debug,
            EventKind::Recovered => Severity::Info,
            EventKind::SoftTimeout | EventKind::CheckLate | EventKind::SubscriberOverflow => {
                Severity::Warn
            }
            EventKind::HardTimeout
            | EventKind::HookFailed
            | EventKind::HookPanicked
            | EventKind::InconsistentState
            | EventKind::StateDump
            | EventKind::SubscriberPanicked => Severity::Error,
        }
    }
}

/// Event severity, from least to most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,

    /// Unit timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Lateness in milliseconds (soft/hard timeout or scheduler lag).
    pub late_ms: Option<u64>,
    /// Human-readable reason (errors, overflow details, dumps).
    pub reason: Option<Arc<str>>,
    /// Name of the unit (or subscriber), if applicable.
    pub unit: Option<Arc<str>>,
    /// Event classification.
    pub kind: EventKind,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            kind,
            at: SystemTime::now(),
            timeout_ms: None,
            late_ms: None,
            reason: None,
            unit: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a unit name.
    #[inline]
    pub fn with_unit(mut self, unit: impl Into<Arc<str>>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(as_millis(d));
        self
    }

    /// Attaches a lateness (stored as milliseconds).
    #[inline]
    pub fn with_late(mut self, d: Duration) -> Self {
        self.late_ms = Some(as_millis(d));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_unit(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_unit(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}

fn as_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::UnitAdded);
        let b = Event::new(EventKind::UnitRemoved);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(EventKind::HardTimeout.severity() > EventKind::SoftTimeout.severity());
        assert_eq!(EventKind::SoftTimeout.severity(), Severity::Warn);
        assert_eq!(EventKind::HookPanicked.severity(), Severity::Error);
        assert_eq!(EventKind::UnitAdded.severity(), Severity::Debug);
    }

    #[test]
    fn test_builders_store_millis() {
        let ev = Event::new(EventKind::HardTimeout)
            .with_timeout(Duration::from_secs(2))
            .with_late(Duration::from_micros(1500));
        assert_eq!(ev.timeout_ms, Some(2000));
        assert_eq!(ev.late_ms, Some(1));
    }
}
