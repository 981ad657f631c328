//! # GuardContext: per-unit supervision state machine.
//!
//! A context is created by the registry when a unit is added and is handed to
//! the unit through [`Guardable::set_context`]. The unit keeps it alive with
//! heartbeats; the registry's `check()` drives its state.
//!
//! ## States
//! ```text
//!             soft timeout missed              hard timeout missed
//!  Healthy ───────────────────────► Recovering ───────────────────► Terminating
//!     ▲                                 │                            (absorbing,
//!     └──────── heartbeat moved ◄───────┘                             removed)
//!               the soft timeout
//! ```
//!
//! ## Timers (absolute, milliseconds)
//! - `soft_timeout`: written by heartbeats (any thread, lock-free)
//! - `hard_timeout`: written by the scan when entering recovery
//! - `missed_soft`: the soft timeout that triggered the current recovery
//!
//! A unit is *suspect* when `now >= soft_timeout` and the soft timeout is
//! still the one already flagged (or none was flagged). An intervening
//! heartbeat moves `soft_timeout` away from `missed_soft`, which is what
//! turns a recovering unit healthy again.
//!
//! ## Rules
//! - Heartbeats never block and never take the registry lock.
//! - Only the registry scan changes `state`, `hard_timeout` and `missed_soft`.
//! - A race between a heartbeat and a scan costs at most one extra recovery.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::core::clock::{self, Clock, Millis, NEVER, UNSET};
use crate::core::registry::Registry;
use crate::error::GuardError;
use crate::units::{Guardable, GuardableRef};

/// Supervision state of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GuardState {
    /// Heartbeats arrive on time.
    Healthy = 0,
    /// The soft timeout was missed; `recover()` has been issued.
    Recovering = 1,
    /// The hard timeout was missed; `terminate()` has been issued.
    Terminating = 2,
}

impl GuardState {
    /// Returns a short stable label for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            GuardState::Healthy => "healthy",
            GuardState::Recovering => "recovering",
            GuardState::Terminating => "terminating",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => GuardState::Healthy,
            1 => GuardState::Recovering,
            _ => GuardState::Terminating,
        }
    }
}

impl fmt::Display for GuardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Outcome of evaluating one context during a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verdict {
    /// Nothing to do; wake no later than `wake`.
    Healthy { wake: Millis },
    /// Entered recovery; `late` is how long ago the soft timeout passed.
    Suspect { wake: Millis, late: Millis },
    /// Still inside the recovery window.
    Recovering { wake: Millis },
    /// Heartbeated during recovery; healthy again.
    Recovered { wake: Millis },
    /// Recovery window exhausted; `late` is how long ago the hard timeout passed.
    TimedOut { late: Millis },
    /// Observed in `Terminating`, which a scan never leaves behind.
    Inconsistent,
}

pub(crate) struct ContextInner {
    unit: Weak<dyn Guardable>,
    name: Arc<str>,
    registry: Weak<Registry>,
    clock: Clock,

    /// Index of the slot holding this context.
    slot: AtomicUsize,
    state: AtomicU8,

    default_timeout: Millis,
    default_soft: Millis,
    fraction: f32,

    /// Current timeout; differs from the default after a custom heartbeat.
    timeout: AtomicU64,
    /// Current recovery window.
    recovery: AtomicU64,

    soft_timeout: AtomicU64,
    hard_timeout: AtomicU64,
    missed_soft: AtomicU64,

    interrupted: AtomicBool,
    detached: AtomicBool,
}

/// Handle to the supervision state of one unit.
///
/// Cheap to clone; all clones refer to the same context. The registry is the
/// owner; the unit and the association table hold clones purely as a
/// convenience channel for heartbeats.
#[derive(Clone)]
pub struct GuardContext {
    inner: Arc<ContextInner>,
}

impl GuardContext {
    /// Builds a context; `timeout` and `fraction` must already be validated.
    pub(crate) fn new(
        unit: &GuardableRef,
        timeout: Duration,
        fraction: f32,
        registry: Weak<Registry>,
        clock: Clock,
    ) -> Self {
        let default_timeout = clock::millis(timeout).max(1);
        let default_soft = soft_part(default_timeout, fraction);
        Self {
            inner: Arc::new(ContextInner {
                unit: Arc::downgrade(unit),
                name: Arc::from(unit.name()),
                registry,
                clock,
                slot: AtomicUsize::new(usize::MAX),
                state: AtomicU8::new(GuardState::Healthy as u8),
                default_timeout,
                default_soft,
                fraction,
                timeout: AtomicU64::new(default_timeout),
                recovery: AtomicU64::new(default_timeout - default_soft),
                soft_timeout: AtomicU64::new(NEVER),
                hard_timeout: AtomicU64::new(UNSET),
                missed_soft: AtomicU64::new(UNSET),
                interrupted: AtomicBool::new(false),
                detached: AtomicBool::new(false),
            }),
        }
    }

    /// Signals liveness with the default timeout.
    ///
    /// Restores the default timeout if a custom heartbeat was in effect.
    pub fn heartbeat(&self) {
        let inner = &self.inner;
        let now = inner.clock.now();

        if inner.timeout.load(Ordering::Relaxed) != inner.default_timeout {
            inner
                .recovery
                .store(inner.default_timeout - inner.default_soft, Ordering::Relaxed);
            inner.timeout.store(inner.default_timeout, Ordering::Relaxed);
        }
        inner
            .soft_timeout
            .store(now.saturating_add(inner.default_soft), Ordering::Release);
    }

    /// Signals liveness and grants a one-off timeout of `timeout`.
    ///
    /// The recovery fraction of the registration applies to `timeout` as well.
    /// The next plain [`heartbeat`](Self::heartbeat) restores the default.
    ///
    /// # Errors
    /// [`GuardError::InvalidArgument`] if `timeout` is shorter than one millisecond.
    pub fn heartbeat_for(&self, timeout: Duration) -> Result<(), GuardError> {
        let inner = &self.inner;
        let ms = clock::millis(timeout);
        if ms == 0 {
            return Err(GuardError::invalid(&inner.name, timeout, inner.fraction));
        }

        let now = inner.clock.now();
        let soft = scaled(ms, inner.fraction);
        inner.recovery.store(ms - soft, Ordering::Relaxed);
        inner
            .soft_timeout
            .store(now.saturating_add(soft.max(1)), Ordering::Release);
        inner.timeout.store(ms, Ordering::Relaxed);
        Ok(())
    }

    /// Heartbeats only if at least half of the default soft timeout has elapsed,
    /// clearing the pending interruption when it does.
    ///
    /// Cheap enough to call from tight loops. Returns `true` if a heartbeat was issued.
    pub fn reset(&self) -> bool {
        let inner = &self.inner;
        let now = inner.clock.now();
        let halfway = inner
            .soft_timeout
            .load(Ordering::Acquire)
            .saturating_sub(inner.default_soft >> 1);

        if now >= halfway {
            self.heartbeat();
            inner.interrupted.store(false, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Ends supervision: detaches from the unit and removes the context from
    /// its registry. Idempotent.
    pub fn release(&self) {
        match self.inner.registry.upgrade() {
            Some(registry) => registry.release_context(self),
            None => {
                self.detach(true);
            }
        }
    }

    /// Current supervision state.
    pub fn state(&self) -> GuardState {
        GuardState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    /// The supervised unit, if it is still alive.
    pub fn unit(&self) -> Option<GuardableRef> {
        self.inner.unit.upgrade()
    }

    /// Name of the supervised unit.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Time from a heartbeat to the soft timeout, for the current timeout.
    pub fn soft_timeout(&self) -> Duration {
        let inner = &self.inner;
        let timeout = inner.timeout.load(Ordering::Relaxed);
        let recovery = inner.recovery.load(Ordering::Relaxed);
        clock::duration(timeout.saturating_sub(recovery).max(1))
    }

    /// Current timeout (the default, or the last custom heartbeat's).
    pub fn timeout(&self) -> Duration {
        clock::duration(self.inner.timeout.load(Ordering::Relaxed))
    }

    /// Raises the pending interruption; cleared by the next effective [`reset`](Self::reset).
    pub fn interrupt(&self) {
        self.inner.interrupted.store(true, Ordering::Release);
    }

    /// Whether an interruption is pending.
    pub fn is_interrupted(&self) -> bool {
        self.inner.interrupted.load(Ordering::Acquire)
    }

    /// Whether supervision of this context has ended.
    pub fn is_released(&self) -> bool {
        self.inner.detached.load(Ordering::Acquire)
    }

    /// Whether both handles refer to the same context.
    pub fn ptr_eq(&self, other: &GuardContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ---------------------------
    // Registry side
    // ---------------------------

    pub(crate) fn slot(&self) -> usize {
        self.inner.slot.load(Ordering::Relaxed)
    }

    pub(crate) fn set_slot(&self, slot: usize) {
        self.inner.slot.store(slot, Ordering::Relaxed);
    }

    /// Whether this context supervises `unit`.
    pub(crate) fn guards(&self, unit: &dyn Guardable) -> bool {
        let mine = Weak::as_ptr(&self.inner.unit) as *const ();
        let theirs = unit as *const dyn Guardable as *const ();
        std::ptr::eq(mine, theirs)
    }

    /// Whether the unit has been dropped by its owner.
    pub(crate) fn is_orphaned(&self) -> bool {
        self.inner.unit.strong_count() == 0
    }

    /// Marks the context released and, if `clear_unit`, clears the unit's
    /// association. Returns `false` if it was already detached.
    pub(crate) fn detach(&self, clear_unit: bool) -> bool {
        if self.inner.detached.swap(true, Ordering::AcqRel) {
            return false;
        }
        if clear_unit {
            if let Some(unit) = self.unit() {
                unit.set_context(None);
            }
        }
        true
    }

    pub(crate) fn soft_deadline(&self) -> Millis {
        self.inner.soft_timeout.load(Ordering::Acquire)
    }

    /// Applies the transition rule at `now`; `poll` is the recovery poll period.
    pub(crate) fn evaluate(&self, now: Millis, poll: Millis) -> Verdict {
        let inner = &self.inner;
        let soft = inner.soft_timeout.load(Ordering::Acquire);

        match self.state() {
            GuardState::Healthy => {
                if !self.is_suspect(now, soft) {
                    return Verdict::Healthy { wake: soft };
                }
                inner.missed_soft.store(soft, Ordering::Relaxed);
                let hard = now.saturating_add(inner.recovery.load(Ordering::Relaxed));
                inner.hard_timeout.store(hard, Ordering::Relaxed);
                self.set_state(GuardState::Recovering);
                Verdict::Suspect {
                    wake: hard.min(now.saturating_add(poll)),
                    late: now - soft,
                }
            }
            GuardState::Recovering => {
                let hard = inner.hard_timeout.load(Ordering::Relaxed);
                if !self.is_suspect(now, soft) {
                    inner.missed_soft.store(UNSET, Ordering::Relaxed);
                    inner.hard_timeout.store(UNSET, Ordering::Relaxed);
                    self.set_state(GuardState::Healthy);
                    Verdict::Recovered {
                        wake: soft.max(now),
                    }
                } else if now >= hard {
                    self.set_state(GuardState::Terminating);
                    Verdict::TimedOut { late: now - hard }
                } else {
                    Verdict::Recovering {
                        wake: hard.min(now.saturating_add(poll)),
                    }
                }
            }
            GuardState::Terminating => Verdict::Inconsistent,
        }
    }

    fn is_suspect(&self, now: Millis, soft: Millis) -> bool {
        let missed = self.inner.missed_soft.load(Ordering::Relaxed);
        now >= soft && (soft == missed || missed == UNSET)
    }

    fn set_state(&self, state: GuardState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }
}

impl fmt::Debug for GuardContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardContext")
            .field("unit", &self.name())
            .field("state", &self.state())
            .field("timeout", &self.timeout())
            .field("soft_timeout", &self.soft_timeout())
            .finish()
    }
}

/// `max(1, timeout·fraction)`: the soft part of a timeout.
fn soft_part(timeout: Millis, fraction: f32) -> Millis {
    scaled(timeout, fraction).max(1)
}

/// Below this many milliseconds an `f32` product is exact enough that
/// `1000 * 0.7` lands on 700 rather than 699.
const F32_EXACT_MS: Millis = 1 << 24;

fn scaled(ms: Millis, fraction: f32) -> Millis {
    if ms < F32_EXACT_MS {
        ((ms as f32) * fraction) as Millis
    } else {
        ((ms as f64) * f64::from(fraction)) as Millis
    }
}
