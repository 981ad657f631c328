//! # Registry: owner of all supervision contexts and the check scheduler.
//!
//! The registry keeps contexts in a slot arena and decides, on each `check()`,
//! which units are suspect, which recovered and which must be terminated.
//!
//! ## Architecture
//! ```text
//! add(unit) ──► GuardContext::new ─► heartbeat ─► slot (free-list or grow) ─► unit.set_context
//!
//! check():
//!   now vs scheduled ──► too early ─► return 0
//!                    ├─► too late  ─► reschedule now + max_check_interval, return lag
//!                    └─► on time   ─► for each slot: ctx.evaluate(now)
//!                                        ├─ Suspect   → recover()   (detached)
//!                                        ├─ Recovered → event
//!                                        ├─ TimedOut  → terminate() (detached) + remove
//!                                        └─ wake time → min(...), floored at now + 1
//!                                     scheduled = max(scheduled, min wake)
//! ```
//!
//! ## Rules
//! - One lock guards the slots and the schedule; `check`, `add`, `remove` and
//!   `release` mutually exclude.
//! - User code (`set_context`, hooks) never runs under the lock.
//! - The scheduled check time never decreases.
//! - `live` always equals the number of occupied slots.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::core::clock::{self, Clock, Millis, UNSET};
use crate::core::config::{GuardianConfig, valid_fraction};
use crate::core::context::{GuardContext, GuardState, Verdict};
use crate::core::dump::DumpThrottle;
use crate::core::hooks::{Hook, spawn_hook};
use crate::error::GuardError;
use crate::events::{Bus, Event, EventKind};
use crate::units::{Guardable, GuardableRef};

/// Scheduling thresholds in milliseconds.
#[derive(Clone, Copy, Debug)]
struct Timing {
    max_interval: Millis,
    early: Millis,
    late: Millis,
    poll: Millis,
    horizon: Millis,
}

impl Timing {
    fn from_config(cfg: &GuardianConfig) -> Self {
        Self {
            max_interval: clock::millis(cfg.max_check_interval),
            early: clock::millis(cfg.early_threshold),
            late: clock::millis(cfg.late_threshold),
            poll: clock::millis(cfg.recovery_poll),
            horizon: clock::millis(cfg.wake_horizon),
        }
    }
}

/// Slot arena plus schedule; everything behind the registry lock.
struct Slots {
    contexts: Vec<Option<GuardContext>>,
    /// Indices of empty slots, reused before the arena grows.
    free: Vec<usize>,
    live: usize,
    next_check: Millis,
}

impl Slots {
    fn new() -> Self {
        Self {
            contexts: Vec::new(),
            free: Vec::new(),
            live: 0,
            next_check: UNSET,
        }
    }

    fn insert(&mut self, ctx: GuardContext) {
        let idx = match self.free.pop() {
            Some(idx) => idx,
            None => {
                self.contexts.push(None);
                self.contexts.len() - 1
            }
        };
        ctx.set_slot(idx);
        self.contexts[idx] = Some(ctx);
        self.live += 1;
    }

    fn take(&mut self, idx: usize) -> Option<GuardContext> {
        let ctx = self.contexts.get_mut(idx)?.take()?;
        self.free.push(idx);
        self.live -= 1;
        Some(ctx)
    }

    /// Removes `ctx` if it still occupies its slot.
    fn take_context(&mut self, ctx: &GuardContext) -> bool {
        let idx = ctx.slot();
        match self.contexts.get(idx) {
            Some(Some(current)) if current.ptr_eq(ctx) => self.take(idx).is_some(),
            _ => false,
        }
    }

    fn position_of(&self, unit: &dyn Guardable) -> Option<usize> {
        self.contexts
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|ctx| ctx.guards(unit)))
    }
}

/// Side effects of a scan, performed once the lock is released.
enum Action {
    Recover { ctx: GuardContext, late: Millis },
    Recovered(GuardContext),
    Terminate { ctx: GuardContext, late: Millis },
    Orphaned(GuardContext),
    Inconsistent(GuardContext),
}

/// Recovery and termination counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardStats {
    /// Soft timeouts detected (recoveries issued).
    pub recoveries: u64,
    /// Hard timeouts detected (terminations issued).
    pub terminations: u64,
}

/// Point-in-time view of one supervised unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSnapshot {
    /// Arena slot index (stable while registered).
    pub slot: usize,
    /// Unit name.
    pub unit: Arc<str>,
    /// Supervision state.
    pub state: GuardState,
    /// Current timeout.
    pub timeout: Duration,
    /// Current soft timeout duration.
    pub soft_timeout: Duration,
    /// Time left until the soft timeout (zero once passed).
    pub due_in: Duration,
    /// Time since the soft timeout passed (zero before).
    pub overdue: Duration,
}

impl fmt::Display for ContextSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "slot={} unit={:?} state={} timeout={:?} soft={:?} due_in={:?} overdue={:?}",
            self.slot,
            self.unit,
            self.state,
            self.timeout,
            self.soft_timeout,
            self.due_in,
            self.overdue
        )
    }
}

/// Supervision registry: owns the contexts and schedules checks.
pub struct Registry {
    timing: Timing,
    clock: Clock,
    bus: Bus,
    runtime: Handle,
    slots: Mutex<Slots>,
    dump: DumpThrottle,
    dump_on_soft_timeout: bool,
    recoveries: AtomicU64,
    terminations: AtomicU64,
}

impl Registry {
    /// Creates a registry publishing to `bus` and running hooks on `runtime`.
    ///
    /// # Errors
    /// [`GuardError::InvalidConfig`] if `cfg` fails [`GuardianConfig::validate`].
    pub fn new(cfg: &GuardianConfig, bus: Bus, runtime: Handle) -> Result<Arc<Self>, GuardError> {
        cfg.validate()?;
        Ok(Arc::new(Self {
            timing: Timing::from_config(cfg),
            clock: Clock::new(),
            bus,
            runtime,
            slots: Mutex::new(Slots::new()),
            dump: DumpThrottle::new(cfg.dump_interval),
            dump_on_soft_timeout: cfg.dump_on_soft_timeout,
            recoveries: AtomicU64::new(0),
            terminations: AtomicU64::new(0),
        }))
    }

    /// Starts supervising `unit`.
    ///
    /// The unit's soft timeout is `timeout·fraction`; the rest of `timeout` is
    /// its recovery window. An immediate heartbeat starts monitoring right away.
    /// Adding a unit that is already registered replaces its context in place.
    ///
    /// # Errors
    /// [`GuardError::InvalidArgument`] if `timeout` is under one millisecond or
    /// `fraction` is outside `(0, 1]`. The registry is left untouched.
    pub fn add(
        self: &Arc<Self>,
        unit: &GuardableRef,
        timeout: Duration,
        fraction: f32,
    ) -> Result<GuardContext, GuardError> {
        if clock::millis(timeout) == 0 || !valid_fraction(fraction) {
            return Err(GuardError::invalid(unit.name(), timeout, fraction));
        }

        let ctx = GuardContext::new(unit, timeout, fraction, Arc::downgrade(self), self.clock);
        ctx.heartbeat();

        let replaced = {
            let mut slots = self.slots.lock();
            match slots.position_of(unit.as_ref()) {
                Some(idx) => {
                    ctx.set_slot(idx);
                    slots.contexts[idx].replace(ctx.clone())
                }
                None => {
                    slots.insert(ctx.clone());
                    None
                }
            }
        };

        if let Some(old) = replaced {
            old.detach(false);
        }
        unit.set_context(Some(ctx.clone()));
        self.bus.publish(
            Event::new(EventKind::UnitAdded)
                .with_unit(ctx.name())
                .with_timeout(timeout),
        );
        Ok(ctx)
    }

    /// Stops supervising `unit`; no-op if it is not registered.
    pub fn remove(&self, unit: &dyn Guardable) {
        let removed = {
            let mut slots = self.slots.lock();
            slots.position_of(unit).and_then(|idx| slots.take(idx))
        };
        if let Some(ctx) = removed {
            self.finish(&ctx, "removed");
        }
    }

    /// Detaches every context from its unit and empties the registry.
    pub fn release(&self) {
        let drained: Vec<GuardContext> = {
            let mut slots = self.slots.lock();
            slots.free.clear();
            slots.live = 0;
            slots.contexts.drain(..).flatten().collect()
        };
        for ctx in &drained {
            self.finish(ctx, "released");
        }
    }

    /// Number of supervised units.
    pub fn live_count(&self) -> usize {
        self.slots.lock().live
    }

    /// Checks every unit, starting recovery or termination as needed.
    ///
    /// Returns how late this call was when the scheduler is so far behind that
    /// no unit was inspected (see [`GuardianConfig::late_threshold`]);
    /// otherwise returns zero.
    pub fn check(&self) -> Duration {
        let mut actions = Vec::new();
        {
            let mut slots = self.slots.lock();
            let now = self.clock.now();
            let scheduled = slots.next_check;

            if scheduled.saturating_sub(now) > self.timing.early {
                return Duration::ZERO;
            }

            let lag = now.saturating_sub(scheduled);
            if scheduled != UNSET && slots.live > 0 && lag > self.timing.late {
                slots.next_check = scheduled.max(now.saturating_add(self.timing.max_interval));
                drop(slots);
                self.bus
                    .publish(Event::new(EventKind::CheckLate).with_late(clock::duration(lag)));
                return clock::duration(lag);
            }

            self.scan(&mut slots, now, &mut actions);
        }

        for action in actions {
            self.apply(action);
        }
        Duration::ZERO
    }

    /// How long the driver should wait before the next check.
    ///
    /// Zero before the first check; never more than the configured maximum interval.
    pub fn next_check_in(&self) -> Duration {
        let next = self.slots.lock().next_check;
        if next == UNSET {
            return Duration::ZERO;
        }
        let wait = next.saturating_sub(self.clock.now());
        clock::duration(wait.min(self.timing.max_interval))
    }

    /// Snapshot of every supervised unit, in slot order.
    pub fn snapshot(&self) -> Vec<ContextSnapshot> {
        let contexts: Vec<GuardContext> = self.slots.lock().contexts.iter().flatten().cloned().collect();
        let now = self.clock.now();
        contexts.iter().map(|ctx| snapshot_of(ctx, now)).collect()
    }

    /// Publishes a diagnostic dump of all units, at most once per dump interval.
    ///
    /// Returns the dump text when one was produced.
    pub fn dump_state(&self) -> Option<String> {
        if !self.dump.try_acquire(self.clock.now()) {
            return None;
        }
        let snapshot = self.snapshot();
        let mut text = format!("guardian state: {} unit(s)", snapshot.len());
        for entry in &snapshot {
            text.push_str("\n  ");
            text.push_str(&entry.to_string());
        }
        self.bus
            .publish(Event::new(EventKind::StateDump).with_reason(text.as_str()));
        Some(text)
    }

    /// Recovery/termination counters since creation or the last reset.
    pub fn stats(&self) -> GuardStats {
        GuardStats {
            recoveries: self.recoveries.load(Ordering::Relaxed),
            terminations: self.terminations.load(Ordering::Relaxed),
        }
    }

    /// Zeroes the counters.
    pub fn reset_stats(&self) {
        self.recoveries.store(0, Ordering::Relaxed);
        self.terminations.store(0, Ordering::Relaxed);
    }

    /// Removes `ctx` if it is still registered, then detaches it.
    pub(crate) fn release_context(&self, ctx: &GuardContext) {
        let removed = self.slots.lock().take_context(ctx);
        if removed {
            self.finish(ctx, "released");
        } else {
            ctx.detach(true);
        }
    }

    #[cfg(test)]
    pub(crate) fn next_check_time(&self) -> Millis {
        self.slots.lock().next_check
    }

    // ---------------------------
    // Scan
    // ---------------------------

    fn scan(&self, slots: &mut Slots, now: Millis, actions: &mut Vec<Action>) {
        let floor = now.saturating_add(1);
        let mut wake_min = now.saturating_add(self.timing.horizon);

        for idx in 0..slots.contexts.len() {
            let Some(ctx) = slots.contexts[idx].clone() else {
                continue;
            };

            if ctx.is_orphaned() {
                slots.take(idx);
                actions.push(Action::Orphaned(ctx));
                continue;
            }

            let wake = match ctx.evaluate(now, self.timing.poll) {
                Verdict::Healthy { wake } | Verdict::Recovering { wake } => wake,
                Verdict::Suspect { wake, late } => {
                    actions.push(Action::Recover { ctx, late });
                    wake
                }
                Verdict::Recovered { wake } => {
                    actions.push(Action::Recovered(ctx));
                    wake
                }
                Verdict::TimedOut { late } => {
                    slots.take(idx);
                    actions.push(Action::Terminate { ctx, late });
                    continue;
                }
                Verdict::Inconsistent => {
                    actions.push(Action::Inconsistent(ctx));
                    continue;
                }
            };
            wake_min = wake_min.min(wake.max(floor));
        }

        slots.next_check = slots.next_check.max(wake_min);
    }

    fn apply(&self, action: Action) {
        match action {
            Action::Recover { ctx, late } => {
                self.recoveries.fetch_add(1, Ordering::Relaxed);
                self.bus.publish(
                    Event::new(EventKind::SoftTimeout)
                        .with_unit(ctx.name())
                        .with_late(clock::duration(late))
                        .with_timeout(ctx.timeout()),
                );
                self.run_hook(&ctx, Hook::Recover);
                if self.dump_on_soft_timeout {
                    self.dump_state();
                }
            }
            Action::Recovered(ctx) => {
                self.bus
                    .publish(Event::new(EventKind::Recovered).with_unit(ctx.name()));
            }
            Action::Terminate { ctx, late } => {
                self.terminations.fetch_add(1, Ordering::Relaxed);
                self.bus.publish(
                    Event::new(EventKind::HardTimeout)
                        .with_unit(ctx.name())
                        .with_late(clock::duration(late))
                        .with_timeout(ctx.timeout()),
                );
                self.run_hook(&ctx, Hook::Terminate);
                self.finish(&ctx, "terminated");
            }
            Action::Orphaned(ctx) => {
                ctx.detach(false);
                self.bus.publish(
                    Event::new(EventKind::UnitRemoved)
                        .with_unit(ctx.name())
                        .with_reason("dropped"),
                );
            }
            Action::Inconsistent(ctx) => {
                self.bus.publish(
                    Event::new(EventKind::InconsistentState)
                        .with_unit(ctx.name())
                        .with_reason(format!("unexpected state {}", ctx.state())),
                );
            }
        }
    }

    fn run_hook(&self, ctx: &GuardContext, hook: Hook) {
        if let Some(unit) = ctx.unit() {
            spawn_hook(&self.runtime, &self.bus, unit, Arc::from(ctx.name()), hook);
        }
    }

    /// Detaches a context that already left its slot and reports it.
    fn finish(&self, ctx: &GuardContext, reason: &'static str) {
        ctx.detach(true);
        self.bus.publish(
            Event::new(EventKind::UnitRemoved)
                .with_unit(ctx.name())
                .with_reason(reason),
        );
    }
}

fn snapshot_of(ctx: &GuardContext, now: Millis) -> ContextSnapshot {
    let soft = ctx.soft_deadline();
    ContextSnapshot {
        slot: ctx.slot(),
        unit: Arc::from(ctx.name()),
        state: ctx.state(),
        timeout: ctx.timeout(),
        soft_timeout: ctx.soft_timeout(),
        due_in: clock::duration(soft.saturating_sub(now)),
        overdue: clock::duration(now.saturating_sub(soft)),
    }
}
