//! # Guardian configuration.
//!
//! Provides [`GuardianConfig`], the centralized tuning knobs of the guardian.
//!
//! Config is used in two ways:
//! 1. **Scheduling**: thresholds and intervals consumed by `Registry::check`
//! 2. **Unit defaults**: `Guardian::guard(unit)` registers with `default_timeout`
//!    and `default_recover_fraction`
//!
//! ## Ordering constraint
//! `early_threshold < max_check_interval < late_threshold` must hold; a check
//! that is merely early must never be confused with one that is late.

use std::time::Duration;

use crate::error::GuardError;

/// Global configuration for a guardian.
///
/// ## Field semantics
/// - `max_check_interval`: longest the driver waits between two checks
/// - `early_threshold`: a check this much before its scheduled time is skipped
/// - `late_threshold`: a check this much after its scheduled time is blamed on
///   scheduler starvation and inspects nothing
/// - `recovery_poll`: poll period for units in recovery
/// - `wake_horizon`: upper bound on the next-wake recommendation of one scan
/// - `dump_interval`: minimum spacing between two state dumps
/// - `dump_on_soft_timeout`: publish a state dump when a unit misses its soft timeout
/// - `default_timeout` / `default_recover_fraction`: SLA used by `Guardian::guard`
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
#[derive(Clone, Debug)]
pub struct GuardianConfig {
    /// Maximum interval at which the driver calls `check()`.
    pub max_check_interval: Duration,

    /// How early a check may run before it is ignored.
    pub early_threshold: Duration,

    /// How late a check may run before it stops inspecting units.
    ///
    /// A guardian this far behind most likely shares a stalled process with its
    /// units; they get `max_check_interval` to catch up instead of being punished.
    pub late_threshold: Duration,

    /// Poll period while a unit is recovering, so a recovered unit turns
    /// healthy promptly.
    pub recovery_poll: Duration,

    /// Upper bound on how far ahead a single scan schedules the next check.
    pub wake_horizon: Duration,

    /// Minimum interval between two diagnostic dumps.
    pub dump_interval: Duration,

    /// Whether a soft timeout triggers a (rate-limited) diagnostic dump.
    pub dump_on_soft_timeout: bool,

    /// Timeout used by `Guardian::guard`.
    pub default_timeout: Duration,

    /// Recovery fraction used by `Guardian::guard`; `0 < f <= 1`.
    pub default_recover_fraction: f32,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,
}

impl GuardianConfig {
    /// Checks the ordering and range constraints.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use guardvisor::GuardianConfig;
    ///
    /// let mut cfg = GuardianConfig::default();
    /// assert!(cfg.validate().is_ok());
    ///
    /// cfg.early_threshold = Duration::from_secs(30);
    /// assert!(cfg.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<(), GuardError> {
        if self.early_threshold >= self.max_check_interval {
            return Err(invalid(format!(
                "early_threshold {:?} must be below max_check_interval {:?}",
                self.early_threshold, self.max_check_interval
            )));
        }
        if self.max_check_interval >= self.late_threshold {
            return Err(invalid(format!(
                "max_check_interval {:?} must be below late_threshold {:?}",
                self.max_check_interval, self.late_threshold
            )));
        }
        if self.recovery_poll.is_zero() || self.wake_horizon.is_zero() {
            return Err(invalid("recovery_poll and wake_horizon must be non-zero".into()));
        }
        if self.default_timeout.is_zero() {
            return Err(invalid("default_timeout must be non-zero".into()));
        }
        if !valid_fraction(self.default_recover_fraction) {
            return Err(invalid(format!(
                "default_recover_fraction {} must be in (0, 1]",
                self.default_recover_fraction
            )));
        }
        Ok(())
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for GuardianConfig {
    /// Default configuration:
    ///
    /// - `max_check_interval = 5s`, `late_threshold = 10s`, `early_threshold = 500ms`
    /// - `recovery_poll = 100ms`, `wake_horizon = 1s`
    /// - `dump_interval = 3s`, `dump_on_soft_timeout = true`
    /// - `default_timeout = 60s`, `default_recover_fraction = 0.8`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        let max_check_interval = Duration::from_secs(5);
        Self {
            max_check_interval,
            early_threshold: Duration::from_millis(500),
            late_threshold: max_check_interval * 2,
            recovery_poll: Duration::from_millis(100),
            wake_horizon: Duration::from_secs(1),
            dump_interval: Duration::from_secs(3),
            dump_on_soft_timeout: true,
            default_timeout: Duration::from_secs(60),
            default_recover_fraction: 0.8,
            bus_capacity: 1024,
        }
    }
}

/// `true` when `f` is a usable recovery fraction (NaN is rejected).
#[inline]
pub(crate) fn valid_fraction(f: f32) -> bool {
    f > 0.0 && f <= 1.0
}

fn invalid(reason: String) -> GuardError {
    GuardError::InvalidConfig { reason }
}
