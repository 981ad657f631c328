//! Error types used by the guardian runtime and by supervised units.
//!
//! This module defines two main error enums:
//!
//! - [`GuardError`]: errors raised by the guardian itself (bad arguments, bad config).
//! - [`UnitError`]: errors returned by a unit's `recover`/`terminate` hooks.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the guardian.
///
/// These are programmer or configuration errors. They are raised synchronously
/// by registration, custom heartbeats and [`GuardianBuilder::build`](crate::GuardianBuilder::build),
/// and never leave the registry in a modified state.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GuardError {
    /// Registration or heartbeat parameters are out of range.
    #[error("invalid argument: unit={unit} timeout={timeout:?} recover={recover}")]
    InvalidArgument {
        /// Name of the unit the call was made for.
        unit: String,
        /// The offending timeout (must be non-zero).
        timeout: Duration,
        /// The offending recovery fraction (must be in `(0, 1]`).
        recover: f32,
    },

    /// Guardian configuration violates its ordering constraints.
    #[error("invalid guardian config: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// The guardian was built outside of a tokio runtime and no handle was supplied.
    #[error("no tokio runtime available to run recovery hooks")]
    NoRuntime,
}

impl GuardError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use guardvisor::GuardError;
    ///
    /// let err = GuardError::InvalidConfig { reason: "early >= max".into() };
    /// assert_eq!(err.as_label(), "guard_invalid_config");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            GuardError::InvalidArgument { .. } => "guard_invalid_argument",
            GuardError::InvalidConfig { .. } => "guard_invalid_config",
            GuardError::NoRuntime => "guard_no_runtime",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            GuardError::InvalidArgument {
                unit,
                timeout,
                recover,
            } => format!("unit={unit} timeout={timeout:?} recover={recover}"),
            GuardError::InvalidConfig { reason } => format!("config: {reason}"),
            GuardError::NoRuntime => "no tokio runtime".to_string(),
        }
    }

    pub(crate) fn invalid(unit: &str, timeout: Duration, recover: f32) -> Self {
        GuardError::InvalidArgument {
            unit: unit.to_string(),
            timeout,
            recover,
        }
    }
}

/// # Errors returned by a unit's hooks.
///
/// The guardian never propagates these; it catches them on the hook task and
/// publishes [`EventKind::HookFailed`](crate::EventKind::HookFailed).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum UnitError {
    /// The hook could not complete, but the unit may still be usable.
    #[error("hook failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The unit was already shutting down when the hook ran.
    #[error("unit cancelled")]
    Canceled,
}

impl UnitError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use guardvisor::UnitError;
    ///
    /// let err = UnitError::Fail { error: "busy".into() };
    /// assert_eq!(err.as_label(), "unit_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            UnitError::Fail { .. } => "unit_failed",
            UnitError::Canceled => "unit_canceled",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            UnitError::Fail { error } => format!("error: {error}"),
            UnitError::Canceled => "unit cancelled".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_error_labels_and_messages() {
        let fail = UnitError::Fail {
            error: "busy".into(),
        };
        assert_eq!(fail.as_label(), "unit_failed");
        assert_eq!(fail.as_message(), "error: busy");
        assert_eq!(fail.to_string(), "hook failed: busy");

        assert_eq!(UnitError::Canceled.as_label(), "unit_canceled");
        assert_eq!(UnitError::Canceled.to_string(), "unit cancelled");
    }

    #[test]
    fn test_guard_error_labels() {
        let err = GuardError::invalid("w", Duration::ZERO, 0.5);
        assert_eq!(err.as_label(), "guard_invalid_argument");
        assert!(err.as_message().contains("unit=w"));
        assert_eq!(GuardError::NoRuntime.as_label(), "guard_no_runtime");
    }
}
