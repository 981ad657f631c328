//! # LogWriter: events to `tracing`
//!
//! A subscriber that forwards every [`Event`] to the `tracing` ecosystem at a
//! level derived from [`EventKind::severity`]. Install any `tracing`
//! subscriber (e.g. `tracing-subscriber`) to see the output.
//!
//! ## Example output
//! ```text
//! WARN  guardvisor: soft-timeout unit="indexer" timeout_ms=Some(2000) late_ms=Some(12)
//! INFO  guardvisor: recovered unit="indexer"
//! ERROR guardvisor: hard-timeout unit="indexer" timeout_ms=Some(2000) late_ms=Some(3)
//! WARN  guardvisor: check-late late_ms=Some(10400)
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind, Severity};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

macro_rules! emit {
    ($sev:expr, $($arg:tt)+) => {
        match $sev {
            Severity::Debug => tracing::debug!(target: "guardvisor", $($arg)+),
            Severity::Info => tracing::info!(target: "guardvisor", $($arg)+),
            Severity::Warn => tracing::warn!(target: "guardvisor", $($arg)+),
            Severity::Error => tracing::error!(target: "guardvisor", $($arg)+),
        }
    };
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let label = e.kind.as_label();
        let unit = e.unit.as_deref().unwrap_or("-");
        let sev = e.kind.severity();

        match e.kind {
            EventKind::UnitAdded => {
                emit!(sev, seq = e.seq, unit, timeout_ms = ?e.timeout_ms, "{label}");
            }
            EventKind::SoftTimeout | EventKind::HardTimeout => {
                emit!(
                    sev,
                    seq = e.seq,
                    unit,
                    timeout_ms = ?e.timeout_ms,
                    late_ms = ?e.late_ms,
                    "{label}"
                );
            }
            EventKind::CheckLate => {
                emit!(sev, seq = e.seq, late_ms = ?e.late_ms, "{label}");
            }
            EventKind::StateDump => {
                emit!(sev, seq = e.seq, "{label}\n{}", e.reason.as_deref().unwrap_or(""));
            }
            _ => match e.reason.as_deref() {
                Some(reason) => emit!(sev, seq = e.seq, unit, reason, "{label}"),
                None => emit!(sev, seq = e.seq, unit, "{label}"),
            },
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn test_timeouts_carry_duration_and_lateness() {
        let w = LogWriter::new();
        w.on_event(
            &Event::new(EventKind::HardTimeout)
                .with_unit("indexer")
                .with_timeout(Duration::from_millis(1000))
                .with_late(Duration::from_millis(3)),
        )
        .await;
        w.on_event(
            &Event::new(EventKind::SoftTimeout)
                .with_unit("indexer")
                .with_timeout(Duration::from_millis(1000))
                .with_late(Duration::from_millis(12)),
        )
        .await;

        assert!(logs_contain("hard-timeout"));
        assert!(logs_contain("timeout_ms=Some(1000) late_ms=Some(3)"));
        assert!(logs_contain("timeout_ms=Some(1000) late_ms=Some(12)"));
        assert!(logs_contain("ERROR"));
    }

    #[tokio::test]
    async fn test_handles_every_kind_without_subscriber() {
        let w = LogWriter::new();
        for kind in [
            EventKind::UnitAdded,
            EventKind::SoftTimeout,
            EventKind::StateDump,
            EventKind::HookFailed,
            EventKind::DriverStopped,
        ] {
            w.on_event(&Event::new(kind).with_unit("u").with_reason("r"))
                .await;
        }
        assert_eq!(w.name(), "log-writer");
    }
}
