//! # Guardable capability.
//!
//! A [`Guardable`] is anything that cooperates with a guardian: it reports
//! liveness through the [`GuardContext`] it is handed, and it exposes two hooks
//! the guardian calls when liveness stops:
//!
//! ```text
//! soft timeout missed ──► recover()    (non-destructive: interrupt, restart work)
//! hard timeout missed ──► terminate()  (force the unit to stop)
//! ```
//!
//! Hooks run on detached tasks. Their errors and panics are caught and reported
//! as events; they never reach the guardian's check loop.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::GuardContext;
use crate::error::UnitError;

/// Shared handle to a supervised unit.
pub type GuardableRef = Arc<dyn Guardable>;

/// # Supervised capability.
///
/// The guardian keeps only a weak reference to the unit: dropping the last
/// [`GuardableRef`] ends supervision at the next check.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use parking_lot::Mutex;
/// use guardvisor::{GuardContext, Guardable, UnitError};
///
/// struct Worker {
///     ctx: Mutex<Option<GuardContext>>,
/// }
///
/// #[async_trait]
/// impl Guardable for Worker {
///     fn name(&self) -> &str { "worker" }
///
///     fn set_context(&self, ctx: Option<GuardContext>) {
///         *self.ctx.lock() = ctx;
///     }
///
///     async fn recover(&self) -> Result<(), UnitError> {
///         if let Some(ctx) = self.ctx.lock().as_ref() {
///             ctx.interrupt();
///         }
///         Ok(())
///     }
///
///     async fn terminate(&self) -> Result<(), UnitError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Guardable: Send + Sync + 'static {
    /// Returns a stable, human-readable unit name used in events and dumps.
    fn name(&self) -> &str;

    /// Associates the unit with its context, or clears the association (`None`)
    /// when supervision ends.
    ///
    /// Called outside of the guardian's internal lock; it is safe to call back
    /// into the context from here.
    fn set_context(&self, context: Option<GuardContext>);

    /// Attempts non-destructive remediation after a missed soft timeout.
    ///
    /// A successful recovery is signalled by a heartbeat, not by the return value.
    async fn recover(&self) -> Result<(), UnitError>;

    /// Forces the unit to stop after a missed hard timeout.
    ///
    /// By the time this runs the unit is already out of the registry.
    async fn terminate(&self) -> Result<(), UnitError>;
}
