//! # TokenGuardable: a unit driven by cancellation tokens.
//!
//! Most async workers already stop on a [`CancellationToken`]. `TokenGuardable`
//! maps the guardian's hooks onto two of them:
//!
//! ```text
//! root token ─────────────────────────────── cancelled by terminate()
//!    └─ work token #1 ── cancelled by recover() ─┐
//!    └─ work token #2 ◄── installed by recover() ┘ (context interrupted)
//! ```
//!
//! A worker selects on [`work_token`](TokenGuardable::work_token) to abandon the
//! item it is stuck on, and on [`root_token`](TokenGuardable::root_token) to
//! exit for good.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use guardvisor::{Guardian, GuardianConfig, TokenGuardable};
//!
//! # async fn run() -> Result<(), guardvisor::GuardError> {
//! let guardian = Guardian::builder(GuardianConfig::default()).build()?;
//! let unit = TokenGuardable::arc("fetcher");
//! guardian.guard_with(unit.clone(), Duration::from_secs(10), 0.5)?;
//!
//! let root = unit.root_token();
//! while !root.is_cancelled() {
//!     let work = unit.work_token();
//!     tokio::select! {
//!         _ = work.cancelled() => continue,
//!         _ = tokio::time::sleep(Duration::from_millis(100)) => unit.heartbeat(),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::core::GuardContext;
use crate::error::UnitError;
use crate::units::Guardable;

/// Guardable unit backed by a root and a per-item [`CancellationToken`].
pub struct TokenGuardable {
    name: String,
    root: CancellationToken,
    work: Mutex<CancellationToken>,
    context: Mutex<Option<GuardContext>>,
}

impl TokenGuardable {
    /// Creates a unit with a fresh root token.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_root(name, CancellationToken::new())
    }

    /// Creates a unit whose root token is a child of `parent`.
    pub fn with_parent(name: impl Into<String>, parent: &CancellationToken) -> Self {
        Self::with_root(name, parent.child_token())
    }

    /// Creates a unit and wraps it into an `Arc`.
    pub fn arc(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(name))
    }

    fn with_root(name: impl Into<String>, root: CancellationToken) -> Self {
        let work = root.child_token();
        Self {
            name: name.into(),
            root,
            work: Mutex::new(work),
            context: Mutex::new(None),
        }
    }

    /// Token cancelled when the unit is terminated.
    pub fn root_token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Token for the current item of work; cancelled on recovery and replaced.
    pub fn work_token(&self) -> CancellationToken {
        self.work.lock().clone()
    }

    /// The supervision context, while guarded.
    pub fn context(&self) -> Option<GuardContext> {
        self.context.lock().clone()
    }

    /// Heartbeats the supervision context, if any.
    pub fn heartbeat(&self) {
        if let Some(ctx) = self.context() {
            ctx.heartbeat();
        }
    }

    /// True once [`terminate`](Guardable::terminate) ran.
    pub fn is_terminated(&self) -> bool {
        self.root.is_cancelled()
    }
}

#[async_trait]
impl Guardable for TokenGuardable {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_context(&self, context: Option<GuardContext>) {
        *self.context.lock() = context;
    }

    async fn recover(&self) -> Result<(), UnitError> {
        if self.root.is_cancelled() {
            return Err(UnitError::Canceled);
        }
        let stale = {
            let mut work = self.work.lock();
            std::mem::replace(&mut *work, self.root.child_token())
        };
        stale.cancel();
        if let Some(ctx) = self.context() {
            ctx.interrupt();
        }
        Ok(())
    }

    async fn terminate(&self) -> Result<(), UnitError> {
        self.root.cancel();
        Ok(())
    }
}
