//! # guardvisor
//!
//! **Guardvisor** detects stalled workers and drives them through recovery or
//! termination.
//!
//! A worker (a [`Guardable`] unit) promises to heartbeat within a *soft
//! timeout*. When it misses one, the guardian asks it to [`recover`](Guardable::recover);
//! if it still has not heartbeated when the *hard timeout* expires, the
//! guardian [`terminate`](Guardable::terminate)s it and forgets about it.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  Guardable   │   │  Guardable   │   │  Guardable   │
//!     │  (worker #1) │   │  (worker #2) │   │  (worker #3) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            │ heartbeat()      │ association::    │ heartbeat_for(d)
//!            ▼                  ▼ heartbeat()      ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ GuardContext │   │ GuardContext │   │ GuardContext │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            └──────────────────┼──────────────────┘
//!                               ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Guardian                                                         │
//! │  - Registry (slot arena + check schedule)                         │
//! │  - driver (check loop)                                            │
//! │  - Bus (broadcast events)                                         │
//! │  - SubscriberSet (fans out to user subscribers)                   │
//! └──────┬─────────────────────────────────────────────────────┬──────┘
//!        │ recover() / terminate() on detached tasks           │ Events
//!        ▼                                                     ▼
//!   Guardable hooks                              SubscriberSet ─► LogWriter, ...
//! ```
//!
//! ### Lifecycle of one unit
//! ```text
//! guard(unit) ──► Healthy ──(soft timeout missed)──► Recovering ──(hard timeout)──► Terminating
//!                    ▲                                  │                            │
//!                    └───────(heartbeat arrives)────────┘                  terminate(), removed
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                       |
//! |-------------------|----------------------------------------------------------|------------------------------------------|
//! | **Supervision**   | Register units, run checks, drive the check loop.        | [`Guardian`], [`Registry`]               |
//! | **Units**         | Capability a worker implements to be guarded.            | [`Guardable`], [`TokenGuardable`]        |
//! | **Heartbeats**    | Per-unit handle, or implicit via the association table.  | [`GuardContext`], [`association`]        |
//! | **Subscriber API**| Hook into guardian events (logging, metrics, paging).    | [`Subscribe`]                            |
//! | **Errors**        | Typed errors for the guardian and for unit hooks.        | [`GuardError`], [`UnitError`]            |
//! | **Configuration** | Centralize scheduling thresholds and unit defaults.      | [`GuardianConfig`]                       |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], which forwards events to `tracing`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use guardvisor::{Guardian, GuardianConfig, GuardState, TokenGuardable};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn guardvisor::Subscribe>> = vec![Arc::new(guardvisor::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn guardvisor::Subscribe>> = Vec::new();
//!
//!     let guardian = Guardian::builder(GuardianConfig::default())
//!         .with_subscribers(subs)
//!         .build()?;
//!
//!     // Must heartbeat every 100ms; gets another 100ms to recover.
//!     let unit = TokenGuardable::arc("worker");
//!     let ctx = guardian.guard_with(unit.clone(), Duration::from_millis(200), 0.5)?;
//!
//!     let stop = CancellationToken::new();
//!     let driver = guardian.spawn_driver(stop.clone());
//!
//!     for _ in 0..5 {
//!         tokio::time::sleep(Duration::from_millis(20)).await;
//!         ctx.heartbeat();
//!     }
//!     assert_eq!(ctx.state(), GuardState::Healthy);
//!
//!     stop.cancel();
//!     driver.await?;
//!     Ok(())
//! }
//! ```

pub mod association;
mod core;
mod error;
pub mod events;
pub mod subscribers;
mod units;

#[cfg(test)]
mod testing;

// ---- Public re-exports ----

pub use core::{
    ContextSnapshot, GuardContext, GuardState, GuardStats, Guardian, GuardianBuilder,
    GuardianConfig, Registry,
};
pub use error::{GuardError, UnitError};
pub use events::{Bus, Event, EventKind, Severity};
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
pub use subscribers::{Subscribe, SubscriberSet};
pub use units::{Guardable, GuardableRef, TokenGuardable};
