//! Guardian events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the registry, the hook tasks,
//! the periodic driver and the subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`], [`Severity`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Registry` (add/remove/check), hook tasks (failures/panics),
//!   `Guardian` driver and dumps, `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the guardian's fan-out listener (feeds `SubscriberSet`) and
//!   any receiver obtained from `Guardian::subscribe`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind, Severity};
