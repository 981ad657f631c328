//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out,
//! and the built-in [`LogWriter`] (feature `logging`).
//!
//! ## Architecture
//! ```text
//! Registry / hooks / driver ── publish(Event) ──► Bus ──► fan-out listener
//!                                                              │
//!                                                     SubscriberSet::emit(&Event)
//!                                                    ┌─────────┼─────────┐
//!                                                    ▼         ▼         ▼
//!                                               LogWriter   Pager     Custom ...
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
