//! # Subscribe: the observer seam of a guardian.
//!
//! Anything that wants to react to timeouts, recoveries or hook failures
//! (paging, metrics, audit trails) implements [`Subscribe`] and is handed to
//! [`GuardianBuilder::with_subscribers`](crate::GuardianBuilder::with_subscribers).
//!
//! A subscriber runs on its own worker behind its own queue, so it can be as
//! slow as it likes without delaying `check()` or a heartbeat. When its queue
//! is full the event is dropped for it alone and `SubscriberOverflow` is
//! published.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use guardvisor::events::{Event, EventKind};
//! use guardvisor::subscribers::Subscribe;
//!
//! struct Pager;
//!
//! #[async_trait]
//! impl Subscribe for Pager {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::HardTimeout) {
//!             // page whoever owns ev.unit
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "pager" }
//!     fn queue_capacity(&self) -> usize { 64 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receives guardian events, one at a time, in publication order.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event. A panic here is reported as `SubscriberPanicked`
    /// and the worker moves on to the next event.
    async fn on_event(&self, event: &Event);

    /// Name carried by this subscriber's overflow and panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Events buffered before this subscriber starts dropping (at least 1).
    fn queue_capacity(&self) -> usize {
        1024
    }
}
