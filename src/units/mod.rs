//! # Supervised units.
//!
//! This module provides the capability a unit implements to be guarded:
//! - [`Guardable`] - trait with the association setter and the recover/terminate hooks
//! - [`GuardableRef`] - shared reference to a unit (`Arc<dyn Guardable>`)
//! - [`TokenGuardable`] - ready-made unit driven by a [`CancellationToken`](tokio_util::sync::CancellationToken)

mod guardable;
mod token;

pub use guardable::{Guardable, GuardableRef};
pub use token::TokenGuardable;
