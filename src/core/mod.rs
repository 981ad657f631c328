//! Runtime core: supervision state and scheduling.
//!
//! Internal modules:
//! - [`registry`]: owns the contexts, runs `check()` and schedules the next one;
//! - [`context`]: per-unit state machine and heartbeats;
//! - [`guardian`]: public facade, subscriber fan-out and the check driver;
//! - [`hooks`]: detached execution of `recover()` / `terminate()`;
//! - [`clock`]: monotonic millisecond clock;
//! - [`dump`]: rate limiting for diagnostic dumps.

mod builder;
mod clock;
mod config;
mod context;
mod dump;
mod guardian;
mod hooks;
mod registry;

pub use builder::GuardianBuilder;
pub use config::GuardianConfig;
pub use context::{GuardContext, GuardState};
pub use guardian::Guardian;
pub use registry::{ContextSnapshot, GuardStats, Registry};

pub(crate) use clock::Clock;
pub(crate) use dump::DumpThrottle;
pub(crate) use hooks::panic_message;
