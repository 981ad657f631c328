//! # Detached execution of unit hooks.
//!
//! `recover()` and `terminate()` run on fire-and-forget tasks spawned on the
//! guardian's runtime, so a hung unit can never stall `check()`.
//!
//! ```text
//! check() ──► spawn_hook(unit, Recover) ──► runtime.spawn ──► unit.recover()
//!    │                                                            ├─ Ok        → (nothing)
//!    │ returns immediately                                        ├─ Err(e)    → HookFailed
//!    ▼                                                            └─ panic     → HookPanicked
//! ```
//!
//! ## Rules
//! - The join handle is dropped: hooks are never awaited nor cancelled.
//! - Errors and panics become events; nothing propagates to the caller.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::runtime::Handle;

use crate::events::{Bus, Event, EventKind};
use crate::units::GuardableRef;

/// Which hook to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Hook {
    Recover,
    Terminate,
}

impl Hook {
    fn as_label(self) -> &'static str {
        match self {
            Hook::Recover => "recover",
            Hook::Terminate => "terminate",
        }
    }
}

/// Runs `hook` of `unit` on a detached task.
pub(crate) fn spawn_hook(runtime: &Handle, bus: &Bus, unit: GuardableRef, name: Arc<str>, hook: Hook) {
    let bus = bus.clone();
    runtime.spawn(async move {
        let fut = async move {
            match hook {
                Hook::Recover => unit.recover().await,
                Hook::Terminate => unit.terminate().await,
            }
        };

        match AssertUnwindSafe(fut).catch_unwind().await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => bus.publish(
                Event::new(EventKind::HookFailed)
                    .with_unit(name)
                    .with_reason(format!("{}: {e}", hook.as_label())),
            ),
            Err(panic_err) => bus.publish(
                Event::new(EventKind::HookPanicked)
                    .with_unit(name)
                    .with_reason(format!("{}: {}", hook.as_label(), panic_message(&*panic_err))),
            ),
        }
    });
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(any: &(dyn Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
