//! Test doubles shared by the unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::GuardContext;
use crate::error::UnitError;
use crate::units::Guardable;

/// How a [`Recorder`] answers its hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Behavior {
    Ok,
    Fail,
    Panic,
}

/// Guardable that records every call made to it.
pub(crate) struct Recorder {
    name: String,
    behavior: Behavior,
    context: Mutex<Option<GuardContext>>,
    associations: AtomicUsize,
    recoveries: AtomicUsize,
    terminations: AtomicUsize,
}

impl Recorder {
    pub(crate) fn arc(name: &str) -> Arc<Self> {
        Self::with_behavior(name, Behavior::Ok)
    }

    pub(crate) fn with_behavior(name: &str, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            behavior,
            context: Mutex::new(None),
            associations: AtomicUsize::new(0),
            recoveries: AtomicUsize::new(0),
            terminations: AtomicUsize::new(0),
        })
    }

    pub(crate) fn context(&self) -> Option<GuardContext> {
        self.context.lock().clone()
    }

    /// Number of `set_context(Some(_))` calls.
    pub(crate) fn associations(&self) -> usize {
        self.associations.load(Ordering::SeqCst)
    }

    pub(crate) fn recoveries(&self) -> usize {
        self.recoveries.load(Ordering::SeqCst)
    }

    pub(crate) fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    fn answer(&self) -> Result<(), UnitError> {
        match self.behavior {
            Behavior::Ok => Ok(()),
            Behavior::Fail => Err(UnitError::Fail {
                error: "recorder refused".into(),
            }),
            Behavior::Panic => panic!("recorder panicked"),
        }
    }
}

#[async_trait]
impl Guardable for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_context(&self, context: Option<GuardContext>) {
        if context.is_some() {
            self.associations.fetch_add(1, Ordering::SeqCst);
        }
        *self.context.lock() = context;
    }

    async fn recover(&self) -> Result<(), UnitError> {
        self.recoveries.fetch_add(1, Ordering::SeqCst);
        self.answer()
    }

    async fn terminate(&self) -> Result<(), UnitError> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        self.answer()
    }
}

/// Lets detached hook tasks run to completion on a current-thread runtime.
pub(crate) async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}
