use std::sync::Arc;

use tokio::runtime::Handle;

use super::{config::GuardianConfig, guardian::Guardian, registry::Registry};
use crate::{
    error::GuardError,
    events::Bus,
    subscribers::{Subscribe, SubscriberSet},
};

/// Builder for constructing a [`Guardian`] with optional features.
pub struct GuardianBuilder {
    cfg: GuardianConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    runtime: Option<Handle>,
}

impl GuardianBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: GuardianConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            runtime: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive guardian events (timeouts, recoveries, hook
    /// failures, etc.) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Runs hooks, subscriber workers and the driver on `runtime` instead of
    /// the runtime current at [`build`](Self::build) time.
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Builds and returns the guardian.
    ///
    /// # Errors
    /// - [`GuardError::InvalidConfig`] if the configuration does not validate;
    /// - [`GuardError::NoRuntime`] if no runtime was given and none is current.
    pub fn build(self) -> Result<Arc<Guardian>, GuardError> {
        self.cfg.validate()?;
        let runtime = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| GuardError::NoRuntime)?,
        };

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone(), &runtime));
        let registry = Registry::new(&self.cfg, bus.clone(), runtime.clone())?;

        let guardian = Arc::new(Guardian::new_internal(self.cfg, bus, subs, registry, runtime));
        guardian.subscriber_listener();
        Ok(guardian)
    }
}
