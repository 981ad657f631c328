//! # Guardian: the public face of the supervision runtime.
//!
//! The [`Guardian`] owns the event bus, the [`Registry`] and a
//! [`SubscriberSet`], and drives periodic checks.
//!
//! ## Key responsibilities
//! - register units ([`guard`](Guardian::guard), [`guard_with`](Guardian::guard_with))
//!   and unregister them ([`unguard`](Guardian::unguard))
//! - run checks, either by hand or through [`spawn_driver`](Guardian::spawn_driver)
//! - subscribe to the [`Bus`] and **fan-out** events via [`SubscriberSet`]
//!
//! ## High-level architecture
//! ```text
//! GuardianBuilder::build()
//!   ├─► Bus::new(cfg.bus_capacity)
//!   ├─► SubscriberSet::new(subscribers)      one worker per subscriber
//!   ├─► Registry::new(cfg, bus, runtime)
//!   └─► subscriber_listener(): Bus.subscribe() ─► SubscriberSet::emit(&Event)
//!
//! spawn_driver(token):
//!   publish(DriverStarted)
//!   loop {
//!       registry.check()
//!       select! {
//!           token.cancelled()               → break
//!           sleep(next_check_in())          → continue   (≤ max_check_interval)
//!       }
//!   }
//!   registry.release()                      every unit detached
//!   publish(DriverStopped)
//! ```
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use guardvisor::{Guardian, GuardianConfig, TokenGuardable};
//! use guardvisor::subscribers::Subscribe;
//! #[cfg(feature = "logging")]
//! use guardvisor::subscribers::LogWriter;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut subs: Vec<Arc<dyn Subscribe>> = Vec::new();
//!     #[cfg(feature = "logging")]
//!     subs.push(Arc::new(LogWriter::new()));
//!
//!     let guardian = Guardian::builder(GuardianConfig::default())
//!         .with_subscribers(subs)
//!         .build()?;
//!
//!     let unit = TokenGuardable::arc("poller");
//!     guardian.guard_with(unit.clone(), Duration::from_secs(2), 0.5)?;
//!
//!     let stop = CancellationToken::new();
//!     let driver = guardian.spawn_driver(stop.clone());
//!
//!     let root = unit.root_token();
//!     while !root.is_cancelled() {
//!         tokio::time::sleep(Duration::from_millis(250)).await;
//!         unit.heartbeat();
//!     }
//!
//!     stop.cancel();
//!     driver.await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::builder::GuardianBuilder;
use super::config::GuardianConfig;
use super::context::GuardContext;
use super::registry::{ContextSnapshot, GuardStats, Registry};
use crate::error::GuardError;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::SubscriberSet;
use crate::units::{Guardable, GuardableRef};

/// Shortest pause between two driver iterations.
const MIN_DRIVER_WAIT: Duration = Duration::from_millis(1);

/// Supervises [`Guardable`] units and publishes what happens to them.
pub struct Guardian {
    cfg: GuardianConfig,
    bus: Bus,
    registry: Arc<Registry>,
    subs: Arc<SubscriberSet>,
    runtime: Handle,
    /// Stops the subscriber listener when the guardian is dropped.
    listener_token: CancellationToken,
}

impl Guardian {
    /// Starts building a guardian.
    pub fn builder(cfg: GuardianConfig) -> GuardianBuilder {
        GuardianBuilder::new(cfg)
    }

    pub(super) fn new_internal(
        cfg: GuardianConfig,
        bus: Bus,
        subs: Arc<SubscriberSet>,
        registry: Arc<Registry>,
        runtime: Handle,
    ) -> Self {
        Self {
            cfg,
            bus,
            registry,
            subs,
            runtime,
            listener_token: CancellationToken::new(),
        }
    }

    /// Guards `unit` with the configured default timeout and recovery fraction.
    ///
    /// # Errors
    /// See [`Registry::add`].
    pub fn guard(&self, unit: GuardableRef) -> Result<GuardContext, GuardError> {
        self.guard_with(
            unit,
            self.cfg.default_timeout,
            self.cfg.default_recover_fraction,
        )
    }

    /// Guards `unit`: it must heartbeat within `timeout·fraction`, and is
    /// terminated if it has not recovered within `timeout`.
    ///
    /// # Errors
    /// See [`Registry::add`].
    pub fn guard_with(
        &self,
        unit: GuardableRef,
        timeout: Duration,
        fraction: f32,
    ) -> Result<GuardContext, GuardError> {
        self.registry.add(&unit, timeout, fraction)
    }

    /// Stops guarding `unit`; no-op if it is not guarded.
    pub fn unguard(&self, unit: &dyn Guardable) {
        self.registry.remove(unit);
    }

    /// Runs one check; see [`Registry::check`].
    pub fn check(&self) -> Duration {
        self.registry.check()
    }

    /// Detaches every guarded unit.
    pub fn release(&self) {
        self.registry.release();
    }

    /// Number of guarded units.
    pub fn live_count(&self) -> usize {
        self.registry.live_count()
    }

    /// How long until the next check is due.
    pub fn next_check_in(&self) -> Duration {
        self.registry.next_check_in()
    }

    /// Snapshot of every guarded unit.
    pub fn snapshot(&self) -> Vec<ContextSnapshot> {
        self.registry.snapshot()
    }

    /// Rate-limited diagnostic dump; see [`Registry::dump_state`].
    pub fn dump_state(&self) -> Option<String> {
        self.registry.dump_state()
    }

    /// Recovery/termination counters.
    pub fn stats(&self) -> GuardStats {
        self.registry.stats()
    }

    /// Zeroes the recovery/termination counters.
    pub fn reset_stats(&self) {
        self.registry.reset_stats();
    }

    /// Raw receiver of every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// The underlying registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The configuration this guardian was built with.
    pub fn config(&self) -> &GuardianConfig {
        &self.cfg
    }

    /// Spawns the check loop on the guardian's runtime.
    ///
    /// The loop runs until `token` is cancelled, then releases every unit and
    /// publishes [`EventKind::DriverStopped`].
    pub fn spawn_driver(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let me = Arc::clone(self);
        self.runtime.spawn(async move {
            me.bus.publish(Event::new(EventKind::DriverStarted));
            loop {
                me.registry.check();
                let wait = me
                    .registry
                    .next_check_in()
                    .clamp(MIN_DRIVER_WAIT, me.cfg.max_check_interval);

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            me.registry.release();
            me.bus.publish(Event::new(EventKind::DriverStopped));
        })
    }

    /// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
    pub(super) fn subscriber_listener(&self) {
        if self.subs.is_empty() {
            return;
        }
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        let token = self.listener_token.clone();

        self.runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    msg = rx.recv() => match msg {
                        Ok(ev) => set.emit(&ev),
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        });
    }
}

impl Drop for Guardian {
    fn drop(&mut self) {
        self.listener_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::core::GuardState;
    use crate::subscribers::Subscribe;
    use crate::testing::{Recorder, settle};

    struct EventRecorder(parking_lot::Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for EventRecorder {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().push(ev.kind);
        }
        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    fn guardian() -> Arc<Guardian> {
        Guardian::builder(GuardianConfig::default()).build().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_uses_config_defaults() {
        let g = guardian();
        let recorder = Recorder::arc("defaults");
        let ctx = g.guard(recorder.clone()).unwrap();

        assert_eq!(ctx.timeout(), Duration::from_secs(60));
        assert_eq!(ctx.soft_timeout(), Duration::from_secs(48));
        assert_eq!(g.live_count(), 1);
        assert!(recorder.context().is_some());

        g.unguard(&*recorder);
        assert_eq!(g.live_count(), 0);
        assert!(recorder.context().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_rejects_bad_arguments() {
        let g = guardian();
        let recorder = Recorder::arc("bad");
        let err = g
            .guard_with(recorder.clone(), Duration::from_millis(100), 1.5)
            .unwrap_err();
        assert_eq!(err.as_label(), "guard_invalid_argument");
        assert_eq!(g.live_count(), 0);
        assert_eq!(recorder.associations(), 0);
    }

    #[test]
    fn test_build_without_runtime_fails() {
        let err = Guardian::builder(GuardianConfig::default())
            .build()
            .err()
            .unwrap();
        assert_eq!(err, GuardError::NoRuntime);
    }

    #[test]
    fn test_build_with_explicit_runtime() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let g = Guardian::builder(GuardianConfig::default())
            .with_runtime(rt.handle().clone())
            .build()
            .unwrap();
        assert_eq!(g.live_count(), 0);
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_config() {
        let mut cfg = GuardianConfig::default();
        cfg.late_threshold = Duration::from_secs(1);
        let err = Guardian::builder(cfg).build().err().unwrap();
        assert_eq!(err.as_label(), "guard_invalid_config");
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_recovers_and_terminates() {
        let g = guardian();
        let mut rx = g.subscribe();
        let recorder = Recorder::arc("stalled");
        let ctx = g
            .guard_with(recorder.clone(), Duration::from_millis(1000), 0.5)
            .unwrap();

        let stop = CancellationToken::new();
        let driver = g.spawn_driver(stop.clone());

        tokio::time::sleep(Duration::from_millis(600)).await;
        settle().await;
        assert_eq!(ctx.state(), GuardState::Recovering);
        assert_eq!(recorder.recoveries(), 1);

        tokio::time::sleep(Duration::from_millis(600)).await;
        settle().await;
        assert_eq!(recorder.terminations(), 1);
        assert_eq!(g.live_count(), 0);
        assert_eq!(g.stats(), GuardStats { recoveries: 1, terminations: 1 });

        stop.cancel();
        driver.await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind);
        }
        assert_eq!(kinds.first(), Some(&EventKind::UnitAdded));
        assert!(kinds.contains(&EventKind::DriverStarted));
        assert!(kinds.contains(&EventKind::SoftTimeout));
        assert!(kinds.contains(&EventKind::HardTimeout));
        assert_eq!(kinds.last(), Some(&EventKind::DriverStopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_keeps_heartbeating_unit_healthy() {
        let g = guardian();
        let recorder = Recorder::arc("steady");
        let ctx = g
            .guard_with(recorder.clone(), Duration::from_millis(1000), 0.5)
            .unwrap();
        let stop = CancellationToken::new();
        let driver = g.spawn_driver(stop.clone());

        for _ in 0..40 {
            tokio::time::sleep(Duration::from_millis(200)).await;
            ctx.heartbeat();
        }
        settle().await;
        assert_eq!(ctx.state(), GuardState::Healthy);
        assert_eq!(recorder.recoveries(), 0);

        stop.cancel();
        driver.await.unwrap();
        assert_eq!(g.live_count(), 0);
        assert!(recorder.context().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribers_receive_events() {
        let rec = Arc::new(EventRecorder(parking_lot::Mutex::new(Vec::new())));
        let g = Guardian::builder(GuardianConfig::default())
            .with_subscribers(vec![rec.clone()])
            .build()
            .unwrap();

        let recorder = Recorder::arc("observed");
        g.guard(recorder.clone()).unwrap();
        g.unguard(&*recorder);
        settle().await;

        let seen = rec.0.lock().clone();
        assert_eq!(seen, vec![EventKind::UnitAdded, EventKind::UnitRemoved]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_stats() {
        let g = guardian();
        let recorder = Recorder::arc("counted");
        g.guard_with(recorder.clone(), Duration::from_millis(100), 0.5)
            .unwrap();
        tokio::time::advance(Duration::from_millis(50)).await;
        g.check();
        assert_eq!(g.stats().recoveries, 1);

        g.reset_stats();
        assert_eq!(g.stats(), GuardStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dump_is_rate_limited() {
        let g = guardian();
        g.guard(Recorder::arc("dumped")).unwrap();

        let text = g.dump_state().unwrap();
        assert!(text.contains("dumped"));
        assert!(g.dump_state().is_none());

        tokio::time::advance(Duration::from_secs(3)).await;
        assert!(g.dump_state().is_some());
    }
}
