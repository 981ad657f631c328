//! # Association table: implicit heartbeats from nested code.
//!
//! Library code deep inside a supervised unit rarely has the unit's
//! [`GuardContext`] at hand. The association table maps the *execution unit*
//! running that code to its context, so the code can call
//! [`association::heartbeat()`](heartbeat) and have it land on the right unit.
//!
//! ## Execution units
//! ```text
//! ExecutionUnit::Thread(id)  an OS thread;         bound by set_current / enter
//! ExecutionUnit::Task(n)     an async scope;       bound by scope(ctx, fut)
//! ```
//! Inside [`scope`] the task key wins, so the association follows the future
//! across worker threads of a multi-threaded runtime.
//!
//! ## Rules
//! - The table holds clones of contexts, never units; it owns nothing.
//! - A scope's entry is removed when its future completes or is dropped.
//! - A thread's entry is removed by `set_current(None)`, when its
//!   [`AssociationGuard`] drops, or when the thread exits.
//! - All helpers are no-ops without an association.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use std::time::Duration;

use parking_lot::RwLock;

use crate::core::{Clock, DumpThrottle, GuardContext};
use crate::error::GuardError;

/// Minimum spacing between two [`dump_state`] dumps.
pub const DUMP_INTERVAL: Duration = Duration::from_millis(3000);

static TABLE: LazyLock<RwLock<HashMap<ExecutionUnit, GuardContext>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

static NEXT_SCOPE: AtomicU64 = AtomicU64::new(1);

static DUMP: LazyLock<DumpThrottle> = LazyLock::new(|| DumpThrottle::new(DUMP_INTERVAL));

static DUMP_CLOCK: LazyLock<Clock> = LazyLock::new(Clock::new);

tokio::task_local! {
    static SCOPE: u64;
}

/// Removes the calling thread's association when the thread exits.
struct ThreadExit(ThreadId);

impl Drop for ThreadExit {
    fn drop(&mut self) {
        TABLE.write().remove(&ExecutionUnit::Thread(self.0));
    }
}

thread_local! {
    static THREAD_EXIT: ThreadExit = ThreadExit(thread::current().id());
}

/// Identity of whatever is executing the calling code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionUnit {
    /// An OS thread.
    Thread(ThreadId),
    /// An async scope opened with [`scope`].
    Task(u64),
}

impl ExecutionUnit {
    /// The execution unit running the caller.
    pub fn current() -> Self {
        SCOPE
            .try_with(|id| ExecutionUnit::Task(*id))
            .unwrap_or_else(|_| ExecutionUnit::Thread(thread::current().id()))
    }
}

impl fmt::Display for ExecutionUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionUnit::Thread(id) => write!(f, "thread {id:?}"),
            ExecutionUnit::Task(n) => write!(f, "task #{n}"),
        }
    }
}

/// The context associated with the calling execution unit.
pub fn current() -> Option<GuardContext> {
    TABLE.read().get(&ExecutionUnit::current()).cloned()
}

/// Associates `context` with the calling execution unit (or clears it with
/// `None`), returning the previous association.
pub fn set_current(context: Option<GuardContext>) -> Option<GuardContext> {
    let unit = ExecutionUnit::current();
    if matches!(unit, ExecutionUnit::Thread(_)) && context.is_some() {
        THREAD_EXIT.with(|_| {});
    }
    let mut table = TABLE.write();
    match context {
        Some(ctx) => table.insert(unit, ctx),
        None => table.remove(&unit),
    }
}

/// Associates `context` with the calling execution unit until the returned
/// guard drops; the previous association is then restored.
///
/// # Example
/// ```no_run
/// # fn work(ctx: guardvisor::GuardContext) {
/// use guardvisor::association;
///
/// let _bound = association::enter(ctx);
/// for _item in 0..1_000 {
///     // ... process ...
///     association::reset();
/// }
/// # }
/// ```
#[must_use = "the association ends when the guard is dropped"]
pub fn enter(context: GuardContext) -> AssociationGuard {
    let unit = ExecutionUnit::current();
    let previous = set_current(Some(context));
    AssociationGuard { unit, previous }
}

/// Restores the previous association of an execution unit on drop.
pub struct AssociationGuard {
    unit: ExecutionUnit,
    previous: Option<GuardContext>,
}

impl Drop for AssociationGuard {
    fn drop(&mut self) {
        let mut table = TABLE.write();
        match self.previous.take() {
            Some(ctx) => {
                table.insert(self.unit, ctx);
            }
            None => {
                table.remove(&self.unit);
            }
        }
    }
}

/// Runs `fut` as its own execution unit associated with `context`.
///
/// The association lives exactly as long as the future: it is removed when
/// the future completes or is dropped before completion.
///
/// # Example
/// ```no_run
/// # async fn run(ctx: guardvisor::GuardContext) {
/// use guardvisor::association;
///
/// association::scope(ctx, async {
///     loop {
///         // ... one item of work ...
///         association::heartbeat();
///         tokio::task::yield_now().await;
///     }
/// })
/// .await
/// # }
/// ```
pub async fn scope<F>(context: GuardContext, fut: F) -> F::Output
where
    F: Future,
{
    let id = NEXT_SCOPE.fetch_add(1, Ordering::Relaxed);
    let unit = ExecutionUnit::Task(id);
    TABLE.write().insert(unit, context);
    let _cleanup = ScopeCleanup(unit);
    SCOPE.scope(id, fut).await
}

struct ScopeCleanup(ExecutionUnit);

impl Drop for ScopeCleanup {
    fn drop(&mut self) {
        TABLE.write().remove(&self.0);
    }
}

/// Heartbeats the current association; no-op without one.
pub fn heartbeat() {
    if let Some(ctx) = current() {
        ctx.heartbeat();
    }
}

/// Custom heartbeat on the current association; no-op without one.
///
/// # Errors
/// [`GuardError::InvalidArgument`] if there is an association and `timeout`
/// is shorter than one millisecond.
pub fn heartbeat_for(timeout: Duration) -> Result<(), GuardError> {
    match current() {
        Some(ctx) => ctx.heartbeat_for(timeout),
        None => Ok(()),
    }
}

/// [`GuardContext::reset`] on the current association; `false` without one.
pub fn reset() -> bool {
    current().is_some_and(|ctx| ctx.reset())
}

/// Number of live associations across the process.
pub fn len() -> usize {
    TABLE.read().len()
}

/// Dumps every association and its supervision state, at most once per
/// [`DUMP_INTERVAL`] process-wide.
///
/// Meant to be called when a stall is detected; during cascading failures
/// most calls return `None` without doing any work.
pub fn dump_state() -> Option<String> {
    if !DUMP.try_acquire(DUMP_CLOCK.now()) {
        return None;
    }

    let mut entries: Vec<(ExecutionUnit, GuardContext)> = TABLE
        .read()
        .iter()
        .map(|(unit, ctx)| (*unit, ctx.clone()))
        .collect();
    entries.sort_by_key(|(unit, _)| unit.to_string());

    let mut text = format!("associations: {}", entries.len());
    for (unit, ctx) in &entries {
        text.push_str(&format!("\n  {unit} -> {ctx:?}"));
    }

    #[cfg(feature = "logging")]
    tracing::error!(target: "guardvisor::association", "{text}");

    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio::runtime::Handle;

    use crate::core::{GuardianConfig, Registry};
    use crate::events::Bus;
    use crate::testing::Recorder;
    use crate::units::GuardableRef;

    fn guarded(name: &str) -> (Arc<Registry>, GuardableRef, GuardContext) {
        let reg = Registry::new(&GuardianConfig::default(), Bus::new(16), Handle::current()).unwrap();
        let unit: GuardableRef = Recorder::arc(name);
        let ctx = reg
            .add(&unit, Duration::from_millis(1000), 0.5)
            .unwrap();
        (reg, unit, ctx)
    }

    #[test]
    fn test_helpers_are_noops_without_association() {
        std::thread::spawn(|| {
            assert!(current().is_none());
            heartbeat();
            assert!(heartbeat_for(Duration::ZERO).is_ok());
            assert!(!reset());
        })
        .join()
        .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_current_routes_heartbeats() {
        let (_reg, _unit, ctx) = guarded("bound");
        assert!(set_current(Some(ctx.clone())).is_none());
        assert!(current().unwrap().ptr_eq(&ctx));

        let before = ctx.soft_deadline();
        tokio::time::advance(Duration::from_millis(300)).await;
        heartbeat();
        assert_eq!(ctx.soft_deadline(), before + 300);

        heartbeat_for(Duration::from_millis(4000)).unwrap();
        assert_eq!(ctx.timeout(), Duration::from_millis(4000));
        assert!(heartbeat_for(Duration::ZERO).is_err());

        assert!(set_current(None).unwrap().ptr_eq(&ctx));
        assert!(current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enter_restores_previous() {
        let (_reg, _a, outer) = guarded("outer");
        let (_reg2, _b, inner) = guarded("inner");

        let _outer_guard = enter(outer.clone());
        {
            let _inner_guard = enter(inner.clone());
            assert!(current().unwrap().ptr_eq(&inner));
        }
        assert!(current().unwrap().ptr_eq(&outer));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scope_binds_for_future_lifetime() {
        let (_reg, _unit, ctx) = guarded("scoped");

        let seen = scope(ctx.clone(), async {
            let unit = ExecutionUnit::current();
            tokio::task::yield_now().await;
            (unit, current())
        })
        .await;

        assert!(matches!(seen.0, ExecutionUnit::Task(_)));
        assert!(seen.1.unwrap().ptr_eq(&ctx));
        assert!(!TABLE.read().contains_key(&seen.0));
        assert!(current().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_scope_cleans_up() {
        let (_reg, _unit, ctx) = guarded("abandoned");
        let (tx, rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(scope(ctx, async move {
            let _ = tx.send(ExecutionUnit::current());
            std::future::pending::<()>().await;
        }));
        let unit = rx.await.unwrap();
        assert!(TABLE.read().contains_key(&unit));

        handle.abort();
        let _ = handle.await;
        assert!(!TABLE.read().contains_key(&unit));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_through_association() {
        let (_reg, _unit, ctx) = guarded("looping");
        let _bound = enter(ctx.clone());

        assert!(!reset());
        tokio::time::advance(Duration::from_millis(260)).await;
        ctx.interrupt();
        assert!(reset());
        assert!(!ctx.is_interrupted());
    }

    #[test]
    fn test_thread_exit_clears_association() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let (reg, unit, ctx) = rt.block_on(async { guarded("threaded") });

        let id = std::thread::spawn(move || {
            set_current(Some(ctx));
            thread::current().id()
        })
        .join()
        .unwrap();

        assert!(!TABLE.read().contains_key(&ExecutionUnit::Thread(id)));
        drop((reg, unit));
    }

    #[test]
    fn test_dump_lists_associations() {
        // other tests may have consumed the process-wide budget
        if let Some(text) = dump_state() {
            assert!(text.starts_with("associations:"));
            assert!(dump_state().is_none());
        }
    }
}
