//! [`Runtime`]: wires the context, dispatcher, and background sweeper
//! together and owns the shutdown sequence (§5).

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use tokio::task::JoinHandle;

// Layer 3: Internal module imports
use crate::cluster::ClusterBus;
use crate::config::RuntimeConfig;
use crate::context::RuntimeContext;
use crate::dispatcher::Dispatcher;
use crate::request_cache::{spawn_sweeper, DEFAULT_SWEEP_INTERVAL};
use crate::transport::TransportServer;

/// Default drain deadline used by [`Runtime::shutdown`] when an embedder
/// doesn't need a tighter bound.
pub const DEFAULT_DRAIN_DEADLINE: Duration = Duration::from_secs(5);

/// Top-level handle an embedding application constructs once at process
/// start (§2: "the whole runtime").
pub struct Runtime {
    ctx: Arc<RuntimeContext>,
    dispatcher: Arc<Dispatcher>,
    sweeper: JoinHandle<()>,
    accepting: Arc<AtomicBool>,
}

impl Runtime {
    /// Builds a runtime with no cluster bus and no transport collaborator
    /// wired in — suitable for a single-process embedding or for tests.
    pub fn new(config: RuntimeConfig) -> Self {
        Self::with_collaborators(config, None, None)
    }

    pub fn with_collaborators(
        config: RuntimeConfig,
        cluster_bus: Option<Arc<dyn ClusterBus>>,
        transport: Option<Arc<dyn TransportServer>>,
    ) -> Self {
        let ctx = RuntimeContext::with_transport(config, cluster_bus, transport);
        let dispatcher = Arc::new(Dispatcher::new(ctx.clone()));
        let sweeper = spawn_sweeper(ctx.request_cache.clone(), DEFAULT_SWEEP_INTERVAL);
        Self {
            ctx,
            dispatcher,
            sweeper,
            accepting: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn ctx(&self) -> &Arc<RuntimeContext> {
        &self.ctx
    }

    /// Whether new sessions should still be admitted. The embedding
    /// transport is expected to check this before constructing a fresh
    /// [`crate::session::SessionAdapter`] (§5, "stop accepting
    /// new transport").
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Runtime-wide shutdown, in the order §5 specifies: stop
    /// accepting new transport, drain existing inboxes with a deadline,
    /// cancel pending requests, stop timers, stop workers.
    ///
    /// Every live stage is told to destroy itself up front so the actual
    /// draining happens in parallel across stages rather than one at a
    /// time; `drain_deadline` bounds the total wait, not a per-stage budget.
    /// A stage that doesn't finish draining in time is logged and left to
    /// finish on its own detached drain task.
    ///
    /// Stopping timers falls out of destroying every stage:
    /// `DispatcherRegistry::destroy` already cancels every timer the stage
    /// owns. The worker pools have no explicit stop — their
    /// `spawn_blocking` tasks are independent of any stage's lifetime and
    /// simply finish or get abandoned with the tokio runtime.
    pub async fn shutdown(&self, drain_deadline: Duration) {
        self.accepting.store(false, Ordering::Release);

        let cells = self.dispatcher.registry().all_cells();
        for cell in &cells {
            self.dispatcher.destroy(cell.stage_id());
        }

        let deadline = tokio::time::Instant::now() + drain_deadline;
        for cell in &cells {
            while !cell.is_destroyed() && tokio::time::Instant::now() < deadline {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            if !cell.is_destroyed() {
                tracing::warn!(stage_id = cell.stage_id(), "stage did not finish draining before shutdown deadline");
            }
        }

        self.ctx.request_cache.cancel_all();
        self.sweeper.abort();
    }
}
