//! The shared dependency bag every stage and sender is constructed with.
//!
//! §9 calls out "global singletons (logger, metrics, counters)"
//! as a source pattern to re-architect away from: "expose as explicit
//! dependencies threaded through construction; forbid hidden process-wide
//! state in the core." `RuntimeContext` is that explicit dependency bag,
//! built once by [`crate::runtime::Runtime`] and handed down to every stage.

// Layer 1: Standard library imports
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use dashmap::DashMap;

// Layer 3: Internal module imports
use crate::cluster::ClusterBus;
use crate::config::RuntimeConfig;
use crate::request_cache::RequestCache;
use crate::timer::TimerManager;
use crate::transport::TransportServer;
use crate::worker_pool::WorkerPool;

/// Everything a stage needs that isn't its own private state.
pub struct RuntimeContext {
    pub config: RuntimeConfig,
    pub request_cache: Arc<RequestCache>,
    pub timer_manager: Arc<TimerManager>,
    pub worker_pool: Arc<WorkerPool>,
    pub cluster_bus: Option<Arc<dyn ClusterBus>>,
    /// The transport collaborator, reused by `StageSender::send_to_client`
    /// (stage variant) to push to an arbitrary session by id.
    pub transport: Option<Arc<dyn TransportServer>>,
    /// Round-robin cursor per `(server_type, service_id)` service group,
    /// shared process-wide so repeated `send_to_service` calls actually
    /// cycle through peers instead of restarting at index 0 each time.
    pub(crate) selection_cursors: DashMap<(String, u16), AtomicUsize>,
}

impl RuntimeContext {
    pub fn new(config: RuntimeConfig, cluster_bus: Option<Arc<dyn ClusterBus>>) -> Arc<Self> {
        Self::with_transport(config, cluster_bus, None)
    }

    pub fn with_transport(
        config: RuntimeConfig,
        cluster_bus: Option<Arc<dyn ClusterBus>>,
        transport: Option<Arc<dyn TransportServer>>,
    ) -> Arc<Self> {
        let worker_pool = WorkerPool::new(config.max_task_pool_size, crate::worker_pool::DEFAULT_IO_POOL_SIZE);
        Arc::new(Self {
            config,
            request_cache: Arc::new(RequestCache::new()),
            timer_manager: TimerManager::new(),
            worker_pool,
            cluster_bus,
            transport,
            selection_cursors: DashMap::new(),
        })
    }
}
