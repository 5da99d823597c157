//! Async Worker Pool (§4.8): off-loop execution of CPU/IO jobs.
//!
//! Two independently bounded pools, both built on
//! `tokio::task::spawn_blocking` gated by a semaphore: the **compute** pool
//! is capped near the CPU core count so it can't starve game-loop threads,
//! the **I/O** pool is capped much higher (§B.4: a fixed
//! constant, not user-configurable) since blocking I/O waits spend most of
//! their time parked rather than burning a core.
//!
//! This module only runs `pre`; wiring its result into an `AsyncMessage`
//! bound for a specific stage's inbox is [`crate::sender`]'s job; the pool
//! has no notion of stages.

// Layer 1: Standard library imports
use std::error::Error as StdError;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use tokio::sync::Semaphore;

// Layer 3: Internal module imports
use crate::stage::message::AsyncResult;

/// §B.4: the I/O pool's default bound is a fixed constant.
pub const DEFAULT_IO_POOL_SIZE: usize = 100;

/// Bounded compute/IO worker pools (§4.8).
pub struct WorkerPool {
    compute_permits: Arc<Semaphore>,
    io_permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(compute_pool_size: usize, io_pool_size: usize) -> Arc<Self> {
        Arc::new(Self {
            compute_permits: Arc::new(Semaphore::new(compute_pool_size.max(1))),
            io_permits: Arc::new(Semaphore::new(io_pool_size.max(1))),
        })
    }

    /// `compute_pool_size` defaults to the available parallelism; §4.8:
    /// "bounded at ≈ CPU-core count".
    pub fn with_defaults() -> Arc<Self> {
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        Self::new(cores, DEFAULT_IO_POOL_SIZE)
    }

    /// Runs `pre` on the compute pool. `pre` must not touch stage state
    /// (§4.8 point 4): it executes on a foreign thread.
    pub async fn run_compute<F, T>(&self, pre: F) -> AsyncResult
    where
        F: FnOnce() -> Result<T, Box<dyn StdError + Send + Sync>> + Send + 'static,
        T: Send + 'static,
    {
        run_on(&self.compute_permits, pre).await
    }

    /// Same contract as [`Self::run_compute`], routed through the I/O pool.
    pub async fn run_io<F, T>(&self, pre: F) -> AsyncResult
    where
        F: FnOnce() -> Result<T, Box<dyn StdError + Send + Sync>> + Send + 'static,
        T: Send + 'static,
    {
        run_on(&self.io_permits, pre).await
    }

    pub fn available_compute_permits(&self) -> usize {
        self.compute_permits.available_permits()
    }

    pub fn available_io_permits(&self) -> usize {
        self.io_permits.available_permits()
    }
}

async fn run_on<F, T>(permits: &Arc<Semaphore>, pre: F) -> AsyncResult
where
    F: FnOnce() -> Result<T, Box<dyn StdError + Send + Sync>> + Send + 'static,
    T: Send + 'static,
{
    let permit = permits
        .clone()
        .acquire_owned()
        .await
        .expect("worker pool semaphore never closes");
    let joined = tokio::task::spawn_blocking(move || {
        let result = pre();
        drop(permit);
        result
    })
    .await;

    match joined {
        Ok(Ok(value)) => Ok(Box::new(value)),
        Ok(Err(err)) => Err(err),
        Err(join_err) => Err(Box::new(join_err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_compute_delivers_boxed_value() {
        let pool = WorkerPool::new(2, 2);
        let result = pool.run_compute(|| Ok::<_, Box<dyn StdError + Send + Sync>>(42u32)).await;
        let value = result.unwrap();
        assert_eq!(*value.downcast::<u32>().unwrap(), 42);
    }

    #[tokio::test]
    async fn run_compute_propagates_pre_errors() {
        let pool = WorkerPool::new(2, 2);
        let result = pool
            .run_compute(|| -> Result<u32, Box<dyn StdError + Send + Sync>> {
                Err("boom".into())
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn compute_and_io_pools_are_independently_bounded() {
        let pool = WorkerPool::new(3, 7);
        assert_eq!(pool.available_compute_permits(), 3);
        assert_eq!(pool.available_io_permits(), 7);
    }
}
