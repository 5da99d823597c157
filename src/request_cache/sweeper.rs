//! Background timeout sweeper (§4.2: "a single background
//! sweeper (coarse-grained; 50-100 ms tick)").

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
use tokio::task::JoinHandle;
use tokio::time::interval;

// Layer 3: Internal module imports
use crate::request_cache::cache::RequestCache;

/// Default sweep tick, the midpoint of §4.2's "50-100 ms" guidance.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(75);

/// Spawns the background task that periodically calls
/// [`RequestCache::sweep_expired`]. Stops when the returned handle is
/// aborted, typically during runtime shutdown.
pub fn spawn(cache: Arc<RequestCache>, tick: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(tick);
        loop {
            ticker.tick().await;
            let expired = cache.sweep_expired();
            if expired > 0 {
                tracing::debug!(expired, "request cache sweep reaped timed-out entries");
            }
        }
    })
}
