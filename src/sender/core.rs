//! Shared plumbing behind both [`crate::sender::StageSender`] and
//! [`crate::sender::ActorSender`]: routing an off-loop job's result back into
//! a stage's inbox, and adapting a `StageCell` into the `Weak<dyn StageInbox>`
//! the timer manager addresses.

// Layer 1: Standard library imports
use std::error::Error as StdError;
use std::sync::{Arc, Weak};

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use crate::stage::cell::StageCell;
use crate::stage::message::{AsyncResult, StageMessage};
use crate::timer::StageInbox;
use crate::worker_pool::WorkerPool;

pub(crate) fn timer_stage_inbox(stage: &Arc<StageCell>) -> Weak<dyn StageInbox> {
    Arc::downgrade(stage) as Weak<dyn StageInbox>
}

/// Runs `pre` on the given pool, then enqueues the result as an
/// `AsyncMessage` so `post` runs inside the owning stage's drain loop
/// (§4.8 point 4: "the post-processing callback... executes inside
/// the stage's event loop").
///
/// Snapshots `stage.current_header()` at call time (while the triggering
/// request is still current) and carries it along on the `AsyncMessage`, so
/// `post` can call `Sender::reply` just like any other request-bearing
/// handler even though no request is literally "current" by the time the
/// off-loop `pre` phase finishes (§8 scenario S5).
pub(crate) fn async_job<F, T, P>(stage: Arc<StageCell>, pool: Arc<WorkerPool>, compute: bool, pre: F, post: Option<P>)
where
    F: FnOnce() -> Result<T, Box<dyn StdError + Send + Sync>> + Send + 'static,
    T: Send + 'static,
    P: FnOnce(AsyncResult) + Send + 'static,
{
    let header = stage.current_header();
    tokio::spawn(async move {
        let result: AsyncResult = if compute { pool.run_compute(pre).await } else { pool.run_io(pre).await };
        stage.enqueue(StageMessage::AsyncMessage {
            result,
            post: post.map(|p| Box::new(p) as Box<dyn FnOnce(AsyncResult) + Send>),
            header,
        });
    });
}
