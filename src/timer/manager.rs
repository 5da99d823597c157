//! Global timer scheduler (§4.3, "Timer Manager").
//!
//! Timers never invoke their callback directly off their own tick thread.
//! Instead each tick is wrapped into a `TimerMessage` and handed to the
//! owning stage's inbox, so the callback still runs under that stage's
//! single-consumer guarantee. If the stage is gone by the time a tick
//! fires, the tick is dropped and the timer cancelled (§4.3).

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::sleep;

// Layer 3: Internal module imports
use crate::stage::message::TimerCallback;
use crate::util::{StageId, TimerId, TimerIdGenerator};

/// Anything that can accept a timer tick for dispatch
/// (implemented by [`crate::stage::cell::StageCell`]).
///
/// `enqueue_timer` takes `self: Arc<Self>` rather than `&self` because the
/// manager only ever holds a `Weak<dyn StageInbox>`; upgrading it hands back
/// an owned `Arc`, and forwarding the tick requires the stage's own
/// enqueue path, which itself needs an `Arc` to spawn its drain task.
pub trait StageInbox: Send + Sync {
    fn enqueue_timer(self: Arc<Self>, timer_id: TimerId, callback: TimerCallback);
    fn stage_id(&self) -> StageId;
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Repeat,
    Count,
}

struct TimerEntry {
    stage: Weak<dyn StageInbox>,
    stage_id: StageId,
    kind: TimerKind,
    remaining: AtomicU32,
    cancelled: std::sync::atomic::AtomicBool,
    task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

/// Owns every outstanding repeating/counted timer in the process.
///
/// §4.3: "Precision: milliseconds... warn users against
/// sub-10 ms periods." This implementation is built on `tokio::time::sleep`,
/// which inherits the runtime's timer-wheel resolution (~1 ms typical).
#[derive(Default)]
pub struct TimerManager {
    entries: DashMap<TimerId, Arc<TimerEntry>>,
    ids: TimerIdGenerator,
}

impl TimerManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Fires at `t = initial_delay`, then every `period` until cancelled.
    pub fn add_repeat<F>(
        self: &Arc<Self>,
        stage: Weak<dyn StageInbox>,
        stage_id: StageId,
        initial_delay: Duration,
        period: Duration,
        mut make_callback: F,
    ) -> TimerId
    where
        F: FnMut() -> TimerCallback + Send + 'static,
    {
        let timer_id = self.ids.next_id();
        let entry = Arc::new(TimerEntry {
            stage,
            stage_id,
            kind: TimerKind::Repeat,
            remaining: AtomicU32::new(0),
            cancelled: std::sync::atomic::AtomicBool::new(false),
            task: parking_lot::Mutex::new(None),
        });
        self.entries.insert(timer_id, entry.clone());

        let manager = self.clone();
        let task = tokio::spawn(async move {
            sleep(initial_delay).await;
            loop {
                if entry.cancelled.load(Ordering::Acquire) {
                    return;
                }
                match entry.stage.upgrade() {
                    Some(stage) => stage.enqueue_timer(timer_id, make_callback()),
                    None => {
                        manager.entries.remove(&timer_id);
                        return;
                    }
                }
                sleep(period).await;
            }
        });
        if let Some(handle) = self.entries.get(&timer_id) {
            *handle.task.lock() = Some(task);
        }
        timer_id
    }

    /// Fires up to `count` times, then self-cancels.
    pub fn add_count<F>(
        self: &Arc<Self>,
        stage: Weak<dyn StageInbox>,
        stage_id: StageId,
        initial_delay: Duration,
        period: Duration,
        count: u32,
        mut make_callback: F,
    ) -> TimerId
    where
        F: FnMut() -> TimerCallback + Send + 'static,
    {
        let timer_id = self.ids.next_id();
        let entry = Arc::new(TimerEntry {
            stage,
            stage_id,
            kind: TimerKind::Count,
            remaining: AtomicU32::new(count),
            cancelled: std::sync::atomic::AtomicBool::new(false),
            task: parking_lot::Mutex::new(None),
        });
        self.entries.insert(timer_id, entry.clone());

        let manager = self.clone();
        let task = tokio::spawn(async move {
            sleep(initial_delay).await;
            loop {
                if entry.cancelled.load(Ordering::Acquire) {
                    return;
                }
                if entry.remaining.load(Ordering::Acquire) == 0 {
                    manager.entries.remove(&timer_id);
                    return;
                }
                match entry.stage.upgrade() {
                    Some(stage) => stage.enqueue_timer(timer_id, make_callback()),
                    None => {
                        manager.entries.remove(&timer_id);
                        return;
                    }
                }
                let prev = entry.remaining.fetch_sub(1, Ordering::AcqRel);
                if prev == 1 {
                    manager.entries.remove(&timer_id);
                    return;
                }
                sleep(period).await;
            }
        });
        if let Some(handle) = self.entries.get(&timer_id) {
            *handle.task.lock() = Some(task);
        }
        timer_id
    }

    pub fn cancel(&self, timer_id: TimerId) {
        if let Some((_, entry)) = self.entries.remove(&timer_id) {
            entry.cancelled.store(true, Ordering::Release);
            if let Some(task) = entry.task.lock().take() {
                task.abort();
            }
        }
    }

    pub fn cancel_all_for(&self, stage_id: StageId) {
        let ids: Vec<TimerId> = self
            .entries
            .iter()
            .filter(|e| e.stage_id == stage_id)
            .map(|e| *e.key())
            .collect();
        for id in ids {
            self.cancel(id);
        }
    }

    pub fn has_timer(&self, timer_id: TimerId) -> bool {
        self.entries.contains_key(&timer_id)
    }

    pub fn active_count(&self) -> usize {
        self.entries.len()
    }

    #[allow(dead_code)]
    fn kind_of(&self, timer_id: TimerId) -> Option<()> {
        self.entries.get(&timer_id).map(|_| ())
    }
}
