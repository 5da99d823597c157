//! The per-stage inbox and drainer CAS (§4.4).
//!
//! A multi-producer, single-consumer FIFO backed by [`crossbeam_queue::SegQueue`]
//! (unbounded, lock-free `push`/`pop`), paired with an `AtomicBool` drain
//! flag. Enqueue never blocks; becoming the drainer is decided purely by a
//! single `compare_exchange`, matching the pseudocode in §4.4
//! exactly so the ordering invariants it proves hold here too.

// Layer 1: Standard library imports
use std::sync::atomic::{AtomicBool, Ordering};

// Layer 2: Third-party crate imports
use crossbeam_queue::SegQueue;

// Layer 3: Internal module imports
use crate::stage::message::StageMessage;

/// Lock-free MPSC queue plus the CAS flag that elects a single drainer.
pub struct Inbox {
    queue: SegQueue<StageMessage>,
    processing: AtomicBool,
}

impl Default for Inbox {
    fn default() -> Self {
        Self {
            queue: SegQueue::new(),
            processing: AtomicBool::new(false),
        }
    }
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues `msg` and reports whether the caller just became the
    /// drainer by winning the `false -> true` CAS. Losers rely on the
    /// current drainer to observe the new item (§4.4,
    /// "Drainer startup").
    pub fn push(&self, msg: StageMessage) -> bool {
        self.queue.push(msg);
        self.try_become_drainer()
    }

    pub fn try_become_drainer(&self) -> bool {
        self.processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn try_dequeue(&self) -> Option<StageMessage> {
        self.queue.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Releases the drainer role, then re-checks for the race window
    /// described in §4.4: a producer may have pushed after the
    /// last `try_dequeue` failed but before the flag was cleared. Returns
    /// `true` if the caller must keep draining.
    pub fn release_or_continue(&self) -> bool {
        self.processing.store(false, Ordering::Release);
        !self.queue.is_empty() && self.try_become_drainer()
    }
}
