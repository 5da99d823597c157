//! Identifier newtypes used throughout the runtime.

// Layer 1: Standard library imports
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// Logical room identifier (§3: "signed 64-bit logical room
/// identifier").
pub type StageId = i64;

/// Process identity of a mesh peer, e.g. `"play-03"`.
pub type PeerId = String;

/// Sequence id used to correlate a request with its reply. `0` means
/// "not a request" (§3 invariant: `msg_seq == 0 ⇒ is_reply == false`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MsgSeq(pub u16);

impl MsgSeq {
    pub const NONE: MsgSeq = MsgSeq(0);

    pub fn is_request(self) -> bool {
        self.0 != 0
    }
}

impl Display for MsgSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process-global, monotonically increasing sequence generator that skips
/// zero (§3: "Sequence ids are a process-global monotonically
/// increasing counter that skips zero").
#[derive(Debug, Default)]
pub struct SeqGenerator {
    counter: AtomicU16,
}

impl SeqGenerator {
    pub fn new() -> Self {
        Self {
            counter: AtomicU16::new(0),
        }
    }

    /// Atomically increments the shared counter; if the wrap produces `0`,
    /// increments again (§4.2).
    pub fn next_seq(&self) -> MsgSeq {
        loop {
            let seq = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if seq != 0 {
                return MsgSeq(seq);
            }
        }
    }
}

/// Globally unique, monotonically increasing timer identifier
/// (§3: "timer_id is globally unique and monotonically increasing").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimerId(pub u64);

impl Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct TimerIdGenerator {
    counter: AtomicU64,
}

impl TimerIdGenerator {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
        }
    }

    pub fn next_id(&self) -> TimerId {
        TimerId(self.counter.fetch_add(1, Ordering::Relaxed) + 1)
    }
}
