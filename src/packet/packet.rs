//! The message envelope (§3, "Packet").

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use crate::error::ErrorCode;
use crate::packet::payload::Payload;
use crate::util::{MsgSeq, PeerId, StageId};

/// Opaque message envelope. The core never parses `payload`; it only routes
/// by `msg_id` (§9: "the core must not parse payloads").
///
/// Invariants upheld by the constructors below (§3): `msg_id` is
/// never empty, and `msg_seq == MsgSeq::NONE` implies `is_reply == false`.
#[derive(Debug, Clone)]
pub struct Packet {
    pub msg_id: String,
    pub msg_seq: MsgSeq,
    pub stage_id: StageId,
    /// Set by the authentication step; empty before authentication.
    pub account_id: String,
    pub error_code: ErrorCode,
    pub is_reply: bool,
    /// Origin peer id; empty for client-origin messages.
    pub from: PeerId,
    pub payload: Payload,
}

impl Packet {
    /// Builds a request/fire-and-forget packet. Panics in debug builds if
    /// `msg_id` is empty; this is a programmer error, not a runtime
    /// condition (§3 invariant).
    pub fn request(msg_id: impl Into<String>, stage_id: StageId, payload: Payload) -> Self {
        let msg_id = msg_id.into();
        debug_assert!(!msg_id.is_empty(), "msg_id must not be empty");
        Self {
            msg_id,
            msg_seq: MsgSeq::NONE,
            stage_id,
            account_id: String::new(),
            error_code: ErrorCode::Success,
            is_reply: false,
            from: PeerId::new(),
            payload,
        }
    }

    pub fn with_seq(mut self, seq: MsgSeq) -> Self {
        self.msg_seq = seq;
        self
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = account_id.into();
        self
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    /// Builds a reply to `self`, reusing its `msg_id`, `msg_seq`, `stage_id`,
    /// and swapping `from`/recipient roles implicitly (the transport layer
    /// decides the destination; the core only flips `is_reply`).
    pub fn reply_to(&self, error_code: ErrorCode, payload: Payload) -> Self {
        Self {
            msg_id: self.msg_id.clone(),
            msg_seq: self.msg_seq,
            stage_id: self.stage_id,
            account_id: self.account_id.clone(),
            error_code,
            is_reply: true,
            from: self.from.clone(),
            payload,
        }
    }

    pub fn is_request(&self) -> bool {
        !self.is_reply && self.msg_seq.is_request()
    }

    /// §4.6 routing decision: "If packet is a reply
    /// (`is_reply && msg_seq > 0`)".
    pub fn is_correlated_reply(&self) -> bool {
        self.is_reply && self.msg_seq.is_request()
    }

    /// §B.1: reserved system message ids are namespaced with
    /// a `$` prefix that user-chosen `msg_id`s may never use.
    pub fn is_system_message(&self) -> bool {
        self.msg_id.starts_with('$')
    }
}
