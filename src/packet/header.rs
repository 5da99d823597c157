//! Server-to-server routing header (§6, "Sender routing header").

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use crate::util::{MsgSeq, PeerId, StageId};

/// Carries everything a reply needs to find its way back to the original
/// requester, and everything a forwarded request needs to find its target.
///
/// The exact on-the-mesh encoding is an external concern (§6); the
/// core only requires that these fields round-trip through a
/// [`crate::cluster::ClusterBus`] implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteHeader {
    pub msg_seq: MsgSeq,
    pub service_id: u16,
    pub msg_id: String,
    /// Origin peer id; empty for client-origin messages.
    pub from: PeerId,
    pub stage_id: StageId,
    pub account_id: String,
    /// Client-assigned logical sub-identifier (§B.2);
    /// opaque to the core.
    pub sid: String,
    pub is_reply: bool,
}

impl RouteHeader {
    pub fn is_request(&self) -> bool {
        !self.is_reply && self.msg_seq.is_request()
    }

    /// §4.6: "If packet is a reply (`is_reply && msg_seq > 0`)".
    pub fn is_correlated_reply(&self) -> bool {
        self.is_reply && self.msg_seq.is_request()
    }
}
