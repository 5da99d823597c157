//! Per-connection session state (§4.9).

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use crate::util::StageId;

/// `session_id`, `account_id`, `is_authenticated`, `current_stage_id` plus
/// the send channel handle §4.9 calls for. The channel itself
/// lives on [`crate::session::SessionAdapter`] (it's immutable for the
/// session's lifetime); this struct holds the fields that change across the
/// auth handshake.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub account_id: Option<String>,
    pub is_authenticated: bool,
    pub current_stage_id: Option<StageId>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }
}
