//! `ActorCell`: runtime bookkeeping the stage loop wraps around a
//! user-provided [`ActorBehavior`] (§3, "Actor").

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use crate::stage::handler::ActorBehavior;
use crate::transport::ClientChannel;

/// Wraps a user actor with the fields the runtime itself needs: the
/// transport handle for direct client push, and a dispose hook
/// (§3, "Actor").
///
/// Only ever touched from inside the owning stage's drain loop
/// (§5, "Shared-resource policy"), so no internal locking.
pub struct ActorCell {
    pub behavior: Box<dyn ActorBehavior>,
    /// `None` for server-side actors reached only via mesh routing.
    pub session_ref: Option<Arc<dyn ClientChannel>>,
}

impl ActorCell {
    pub fn new(behavior: Box<dyn ActorBehavior>, session_ref: Option<Arc<dyn ClientChannel>>) -> Self {
        Self { behavior, session_ref }
    }

    pub fn account_id(&self) -> &str {
        self.behavior.account_id()
    }

    /// Rebinds the session handle on reconnection; only ever called from
    /// inside the stage loop (§3, "Actor").
    pub fn rebind_session(&mut self, session_ref: Arc<dyn ClientChannel>) {
        self.session_ref = Some(session_ref);
    }

    pub fn push_to_client(&self, packet: crate::packet::Packet) {
        match &self.session_ref {
            Some(channel) => channel.send(packet),
            None => {
                tracing::debug!(account_id = %self.account_id(), "send_to_client dropped: no session bound");
            }
        }
    }
}
