//! The transport boundary (§1: "Concrete socket listeners... treated
//! as a `TransportServer`").
//!
//! Concrete TCP/WebSocket/TLS listeners are an external collaborator; this
//! module only defines the interface the core consumes and the events it
//! expects to receive. An embedding application implements
//! [`TransportServer`] and [`ClientChannel`] over whatever socket library it
//! prefers and feeds frames to a [`crate::session::SessionAdapter`].

// Layer 1: Standard library imports
// (none)

// Layer 2: Third-party crate imports
use async_trait::async_trait;

// Layer 3: Internal module imports
use crate::packet::Packet;
use crate::util::StageId;

/// One connected client session's inbound frame, already length-delimited
/// and parsed off the wire (§6, "Client wire framing").
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub msg_id: String,
    pub msg_seq: crate::util::MsgSeq,
    pub stage_id: StageId,
    pub payload: crate::packet::Payload,
}

/// A live connection's outbound handle, bound to a session adapter instance.
/// Implementations push frames onto whatever socket/write-queue backs the
/// connection; `send` must not block the caller.
pub trait ClientChannel: Send + Sync {
    fn send(&self, packet: Packet);
    fn close(&self);
    fn session_id(&self) -> &str;
}

/// The external collaborator that owns actual sockets. The core never
/// implements this trait; it only calls into it (to push responses) and
/// receives calls from it (inbound frames, disconnects) via
/// [`crate::session::SessionAdapter`].
#[async_trait]
pub trait TransportServer: Send + Sync {
    /// Push a response frame to a specific, still-connected session.
    /// Silently dropped if the session is gone (§B.6).
    async fn send_response(&self, session_id: &str, packet: Packet);

    /// Forcibly closes a session, e.g. after a pre-auth protocol violation
    /// (§4.9).
    async fn close_session(&self, session_id: &str);
}
