//! `StageMessage`, the tagged union dispatched by the drain loop
//! (§3, "StageMessage").

// Layer 1: Standard library imports
use std::fmt;
use std::sync::Arc;

// Layer 2: Third-party crate imports
use tokio::sync::oneshot;

// Layer 3: Internal module imports
use crate::packet::{Packet, RouteHeader};
use crate::timer::TimerId;
use crate::transport::ClientChannel;
use crate::util::PeerId;

/// An authenticated actor handed to a stage by the session adapter. Boxed
/// behind [`crate::stage::handler::ActorBehavior`] so the stage can hold
/// actors of heterogeneous concrete types behind one trait object.
pub type BoxedActor = Box<dyn crate::stage::handler::ActorBehavior>;

/// Completion result carried by an [`crate::worker_pool`] job.
pub type AsyncResult = Result<Box<dyn std::any::Any + Send>, Box<dyn std::error::Error + Send + Sync>>;

/// Callback invoked inside the stage loop once an async job's `pre` phase
/// completes (§4.8). Runs with full access to stage state.
pub type AsyncPostCallback = Box<dyn FnOnce(AsyncResult) + Send>;

/// Callback carried by a timer tick (§4.3).
pub type TimerCallback = Box<dyn FnOnce() + Send>;

/// One entry of the per-stage inbox (§3).
pub enum StageMessage {
    /// Server-to-server or system command, carrying its routing header.
    RouteMessage { packet: Packet, header: RouteHeader },
    /// A client frame already associated with this stage.
    ClientRouteMessage {
        account_id: String,
        packet: Packet,
        sid: String,
    },
    /// Deliver an authenticated actor into the stage. `session_ref` is the
    /// connection the actor should push to; on reconnection (an actor with
    /// the same `account_id` already present) it replaces the stale handle
    /// instead of being discarded (§3, "Actor lifecycle").
    JoinActorMessage {
        actor: BoxedActor,
        session_ref: Option<Arc<dyn ClientChannel>>,
        completion: Option<oneshot::Sender<Result<(), crate::error::StageError>>>,
    },
    /// Transport-level disconnect notification.
    DisconnectMessage { account_id: String },
    /// Explicit removal requested via `ActorSender::leave_stage`, or a
    /// grace-window expiry sweep. Unlike `DisconnectMessage`, this actually
    /// removes the actor from the stage.
    LeaveActorMessage { account_id: String },
    /// Timer tick.
    TimerMessage {
        timer_id: TimerId,
        callback: TimerCallback,
    },
    /// Off-loop job completion. `header` is a snapshot of the
    /// `current_header` in effect when `async_compute`/`async_io` was
    /// called, so `post` can still route a reply via
    /// `Sender::reply` even though no request is literally "current" at
    /// dispatch time (§4.8, §8 scenario S5).
    AsyncMessage {
        result: AsyncResult,
        post: Option<AsyncPostCallback>,
        header: Option<crate::packet::RouteHeader>,
    },
    /// Tear down. After this is processed, enqueue becomes a no-op.
    DestroyMessage,
}

impl fmt::Debug for StageMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageMessage::RouteMessage { packet, .. } => {
                f.debug_struct("RouteMessage").field("msg_id", &packet.msg_id).finish()
            }
            StageMessage::ClientRouteMessage { account_id, packet, .. } => f
                .debug_struct("ClientRouteMessage")
                .field("account_id", account_id)
                .field("msg_id", &packet.msg_id)
                .finish(),
            StageMessage::JoinActorMessage { .. } => f.debug_struct("JoinActorMessage").finish(),
            StageMessage::DisconnectMessage { account_id } => {
                f.debug_struct("DisconnectMessage").field("account_id", account_id).finish()
            }
            StageMessage::LeaveActorMessage { account_id } => {
                f.debug_struct("LeaveActorMessage").field("account_id", account_id).finish()
            }
            StageMessage::TimerMessage { timer_id, .. } => {
                f.debug_struct("TimerMessage").field("timer_id", timer_id).finish()
            }
            StageMessage::AsyncMessage { header, .. } => f.debug_struct("AsyncMessage").field("header", header).finish(),
            StageMessage::DestroyMessage => f.debug_struct("DestroyMessage").finish(),
        }
    }
}

/// Peer this packet arrived from, for reply routing via `current_header`.
/// `None` for messages with no associated request header.
///
/// `ClientRouteMessage` synthesizes a header with an empty `from` (client
/// origin, per §3's "from: empty for client-origin messages") so
/// that `ActorSender::reply` can route replies to in-flight client requests
/// the same way it routes replies to mesh requests.
pub fn header_of(msg: &StageMessage) -> Option<(PeerId, RouteHeader)> {
    match msg {
        StageMessage::RouteMessage { header, .. } => Some((header.from.clone(), header.clone())),
        StageMessage::ClientRouteMessage { account_id, packet, sid } => {
            let header = RouteHeader {
                msg_seq: packet.msg_seq,
                service_id: 0,
                msg_id: packet.msg_id.clone(),
                from: PeerId::new(),
                stage_id: packet.stage_id,
                account_id: account_id.clone(),
                sid: sid.clone(),
                is_reply: false,
            };
            Some((PeerId::new(), header))
        }
        StageMessage::AsyncMessage { header: Some(header), .. } => Some((header.from.clone(), header.clone())),
        _ => None,
    }
}

#[allow(dead_code)]
fn _assert_send(_: &StageMessage) {}
