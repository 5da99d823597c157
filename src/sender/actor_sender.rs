//! [`ActorSender`]: the sender bound to one actor inside its stage
//! (§4.7). Handed to `on_dispatch`, `on_join_stage`,
//! `on_post_join_stage`, and `on_connection_changed`.

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use crate::cluster::RoutePacket;
use crate::config::PolicyKind;
use crate::error::{DispatchError, ErrorCode};
use crate::packet::{Packet, Payload};
use crate::request_cache::ReplyFuture;
use crate::sender::stage_sender::StageSender;
use crate::stage::cell::StageCell;
use crate::stage::message::{AsyncResult, StageMessage};
use crate::transport::ClientChannel;
use crate::util::{PeerId, StageId, TimerId};

/// Outbound API bound to one authenticated actor (§4.7).
/// Every stage-wide operation `StageSender` exposes is also available here,
/// delegated to an owned `StageSender` so there's exactly one implementation
/// of each routing call.
#[derive(Clone)]
pub struct ActorSender {
    stage_sender: StageSender,
    account_id: String,
    /// The channel bound to this actor's session at the time this sender was
    /// constructed; `None` for a server-side actor with no live connection.
    channel: Option<Arc<dyn ClientChannel>>,
}

impl ActorSender {
    pub fn new(stage: Arc<StageCell>, account_id: String, channel: Option<Arc<dyn ClientChannel>>) -> Self {
        Self { stage_sender: StageSender::new(stage), account_id, channel }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn stage_id(&self) -> StageId {
        self.stage_sender.stage_id()
    }

    pub fn stage_type_name(&self) -> &str {
        self.stage_sender.stage_type_name()
    }

    /// Pushes directly to this actor's own bound session, bypassing the
    /// mesh entirely (§4.7: actor-bound `send_to_client`).
    /// Silently dropped if no session is currently bound (reconnect window
    /// or a server-side actor).
    pub fn send_to_client(&self, packet: Packet) {
        match &self.channel {
            Some(channel) => channel.send(packet),
            None => tracing::debug!(account_id = %self.account_id, "send_to_client dropped: no session bound"),
        }
    }

    /// Replies to the current request. If it originated from this actor's
    /// own client connection (§3: "from: empty for client-origin
    /// messages"), the reply is pushed straight down the bound channel
    /// instead of round-tripping through the cluster bus.
    pub fn reply(&self, error_code: ErrorCode, payload: Payload) {
        let Some(header) = self.stage_sender.stage.current_header() else {
            tracing::debug!(account_id = %self.account_id, "reply() called with no current request");
            return;
        };
        if !header.is_request() {
            return;
        }
        if header.from.is_empty() {
            let mut packet = Packet::request(header.msg_id.clone(), header.stage_id, payload)
                .with_account_id(self.account_id.clone())
                .with_seq(header.msg_seq);
            packet.error_code = error_code;
            packet.is_reply = true;
            self.send_to_client(packet);
            return;
        }
        self.stage_sender.reply(error_code, payload);
    }

    /// Explicit departure: enqueues a `LeaveActorMessage` so `on_destroy`
    /// runs and the actor is removed from the stage (§3, "Actor
    /// lifecycle": "Destroyed when the user calls leave_stage").
    pub fn leave_stage(&self) {
        self.stage_sender.stage.enqueue(StageMessage::LeaveActorMessage { account_id: self.account_id.clone() });
    }

    pub fn send_to_stage(&self, peer_id: &PeerId, stage_id: StageId, packet: Packet) {
        self.stage_sender.send_to_stage(peer_id, stage_id, packet);
    }

    pub fn request_to_stage_cb<F>(&self, peer_id: &PeerId, stage_id: StageId, packet: Packet, callback: F)
    where
        F: FnOnce(Result<Packet, ErrorCode>) + Send + 'static,
    {
        self.stage_sender.request_to_stage_cb(peer_id, stage_id, packet, callback);
    }

    pub fn request_to_stage(&self, peer_id: &PeerId, stage_id: StageId, packet: Packet) -> ReplyFuture {
        self.stage_sender.request_to_stage(peer_id, stage_id, packet)
    }

    pub fn send_to_api(&self, peer_id: &PeerId, packet: Packet) {
        self.stage_sender.send_to_api(peer_id, packet);
    }

    pub fn request_to_api_cb<F>(&self, peer_id: &PeerId, packet: Packet, callback: F)
    where
        F: FnOnce(Result<Packet, ErrorCode>) + Send + 'static,
    {
        self.stage_sender.request_to_api_cb(peer_id, packet, callback);
    }

    pub fn request_to_api(&self, peer_id: &PeerId, packet: Packet) -> ReplyFuture {
        self.stage_sender.request_to_api(peer_id, packet)
    }

    pub fn send_to_service(&self, server_type: &str, service_id: u16, packet: Packet, policy: Option<PolicyKind>) -> Result<(), DispatchError> {
        self.stage_sender.send_to_service(server_type, service_id, packet, policy)
    }

    pub fn request_to_service_cb<F>(
        &self,
        server_type: &str,
        service_id: u16,
        packet: Packet,
        policy: Option<PolicyKind>,
        callback: F,
    ) -> Result<(), DispatchError>
    where
        F: FnOnce(Result<Packet, ErrorCode>) + Send + 'static,
    {
        self.stage_sender.request_to_service_cb(server_type, service_id, packet, policy, callback)
    }

    pub fn request_to_service(&self, server_type: &str, service_id: u16, packet: Packet, policy: Option<PolicyKind>) -> Result<ReplyFuture, DispatchError> {
        self.stage_sender.request_to_service(server_type, service_id, packet, policy)
    }

    pub fn send_to_system(&self, peer_id: &PeerId, packet: Packet) {
        self.stage_sender.send_to_system(peer_id, packet);
    }

    pub fn request_to_system_cb<F>(&self, peer_id: &PeerId, packet: Packet, callback: F)
    where
        F: FnOnce(Result<Packet, ErrorCode>) + Send + 'static,
    {
        self.stage_sender.request_to_system_cb(peer_id, packet, callback);
    }

    pub fn request_to_system(&self, peer_id: &PeerId, packet: Packet) -> ReplyFuture {
        self.stage_sender.request_to_system(peer_id, packet)
    }

    pub fn async_compute<F, T, P>(&self, pre: F, post: Option<P>)
    where
        F: FnOnce() -> Result<T, Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
        T: Send + 'static,
        P: FnOnce(AsyncResult) + Send + 'static,
    {
        self.stage_sender.async_compute(pre, post);
    }

    pub fn async_io<F, T, P>(&self, pre: F, post: Option<P>)
    where
        F: FnOnce() -> Result<T, Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
        T: Send + 'static,
        P: FnOnce(AsyncResult) + Send + 'static,
    {
        self.stage_sender.async_io(pre, post);
    }

    pub fn add_repeat_timer<F>(&self, initial_delay: Duration, period: Duration, callback: F) -> TimerId
    where
        F: FnMut() + Send + 'static,
    {
        self.stage_sender.add_repeat_timer(initial_delay, period, callback)
    }

    pub fn add_count_timer<F>(&self, initial_delay: Duration, period: Duration, count: u32, callback: F) -> TimerId
    where
        F: FnMut() + Send + 'static,
    {
        self.stage_sender.add_count_timer(initial_delay, period, count, callback)
    }

    pub fn cancel_timer(&self, timer_id: TimerId) {
        self.stage_sender.cancel_timer(timer_id);
    }

    pub fn has_timer(&self, timer_id: TimerId) -> bool {
        self.stage_sender.has_timer(timer_id)
    }
}

#[allow(dead_code)]
fn _assert_route_packet_shape(_: RoutePacket) {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuntimeContext;
    use crate::stage::handler::{ActorBehavior, StageType};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Weak;

    struct NoopStage;

    #[async_trait]
    impl StageType for NoopStage {
        async fn on_dispatch(&mut self, _sender: &ActorSender, _actor: &mut dyn ActorBehavior, _packet: &Packet) {}
    }

    struct CountingChannel(AtomicUsize);

    impl ClientChannel for CountingChannel {
        fn send(&self, _packet: Packet) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
        fn close(&self) {}
        fn session_id(&self) -> &str {
            "session-1"
        }
    }

    fn test_cell() -> Arc<StageCell> {
        let ctx = RuntimeContext::new(crate::config::RuntimeConfig::default(), None);
        StageCell::new(1, "Test".to_string(), Box::new(NoopStage), ctx, Weak::new())
    }

    #[test]
    fn send_to_client_with_no_bound_channel_does_not_panic() {
        let sender = ActorSender::new(test_cell(), "alice".to_string(), None);
        sender.send_to_client(Packet::request("Ping", 1, Payload::empty()));
    }

    #[test]
    fn send_to_client_forwards_to_the_bound_channel() {
        let channel = Arc::new(CountingChannel(AtomicUsize::new(0)));
        let sender = ActorSender::new(test_cell(), "alice".to_string(), Some(channel.clone()));
        sender.send_to_client(Packet::request("Ping", 1, Payload::empty()));
        assert_eq!(channel.0.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn account_id_reflects_the_owning_actor() {
        let sender = ActorSender::new(test_cell(), "alice".to_string(), None);
        assert_eq!(sender.account_id(), "alice");
    }
}
