//! [`StageSender`]: the sender bound to a stage but no particular actor
//! (§4.7). Handed to `on_create`, `on_dispatch_stage`, and
//! `on_destroy`.

// Layer 1: Standard library imports
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use crate::cluster::{select_peer, RoutePacket, ServicePeer};
use crate::config::PolicyKind;
use crate::error::{DispatchError, ErrorCode};
use crate::packet::{Packet, Payload, RouteHeader};
use crate::request_cache::ReplyFuture;
use crate::sender::core::{async_job, timer_stage_inbox};
use crate::stage::cell::StageCell;
use crate::stage::message::{AsyncPostCallback, AsyncResult, StageMessage, TimerCallback};
use crate::timer::game_loop::GameLoopConfig;
use crate::util::{MsgSeq, PeerId, StageId, TimerId};

/// Outbound API bound to one stage (§4.7: "Sender (ISender/ILink
/// collapsed, §B.7) — the only outbound API user code uses").
#[derive(Clone)]
pub struct StageSender {
    pub(crate) stage: Arc<StageCell>,
}

impl StageSender {
    pub fn new(stage: Arc<StageCell>) -> Self {
        Self { stage }
    }

    pub fn stage_id(&self) -> StageId {
        self.stage.stage_id()
    }

    pub fn stage_type_name(&self) -> &str {
        self.stage.stage_type_name()
    }

    /// Replies to whatever request is current for this loop iteration, read
    /// from `StageCell::current_header` (§3, "current_header").
    /// A no-op if nothing is currently being dispatched, or the current
    /// message wasn't request-bearing.
    pub fn reply(&self, error_code: ErrorCode, payload: Payload) {
        let Some(header) = self.stage.current_header() else {
            tracing::debug!(stage_id = self.stage_id(), "reply() called with no current request");
            return;
        };
        if !header.is_request() {
            tracing::debug!(stage_id = self.stage_id(), msg_id = %header.msg_id, "reply() called on a non-request message");
            return;
        }
        if header.from.is_empty() {
            // `StageSender` only ever sees client-origin headers through
            // `on_dispatch_stage`, which §4.4 describes as server-side
            // (no actor). There's no session to reply to directly here.
            tracing::debug!(stage_id = self.stage_id(), "reply() with no peer and no bound session: dropped");
            return;
        }
        self.reply_to_peer(&header, error_code, payload);
    }

    fn reply_to_peer(&self, header: &RouteHeader, error_code: ErrorCode, payload: Payload) {
        let Some(bus) = self.stage.ctx().cluster_bus.clone() else {
            tracing::debug!(stage_id = self.stage_id(), "no cluster bus configured: reply dropped");
            return;
        };
        let reply_header = RouteHeader { is_reply: true, from: self.stage.ctx().config.server_id.clone(), ..header.clone() };
        let mut packet = Packet::request(header.msg_id.clone(), header.stage_id, payload)
            .with_seq(header.msg_seq)
            .with_from(self.stage.ctx().config.server_id.clone())
            .with_account_id(header.account_id.clone());
        packet.error_code = error_code;
        packet.is_reply = true;
        let peer = header.from.clone();
        tokio::spawn(async move {
            if let Err(err) = bus.send(&peer, RoutePacket { header: reply_header, packet }).await {
                tracing::warn!(peer = %peer, error = %err, "failed to deliver reply");
            }
        });
    }

    /// Pushes a response to an arbitrary, still-connected session by id,
    /// through the shared [`crate::transport::TransportServer`]
    /// (§4.7: stage-level `send_to_client`, as opposed to the
    /// actor-bound variant that always targets its own session).
    pub fn send_to_client(&self, session_id: &str, packet: Packet) {
        let Some(transport) = self.stage.ctx().transport.clone() else {
            tracing::debug!(session_id, "no transport configured: send_to_client dropped");
            return;
        };
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            transport.send_response(&session_id, packet).await;
        });
    }

    /// Fire-and-forget delivery to another stage, local or remote
    /// (§4.7).
    pub fn send_to_stage(&self, peer_id: &PeerId, stage_id: StageId, packet: Packet) {
        self.send_routed(peer_id.clone(), stage_id, MsgSeq::NONE, 0, packet);
    }

    /// Request/reply to another stage, completed via a one-shot callback run
    /// on the delivering thread (§9: never posted back onto the
    /// stage loop).
    pub fn request_to_stage_cb<F>(&self, peer_id: &PeerId, stage_id: StageId, packet: Packet, callback: F)
    where
        F: FnOnce(Result<Packet, ErrorCode>) + Send + 'static,
    {
        let seq = self.stage.ctx().request_cache.next_seq();
        self.stage.ctx().request_cache.register_callback(seq, self.stage.ctx().config.request_timeout(), callback);
        self.send_routed(peer_id.clone(), stage_id, seq, 0, packet);
    }

    /// Same as [`Self::request_to_stage_cb`], but resolves a future instead
    /// of invoking a callback.
    pub fn request_to_stage(&self, peer_id: &PeerId, stage_id: StageId, packet: Packet) -> ReplyFuture {
        let seq = self.stage.ctx().request_cache.next_seq();
        let fut = self.stage.ctx().request_cache.register_future(seq, self.stage.ctx().config.request_timeout());
        self.send_routed(peer_id.clone(), stage_id, seq, 0, packet);
        fut
    }

    /// Fire-and-forget to a stateless `api` peer; same wire shape as
    /// `send_to_stage`, just addressed at a peer with no stage concept
    /// (§4.7).
    pub fn send_to_api(&self, peer_id: &PeerId, packet: Packet) {
        self.send_routed(peer_id.clone(), 0, MsgSeq::NONE, 0, packet);
    }

    pub fn request_to_api_cb<F>(&self, peer_id: &PeerId, packet: Packet, callback: F)
    where
        F: FnOnce(Result<Packet, ErrorCode>) + Send + 'static,
    {
        self.request_to_stage_cb(peer_id, 0, packet, callback);
    }

    pub fn request_to_api(&self, peer_id: &PeerId, packet: Packet) -> ReplyFuture {
        self.request_to_stage(peer_id, 0, packet)
    }

    /// Addresses a service group by `(server_type, service_id)` and a
    /// selection policy, resolving to one concrete peer via
    /// [`crate::cluster::select_peer`] (§6, "Server-selection
    /// policy").
    pub fn send_to_service(&self, server_type: &str, service_id: u16, packet: Packet, policy: Option<PolicyKind>) -> Result<(), DispatchError> {
        let peer = self.resolve_service_peer(server_type, service_id, policy)?;
        self.send_routed(peer, packet.stage_id, MsgSeq::NONE, service_id, packet);
        Ok(())
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
        let peer = self.resolve_service_peer(server_type, service_id, policy)?;
        let seq = self.stage.ctx().request_cache.next_seq();
        self.stage.ctx().request_cache.register_callback(seq, self.stage.ctx().config.request_timeout(), callback);
        self.send_routed(peer, packet.stage_id, seq, service_id, packet);
        Ok(())
    }

    pub fn request_to_service(&self, server_type: &str, service_id: u16, packet: Packet, policy: Option<PolicyKind>) -> Result<ReplyFuture, DispatchError> {
        let peer = self.resolve_service_peer(server_type, service_id, policy)?;
        let seq = self.stage.ctx().request_cache.next_seq();
        let fut = self.stage.ctx().request_cache.register_future(seq, self.stage.ctx().config.request_timeout());
        self.send_routed(peer, packet.stage_id, seq, service_id, packet);
        Ok(fut)
    }

    /// Out-of-band control message to a specific peer's system controller,
    /// addressed at the reserved logical stage id `0` (§B.1/B.2).
    pub fn send_to_system(&self, peer_id: &PeerId, packet: Packet) {
        self.send_routed(peer_id.clone(), 0, MsgSeq::NONE, 0, packet);
    }

    pub fn request_to_system_cb<F>(&self, peer_id: &PeerId, packet: Packet, callback: F)
    where
        F: FnOnce(Result<Packet, ErrorCode>) + Send + 'static,
    {
        self.request_to_stage_cb(peer_id, 0, packet, callback);
    }

    pub fn request_to_system(&self, peer_id: &PeerId, packet: Packet) -> ReplyFuture {
        self.request_to_stage(peer_id, 0, packet)
    }

    fn resolve_service_peer(&self, server_type: &str, service_id: u16, policy: Option<PolicyKind>) -> Result<PeerId, DispatchError> {
        let ctx = self.stage.ctx();
        let Some(bus) = ctx.cluster_bus.as_ref() else {
            return Err(DispatchError::NoPeerAvailable { server_type: server_type.to_string(), service_id });
        };
        let peers: Vec<ServicePeer> = bus.service_peers(server_type, service_id);
        let policy = policy.unwrap_or(ctx.config.default_selection_policy);
        let cursor_key = (server_type.to_string(), service_id);
        let cursor_entry = ctx.selection_cursors.entry(cursor_key).or_insert_with(|| AtomicUsize::new(0));
        let mut cursor = cursor_entry.load(std::sync::atomic::Ordering::Relaxed);
        let picked = select_peer(&peers, policy, &mut cursor);
        cursor_entry.store(cursor, std::sync::atomic::Ordering::Relaxed);
        picked.ok_or_else(|| DispatchError::NoPeerAvailable { server_type: server_type.to_string(), service_id })
    }

    fn send_routed(&self, peer_id: PeerId, stage_id: StageId, seq: MsgSeq, service_id: u16, packet: Packet) {
        let Some(bus) = self.stage.ctx().cluster_bus.clone() else {
            tracing::debug!(peer = %peer_id, "no cluster bus configured: send dropped");
            return;
        };
        let header = RouteHeader {
            msg_seq: seq,
            service_id,
            msg_id: packet.msg_id.clone(),
            from: self.stage.ctx().config.server_id.clone(),
            stage_id,
            account_id: packet.account_id.clone(),
            sid: String::new(),
            is_reply: false,
        };
        let packet = Packet { stage_id, ..packet };
        tokio::spawn(async move {
            if let Err(err) = bus.send(&peer_id, RoutePacket { header, packet }).await {
                tracing::warn!(peer = %peer_id, error = %err, "failed to deliver packet");
            }
        });
    }

    /// Runs `pre` on the bounded compute pool, then delivers its result back
    /// into this stage's inbox as an `AsyncMessage` so `post` runs under the
    /// stage's single-consumer guarantee (§4.8).
    pub fn async_compute<F, T, P>(&self, pre: F, post: Option<P>)
    where
        F: FnOnce() -> Result<T, Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
        T: Send + 'static,
        P: FnOnce(AsyncResult) + Send + 'static,
    {
        async_job(self.stage.clone(), self.stage.ctx().worker_pool.clone(), true, pre, post);
    }

    /// Same contract as [`Self::async_compute`], routed through the I/O pool.
    pub fn async_io<F, T, P>(&self, pre: F, post: Option<P>)
    where
        F: FnOnce() -> Result<T, Box<dyn std::error::Error + Send + Sync>> + Send + 'static,
        T: Send + 'static,
        P: FnOnce(AsyncResult) + Send + 'static,
    {
        async_job(self.stage.clone(), self.stage.ctx().worker_pool.clone(), false, pre, post);
    }

    /// Fires at `t = initial_delay`, then every `period`, delivering each
    /// tick as a `TimerMessage` into this stage's inbox (§4.3).
    pub fn add_repeat_timer<F>(&self, initial_delay: Duration, period: Duration, callback: F) -> TimerId
    where
        F: FnMut() + Send + 'static,
    {
        let cb = Arc::new(parking_lot::Mutex::new(callback));
        self.stage.ctx().timer_manager.add_repeat(timer_stage_inbox(&self.stage), self.stage.stage_id(), initial_delay, period, move || {
            let cb = cb.clone();
            Box::new(move || (cb.lock())()) as TimerCallback
        })
    }

    /// Fires up to `count` times, then self-cancels (§4.3).
    pub fn add_count_timer<F>(&self, initial_delay: Duration, period: Duration, count: u32, callback: F) -> TimerId
    where
        F: FnMut() + Send + 'static,
    {
        let cb = Arc::new(parking_lot::Mutex::new(callback));
        self.stage.ctx().timer_manager.add_count(timer_stage_inbox(&self.stage), self.stage.stage_id(), initial_delay, period, count, move || {
            let cb = cb.clone();
            Box::new(move || (cb.lock())()) as TimerCallback
        })
    }

    pub fn cancel_timer(&self, timer_id: TimerId) {
        self.stage.ctx().timer_manager.cancel(timer_id);
    }

    pub fn has_timer(&self, timer_id: TimerId) -> bool {
        self.stage.ctx().timer_manager.has_timer(timer_id)
    }

    /// Starts a dedicated-thread fixed-timestep game loop for this stage.
    /// Each tick is delivered through the stage inbox like any other timer,
    /// so `tick` runs under the same single-consumer guarantee
    /// (§4.3).
    pub fn start_game_loop<F>(&self, fixed_timestep: Duration, max_accumulator_cap: Option<Duration>, tick: F)
    where
        F: FnMut(Duration, Duration) + Send + 'static,
    {
        let mut config = GameLoopConfig::new(fixed_timestep);
        if let Some(cap) = max_accumulator_cap {
            config.max_accumulator_cap = cap.max(fixed_timestep);
        }
        let stage = self.stage.clone();
        let tick = Arc::new(parking_lot::Mutex::new(tick));
        let handle = crate::timer::game_loop::start(config, move |delta, elapsed| {
            let stage = stage.clone();
            let tick = tick.clone();
            stage.enqueue(StageMessage::TimerMessage {
                timer_id: TimerId(0),
                callback: Box::new(move || (tick.lock())(delta, elapsed)),
            });
            Box::new(|| {}) as TimerCallback
        });
        self.stage.set_game_loop(handle);
    }

    pub fn stop_game_loop(&self) {
        self.stage.stop_game_loop();
    }

    pub fn is_game_loop_running(&self) -> bool {
        self.stage.is_game_loop_running()
    }

    /// Asks the Dispatcher to tear this stage down (§4.7).
    /// A no-op if the Dispatcher that created this stage has already been
    /// dropped (runtime shutdown in progress).
    pub fn close_stage(&self) {
        if let Some(registry) = self.stage.dispatcher().upgrade() {
            registry.destroy(self.stage_id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RuntimeContext;
    use crate::stage::handler::{ActorBehavior, StageType};
    use async_trait::async_trait;
    use std::sync::Weak;

    struct NoopStage;

    #[async_trait]
    impl StageType for NoopStage {
        async fn on_dispatch(&mut self, _sender: &crate::sender::ActorSender, _actor: &mut dyn ActorBehavior, _packet: &Packet) {}
    }

    fn test_sender() -> StageSender {
        let ctx = RuntimeContext::new(crate::config::RuntimeConfig::default(), None);
        let cell = StageCell::new(1, "Test".to_string(), Box::new(NoopStage), ctx, Weak::new());
        StageSender::new(cell)
    }

    #[test]
    fn reply_with_no_current_request_does_not_panic() {
        let sender = test_sender();
        sender.reply(ErrorCode::Success, Payload::empty());
    }

    #[test]
    fn send_to_stage_without_cluster_bus_does_not_panic() {
        let sender = test_sender();
        sender.send_to_stage(&"peer-a".to_string(), 2, Packet::request("Ping", 2, Payload::empty()));
    }

    #[tokio::test]
    async fn async_compute_delivers_result_back_into_the_stage_inbox() {
        use std::sync::atomic::{AtomicBool, Ordering};
        let sender = test_sender();
        let delivered = Arc::new(AtomicBool::new(false));
        let flag = delivered.clone();
        sender.async_compute(
            || Ok::<_, Box<dyn std::error::Error + Send + Sync>>(7u32),
            Some(move |result: AsyncResult| {
                let value = result.unwrap();
                assert_eq!(*value.downcast::<u32>().unwrap(), 7);
                flag.store(true, Ordering::Relaxed);
            }),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(delivered.load(Ordering::Relaxed));
    }

    #[test]
    fn add_repeat_timer_registers_with_the_timer_manager() {
        let sender = test_sender();
        let timer_id = sender.add_repeat_timer(Duration::from_secs(10), Duration::from_secs(10), || {});
        assert!(sender.has_timer(timer_id));
        sender.cancel_timer(timer_id);
        assert!(!sender.has_timer(timer_id));
    }
}
