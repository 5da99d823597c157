//! [`SessionAdapter`]: the boundary between one transport connection and the
//! Dispatcher (§4.9).
//!
//! One instance per connected client, owned by the embedding
//! [`crate::transport::TransportServer`] implementation. Frames for the same
//! session must be handed to [`SessionAdapter::handle_frame`] in arrival
//! order; this adapter does not itself serialize concurrent calls.

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
use tokio::sync::{oneshot, Mutex as AsyncMutex};

// Layer 3: Internal module imports
use crate::dispatcher::Dispatcher;
use crate::error::ErrorCode;
use crate::packet::{Packet, Payload};
use crate::session::state::SessionState;
use crate::stage::message::StageMessage;
use crate::transport::{ClientChannel, InboundFrame, TransportServer};
use crate::util::StageId;

pub struct SessionAdapter {
    dispatcher: Arc<Dispatcher>,
    transport: Arc<dyn TransportServer>,
    channel: Arc<dyn ClientChannel>,
    session_id: String,
    state: AsyncMutex<SessionState>,
}

impl SessionAdapter {
    pub fn new(dispatcher: Arc<Dispatcher>, transport: Arc<dyn TransportServer>, channel: Arc<dyn ClientChannel>) -> Self {
        let session_id = channel.session_id().to_string();
        Self {
            dispatcher,
            transport,
            channel,
            session_id,
            state: AsyncMutex::new(SessionState::new()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.lock().await.is_authenticated
    }

    /// Dispatches one inbound frame per §4.9's decision tree:
    /// pre-auth gating, the authentication handshake, or routing through
    /// the Dispatcher.
    pub async fn handle_frame(&self, frame: InboundFrame) {
        let authenticated = self.state.lock().await.is_authenticated;

        if !authenticated {
            if frame.msg_id != self.dispatcher.ctx().config.authenticate_message_id {
                tracing::warn!(
                    session_id = %self.session_id,
                    msg_id = %frame.msg_id,
                    "pre-auth message rejected: session closed"
                );
                self.transport.close_session(&self.session_id).await;
                return;
            }
            self.authenticate(frame).await;
            return;
        }

        let account_id = {
            let state = self.state.lock().await;
            match state.account_id.clone() {
                Some(id) => id,
                None => {
                    tracing::error!(session_id = %self.session_id, "authenticated session has no account_id");
                    return;
                }
            }
        };

        let stage_id = frame.stage_id;
        let packet = Packet::request(frame.msg_id, stage_id, frame.payload)
            .with_seq(frame.msg_seq)
            .with_account_id(account_id.clone());

        if let Err(err) = self.dispatcher.route_client_frame(account_id, stage_id, packet, self.session_id.clone()) {
            tracing::debug!(session_id = %self.session_id, error = %err, "authenticated frame dropped");
        }
    }

    /// Transport disconnect notice: synthesizes a `DisconnectMessage` for
    /// the actor's stage, if the session ever joined one (§4.9).
    pub async fn handle_disconnect(&self) {
        let (account_id, stage_id) = {
            let state = self.state.lock().await;
            match (state.account_id.clone(), state.current_stage_id) {
                (Some(account_id), Some(stage_id)) => (account_id, stage_id),
                _ => return,
            }
        };
        if let Some(cell) = self.dispatcher.get(stage_id) {
            cell.enqueue(StageMessage::DisconnectMessage { account_id });
        }
    }

    /// §4.5: construct sender + actor, `on_create`,
    /// `on_authenticate`, reject-or-continue, `on_post_authenticate`, then
    /// enqueue the `JoinActorMessage` and wait for the stage loop's verdict.
    async fn authenticate(&self, frame: InboundFrame) {
        let stage_type_name = match self.resolve_target_stage_type(frame.stage_id).await {
            Ok(name) => name,
            Err(code) => {
                self.reject(&frame, code).await;
                return;
            }
        };

        let Some(registration) = self.dispatcher.registry().registration(&stage_type_name) else {
            self.reject(&frame, ErrorCode::InvalidStageType).await;
            return;
        };

        let mut actor = (registration.actor_factory)();
        actor.on_create().await;

        let auth_packet = Packet::request(frame.msg_id.clone(), frame.stage_id, frame.payload.clone()).with_seq(frame.msg_seq);
        let accepted = actor.on_authenticate(&auth_packet).await;
        let account_id = actor.account_id().to_string();

        if !accepted || account_id.is_empty() {
            actor.on_destroy().await;
            self.reject(&frame, ErrorCode::AuthenticationFailed).await;
            return;
        }

        actor.on_post_authenticate().await;

        let Some(cell) = self.dispatcher.get(frame.stage_id) else {
            actor.on_destroy().await;
            self.reject(&frame, ErrorCode::StageNotFound).await;
            return;
        };

        let (tx, rx) = oneshot::channel();
        cell.enqueue(StageMessage::JoinActorMessage {
            actor,
            session_ref: Some(self.channel.clone()),
            completion: Some(tx),
        });

        match rx.await {
            Ok(Ok(())) => {
                let mut state = self.state.lock().await;
                state.account_id = Some(account_id.clone());
                state.is_authenticated = true;
                state.current_stage_id = Some(frame.stage_id);
                drop(state);
                self.accept(&frame, account_id).await;
            }
            Ok(Err(err)) => self.reject(&frame, err.to_error_code()).await,
            Err(_) => {
                tracing::warn!(session_id = %self.session_id, "join completion channel dropped");
                self.reject(&frame, ErrorCode::InternalError).await;
            }
        }
    }

    /// Looks up `stage_id`'s existing `stage_type`, or — if absent and
    /// `default_stage_type` is configured — creates it
    /// (§6, "`default_stage_type`").
    async fn resolve_target_stage_type(&self, stage_id: StageId) -> Result<String, ErrorCode> {
        if let Some(name) = self.dispatcher.registry().stage_type_name_of(stage_id) {
            return Ok(name);
        }
        let Some(default_type) = self.dispatcher.ctx().config.default_stage_type.clone() else {
            return Err(ErrorCode::StageNotFound);
        };
        self.dispatcher
            .get_or_create(stage_id, &default_type)
            .await
            .map(|cell| cell.stage_type_name().to_string())
            .map_err(|err| err.to_error_code())
    }

    async fn accept(&self, frame: &InboundFrame, account_id: String) {
        let mut packet = Packet::request(frame.msg_id.clone(), frame.stage_id, Payload::empty())
            .with_seq(frame.msg_seq)
            .with_account_id(account_id);
        packet.error_code = ErrorCode::Success;
        packet.is_reply = true;
        self.channel.send(packet);
    }

    /// Rejects the in-flight authentication attempt and closes the session
    /// (§4.5 step 5: "If reject → on_destroy, close session, done").
    async fn reject(&self, frame: &InboundFrame, error_code: ErrorCode) {
        let mut packet = Packet::request(frame.msg_id.clone(), frame.stage_id, Payload::empty()).with_seq(frame.msg_seq);
        packet.error_code = error_code;
        packet.is_reply = true;
        self.channel.send(packet);
        self.transport.close_session(&self.session_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use crate::context::RuntimeContext;
    use crate::error::StageError;
    use crate::stage::handler::{ActorBehavior, StageType};
    use crate::util::MsgSeq;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct EchoStage;

    #[async_trait]
    impl StageType for EchoStage {
        async fn on_dispatch(&mut self, sender: &crate::sender::ActorSender, _actor: &mut dyn ActorBehavior, packet: &Packet) {
            sender.reply(ErrorCode::Success, packet.payload.clone());
        }
    }

    struct AcceptingActor {
        account_id: String,
    }

    #[async_trait]
    impl ActorBehavior for AcceptingActor {
        fn account_id(&self) -> &str {
            &self.account_id
        }

        async fn on_authenticate(&mut self, auth_packet: &Packet) -> bool {
            self.account_id = String::from_utf8_lossy(auth_packet.payload.as_slice()).to_string();
            !self.account_id.is_empty()
        }
    }

    struct RejectingActor;

    #[async_trait]
    impl ActorBehavior for RejectingActor {
        fn account_id(&self) -> &str {
            ""
        }

        async fn on_authenticate(&mut self, _auth_packet: &Packet) -> bool {
            false
        }
    }

    struct RecordingChannel {
        sent: StdMutex<Vec<Packet>>,
        closed: AtomicUsize,
    }

    impl RecordingChannel {
        fn new() -> Arc<Self> {
            Arc::new(Self { sent: StdMutex::new(Vec::new()), closed: AtomicUsize::new(0) })
        }
    }

    impl ClientChannel for RecordingChannel {
        fn send(&self, packet: Packet) {
            self.sent.lock().unwrap().push(packet);
        }
        fn close(&self) {
            self.closed.fetch_add(1, Ordering::Relaxed);
        }
        fn session_id(&self) -> &str {
            "sess-1"
        }
    }

    struct RecordingTransport {
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl TransportServer for RecordingTransport {
        async fn send_response(&self, _session_id: &str, _packet: Packet) {}
        async fn close_session(&self, _session_id: &str) {
            self.closed.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn dispatcher_with(actor_factory: crate::stage::handler::ActorFactory) -> Arc<Dispatcher> {
        let ctx = RuntimeContext::new(RuntimeConfig::default(), None);
        let dispatcher = Arc::new(Dispatcher::new(ctx));
        dispatcher.register_stage_type(
            "lobby",
            Box::new(|| Box::new(EchoStage) as Box<dyn StageType>),
            actor_factory,
        );
        dispatcher
    }

    fn frame(msg_id: &str, seq: u16, stage_id: StageId, payload: &[u8]) -> InboundFrame {
        InboundFrame {
            msg_id: msg_id.to_string(),
            msg_seq: MsgSeq(seq),
            stage_id,
            payload: Payload::zero_copy(payload.to_vec()),
        }
    }

    #[tokio::test]
    async fn pre_auth_frame_with_wrong_msg_id_closes_the_session() {
        let dispatcher = dispatcher_with(Box::new(|| Box::new(AcceptingActor { account_id: String::new() })));
        let transport_closed = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(RecordingTransport { closed: transport_closed.clone() });
        let channel = RecordingChannel::new();
        let adapter = SessionAdapter::new(dispatcher, transport, channel.clone());

        adapter.handle_frame(frame("Ping", 1, 1, b"x")).await;

        assert_eq!(transport_closed.load(Ordering::Relaxed), 1);
        assert!(!adapter.is_authenticated().await);
    }

    #[tokio::test]
    async fn successful_authentication_joins_the_stage_and_acks() {
        let dispatcher = dispatcher_with(Box::new(|| Box::new(AcceptingActor { account_id: String::new() })));
        dispatcher.create(1, "lobby").await.unwrap();
        let transport = Arc::new(RecordingTransport { closed: Arc::new(AtomicUsize::new(0)) });
        let channel = RecordingChannel::new();
        let adapter = SessionAdapter::new(dispatcher.clone(), transport, channel.clone());

        adapter.handle_frame(frame("Authenticate", 1, 1, b"alice")).await;

        assert!(adapter.is_authenticated().await);
        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].error_code.is_success());
        assert_eq!(sent[0].account_id, "alice");
    }

    #[tokio::test]
    async fn rejected_authentication_closes_the_session() {
        let dispatcher = dispatcher_with(Box::new(|| Box::new(RejectingActor)));
        dispatcher.create(1, "lobby").await.unwrap();
        let transport_closed = Arc::new(AtomicUsize::new(0));
        let transport = Arc::new(RecordingTransport { closed: transport_closed.clone() });
        let channel = RecordingChannel::new();
        let adapter = SessionAdapter::new(dispatcher, transport, channel.clone());

        adapter.handle_frame(frame("Authenticate", 1, 1, b"")).await;

        assert!(!adapter.is_authenticated().await);
        assert_eq!(transport_closed.load(Ordering::Relaxed), 1);
        let sent = channel.sent.lock().unwrap();
        assert!(!sent[0].error_code.is_success());
    }

    #[tokio::test]
    async fn authenticated_frame_routes_through_the_dispatcher() {
        let dispatcher = dispatcher_with(Box::new(|| Box::new(AcceptingActor { account_id: String::new() })));
        dispatcher.create(1, "lobby").await.unwrap();
        let transport = Arc::new(RecordingTransport { closed: Arc::new(AtomicUsize::new(0)) });
        let channel = RecordingChannel::new();
        let adapter = SessionAdapter::new(dispatcher, transport, channel.clone());

        adapter.handle_frame(frame("Authenticate", 1, 1, b"alice")).await;
        adapter.handle_frame(frame("Ping", 2, 1, b"hi")).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].payload.as_slice(), b"hi");
    }

    #[allow(dead_code)]
    fn _assert_error_type(_: StageError) {}
}
