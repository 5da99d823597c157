//! `StageCell`: the per-stage state machine and its drain loop
//! (§4.4, the hardest component in the system).

// Layer 1: Standard library imports
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

// Layer 2: Third-party crate imports
use tokio::sync::Mutex as AsyncMutex;
use tracing::Instrument;

// Layer 3: Internal module imports
use crate::context::RuntimeContext;
use crate::error::StageError;
use crate::packet::RouteHeader;
use crate::sender::{ActorSender, StageSender};
use crate::stage::actor::ActorCell;
use crate::stage::handler::StageType;
use crate::stage::inbox::Inbox;
use crate::stage::message::StageMessage;
use crate::timer::game_loop::GameLoopHandle;
use crate::timer::StageInbox as TimerStageInbox;
use crate::timer::TimerId;
use crate::util::StageId;

/// Stage-private state, touched only from inside the drain loop
/// (§5: "Stage state... touched only from within the stage
/// loop"). Wrapped in an async `Mutex` (rather than `parking_lot`) because
/// a user callback is awaited while the lock is held; the CAS in [`Inbox`]
/// guarantees it is never contended across stages, only ever re-entered
/// sequentially by the one active drainer.
struct StageState {
    stage_type: Box<dyn StageType>,
    actors: HashMap<String, ActorCell>,
    is_created: bool,
}

/// A single logical game room (§3, "Stage").
pub struct StageCell {
    stage_id: StageId,
    stage_type_name: String,
    inbox: Inbox,
    state: AsyncMutex<StageState>,
    /// Per-loop-iteration reference to the request being handled, read by
    /// `StageSender::reply` for implicit reply routing (§3,
    /// "current_header").
    current_header: parking_lot::Mutex<Option<RouteHeader>>,
    game_loop: parking_lot::Mutex<Option<GameLoopHandle>>,
    destroyed: AtomicBool,
    ctx: Arc<RuntimeContext>,
    dispatcher: Weak<crate::dispatcher::registry::DispatcherRegistry>,
}

impl StageCell {
    pub fn new(
        stage_id: StageId,
        stage_type_name: String,
        stage_type: Box<dyn StageType>,
        ctx: Arc<RuntimeContext>,
        dispatcher: Weak<crate::dispatcher::registry::DispatcherRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            stage_id,
            stage_type_name,
            inbox: Inbox::new(),
            state: AsyncMutex::new(StageState {
                stage_type,
                actors: HashMap::new(),
                is_created: false,
            }),
            current_header: parking_lot::Mutex::new(None),
            game_loop: parking_lot::Mutex::new(None),
            destroyed: AtomicBool::new(false),
            ctx,
            dispatcher,
        })
    }

    pub fn stage_id(&self) -> StageId {
        self.stage_id
    }

    pub fn stage_type_name(&self) -> &str {
        &self.stage_type_name
    }

    pub fn ctx(&self) -> &Arc<RuntimeContext> {
        &self.ctx
    }

    pub fn dispatcher(&self) -> Weak<crate::dispatcher::registry::DispatcherRegistry> {
        self.dispatcher.clone()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn current_header(&self) -> Option<RouteHeader> {
        self.current_header.lock().clone()
    }

    pub fn set_game_loop(&self, handle: GameLoopHandle) {
        *self.game_loop.lock() = Some(handle);
    }

    pub fn stop_game_loop(&self) {
        if let Some(mut handle) = self.game_loop.lock().take() {
            handle.stop();
        }
    }

    pub fn is_game_loop_running(&self) -> bool {
        self.game_loop.lock().as_ref().map(GameLoopHandle::is_running).unwrap_or(false)
    }

    /// Introspection helper for tests; only meaningful when the stage is
    /// not concurrently draining (the lock is otherwise uncontended).
    pub fn has_actor(&self, account_id: &str) -> bool {
        self.state
            .try_lock()
            .map(|state| state.actors.contains_key(account_id))
            .unwrap_or(false)
    }

    pub fn actor_count(&self) -> usize {
        self.state.try_lock().map(|state| state.actors.len()).unwrap_or(0)
    }

    /// Enqueues `msg`; best-effort dropped once the stage is destroyed
    /// (§4.4: "after this, enqueue is a no-op").
    pub fn enqueue(self: &Arc<Self>, msg: StageMessage) {
        if self.is_destroyed() {
            tracing::debug!(stage_id = self.stage_id, "enqueue dropped: stage destroyed");
            return;
        }
        if self.inbox.push(msg) {
            self.spawn_drain();
        }
    }

    fn spawn_drain(self: &Arc<Self>) {
        let cell = self.clone();
        tokio::spawn(async move {
            cell.drain().await;
        });
    }

    /// The drain loop (§4.4 drain algorithm, translated verbatim):
    /// pull and dispatch everything currently queued, release the drainer
    /// flag, then re-check for the race window before actually stopping.
    async fn drain(self: Arc<Self>) {
        let span = tracing::info_span!("stage_drain", stage_id = self.stage_id, stage_type = %self.stage_type_name);
        async {
            loop {
                while let Some(msg) = self.inbox.try_dequeue() {
                    self.dispatch_one(msg).await;
                }
                if !self.inbox.release_or_continue() {
                    break;
                }
            }
        }
        .instrument(span)
        .await;
    }

    async fn dispatch_one(self: &Arc<Self>, msg: StageMessage) {
        let header = crate::stage::message::header_of(&msg).map(|(_, h)| h);
        *self.current_header.lock() = header;

        match msg {
            StageMessage::RouteMessage { packet, header } => {
                self.dispatch_route_message(packet, header).await;
            }
            StageMessage::ClientRouteMessage { account_id, packet, .. } => {
                self.dispatch_client_route(account_id, packet).await;
            }
            StageMessage::JoinActorMessage { actor, session_ref, completion } => {
                self.dispatch_join(actor, session_ref, completion).await;
            }
            StageMessage::DisconnectMessage { account_id } => {
                self.dispatch_disconnect(account_id).await;
            }
            StageMessage::LeaveActorMessage { account_id } => {
                self.dispatch_leave(account_id).await;
            }
            StageMessage::TimerMessage { callback, .. } => {
                callback();
            }
            StageMessage::AsyncMessage { result, post, .. } => {
                if let Some(post) = post {
                    post(result);
                }
            }
            StageMessage::DestroyMessage => {
                self.dispatch_destroy().await;
            }
        }

        *self.current_header.lock() = None;
    }

    fn actor_sender(self: &Arc<Self>, account_id: &str, actors: &HashMap<String, ActorCell>) -> ActorSender {
        let channel = actors.get(account_id).and_then(|a| a.session_ref.clone());
        ActorSender::new(self.clone(), account_id.to_string(), channel)
    }

    async fn dispatch_route_message(self: &Arc<Self>, packet: crate::packet::Packet, header: RouteHeader) {
        if packet.is_system_message() {
            tracing::warn!(msg_id = %packet.msg_id, "unexpected system message reached stage loop dispatch table");
            return;
        }
        let mut state = self.state.lock().await;
        let StageState { stage_type, actors, .. } = &mut *state;
        if actors.contains_key(&header.account_id) {
            let sender = self.actor_sender(&header.account_id, actors);
            let actor = actors.get_mut(&header.account_id).expect("checked above");
            stage_type.on_dispatch(&sender, actor.behavior.as_mut(), &packet).await;
        } else {
            let sender = StageSender::new(self.clone());
            stage_type.on_dispatch_stage(&sender, &packet).await;
        }
    }

    async fn dispatch_client_route(self: &Arc<Self>, account_id: String, packet: crate::packet::Packet) {
        let mut state = self.state.lock().await;
        let StageState { stage_type, actors, .. } = &mut *state;
        if actors.contains_key(&account_id) {
            let sender = self.actor_sender(&account_id, actors);
            let actor = actors.get_mut(&account_id).expect("checked above");
            stage_type.on_dispatch(&sender, actor.behavior.as_mut(), &packet).await;
        } else {
            tracing::debug!(account_id = %account_id, msg_id = %packet.msg_id, "client route dropped: unknown actor");
        }
    }

    async fn dispatch_join(
        self: &Arc<Self>,
        actor: Box<dyn crate::stage::handler::ActorBehavior>,
        session_ref: Option<Arc<dyn crate::transport::ClientChannel>>,
        completion: Option<tokio::sync::oneshot::Sender<Result<(), StageError>>>,
    ) {
        let account_id = actor.account_id().to_string();
        let mut state = self.state.lock().await;

        if state.actors.contains_key(&account_id) {
            // Reconnection: rebind the existing actor to the new connection,
            // fire on_connection_changed(true) only, and destroy the fresh
            // instance (§3, "Actor lifecycle": "persists across
            // reconnections"; §4.4 dispatch table: reconnection "destroys
            // the fresh actor instance").
            if let Some(channel) = session_ref {
                state.actors.get_mut(&account_id).expect("checked above").rebind_session(channel);
            }
            let StageState { stage_type, actors, .. } = &mut *state;
            let sender = self.actor_sender(&account_id, actors);
            let existing = actors.get_mut(&account_id).expect("checked above");
            stage_type.on_connection_changed(&sender, existing.behavior.as_mut(), true).await;
            drop(state);
            let mut actor = actor;
            actor.on_destroy().await;
            if let Some(completion) = completion {
                let _ = completion.send(Ok(()));
            }
            return;
        }

        let mut cell = ActorCell::new(actor, session_ref);
        let sender = ActorSender::new(self.clone(), account_id.clone(), cell.session_ref.clone());
        let accepted = state.stage_type.on_join_stage(&sender, cell.behavior.as_ref()).await;

        if !accepted {
            drop(state);
            cell.behavior.on_destroy().await;
            if let Some(completion) = completion {
                let _ = completion.send(Err(StageError::JoinRejected { stage_id: self.stage_id }));
            }
            return;
        }

        state.stage_type.on_post_join_stage(&sender, cell.behavior.as_mut()).await;
        state.actors.insert(account_id, cell);
        drop(state);
        if let Some(completion) = completion {
            let _ = completion.send(Ok(()));
        }
    }

    async fn dispatch_disconnect(self: &Arc<Self>, account_id: String) {
        let mut state = self.state.lock().await;
        let StageState { stage_type, actors, .. } = &mut *state;
        if actors.contains_key(&account_id) {
            let sender = self.actor_sender(&account_id, actors);
            let actor = actors.get_mut(&account_id).expect("checked above");
            stage_type.on_connection_changed(&sender, actor.behavior.as_mut(), false).await;
        } else {
            tracing::debug!(account_id = %account_id, "disconnect for unknown actor ignored");
        }
    }

    /// Explicit removal (`ActorSender::leave_stage`) or a grace-window
    /// expiry sweep. Unlike `DisconnectMessage`, this actually takes the
    /// actor out of the stage and runs its `on_destroy` (§3,
    /// "Destroyed when the user calls leave_stage").
    async fn dispatch_leave(self: &Arc<Self>, account_id: String) {
        let mut state = self.state.lock().await;
        if let Some(mut actor) = state.actors.remove(&account_id) {
            actor.behavior.on_destroy().await;
        }
    }

    async fn dispatch_destroy(self: &Arc<Self>) {
        let sender = StageSender::new(self.clone());
        let mut state = self.state.lock().await;
        let account_ids: Vec<String> = state.actors.keys().cloned().collect();
        for account_id in account_ids {
            if let Some(mut actor) = state.actors.remove(&account_id) {
                actor.behavior.on_destroy().await;
            }
        }
        state.stage_type.on_destroy(&sender).await;
        drop(state);
        self.stop_game_loop();
        self.destroyed.store(true, Ordering::Release);
    }

    /// Runs the stage's `on_create` inside the loop, exactly once
    /// (§4.6: "route the command into the just-created stage's
    /// loop so that on_create runs inside the loop").
    pub async fn run_on_create(self: &Arc<Self>) -> Result<(), StageError> {
        let sender = StageSender::new(self.clone());
        let mut state = self.state.lock().await;
        if state.is_created {
            return Ok(());
        }
        let result = state.stage_type.on_create(&sender).await;
        if result.is_ok() {
            state.is_created = true;
        }
        result
    }
}

impl TimerStageInbox for StageCell {
    fn enqueue_timer(self: Arc<Self>, timer_id: TimerId, callback: crate::stage::message::TimerCallback) {
        self.enqueue(StageMessage::TimerMessage { timer_id, callback });
    }

    fn stage_id(&self) -> StageId {
        self.stage_id
    }
}
