//! Stage registry front door and inbound routing decisions (§4.6).

pub mod registry;

pub use registry::{DispatcherRegistry, StageTypeRegistration};

// Layer 1: Standard library imports
use std::sync::Arc;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use crate::cluster::RoutePacket;
use crate::context::RuntimeContext;
use crate::error::{DispatchError, ErrorCode, StageError};
use crate::packet::{Packet, Payload, RouteHeader};
use crate::stage::cell::StageCell;
use crate::stage::handler::{ActorFactory, StageTypeFactory};
use crate::stage::message::StageMessage;
use crate::util::StageId;

/// Reserved `msg_id`s a peer uses to ask this process to create a stage
/// (§B.1). Namespaced with `$` so user `msg_id`s never
/// collide with them (`Packet::is_system_message`).
pub const CREATE_STAGE_MSG_ID: &str = "$create_stage";
pub const GET_OR_CREATE_STAGE_MSG_ID: &str = "$get_or_create_stage";

/// The stage registry and the routing decisions made against it
/// (§4.6): reply correlation, system create/get-or-create
/// commands, or plain delivery into an existing stage's inbox.
pub struct Dispatcher {
    registry: Arc<DispatcherRegistry>,
    ctx: Arc<RuntimeContext>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<RuntimeContext>) -> Self {
        Self { registry: DispatcherRegistry::new(ctx.clone()), ctx }
    }

    pub fn registry(&self) -> &Arc<DispatcherRegistry> {
        &self.registry
    }

    pub fn ctx(&self) -> &Arc<RuntimeContext> {
        &self.ctx
    }

    pub fn register_stage_type(&self, name: impl Into<String>, stage_factory: StageTypeFactory, actor_factory: ActorFactory) {
        self.registry.register_stage_type(name, stage_factory, actor_factory);
    }

    pub fn get(&self, stage_id: StageId) -> Option<Arc<StageCell>> {
        self.registry.get(stage_id)
    }

    /// Creates iff `stage_id` is absent; `on_create` runs before returning.
    /// Since the registry insert is atomic and no other producer can reach
    /// this `stage_id` until it is visible in the map, calling `on_create`
    /// directly here gives the same "runs exactly once before anything else
    /// touches the stage" guarantee §4.6 asks for without a
    /// literal detour through the inbox.
    pub async fn create(&self, stage_id: StageId, stage_type: &str) -> Result<Arc<StageCell>, StageError> {
        let cell = self.registry.try_insert(stage_id, stage_type)?;
        cell.run_on_create().await?;
        Ok(cell)
    }

    pub async fn get_or_create(&self, stage_id: StageId, stage_type: &str) -> Result<Arc<StageCell>, StageError> {
        if let Some(cell) = self.registry.get(stage_id) {
            return Ok(cell);
        }
        match self.create(stage_id, stage_type).await {
            Ok(cell) => Ok(cell),
            Err(StageError::AlreadyExists(_)) => {
                self.registry.get(stage_id).ok_or(StageError::NotFound(stage_id))
            }
            Err(other) => Err(other),
        }
    }

    /// Removes the registry entry, cancels every timer the stage owns, and
    /// enqueues a final `DestroyMessage` so in-flight actors get `on_destroy`
    /// (§4.6). Returns `false` if the stage was already gone.
    pub fn destroy(&self, stage_id: StageId) -> bool {
        self.registry.destroy(stage_id)
    }

    /// Routes a client frame the session adapter has already authenticated
    /// and associated with a stage (§4.9: "If authenticated: route
    /// via Dispatcher to the stage").
    pub fn route_client_frame(&self, account_id: String, stage_id: StageId, packet: Packet, sid: String) -> Result<(), DispatchError> {
        match self.registry.get(stage_id) {
            Some(cell) => {
                cell.enqueue(StageMessage::ClientRouteMessage { account_id, packet, sid });
                Ok(())
            }
            None => Err(DispatchError::Stage(StageError::NotFound(stage_id))),
        }
    }

    /// Routes a peer-originated packet arriving over the [`crate::cluster`]
    /// bus (§4.6 inbound routing decision tree):
    ///
    /// 1. A correlated reply completes a pending [`crate::request_cache`]
    ///    entry, if one is still waiting.
    /// 2. A reserved create/get-or-create `msg_id` is handled here, not
    ///    routed into a stage (the stage may not exist yet).
    /// 3. Otherwise the packet is handed to the target stage's inbox, or
    ///    answered with `stage_not_found` if it doesn't exist and a reply
    ///    was requested.
    pub async fn route_packet(&self, packet: Packet, header: RouteHeader) {
        if header.is_correlated_reply() && self.ctx.request_cache.try_complete(header.msg_seq, packet.clone()) {
            return;
        }

        if packet.msg_id == CREATE_STAGE_MSG_ID || packet.msg_id == GET_OR_CREATE_STAGE_MSG_ID {
            self.handle_system_create(packet, header).await;
            return;
        }

        match self.registry.get(header.stage_id) {
            Some(cell) => cell.enqueue(StageMessage::RouteMessage { packet, header }),
            None => {
                if header.is_request() {
                    self.send_error_reply(&header, ErrorCode::StageNotFound).await;
                }
            }
        }
    }

    async fn handle_system_create(&self, packet: Packet, header: RouteHeader) {
        let stage_type = String::from_utf8_lossy(packet.payload.as_slice()).to_string();
        let result = if packet.msg_id == GET_OR_CREATE_STAGE_MSG_ID {
            self.get_or_create(header.stage_id, &stage_type).await
        } else {
            self.create(header.stage_id, &stage_type).await
        };

        if !header.is_request() {
            if let Err(err) = result {
                tracing::warn!(stage_id = header.stage_id, error = %err, "fire-and-forget system create failed");
            }
            return;
        }

        let error_code = match result {
            Ok(_) => ErrorCode::Success,
            Err(err) => err.to_error_code(),
        };
        self.send_error_reply(&header, error_code).await;
    }

    async fn send_error_reply(&self, header: &RouteHeader, error_code: ErrorCode) {
        let Some(bus) = self.ctx.cluster_bus.as_ref() else {
            tracing::debug!(stage_id = header.stage_id, "no cluster bus configured: dropping reply");
            return;
        };
        let reply_header = RouteHeader { is_reply: true, from: self.ctx.config.server_id.clone(), ..header.clone() };
        let mut reply_packet = Packet::request(header.msg_id.clone(), header.stage_id, Payload::empty())
            .with_seq(header.msg_seq)
            .with_from(self.ctx.config.server_id.clone())
            .with_account_id(header.account_id.clone());
        reply_packet.error_code = error_code;
        reply_packet.is_reply = true;

        let bus = bus.clone();
        let peer = header.from.clone();
        let route = RoutePacket { header: reply_header, packet: reply_packet };
        tokio::spawn(async move {
            if let Err(err) = bus.send(&peer, route).await {
                tracing::warn!(peer = %peer, error = %err, "failed to deliver dispatcher error reply");
            }
        });
    }
}
