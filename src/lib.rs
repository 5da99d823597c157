//! # stagecore — single-threaded-per-stage actor runtime
//!
//! A real-time game-server runtime built around one idea: a *stage* (a room,
//! a match, a zone) owns its state and processes every message that touches
//! it on exactly one logical thread at a time, while the runtime as a whole
//! stays fully concurrent because it can run thousands of stages in
//! parallel.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use stagecore::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let runtime = Runtime::new(RuntimeConfig::default());
//!     runtime.dispatcher().register_stage_type(
//!         "lobby",
//!         Box::new(|| Box::new(MyLobby::default()) as Box<dyn StageType>),
//!         Box::new(|| Box::new(MyActor::default()) as Box<dyn ActorBehavior>),
//!     );
//!     runtime.dispatcher().create(1, "lobby").await.unwrap();
//!
//!     // A transport implementation hands each connection to a SessionAdapter,
//!     // which runs the authentication handshake and joins the actor into its
//!     // stage; from then on the Dispatcher routes frames by account_id.
//!     let adapter = SessionAdapter::new(runtime.dispatcher().clone(), my_transport, my_channel);
//!     adapter.handle_frame(first_frame).await;
//! }
//! ```
//!
//! # Module map
//!
//! - [`util`] — shared identifier newtypes (`StageId`, `MsgSeq`, `TimerId`).
//! - [`error`] — the wire-visible [`error::ErrorCode`] taxonomy and the
//!   internal per-subsystem `thiserror` error enums.
//! - [`config`] — [`config::RuntimeConfig`] and its builder.
//! - [`packet`] — the [`packet::Packet`] envelope and pooled
//!   [`packet::Payload`] buffer.
//! - [`codec`] — optional client wire-framing helpers for a
//!   [`transport::TransportServer`] implementation to build on.
//! - [`request_cache`] — request/reply correlation and timeout sweeping.
//! - [`timer`] — repeating/counted timers and the fixed-timestep game loop.
//! - [`stage`] — the stage inbox, drain loop, and actor/handler traits.
//! - [`dispatcher`] — the stage registry and top-level routing decision.
//! - [`sender`] — [`sender::StageSender`] / [`sender::ActorSender`], the only
//!   outbound API surface user code touches.
//! - [`worker_pool`] — bounded compute and I/O pools for blocking work.
//! - [`cluster`] — the mesh-peer abstraction for cross-process routing.
//! - [`session`] — pre-auth gating, the auth handshake, and wire framing.
//! - [`transport`] — the transport-server collaborator trait.
//! - [`runtime`] — [`runtime::Runtime`], wiring every subsystem together.
//!
//! # Non-goals
//!
//! This crate does not define a payload codec, persistence, matchmaking, a
//! broadcast overlay, or a concrete cluster wire format. Those are owned by
//! the embedding application; stagecore only provides the hooks.

pub mod cluster;
pub mod codec;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod packet;
pub mod request_cache;
pub mod runtime;
pub mod sender;
pub mod session;
pub mod stage;
pub mod timer;
pub mod transport;
pub mod util;
pub mod worker_pool;

pub mod prelude;

pub use config::{RuntimeConfig, RuntimeConfigBuilder};
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, ErrorCode, SessionError, StageError};
pub use packet::{Packet, Payload, RouteHeader};
pub use runtime::Runtime;
pub use sender::{ActorSender, StageSender};
pub use util::{MsgSeq, PeerId, StageId, TimerId};
