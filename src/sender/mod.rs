//! Outbound API (§4.7): the only way user code sends anything.
//!
//! Two thin, cheaply-cloneable handles wrap the same underlying
//! [`crate::stage::cell::StageCell`]: [`StageSender`] (no particular actor;
//! handed to stage-level hooks) and [`ActorSender`] (bound to one
//! authenticated actor's session; handed to actor-level hooks). Every
//! stage-wide operation on `ActorSender` simply delegates to an owned
//! `StageSender`, so there is exactly one implementation of each routing
//! decision.

mod actor_sender;
pub(crate) mod core;
mod stage_sender;

pub use actor_sender::ActorSender;
pub use stage_sender::StageSender;
