//! Stage Event Loop (§4.4): the per-stage inbox, cooperative
//! drain, and the traits user code implements to react to it.

pub mod actor;
pub mod cell;
pub mod handler;
pub mod inbox;
pub mod message;

pub use actor::ActorCell;
pub use cell::StageCell;
pub use handler::{ActorBehavior, ActorFactory, StageType, StageTypeFactory};
pub use inbox::Inbox;
pub use message::StageMessage;
