//! Convenient glob import for embedding applications.
//!
//! ```rust,ignore
//! use stagecore::prelude::*;
//! ```

pub use crate::cluster::{ClusterBus, PolicyKind, RoutePacket};
pub use crate::config::{RuntimeConfig, RuntimeConfigBuilder};
pub use crate::dispatcher::Dispatcher;
pub use crate::error::{DispatchError, ErrorCode, SessionError, StageError};
pub use crate::packet::{Packet, Payload, RouteHeader};
pub use crate::request_cache::RequestCache;
pub use crate::runtime::Runtime;
pub use crate::sender::{ActorSender, StageSender};
pub use crate::session::{SessionAdapter, SessionState};
pub use crate::stage::{ActorBehavior, StageType};
pub use crate::timer::TimerManager;
pub use crate::transport::TransportServer;
pub use crate::util::{MsgSeq, PeerId, StageId, TimerId};
pub use crate::worker_pool::WorkerPool;
