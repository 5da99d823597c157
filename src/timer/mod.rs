//! Timer subsystem (§4.3): repeating/counted timers forwarded as
//! stage-inbox messages, plus the specialized fixed-timestep game loop.

pub mod game_loop;
pub mod manager;

pub use game_loop::{GameLoopConfig, GameLoopHandle};
pub use manager::{StageInbox, TimerManager};
pub use crate::util::TimerId;
