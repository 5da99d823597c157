//! Small shared utilities: identifiers and sequence generators.

pub mod ids;

pub use ids::{MsgSeq, PeerId, SeqGenerator, StageId, TimerId, TimerIdGenerator};
