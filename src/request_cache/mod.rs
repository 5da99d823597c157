//! Request Cache (§4.2): correlates outbound requests with
//! inbound replies by sequence number, with background timeout sweeping.

pub mod cache;
pub mod sweeper;

pub use cache::{ReplyFuture, RequestCache};
pub use sweeper::{spawn as spawn_sweeper, DEFAULT_SWEEP_INTERVAL};
