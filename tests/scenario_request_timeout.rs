//! §8 scenario S6 / testable property 7: a `request_to_service`
//! call against a peer that never replies resolves with `request_timeout`
//! once the configured timeout elapses, and a late reply after that point
//! is silently discarded.

// Layer 1: Standard library imports
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use stagecore::config::RuntimeConfig;
use stagecore::context::RuntimeContext;
use stagecore::error::ErrorCode;
use stagecore::packet::{Packet, Payload};
use stagecore::request_cache::spawn_sweeper;
use stagecore::util::MsgSeq;

mod common;

#[tokio::test(start_paused = true)]
async fn unanswered_request_times_out_and_late_replies_are_discarded() {
    let ctx = RuntimeContext::new(RuntimeConfig::default(), None);
    let _sweeper = spawn_sweeper(ctx.request_cache.clone(), Duration::from_millis(20));

    let seq = ctx.request_cache.next_seq();
    let fut = ctx.request_cache.register_future(seq, Duration::from_millis(200));

    tokio::time::sleep(Duration::from_millis(250)).await;
    let result = fut.await;
    assert_eq!(result.unwrap_err().code(), ErrorCode::RequestTimeout.code());

    // A reply arriving after the timeout window must be a no-op, not a panic.
    let late_reply = Packet::request("Pong", 1, Payload::empty()).with_seq(seq);
    assert!(!ctx.request_cache.try_complete(seq, late_reply));
    assert_eq!(ctx.request_cache.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn request_resolves_exactly_once_even_if_reply_and_timeout_race() {
    let ctx = RuntimeContext::new(RuntimeConfig::default(), None);
    let seq = MsgSeq(1);
    let fut = ctx.request_cache.register_future(seq, Duration::from_millis(50));

    // Reply arrives just before the deadline.
    tokio::time::sleep(Duration::from_millis(10)).await;
    let reply = Packet::request("Pong", 1, Payload::empty()).with_seq(seq);
    assert!(ctx.request_cache.try_complete(seq, reply));

    let result = fut.await;
    assert!(result.is_ok());
    // The entry is gone; a duplicate late reply is a no-op, not a double-delivery.
    assert!(!ctx.request_cache.try_complete(seq, Packet::request("Pong", 1, Payload::empty()).with_seq(seq)));
}
