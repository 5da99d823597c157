//! Request/reply correlation table (§4.2).
//!
//! **Reply delivery contract.** Completions run on the delivering thread —
//! the thread that received the reply off the wire — never posted back onto
//! the originating stage's event loop. §9 documents this as the
//! single highest-impact design decision in the whole system: queueing
//! completions into the stage loop was measured at roughly an 18x
//! throughput regression on server-to-server request/reply workloads. A
//! callback that needs to touch stage state must explicitly enqueue a
//! follow-up message itself.

// Layer 1: Standard library imports
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

// Layer 2: Third-party crate imports
use dashmap::DashMap;
use tokio::sync::oneshot;

// Layer 3: Internal module imports
use crate::error::ErrorCode;
use crate::packet::Packet;
use crate::util::{MsgSeq, SeqGenerator};

/// What to do with an incoming reply for a given sequence id.
enum Waiter {
    Callback(Box<dyn FnOnce(Result<Packet, ErrorCode>) + Send>),
    Future(oneshot::Sender<Result<Packet, ErrorCode>>),
}

struct Entry {
    waiter: Waiter,
    deadline: Instant,
}

/// Process-local table correlating outbound requests with inbound replies
/// by sequence id (§3, "RequestCache entry").
#[derive(Default)]
pub struct RequestCache {
    entries: DashMap<MsgSeq, Entry>,
    seq_gen: SeqGenerator,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// §4.2: "atomically increments a shared counter; if wrap
    /// produces 0, increments again."
    pub fn next_seq(&self) -> MsgSeq {
        self.seq_gen.next_seq()
    }

    /// Installs a one-shot completion for `seq`.
    pub fn register_callback<F>(&self, seq: MsgSeq, timeout: Duration, callback: F)
    where
        F: FnOnce(Result<Packet, ErrorCode>) + Send + 'static,
    {
        self.entries.insert(
            seq,
            Entry {
                waiter: Waiter::Callback(Box::new(callback)),
                deadline: Instant::now() + timeout,
            },
        );
    }

    /// Returns a future that resolves with the reply packet, or
    /// `Err(ErrorCode::RequestTimeout)` once the sweeper reaps it.
    pub fn register_future(&self, seq: MsgSeq, timeout: Duration) -> ReplyFuture {
        let (tx, rx) = oneshot::channel();
        self.entries.insert(
            seq,
            Entry {
                waiter: Waiter::Future(tx),
                deadline: Instant::now() + timeout,
            },
        );
        ReplyFuture { rx }
    }

    /// If an entry exists for `seq`, removes it and delivers `reply`;
    /// returns whether it was consumed (§4.2). The Dispatcher
    /// falls through to stage-inbox routing when this returns `false`,
    /// covering the legitimate reply-vs-timeout race.
    pub fn try_complete(&self, seq: MsgSeq, reply: Packet) -> bool {
        match self.entries.remove(&seq) {
            Some((_, entry)) => {
                deliver(entry.waiter, Ok(reply));
                true
            }
            None => false,
        }
    }

    /// Removes every entry whose deadline has passed and delivers
    /// `request_timeout`. Intended to be driven by a coarse-grained
    /// background sweeper (§4.2, 50-100ms tick).
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<MsgSeq> = self
            .entries
            .iter()
            .filter(|e| e.deadline <= now)
            .map(|e| *e.key())
            .collect();
        let count = expired.len();
        for seq in expired {
            if let Some((_, entry)) = self.entries.remove(&seq) {
                deliver(entry.waiter, Err(ErrorCode::RequestTimeout));
            }
        }
        count
    }

    /// Invoked on shutdown: delivers `request_timeout` to every waiter
    /// (§7, "Shutdown-time").
    pub fn cancel_all(&self) {
        let seqs: Vec<MsgSeq> = self.entries.iter().map(|e| *e.key()).collect();
        for seq in seqs {
            if let Some((_, entry)) = self.entries.remove(&seq) {
                deliver(entry.waiter, Err(ErrorCode::RequestTimeout));
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.entries.len()
    }
}

fn deliver(waiter: Waiter, result: Result<Packet, ErrorCode>) {
    match waiter {
        Waiter::Callback(cb) => cb(result),
        Waiter::Future(tx) => {
            let _ = tx.send(result);
        }
    }
}

/// Future returned by [`RequestCache::register_future`].
pub struct ReplyFuture {
    rx: oneshot::Receiver<Result<Packet, ErrorCode>>,
}

impl Future for ReplyFuture {
    type Output = Result<Packet, ErrorCode>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // Sender dropped without sending: treat as an internal failure,
            // not a protocol timeout, so callers can distinguish the two.
            Poll::Ready(Err(_)) => Poll::Ready(Err(ErrorCode::InternalError)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Payload;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn packet(seq: u16) -> Packet {
        Packet::request("Pong", 1, Payload::empty()).with_seq(MsgSeq(seq))
    }

    #[test]
    fn next_seq_skips_zero() {
        let cache = RequestCache::new();
        for _ in 0..5 {
            assert!(cache.next_seq().is_request());
        }
    }

    #[test]
    fn try_complete_delivers_to_registered_callback() {
        let cache = RequestCache::new();
        let delivered = Arc::new(AtomicBool::new(false));
        let flag = delivered.clone();
        cache.register_callback(MsgSeq(1), Duration::from_secs(5), move |result| {
            assert!(result.is_ok());
            flag.store(true, Ordering::Relaxed);
        });
        assert!(cache.try_complete(MsgSeq(1), packet(1)));
        assert!(delivered.load(Ordering::Relaxed));
    }

    #[test]
    fn try_complete_on_unknown_seq_returns_false() {
        let cache = RequestCache::new();
        assert!(!cache.try_complete(MsgSeq(99), packet(99)));
    }

    #[test]
    fn sweep_expired_delivers_timeout_and_removes_entry() {
        let cache = RequestCache::new();
        let timed_out = Arc::new(AtomicBool::new(false));
        let flag = timed_out.clone();
        cache.register_callback(MsgSeq(1), Duration::from_millis(0), move |result| {
            flag.store(result.is_err(), Ordering::Relaxed);
        });
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.sweep_expired(), 1);
        assert!(timed_out.load(Ordering::Relaxed));
        assert_eq!(cache.pending_count(), 0);
    }

    #[tokio::test]
    async fn register_future_resolves_on_reply() {
        let cache = RequestCache::new();
        let fut = cache.register_future(MsgSeq(1), Duration::from_secs(5));
        assert!(cache.try_complete(MsgSeq(1), packet(1)));
        let result = fut.await;
        assert!(result.is_ok());
    }

    #[test]
    fn cancel_all_delivers_timeout_to_every_waiter() {
        let cache = RequestCache::new();
        let a = Arc::new(AtomicBool::new(false));
        let b = Arc::new(AtomicBool::new(false));
        let (fa, fb) = (a.clone(), b.clone());
        cache.register_callback(MsgSeq(1), Duration::from_secs(5), move |r| fa.store(r.is_err(), Ordering::Relaxed));
        cache.register_callback(MsgSeq(2), Duration::from_secs(5), move |r| fb.store(r.is_err(), Ordering::Relaxed));
        cache.cancel_all();
        assert!(a.load(Ordering::Relaxed));
        assert!(b.load(Ordering::Relaxed));
        assert_eq!(cache.pending_count(), 0);
    }
}
