//! Pooled, reference-counted payload buffer.
//!
//! §4.1 describes the source's manual-refcount buffer pool ("the
//! last holder returns the buffer to the pool exactly once"; "double-release
//! is a fatal bug"). In Rust that invariant is enforced structurally rather
//! than by bookkeeping: [`Payload`] is an `Arc<Bytes>` plus a return handle,
//! and the buffer goes back to the [`BufferPool`] from a single `Drop` impl
//! that only runs once the last clone disappears. Double-release and
//! use-after-release are therefore not reachable from safe code; the pool
//! still exposes rented/returned counters so tests can assert the lifetime
//! property from §8 (testable property 10).

// Layer 1: Standard library imports
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use bytes::Bytes;
use parking_lot::Mutex;

// Layer 3: Internal module imports
// (none)

/// Pool of reusable byte buffers. Buffers above `max_pooled_capacity` are not
/// returned (they're freed instead), so one oversized payload can't pin a
/// large allocation in the pool forever.
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
    max_pooled: usize,
    max_pooled_capacity: usize,
    rented: AtomicUsize,
    returned: AtomicUsize,
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("rented", &self.rented())
            .field("returned", &self.returned())
            .finish()
    }
}

impl BufferPool {
    pub fn new(max_pooled: usize, max_pooled_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::with_capacity(max_pooled)),
            max_pooled,
            max_pooled_capacity,
            rented: AtomicUsize::new(0),
            returned: AtomicUsize::new(0),
        })
    }

    pub fn rented(&self) -> usize {
        self.rented.load(Ordering::Relaxed)
    }

    pub fn returned(&self) -> usize {
        self.returned.load(Ordering::Relaxed)
    }

    /// Rent a buffer with at least `capacity` bytes, reusing a pooled one
    /// where possible.
    pub fn rent(self: &Arc<Self>, capacity: usize) -> Vec<u8> {
        self.rented.fetch_add(1, Ordering::Relaxed);
        let mut free = self.free.lock();
        if let Some(pos) = free.iter().position(|buf| buf.capacity() >= capacity) {
            let mut buf = free.swap_remove(pos);
            buf.clear();
            buf
        } else {
            Vec::with_capacity(capacity)
        }
    }

    fn give_back(&self, mut buf: Vec<u8>) {
        self.returned.fetch_add(1, Ordering::Relaxed);
        if buf.capacity() > self.max_pooled_capacity {
            return;
        }
        buf.clear();
        let mut free = self.free.lock();
        if free.len() < self.max_pooled {
            free.push(buf);
        }
    }
}

struct PooledBuffer {
    bytes: Bytes,
    pool: Option<Arc<BufferPool>>,
    raw_capacity: usize,
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            let buf = Vec::with_capacity(self.raw_capacity);
            pool.give_back(buf);
        }
    }
}

/// Opaque byte buffer carried by a [`crate::packet::Packet`].
///
/// Cloning a `Payload` is cheap (an `Arc` bump); the pool's buffer is
/// returned to the pool when the last clone is dropped, never before and
/// never twice, by construction.
#[derive(Clone)]
pub struct Payload {
    inner: Arc<PooledBuffer>,
}

impl Payload {
    /// Wraps pooled bytes (the default, owning form from §4.1).
    pub fn from_pool(pool: Arc<BufferPool>, data: Vec<u8>) -> Self {
        let raw_capacity = data.capacity();
        Self {
            inner: Arc::new(PooledBuffer {
                bytes: Bytes::from(data),
                pool: Some(pool),
                raw_capacity,
            }),
        }
    }

    /// Wraps bytes with no pool affiliation: a zero-copy view that is never
    /// returned anywhere (§4.1's "zero-copy variant"). Suitable for
    /// `'static` slices or data a caller owns and keeps alive independently.
    pub fn zero_copy(data: impl Into<Bytes>) -> Self {
        Self {
            inner: Arc::new(PooledBuffer {
                bytes: data.into(),
                pool: None,
                raw_capacity: 0,
            }),
        }
    }

    pub fn empty() -> Self {
        Self::zero_copy(Bytes::new())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.inner.bytes
    }

    pub fn len(&self) -> usize {
        self.inner.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.bytes.is_empty()
    }

    /// Number of live handles to the underlying buffer; `1` means this call
    /// holds the only reference.
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload").field("len", &self.len()).finish()
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}
