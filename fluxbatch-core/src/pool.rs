//! Host message pool
//!
//! Messages flowing through the stage are borrowed from a bounded pool and
//! must go back exactly once. [`PooledMessage`] returns itself on
//! [`recycle`](PooledMessage::recycle) or on drop, whichever comes first.

use crate::Message;
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Bounded pool of reusable messages
#[derive(Clone)]
pub struct MessagePool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    capacity: usize,
    max_loops: u32,
    free: Mutex<Vec<Message>>,
    outstanding: AtomicUsize,
    recycled: AtomicU64,
}

impl MessagePool {
    /// Create a pool handing out at most `capacity` messages at once.
    /// Messages re-injected more than `max_loops` times are refused.
    pub fn new(capacity: usize, max_loops: u32) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                capacity,
                max_loops,
                free: Mutex::new(Vec::with_capacity(capacity)),
                outstanding: AtomicUsize::new(0),
                recycled: AtomicU64::new(0),
            }),
        }
    }

    /// Take a cleared message whose loop count is one more than `loop_count`.
    ///
    /// Returns `None` when every message is checked out or the loop limit
    /// would be exceeded.
    pub fn acquire(&self, loop_count: u32) -> Option<PooledMessage> {
        let loop_count = loop_count.saturating_add(1);
        if loop_count > self.inner.max_loops {
            return None;
        }

        self.inner
            .outstanding
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.inner.capacity).then_some(n + 1)
            })
            .ok()?;

        let message = self.inner.free.lock().pop().unwrap_or_default();

        Some(PooledMessage {
            message,
            loop_count,
            pool: Some(self.inner.clone()),
        })
    }

    /// Take a message and fill it with `message`
    pub fn acquire_with(&self, message: Message) -> Option<PooledMessage> {
        let mut pooled = self.acquire(0)?;
        pooled.message = message;
        Some(pooled)
    }

    /// Maximum number of messages checked out at once
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Loop limit for re-injected messages
    pub fn max_loops(&self) -> u32 {
        self.inner.max_loops
    }

    /// Messages currently checked out
    pub fn outstanding(&self) -> usize {
        self.inner.outstanding.load(Ordering::Acquire)
    }

    /// Total messages returned so far
    pub fn recycled(&self) -> u64 {
        self.inner.recycled.load(Ordering::Relaxed)
    }
}

impl PoolInner {
    fn release(&self, mut message: Message) {
        message.clear();
        self.free.lock().push(message);
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        self.recycled.fetch_add(1, Ordering::Relaxed);
    }
}

/// A message checked out of a [`MessagePool`]
pub struct PooledMessage {
    message: Message,
    loop_count: u32,
    pool: Option<Arc<PoolInner>>,
}

impl PooledMessage {
    /// How many times this message has passed through an injecting stage
    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    /// Replace the wrapped message
    pub fn set_message(&mut self, message: Message) {
        self.message = message;
    }

    /// Return the message to its pool
    pub fn recycle(self) {
        drop(self)
    }
}

impl Deref for PooledMessage {
    type Target = Message;

    fn deref(&self) -> &Message {
        &self.message
    }
}

impl DerefMut for PooledMessage {
    fn deref_mut(&mut self) -> &mut Message {
        &mut self.message
    }
}

impl Drop for PooledMessage {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(std::mem::take(&mut self.message));
        }
    }
}

impl std::fmt::Debug for PooledMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledMessage")
            .field("message", &self.message)
            .field("loop_count", &self.loop_count)
            .finish()
    }
}
