//! # Message Transport
//!
//! Thin abstraction over the two primitives every node shares: a
//! publish/subscribe broker and a key/value store with time-to-live entries.
//! Nothing above this layer knows which backend is in use.
//!
//! ## Architecture
//!
//! ```text
//! mod.rs         : Transport trait, Subscription handle, TransportError
//! memory.rs      : In-process broker + TTL store (tests, single-process clusters)
//! redis_store.rs : Redis backend (pooled commands, dedicated pub/sub client)
//! ```
//!
//! ## Semantics
//!
//! - `publish` is at-most-once. A message published while nobody is
//!   subscribed is dropped, exactly like Redis `PUBLISH`.
//! - `set_if_absent` and `delete_if_equals` are atomic on the store side.
//!   Callers must never emulate them with a read followed by a write.
//! - Dropping a [`Subscription`] tears the subscription down.

pub mod memory;
pub mod redis_store;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::MemoryTransport;
pub use redis_store::RedisTransport;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by a transport backend.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The Redis server returned an error or the connection failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// No pooled connection could be obtained.
    #[error("connection pool error: {0}")]
    Pool(String),

    /// The backend was shut down.
    #[error("transport closed")]
    Closed,
}

impl From<deadpool_redis::PoolError> for TransportError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Self::Pool(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A live subscription to one channel.
///
/// Messages are buffered until read with [`recv`](Self::recv). Dropping the
/// handle runs the backend's teardown, after which nothing more is buffered.
pub struct Subscription {
    channel: String,
    receiver: mpsc::UnboundedReceiver<String>,
    teardown: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Wraps a receiver fed by the backend.
    pub fn new(channel: impl Into<String>, receiver: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            channel: channel.into(),
            receiver,
            teardown: None,
        }
    }

    /// Registers the closure run when the subscription is dropped.
    pub fn with_teardown(mut self, teardown: impl FnOnce() + Send + 'static) -> Self {
        self.teardown = Some(Box::new(teardown));
        self
    }

    /// The channel this subscription listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Waits for the next message. Returns `None` once the backend has
    /// closed the subscription.
    pub async fn recv(&mut self) -> Option<String> {
        self.receiver.recv().await
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.receiver.close();
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// The pub/sub + expiring key/value substrate shared by all nodes.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Publishes `message` on `channel`. Returns how many subscribers
    /// received it.
    async fn publish(&self, channel: &str, message: &str) -> Result<usize, TransportError>;

    /// Subscribes to `channel`. The subscription is active once this returns.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError>;

    /// Reads a live (unexpired) value.
    async fn get(&self, key: &str) -> Result<Option<String>, TransportError>;

    /// Unconditionally stores `value` for `ttl`.
    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), TransportError>;

    /// Stores `value` for `ttl` only if `key` holds no live value.
    /// Returns `true` if the value was written.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, TransportError>;

    /// Removes `key`. Returns `true` if a live value was removed.
    async fn delete(&self, key: &str) -> Result<bool, TransportError>;

    /// Removes `key` only if it currently holds `expected`.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, TransportError>;
}

/// Milliseconds in `ttl`, clamped to at least 1 (Redis rejects `PX 0`).
pub(crate) fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}
