//! In-process transport.
//!
//! A broker and TTL store living in one process. Several coordinators can
//! share a clone to form a cluster without any external service. Expiry is
//! measured on `tokio::time`, so paused-clock tests see TTLs elapse as the
//! clock advances.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::trace;

use super::{Subscription, Transport, TransportError};

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug)]
struct Subscriber {
    id: u64,
    sender: mpsc::UnboundedSender<String>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: DashMap<String, StoredValue>,
    channels: DashMap<String, Vec<Subscriber>>,
    next_subscriber: AtomicU64,
}

impl Inner {
    fn unsubscribe(&self, channel: &str, id: u64) {
        if let Some(mut subscribers) = self.channels.get_mut(channel) {
            subscribers.retain(|s| s.id != id);
        }
        self.channels.remove_if(channel, |_, subs| subs.is_empty());
    }
}

/// Shared in-memory broker and key/value store.
///
/// Cloning is cheap and every clone sees the same channels and keys.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .get(channel)
            .map(|subs| subs.iter().filter(|s| !s.sender.is_closed()).count())
            .unwrap_or(0)
    }

    /// Number of channels with at least one subscriber.
    pub fn active_channels(&self) -> usize {
        self.inner
            .channels
            .iter()
            .filter(|subs| subs.iter().any(|s| !s.sender.is_closed()))
            .count()
    }

    /// Number of unexpired keys whose name starts with `prefix`.
    pub fn live_keys_with_prefix(&self, prefix: &str) -> usize {
        let now = Instant::now();
        self.inner
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix) && e.value().is_live(now))
            .count()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, channel: &str, message: &str) -> Result<usize, TransportError> {
        let Some(mut subscribers) = self.inner.channels.get_mut(channel) else {
            trace!(channel, "publish with no subscribers");
            return Ok(0);
        };
        subscribers.retain(|s| !s.sender.is_closed());
        let delivered = subscribers
            .iter()
            .filter(|s| s.sender.send(message.to_string()).is_ok())
            .count();
        Ok(delivered)
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner
            .channels
            .entry(channel.to_string())
            .or_default()
            .push(Subscriber { id, sender });

        let inner = Arc::clone(&self.inner);
        let name = channel.to_string();
        Ok(Subscription::new(channel, receiver)
            .with_teardown(move || inner.unsubscribe(&name, id)))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TransportError> {
        let now = Instant::now();
        let found = self
            .inner
            .entries
            .get(key)
            .map(|e| (e.is_live(now), e.value.clone()));
        match found {
            Some((true, value)) => Ok(Some(value)),
            Some((false, _)) => {
                self.inner.entries.remove_if(key, |_, e| !e.is_live(now));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), TransportError> {
        self.inner.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, TransportError> {
        let now = Instant::now();
        let stored = StoredValue {
            value: value.to_string(),
            expires_at: now + ttl,
        };
        match self.inner.entries.entry(key.to_string()) {
            Entry::Occupied(mut existing) => {
                if existing.get().is_live(now) {
                    return Ok(false);
                }
                existing.insert(stored);
                Ok(true)
            }
            Entry::Vacant(slot) => {
                slot.insert(stored);
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, TransportError> {
        let now = Instant::now();
        Ok(self
            .inner
            .entries
            .remove(key)
            .map(|(_, e)| e.is_live(now))
            .unwrap_or(false))
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, TransportError> {
        let now = Instant::now();
        Ok(self
            .inner
            .entries
            .remove_if(key, |_, e| e.is_live(now) && e.value == expected)
            .is_some())
    }
}
