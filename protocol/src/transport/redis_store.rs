//! Redis transport.
//!
//! Commands go through a `deadpool-redis` pool. Every subscription gets its
//! own pub/sub connection from the underlying client and a small forwarding
//! task that pushes payloads into the [`Subscription`] buffer. Dropping the
//! subscription aborts the task, which closes the connection and with it
//! the server-side subscription.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use futures::StreamExt;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{ttl_millis, Subscription, Transport, TransportError};

/// Deletes `KEYS[1]` only while it still holds `ARGV[1]`.
const COMPARE_AND_DELETE: &str = r#"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    else
        return 0
    end
"#;

/// Transport backed by a Redis server.
#[derive(Clone)]
pub struct RedisTransport {
    pool: Pool,
    client: redis::Client,
}

impl RedisTransport {
    /// Builds the pool and pub/sub client for `url`
    /// (e.g. `redis://127.0.0.1:6379`).
    ///
    /// Connections are opened lazily, so this succeeds even when the server
    /// is not reachable yet.
    pub fn connect(url: &str) -> Result<Self, TransportError> {
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| TransportError::Pool(e.to_string()))?;
        let client = redis::Client::open(url)?;
        info!(url, "redis transport initialized");
        Ok(Self { pool, client })
    }

    /// Round-trips a `PING` to verify the server is reachable.
    pub async fn ping(&self) -> Result<(), TransportError> {
        let mut conn = self.pool.get().await?;
        let _: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(())
    }
}

impl std::fmt::Debug for RedisTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisTransport")
            .field("pool", &self.pool.status())
            .finish()
    }
}

#[async_trait]
impl Transport for RedisTransport {
    async fn publish(&self, channel: &str, message: &str) -> Result<usize, TransportError> {
        let mut conn = self.pool.get().await?;
        let receivers: usize = conn.publish(channel, message).await?;
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, TransportError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let name = channel.to_string();
        let forward = tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(channel = %name, error = %e, "dropping non-text payload");
                        continue;
                    }
                };
                if sender.send(payload).is_err() {
                    break;
                }
            }
            debug!(channel = %name, "pub/sub forwarder finished");
        });

        Ok(Subscription::new(channel, receiver).with_teardown(move || forward.abort()))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, TransportError> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), TransportError> {
        let mut conn = self.pool.get().await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut *conn)
            .await?;
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, TransportError> {
        let mut conn = self.pool.get().await?;
        // SET ... NX answers OK when written and nil otherwise.
        let written: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut *conn)
            .await?;
        Ok(written.is_some())
    }

    async fn delete(&self, key: &str) -> Result<bool, TransportError> {
        let mut conn = self.pool.get().await?;
        let removed: u64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, TransportError> {
        let mut conn = self.pool.get().await?;
        let removed: i64 = redis::Script::new(COMPARE_AND_DELETE)
            .key(key)
            .arg(expected)
            .invoke_async(&mut *conn)
            .await?;
        Ok(removed > 0)
    }
}
