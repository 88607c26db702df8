//! Player directory.
//!
//! Records which node each player is connected to, as `presence:<playerId>`
//! entries in the shared store. A node registers players on connect and
//! refreshes them periodically. An entry that is not refreshed lapses, so a
//! crashed node's players disappear on their own.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::{presence_key, PRESENCE_TTL};
use crate::transport::{Transport, TransportError};

#[derive(Clone)]
pub struct PlayerDirectory {
    transport: Arc<dyn Transport>,
    ttl: Duration,
}

impl PlayerDirectory {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_ttl(transport, PRESENCE_TTL)
    }

    pub fn with_ttl(transport: Arc<dyn Transport>, ttl: Duration) -> Self {
        Self { transport, ttl }
    }

    /// Records (or refreshes) `player_id` as connected to `node_id`.
    pub async fn register(&self, player_id: &str, node_id: &str) -> Result<(), TransportError> {
        self.transport
            .set_with_ttl(&presence_key(player_id), node_id, self.ttl)
            .await?;
        debug!(player = player_id, node = node_id, "presence registered");
        Ok(())
    }

    /// Removes the entry, unless the player has since moved to another node.
    pub async fn unregister(&self, player_id: &str, node_id: &str) -> Result<bool, TransportError> {
        self.transport
            .delete_if_equals(&presence_key(player_id), node_id)
            .await
    }

    /// The node `player_id` is connected to.
    pub async fn node_of(&self, player_id: &str) -> Result<Option<String>, TransportError> {
        self.transport.get(&presence_key(player_id)).await
    }
}
