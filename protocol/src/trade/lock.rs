//! Distributed asset locks.
//!
//! A lock is a store key `lock:<node>:<owner>:<slot>` whose value is the id
//! of the trade holding it. Acquisition is a conditional set with a TTL and
//! release is a compare-and-delete, so a holder can never release someone
//! else's lock and a crashed holder's lock lapses on its own.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::types::TradeId;
use crate::transport::{Transport, TransportError};

/// Identifies one asset slot on one node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetLockKey {
    pub node: String,
    pub owner: String,
    pub slot: u8,
}

impl AssetLockKey {
    pub fn new(node: impl Into<String>, owner: impl Into<String>, slot: u8) -> Self {
        Self {
            node: node.into(),
            owner: owner.into(),
            slot,
        }
    }

    pub fn storage_key(&self) -> String {
        format!("lock:{}:{}:{}", self.node, self.owner, self.slot)
    }
}

impl fmt::Display for AssetLockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.node, self.owner, self.slot)
    }
}

#[derive(Clone)]
pub struct LockManager {
    transport: Arc<dyn Transport>,
}

impl LockManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Takes the lock for `holder` unless someone already holds it.
    pub async fn try_acquire(
        &self,
        key: &AssetLockKey,
        holder: &TradeId,
        ttl: Duration,
    ) -> Result<bool, TransportError> {
        let acquired = self
            .transport
            .set_if_absent(&key.storage_key(), holder.as_str(), ttl)
            .await?;
        debug!(lock = %key, trade = %holder, acquired, "lock acquire");
        Ok(acquired)
    }

    /// Releases the lock if `holder` still owns it. Releasing a lock that
    /// expired or belongs to another trade is a no-op.
    pub async fn release(&self, key: &AssetLockKey, holder: &TradeId) -> Result<bool, TransportError> {
        let released = self
            .transport
            .delete_if_equals(&key.storage_key(), holder.as_str())
            .await?;
        trace!(lock = %key, trade = %holder, released, "lock release");
        Ok(released)
    }

    /// The trade currently holding the lock.
    pub async fn holder(&self, key: &AssetLockKey) -> Result<Option<TradeId>, TransportError> {
        Ok(self
            .transport
            .get(&key.storage_key())
            .await?
            .map(TradeId::from))
    }
}
