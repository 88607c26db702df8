//! Trade records and their state machine.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::lock::AssetLockKey;

/// Unique id of a trade, shared by both nodes involved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TradeId(String);

impl TradeId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for TradeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TradeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Lifecycle of a trade.
///
/// ```text
///            ┌──► Accepted ──► Completed
///            │        └──────► Failed
/// Pending ───┼──► Denied
///            ├──► Expired
///            └──► Failed
/// ```
///
/// `Pending` is the only state accept, deny and expiry may start from.
/// Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeState {
    Pending,
    /// Accept claimed the trade and the exchange is in flight.
    Accepted,
    Denied,
    Expired,
    Completed,
    Failed,
}

impl TradeState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TradeState::Denied | TradeState::Expired | TradeState::Completed | TradeState::Failed
        )
    }

    pub fn can_transition(&self, to: TradeState) -> bool {
        use TradeState::*;
        matches!(
            (self, to),
            (Pending, Accepted)
                | (Pending, Denied)
                | (Pending, Expired)
                | (Pending, Failed)
                | (Accepted, Completed)
                | (Accepted, Failed)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeState::Pending => "pending",
            TradeState::Accepted => "accepted",
            TradeState::Denied => "denied",
            TradeState::Expired => "expired",
            TradeState::Completed => "completed",
            TradeState::Failed => "failed",
        }
    }
}

impl fmt::Display for TradeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TradeRequest
// ---------------------------------------------------------------------------

/// One trade between a requester and a target.
///
/// The requester's side is fixed at creation. The target picks the slot
/// they give up only when accepting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    pub trade_id: TradeId,
    pub requester_id: String,
    pub requester_node: String,
    pub requester_slot: u8,
    pub target_id: String,
    pub target_node: String,
    pub created_at: DateTime<Utc>,
    pub state: TradeState,
}

impl TradeRequest {
    pub fn new(
        requester_id: impl Into<String>,
        requester_node: impl Into<String>,
        requester_slot: u8,
        target_id: impl Into<String>,
        target_node: impl Into<String>,
    ) -> Self {
        Self {
            trade_id: TradeId::generate(),
            requester_id: requester_id.into(),
            requester_node: requester_node.into(),
            requester_slot,
            target_id: target_id.into(),
            target_node: target_node.into(),
            created_at: Utc::now(),
            state: TradeState::Pending,
        }
    }

    /// Both participants are on the same node.
    pub fn is_local(&self) -> bool {
        self.requester_node == self.target_node
    }

    /// The lock held on the requester's offered slot.
    pub fn requester_lock(&self) -> AssetLockKey {
        AssetLockKey::new(&self.requester_node, &self.requester_id, self.requester_slot)
    }

    /// The lock the target takes on the slot they give up.
    ///
    /// Keyed under the requester's node for both participants, so the pair
    /// of locks for a trade lives in one namespace.
    pub fn target_lock(&self, target_slot: u8) -> AssetLockKey {
        AssetLockKey::new(&self.requester_node, &self.target_id, target_slot)
    }

    /// Every lock the target must hold on `target_slot` while accepting.
    ///
    /// A remote target also takes the slot's key on its own node, which is
    /// the key its own outgoing offers lock. The home key comes first.
    pub fn target_locks(&self, target_slot: u8) -> Vec<AssetLockKey> {
        let mut locks = Vec::with_capacity(2);
        if !self.is_local() {
            locks.push(AssetLockKey::new(&self.target_node, &self.target_id, target_slot));
        }
        locks.push(self.target_lock(target_slot));
        locks
    }

    /// Whether the trade has outlived `timeout` at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        (now - self.created_at).num_milliseconds() > timeout.as_millis() as i64
    }
}
