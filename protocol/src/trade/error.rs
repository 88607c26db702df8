//! Error types for trade coordination.
//!
//! Every coordinator operation that can fail returns a [`TradeError`].
//! Callers that only care about the broad outcome use [`TradeError::kind`].

use thiserror::Error;

use super::registry::RegistryError;
use super::types::{TradeId, TradeState};
use crate::inventory::InventoryError;
use crate::messaging::{ChannelError, EnvelopeError, Reply};
use crate::transport::TransportError;

/// Broad classification of a failed trade operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A precondition did not hold. Nothing changed.
    Rejected,
    /// A peer node did not answer in time.
    Timeout,
    /// Another operation resolved the trade first.
    Conflict,
    /// Infrastructure failure (store, serialization, inventory).
    Failure,
}

#[derive(Debug, Error)]
pub enum TradeError {
    /// The requester already has an outstanding trade.
    #[error("{requester_id} already has an active trade request")]
    AlreadyActive {
        /// The requester.
        requester_id: String,
    },

    /// A player tried to trade with themselves.
    #[error("cannot trade with yourself")]
    SelfTrade,

    #[error("invalid slot {0}")]
    InvalidSlot(u8),

    /// The named slot is empty.
    #[error("{owner} has no asset in slot {slot}")]
    NoAsset {
        /// Player whose slot was read.
        owner: String,
        /// Slot that was read.
        slot: u8,
    },

    /// The asset in the slot may not be traded.
    #[error("asset in slot {slot} of {owner} cannot be traded")]
    Untradeable {
        /// Player whose slot was read.
        owner: String,
        /// Slot that was read.
        slot: u8,
    },

    /// Another trade holds the lock on this slot.
    #[error("asset lock {lock} is held by another trade")]
    AssetLocked {
        /// The contested lock key.
        lock: String,
    },

    #[error("trade {0} not found")]
    NotFound(TradeId),

    /// The caller is not the target of this trade.
    #[error("{player_id} is not the target of trade {trade_id}")]
    NotParticipant {
        /// The trade.
        trade_id: TradeId,
        /// The player who tried to act on it.
        player_id: String,
    },

    /// The trade already left the pending state.
    #[error("trade {trade_id} is already {state}")]
    AlreadyResolved {
        /// The trade.
        trade_id: TradeId,
        /// State it was found in.
        state: TradeState,
    },

    /// The operation must run on a different node.
    #[error("operation belongs on node {expected}, not {actual}")]
    WrongNode {
        /// Node that owns the operation.
        expected: String,
        /// Node it was invoked on.
        actual: String,
    },

    /// The target node never confirmed receipt of a trade request.
    #[error("node {node} unreachable: {reason}")]
    PeerUnreachable {
        /// The peer node.
        node: String,
        /// What went wrong.
        reason: String,
    },

    /// The peer node answered with something other than success.
    #[error("node {node} refused: {reply}")]
    PeerRejected {
        /// The peer node.
        node: String,
        /// The reply it sent.
        reply: Reply,
    },

    #[error("no reply from node {node} within {timeout_ms}ms")]
    Timeout {
        /// The silent peer node.
        node: String,
        /// Configured bound in milliseconds.
        timeout_ms: u64,
    },

    /// A payload the protocol expected in the store was gone.
    #[error("payload {0} missing from store")]
    PayloadMissing(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl TradeError {
    /// Converts a failed round trip to `node` into a trade error.
    pub fn from_channel(node: &str, err: ChannelError) -> Self {
        match err {
            ChannelError::Timeout { node, timeout_ms } => TradeError::Timeout { node, timeout_ms },
            ChannelError::Closed => TradeError::PeerUnreachable {
                node: node.to_string(),
                reason: "reply channel closed".to_string(),
            },
            ChannelError::Envelope(e) => TradeError::Envelope(e),
            ChannelError::Transport(e) => TradeError::Transport(e),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            TradeError::AlreadyActive { .. }
            | TradeError::SelfTrade
            | TradeError::InvalidSlot(_)
            | TradeError::NoAsset { .. }
            | TradeError::Untradeable { .. }
            | TradeError::AssetLocked { .. }
            | TradeError::NotFound(_)
            | TradeError::NotParticipant { .. }
            | TradeError::WrongNode { .. }
            | TradeError::PeerUnreachable { .. }
            | TradeError::PeerRejected { .. } => ErrorKind::Rejected,
            TradeError::AlreadyResolved { .. } => ErrorKind::Conflict,
            TradeError::Timeout { .. } => ErrorKind::Timeout,
            TradeError::PayloadMissing(_)
            | TradeError::Transport(_)
            | TradeError::Inventory(_)
            | TradeError::Envelope(_)
            | TradeError::Serialization(_)
            | TradeError::Registry(_) => ErrorKind::Failure,
        }
    }
}
