//! # Protocol Configuration & Constants
//!
//! Every timeout, TTL, key prefix and channel name used by the trade
//! protocol lives here. Nodes on the same cluster must agree on these
//! values, so changing one is a coordinated rollout, not a local tweak.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Timing Constants
// ---------------------------------------------------------------------------

/// Lifetime of a pending trade. Also the TTL of every asset lock and of the
/// serialized trade record shipped to the target node.
pub const TRADE_TIMEOUT: Duration = Duration::from_secs(120);

/// How long the initiator waits for the target node to confirm it received
/// a `trade_request`. This covers delivery only, never the human decision.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Round-trip bound for `trade_accept` and `trade_deny`.
pub const ACCEPT_TIMEOUT: Duration = Duration::from_secs(10);

/// TTL of the transient asset payloads exchanged during the accept phase.
pub const ACCEPT_PAYLOAD_TTL: Duration = Duration::from_secs(60);

/// How often the expiry sweeper scans the registry.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Lifetime of a presence entry. Nodes refresh it while the player stays
/// connected.
pub const PRESENCE_TTL: Duration = Duration::from_secs(300);

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

/// Lowest addressable inventory slot.
pub const MIN_SLOT: u8 = 1;

/// Highest addressable inventory slot (a party holds six).
pub const MAX_SLOT: u8 = 6;

// ---------------------------------------------------------------------------
// Channel Names
// ---------------------------------------------------------------------------

/// Best-effort cleanup notices, heard by every node.
pub const BROADCAST_CHANNEL: &str = "broadcast";

/// Fire-and-forget notifications. Nobody is required to listen.
pub const EVENTS_CHANNEL: &str = "events";

/// Returns the inbound request channel of a node: `node:<nodeId>:requests`.
pub fn requests_channel(node_id: &str) -> String {
    format!("node:{}:requests", node_id)
}

/// Returns a fresh private reply channel owned by `node_id`.
pub fn reply_channel(node_id: &str, correlation_id: &str) -> String {
    format!("reply:{}:{}", node_id, correlation_id)
}

// ---------------------------------------------------------------------------
// Key Names
// ---------------------------------------------------------------------------

/// Key of the serialized trade record shipped to the target node.
pub fn trade_key(trade_id: &str) -> String {
    format!("trade:{}", trade_id)
}

/// Key of the target's asset, written by the target node during accept.
pub fn target_asset_key(trade_id: &str) -> String {
    format!("tradedata:{}:target", trade_id)
}

/// Key of the requester's asset, written by the requester node in reply.
pub fn requester_asset_key(trade_id: &str) -> String {
    format!("tradedata:{}:requester", trade_id)
}

/// Key recording which node a player is currently connected to.
pub fn presence_key(player_id: &str) -> String {
    format!("presence:{}", player_id)
}

// ---------------------------------------------------------------------------
// Runtime Configuration
// ---------------------------------------------------------------------------

/// Timeouts used by a [`TradeCoordinator`](crate::trade::TradeCoordinator).
///
/// Production nodes run with [`TradeConfig::default`]. Tests shrink the
/// timeouts so failure paths finish quickly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeConfig {
    /// Lifetime of a pending trade and TTL of its locks.
    pub trade_timeout: Duration,
    /// Delivery confirmation bound for cross-node requests.
    pub handshake_timeout: Duration,
    /// Round-trip bound for cross-node accept and deny.
    pub accept_timeout: Duration,
    /// TTL of accept-phase asset payloads.
    pub payload_ttl: Duration,
    /// Interval between expiry sweeps.
    pub sweep_interval: Duration,
}

impl Default for TradeConfig {
    fn default() -> Self {
        Self {
            trade_timeout: TRADE_TIMEOUT,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            accept_timeout: ACCEPT_TIMEOUT,
            payload_ttl: ACCEPT_PAYLOAD_TTL,
            sweep_interval: SWEEP_INTERVAL,
        }
    }
}

/// Returns `true` if `slot` is an addressable inventory slot.
pub fn is_valid_slot(slot: u8) -> bool {
    (MIN_SLOT..=MAX_SLOT).contains(&slot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_constants_sanity() {
        // The handshake and round trips must fit well inside a trade's life.
        assert!(HANDSHAKE_TIMEOUT < ACCEPT_TIMEOUT);
        assert!(ACCEPT_TIMEOUT < TRADE_TIMEOUT);
        assert!(ACCEPT_PAYLOAD_TTL < TRADE_TIMEOUT);
        assert!(SWEEP_INTERVAL < HANDSHAKE_TIMEOUT);
    }

    #[test]
    fn test_channel_and_key_formats() {
        assert_eq!(requests_channel("n1"), "node:n1:requests");
        assert_eq!(reply_channel("n1", "abc"), "reply:n1:abc");
        assert_eq!(trade_key("t1"), "trade:t1");
        assert_eq!(target_asset_key("t1"), "tradedata:t1:target");
        assert_eq!(requester_asset_key("t1"), "tradedata:t1:requester");
        assert_eq!(presence_key("p1"), "presence:p1");
    }

    #[test]
    fn test_slot_range() {
        assert!(!is_valid_slot(0));
        assert!(is_valid_slot(MIN_SLOT));
        assert!(is_valid_slot(MAX_SLOT));
        assert!(!is_valid_slot(MAX_SLOT + 1));
    }

    #[test]
    fn test_default_config_matches_constants() {
        let config = TradeConfig::default();
        assert_eq!(config.trade_timeout, TRADE_TIMEOUT);
        assert_eq!(config.handshake_timeout, HANDSHAKE_TIMEOUT);
        assert_eq!(config.accept_timeout, ACCEPT_TIMEOUT);
    }
}
