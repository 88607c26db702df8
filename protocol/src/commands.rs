//! Player-facing trade commands.
//!
//! Thin layer between whatever parses player input and the coordinator.
//! Each command returns a [`CommandReply`] carrying the message shown to
//! the player. Details of a failure go to the log, not to the player.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::directory::PlayerDirectory;
use crate::trade::{TradeCoordinator, TradeError};

/// Outcome of a command as shown to the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReply {
    pub success: bool,
    pub message: String,
}

impl CommandReply {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    /// `1` on success, `0` on failure.
    pub fn code(&self) -> i32 {
        i32::from(self.success)
    }
}

#[derive(Clone)]
pub struct TradeCommands {
    coordinator: Arc<TradeCoordinator>,
    directory: PlayerDirectory,
}

impl TradeCommands {
    pub fn new(coordinator: Arc<TradeCoordinator>, directory: PlayerDirectory) -> Self {
        Self {
            coordinator,
            directory,
        }
    }

    pub fn coordinator(&self) -> &Arc<TradeCoordinator> {
        &self.coordinator
    }

    /// `player` offers the asset in `slot` to `target`.
    pub async fn initiate(&self, player: &str, target: &str, slot: u8) -> CommandReply {
        let node = self.coordinator.node_id();
        let target_node = self.node_of(target).await;

        match self
            .coordinator
            .request_trade(player, node, slot, target, &target_node)
            .await
        {
            Ok(trade_id) => {
                debug!(trade = %trade_id, player, target, "initiate command succeeded");
                CommandReply::ok(format!(
                    "Trade request sent to {}. Waiting for response...",
                    target
                ))
            }
            Err(TradeError::AlreadyActive { .. }) => CommandReply::failure(
                "You already have an active trade request. Wait for it to expire or be processed.",
            ),
            Err(e) => {
                warn!(player, target, slot, error = %e, "initiate command failed");
                CommandReply::failure(format!(
                    "Could not initiate trade. Make sure the asset in slot {} can be traded.",
                    slot
                ))
            }
        }
    }

    /// `player` accepts `requester`'s offer, giving up the asset in `slot`.
    pub async fn accept(&self, player: &str, requester: &str, slot: u8) -> CommandReply {
        let Some(trade) = self.coordinator.find_pending(requester, player) else {
            return no_pending(requester);
        };

        match self
            .coordinator
            .accept_trade(&trade.trade_id, player, slot)
            .await
        {
            Ok(_) => CommandReply::ok(format!(
                "Trade accepted! Exchanging assets with {}...",
                requester
            )),
            Err(e) => {
                warn!(trade = %trade.trade_id, player, slot, error = %e, "accept command failed");
                CommandReply::failure(format!(
                    "Could not complete the trade. Make sure the asset in slot {} can be traded.",
                    slot
                ))
            }
        }
    }

    /// `player` refuses `requester`'s offer.
    pub async fn deny(&self, player: &str, requester: &str) -> CommandReply {
        let Some(trade) = self.coordinator.find_pending(requester, player) else {
            return no_pending(requester);
        };

        match self.coordinator.deny_trade(&trade.trade_id, player).await {
            Ok(_) => CommandReply::ok(format!("Trade request from {} denied.", requester)),
            Err(e) => {
                warn!(trade = %trade.trade_id, player, error = %e, "deny command failed");
                CommandReply::failure("Could not deny the trade. The request may have expired.")
            }
        }
    }

    /// The node `player` is on, or this node if the directory has no entry.
    async fn node_of(&self, player: &str) -> String {
        match self.directory.node_of(player).await {
            Ok(Some(node)) => node,
            Ok(None) => self.coordinator.node_id().to_string(),
            Err(e) => {
                warn!(player, error = %e, "directory lookup failed, assuming local player");
                self.coordinator.node_id().to_string()
            }
        }
    }
}

fn no_pending(requester: &str) -> CommandReply {
    CommandReply::failure(format!("No pending trade request from {}", requester))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TradeConfig;
    use crate::inventory::{Asset, Inventory, MemoryInventory};
    use crate::trade::NoopListener;
    use crate::transport::MemoryTransport;
    use serde_json::json;

    fn commands() -> (TradeCommands, Arc<MemoryInventory>) {
        let transport = Arc::new(MemoryTransport::new());
        let inventory = Arc::new(MemoryInventory::new());
        let coordinator = Arc::new(TradeCoordinator::new(
            "n1",
            transport.clone(),
            inventory.clone(),
            Arc::new(NoopListener),
            TradeConfig::default(),
        ));
        (
            TradeCommands::new(coordinator, PlayerDirectory::new(transport)),
            inventory,
        )
    }

    #[tokio::test]
    async fn initiate_and_accept() {
        let (cmds, inventory) = commands();
        inventory.put("alice", 1, Asset::new(json!("a"))).unwrap();
        inventory.put("bob", 2, Asset::new(json!("b"))).unwrap();

        let reply = cmds.initiate("alice", "bob", 1).await;
        assert_eq!(reply.code(), 1);
        assert_eq!(
            reply.message,
            "Trade request sent to bob. Waiting for response..."
        );

        let again = cmds.initiate("alice", "bob", 1).await;
        assert_eq!(again.code(), 0);
        assert!(again.message.starts_with("You already have an active trade"));

        let accepted = cmds.accept("bob", "alice", 2).await;
        assert!(accepted.success);
        assert_eq!(
            accepted.message,
            "Trade accepted! Exchanging assets with alice..."
        );
        assert_eq!(inventory.asset("alice", 1).unwrap().data, json!("b"));
    }

    #[tokio::test]
    async fn deny_without_request() {
        let (cmds, _) = commands();
        let reply = cmds.deny("bob", "alice").await;
        assert_eq!(reply, CommandReply::failure("No pending trade request from alice"));
    }

    #[tokio::test]
    async fn initiate_with_empty_slot_fails() {
        let (cmds, _) = commands();
        let reply = cmds.initiate("alice", "bob", 4).await;
        assert_eq!(
            reply.message,
            "Could not initiate trade. Make sure the asset in slot 4 can be traded."
        );
    }

    #[tokio::test]
    async fn deny_frees_requester() {
        let (cmds, inventory) = commands();
        inventory.put("alice", 1, Asset::new(json!("a"))).unwrap();
        assert!(cmds.initiate("alice", "bob", 1).await.success);

        let reply = cmds.deny("bob", "alice").await;
        assert_eq!(reply.message, "Trade request from alice denied.");
        assert!(cmds.initiate("alice", "carol", 1).await.success);
    }
}
