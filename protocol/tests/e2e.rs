//! End-to-end integration tests for the Shardtrade protocol.
//!
//! Each test builds a small cluster on one shared in-memory transport: every
//! node gets its own inventory, registry, coordinator and dispatcher, exactly
//! as separate processes would. Nodes only see each other through the
//! transport.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use shardtrade_protocol::config::TradeConfig;
use shardtrade_protocol::dispatcher::{DispatcherHandle, NodeDispatcher};
use shardtrade_protocol::inventory::{Asset, Inventory, MemoryInventory};
use shardtrade_protocol::trade::{
    ErrorKind, RecordingListener, TradeCoordinator, TradeError, TradeEvent, TradeState,
};
use shardtrade_protocol::transport::MemoryTransport;
use shardtrade_protocol::{PlayerDirectory, TradeCommands};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

struct Node {
    coordinator: Arc<TradeCoordinator>,
    inventory: Arc<MemoryInventory>,
    listener: Arc<RecordingListener>,
    dispatcher: Option<DispatcherHandle>,
}

impl Node {
    async fn start(transport: &MemoryTransport, id: &str) -> Self {
        let mut node = Self::offline(transport, id);
        node.dispatcher = Some(
            NodeDispatcher::start(Arc::clone(&node.coordinator))
                .await
                .expect("dispatcher starts"),
        );
        node
    }

    /// A node whose dispatcher is not running, so it never answers requests.
    fn offline(transport: &MemoryTransport, id: &str) -> Self {
        let inventory = Arc::new(MemoryInventory::new());
        let listener = Arc::new(RecordingListener::new());
        let coordinator = Arc::new(TradeCoordinator::new(
            id,
            Arc::new(transport.clone()),
            inventory.clone(),
            listener.clone(),
            TradeConfig::default(),
        ));
        Self {
            coordinator,
            inventory,
            listener,
            dispatcher: None,
        }
    }

    fn give(&self, owner: &str, slot: u8, tag: &str) -> Asset {
        let asset = Asset::new(json!({ "tag": tag }));
        self.inventory
            .put(owner, slot, asset.clone())
            .expect("valid slot");
        asset
    }

    async fn stop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.shutdown().await;
        }
    }
}

/// Lets spawned tasks on the other nodes run until `done` holds.
async fn settle(mut done: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("cluster never settled");
}

// ---------------------------------------------------------------------------
// Same-node trades
// ---------------------------------------------------------------------------

#[tokio::test]
async fn same_node_trade_swaps_slots() {
    let transport = MemoryTransport::new();
    let n1 = Node::start(&transport, "n1").await;
    let a = n1.give("p1", 3, "a");
    let b = n1.give("p2", 5, "b");

    let id = n1
        .coordinator
        .request_trade("p1", "n1", 3, "p2", "n1")
        .await
        .expect("request succeeds");
    let done = n1
        .coordinator
        .accept_trade(&id, "p2", 5)
        .await
        .expect("accept succeeds");

    assert_eq!(done.state, TradeState::Completed);
    assert_eq!(n1.inventory.asset("p1", 3), Some(b));
    assert_eq!(n1.inventory.asset("p2", 5), Some(a));
    assert!(n1.coordinator.registry().is_empty());
    assert_eq!(transport.live_keys_with_prefix("lock:"), 0);
}

#[tokio::test]
async fn expired_trade_frees_requester() {
    let transport = MemoryTransport::new();
    let n1 = Node::start(&transport, "n1").await;
    n1.give("p1", 1, "a");
    n1.give("p2", 1, "b");

    let id = n1
        .coordinator
        .request_trade("p1", "n1", 1, "p2", "n1")
        .await
        .unwrap();
    let expired = n1
        .coordinator
        .sweep_expired(Utc::now() + chrono::Duration::seconds(121))
        .await;
    assert_eq!(expired, vec![id.clone()]);

    let err = n1.coordinator.accept_trade(&id, "p2", 1).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Rejected);
    assert!(n1
        .coordinator
        .request_trade("p1", "n1", 1, "p2", "n1")
        .await
        .is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn accept_racing_expiry_has_one_winner() {
    for _ in 0..50 {
        let transport = MemoryTransport::new();
        let n1 = Node::offline(&transport, "n1");
        let a = n1.give("p1", 1, "a");
        n1.give("p2", 2, "b");
        let id = n1
            .coordinator
            .request_trade("p1", "n1", 1, "p2", "n1")
            .await
            .unwrap();

        let accept = {
            let coordinator = Arc::clone(&n1.coordinator);
            let id = id.clone();
            tokio::spawn(async move { coordinator.accept_trade(&id, "p2", 2).await })
        };
        let sweep = {
            let coordinator = Arc::clone(&n1.coordinator);
            tokio::spawn(async move {
                coordinator
                    .sweep_expired(Utc::now() + chrono::Duration::seconds(121))
                    .await
            })
        };
        let accepted = accept.await.unwrap();
        let expired = sweep.await.unwrap();

        let expiry_won = !expired.is_empty();
        assert_ne!(
            accepted.is_ok(),
            expiry_won,
            "exactly one of accept and expiry must win"
        );
        if accepted.is_ok() {
            assert_eq!(n1.inventory.asset("p2", 2), Some(a));
        } else {
            assert_eq!(n1.inventory.asset("p1", 1), Some(a));
        }
        assert!(n1.coordinator.registry().is_empty());
        assert_eq!(n1.coordinator.registry().outbound("p1"), None);
        assert_eq!(transport.live_keys_with_prefix("lock:"), 0);
    }
}

// ---------------------------------------------------------------------------
// Cross-node trades
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cross_node_trade_completes_on_both_nodes() {
    let transport = MemoryTransport::new();
    let n1 = Node::start(&transport, "n1").await;
    let n2 = Node::start(&transport, "n2").await;
    let a = n1.give("p1", 3, "a");
    let b = n2.give("p2", 5, "b");

    let id = n1
        .coordinator
        .request_trade("p1", "n1", 3, "p2", "n2")
        .await
        .expect("target node acknowledges");
    let mirrored = n2.coordinator.registry().get(&id).expect("target sees trade");
    assert_eq!(mirrored.state, TradeState::Pending);
    assert_eq!(transport.live_keys_with_prefix("trade:"), 0);

    let done = n2
        .coordinator
        .accept_trade(&id, "p2", 5)
        .await
        .expect("accept succeeds");
    assert_eq!(done.state, TradeState::Completed);

    assert_eq!(n1.inventory.asset("p1", 3), Some(b));
    assert_eq!(n2.inventory.asset("p2", 5), Some(a));
    assert!(n1.coordinator.registry().is_empty());
    assert!(n2.coordinator.registry().is_empty());
    assert_eq!(n1.coordinator.registry().outbound("p1"), None);
    assert_eq!(transport.live_keys_with_prefix("lock:"), 0);
    assert_eq!(transport.live_keys_with_prefix("tradedata:"), 0);

    assert_eq!(n1.listener.names(), vec!["trade_completed"]);
    assert_eq!(
        n2.listener.names(),
        vec!["trade_requested", "trade_completed"]
    );
    assert!(matches!(
        &n2.listener.events()[0],
        TradeEvent::Requested { requester_id, target_id, .. }
            if requester_id == "p1" && target_id == "p2"
    ));
}

#[tokio::test]
async fn cross_node_deny_releases_requester_node() {
    let transport = MemoryTransport::new();
    let n1 = Node::start(&transport, "n1").await;
    let n2 = Node::start(&transport, "n2").await;
    n1.give("p1", 3, "a");

    let id = n1
        .coordinator
        .request_trade("p1", "n1", 3, "p2", "n2")
        .await
        .unwrap();
    let denied = n2.coordinator.deny_trade(&id, "p2").await.unwrap();
    assert_eq!(denied.state, TradeState::Denied);

    assert!(n1.coordinator.registry().is_empty());
    assert!(n2.coordinator.registry().is_empty());
    assert_eq!(n1.coordinator.registry().outbound("p1"), None);
    assert_eq!(transport.live_keys_with_prefix("lock:"), 0);
    assert_eq!(n1.listener.names(), vec!["trade_denied"]);

    // Denying twice is refused and changes nothing.
    let again = n2.coordinator.deny_trade(&id, "p2").await.unwrap_err();
    assert_eq!(again.kind(), ErrorKind::Rejected);
}

#[tokio::test(start_paused = true)]
async fn unreachable_target_rolls_back_request() {
    let transport = MemoryTransport::new();
    let n1 = Node::start(&transport, "n1").await;
    let _n2 = Node::offline(&transport, "n2");
    n1.give("p1", 3, "a");

    let err = n1
        .coordinator
        .request_trade("p1", "n1", 3, "p2", "n2")
        .await
        .unwrap_err();
    assert!(matches!(err, TradeError::PeerUnreachable { ref node, .. } if node == "n2"));
    assert_eq!(err.kind(), ErrorKind::Rejected);

    assert!(n1.coordinator.registry().is_empty());
    assert_eq!(n1.coordinator.registry().outbound("p1"), None);
    assert_eq!(transport.live_keys_with_prefix("lock:"), 0);
    assert_eq!(transport.live_keys_with_prefix("trade:"), 0);
}

#[tokio::test(start_paused = true)]
async fn requester_node_dying_mid_accept_times_out() {
    let transport = MemoryTransport::new();
    let mut n1 = Node::start(&transport, "n1").await;
    let n2 = Node::start(&transport, "n2").await;
    let a = n1.give("p1", 3, "a");
    let b = n2.give("p2", 5, "b");

    let id = n1
        .coordinator
        .request_trade("p1", "n1", 3, "p2", "n2")
        .await
        .unwrap();
    n1.stop().await;

    let err = n2.coordinator.accept_trade(&id, "p2", 5).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert_eq!(n2.inventory.asset("p2", 5), Some(b));
    assert!(n2.coordinator.registry().is_empty());
    assert_eq!(n2.listener.names().last(), Some(&"trade_failed"));

    // The orphaned payload is cleaned up through the broadcast channel.
    settle(|| transport.live_keys_with_prefix("tradedata:") == 0).await;

    // The requester's own sweep frees its slot once the trade times out.
    let expired = n1
        .coordinator
        .sweep_expired(Utc::now() + chrono::Duration::seconds(121))
        .await;
    assert_eq!(expired, vec![id]);
    assert_eq!(n1.inventory.asset("p1", 3), Some(a));
    assert_eq!(transport.live_keys_with_prefix("lock:"), 0);
}

#[tokio::test]
async fn accept_after_requester_expired_is_refused() {
    let transport = MemoryTransport::new();
    let n1 = Node::start(&transport, "n1").await;
    let n2 = Node::start(&transport, "n2").await;
    n1.give("p1", 3, "a");
    let b = n2.give("p2", 5, "b");

    let id = n1
        .coordinator
        .request_trade("p1", "n1", 3, "p2", "n2")
        .await
        .unwrap();
    n1.coordinator
        .sweep_expired(Utc::now() + chrono::Duration::seconds(121))
        .await;

    let err = n2.coordinator.accept_trade(&id, "p2", 5).await.unwrap_err();
    assert!(matches!(err, TradeError::PeerRejected { .. }));
    assert_eq!(n2.inventory.asset("p2", 5), Some(b));
    assert!(n2.coordinator.registry().is_empty());
    assert_eq!(transport.live_keys_with_prefix("lock:"), 0);
}

#[tokio::test]
async fn target_slot_locked_by_another_trade() {
    let transport = MemoryTransport::new();
    let n1 = Node::start(&transport, "n1").await;
    n1.give("p1", 1, "a");
    n1.give("p3", 1, "c");
    n1.give("p2", 2, "b");

    // p2 offers slot 2 to p3, which locks it.
    n1.coordinator
        .request_trade("p2", "n1", 2, "p3", "n1")
        .await
        .unwrap();
    let id = n1
        .coordinator
        .request_trade("p1", "n1", 1, "p2", "n1")
        .await
        .unwrap();

    let err = n1.coordinator.accept_trade(&id, "p2", 2).await.unwrap_err();
    assert!(matches!(err, TradeError::AssetLocked { .. }));
    // The failed accept leaves the trade open.
    assert_eq!(
        n1.coordinator.registry().get(&id).map(|t| t.state),
        Some(TradeState::Pending)
    );
}

#[tokio::test]
async fn cross_node_accept_respects_targets_own_offer() {
    let transport = MemoryTransport::new();
    let n1 = Node::start(&transport, "n1").await;
    let n2 = Node::start(&transport, "n2").await;
    let a = n1.give("p1", 3, "a");
    let b = n2.give("p2", 5, "b");
    let c = n2.give("p3", 1, "c");

    // p2 already offered slot 5 to p3 on their own node.
    let own = n2
        .coordinator
        .request_trade("p2", "n2", 5, "p3", "n2")
        .await
        .unwrap();
    let id = n1
        .coordinator
        .request_trade("p1", "n1", 3, "p2", "n2")
        .await
        .unwrap();

    let err = n2.coordinator.accept_trade(&id, "p2", 5).await.unwrap_err();
    assert!(matches!(err, TradeError::AssetLocked { ref lock } if lock == "lock:n2:p2:5"));
    assert_eq!(n2.inventory.asset("p2", 5), Some(b.clone()));
    assert_eq!(n1.inventory.asset("p1", 3), Some(a));
    assert_eq!(
        n2.coordinator.registry().get(&id).map(|t| t.state),
        Some(TradeState::Pending)
    );
    // Only the two offers hold locks; the refused accept left nothing behind.
    assert_eq!(transport.live_keys_with_prefix("lock:"), 2);

    // p2's own offer still goes through with the asset p2 put up.
    n2.coordinator.accept_trade(&own, "p3", 1).await.unwrap();
    assert_eq!(n2.inventory.asset("p3", 1), Some(b));
    assert_eq!(n2.inventory.asset("p2", 5), Some(c));
}

#[tokio::test]
async fn cross_node_expiry_frees_requester_for_new_request() {
    let transport = MemoryTransport::new();
    let n1 = Node::start(&transport, "n1").await;
    let n2 = Node::start(&transport, "n2").await;
    n1.give("p1", 3, "a");

    let stale = n1
        .coordinator
        .request_trade("p1", "n1", 3, "p2", "n2")
        .await
        .unwrap();

    // No decision within the trade timeout: both nodes expire their copy.
    let later = Utc::now() + chrono::Duration::seconds(121);
    assert_eq!(n1.coordinator.sweep_expired(later).await, vec![stale.clone()]);
    assert_eq!(n2.coordinator.sweep_expired(later).await, vec![stale.clone()]);
    assert_eq!(n1.coordinator.registry().outbound("p1"), None);
    assert_eq!(transport.live_keys_with_prefix("lock:"), 0);

    let fresh = n1
        .coordinator
        .request_trade("p1", "n1", 3, "p2", "n2")
        .await
        .expect("requester is free again");
    assert_ne!(fresh, stale);
    assert_eq!(n1.coordinator.registry().outbound("p1"), Some(fresh.clone()));

    // Denying the expired trade is refused and reports nothing.
    let n1_events = n1.listener.names();
    let n2_events = n2.listener.names();
    let err = n2.coordinator.deny_trade(&stale, "p2").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Rejected);
    assert_eq!(n1.listener.names(), n1_events);
    assert_eq!(n2.listener.names(), n2_events);
    assert_eq!(
        n2.coordinator.registry().get(&fresh).map(|t| t.state),
        Some(TradeState::Pending)
    );
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

#[tokio::test]
async fn commands_route_through_directory() {
    let transport = MemoryTransport::new();
    let n1 = Node::start(&transport, "n1").await;
    let n2 = Node::start(&transport, "n2").await;
    n1.give("alice", 1, "a");
    n2.give("bob", 4, "b");

    let directory = PlayerDirectory::new(Arc::new(transport.clone()));
    directory.register("alice", "n1").await.unwrap();
    directory.register("bob", "n2").await.unwrap();

    let on_n1 = TradeCommands::new(Arc::clone(&n1.coordinator), directory.clone());
    let on_n2 = TradeCommands::new(Arc::clone(&n2.coordinator), directory);

    let reply = on_n1.initiate("alice", "bob", 1).await;
    assert_eq!(reply.code(), 1, "{}", reply.message);

    let reply = on_n2.accept("bob", "alice", 4).await;
    assert_eq!(reply.code(), 1, "{}", reply.message);
    assert_eq!(n1.inventory.asset("alice", 1).unwrap().data, json!({ "tag": "b" }));
    assert_eq!(n2.inventory.asset("bob", 4).unwrap().data, json!({ "tag": "a" }));

    let reply = on_n2.deny("bob", "alice").await;
    assert_eq!(reply.message, "No pending trade request from alice");
}

#[tokio::test]
async fn dispatcher_shutdown_is_clean() {
    let transport = MemoryTransport::new();
    let mut n1 = Node::start(&transport, "n1").await;
    assert!(transport.active_channels() >= 2);

    n1.stop().await;
    assert_eq!(transport.active_channels(), 0);
}
