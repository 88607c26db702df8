// Copyright (c) 2026 Shardtrade Contributors. MIT License.
// See LICENSE for details.

//! # Shardtrade Protocol: Core Library
//!
//! Coordinates the exchange of player-owned assets between two participants
//! who may be connected to different nodes of a partitioned game-server
//! cluster. Nodes share nothing but a publish/subscribe broker and a
//! key/value store with expiring entries, and the protocol is built on
//! exactly those two primitives.
//!
//! ## Architecture
//!
//! - **transport**: The pub/sub + TTL store substrate (in-memory and Redis).
//! - **messaging**: Wire envelopes and the correlated request/reply channel.
//! - **trade**: Locks, the trade registry, the coordinator and its sweeper.
//! - **dispatcher**: Per-node subscriber that feeds inbound envelopes to the
//!   coordinator.
//! - **inventory**: The node-local asset store the coordinator trades from.
//! - **directory**: Which node a player is connected to.
//! - **commands**: Player-facing command surface with canned replies.
//! - **config**: Protocol constants and timeouts.
//!
//! ## Guarantees
//!
//! 1. A requester has at most one outstanding trade.
//! 2. An asset slot is locked by at most one trade at a time, and every lock
//!    expires on its own if nobody releases it.
//! 3. Accept, deny and expiry racing on the same trade resolve to exactly one
//!    winner.
//! 4. No asset stays locked past the trade timeout, even when a peer node
//!    dies mid-exchange.

pub mod commands;
pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod inventory;
pub mod messaging;
pub mod trade;
pub mod transport;

pub use commands::{CommandReply, TradeCommands};
pub use config::TradeConfig;
pub use directory::PlayerDirectory;
pub use dispatcher::{DispatcherHandle, NodeDispatcher};
pub use inventory::{Asset, Inventory, InventoryError, MemoryInventory};
pub use trade::{
    ErrorKind, ExpirySweeper, NoopListener, SweeperHandle, TradeCoordinator, TradeError,
    TradeEvent, TradeId, TradeListener, TradeRegistry, TradeRequest, TradeState,
};
pub use transport::{MemoryTransport, RedisTransport, Subscription, Transport, TransportError};
