//! # Trade Coordinator
//!
//! Runs the trade protocol for the players connected to one node.
//!
//! ## Flow
//!
//! ```text
//! requester node                            target node
//! ──────────────                            ───────────
//! request_trade
//!   claim marker, lock offered slot
//!   store trade:<id>
//!   trade_request ───────────────────────►  on_trade_request
//!                 ◄─────────────────── ACK    register, notify target
//!                                           ... the target decides ...
//!                                           accept_trade
//!                                             lock slot, claim trade
//!                                             store tradedata:<id>:target
//!  on_trade_accept ◄──────────────────────  trade_accept
//!   claim trade, swap requester slot
//!   store tradedata:<id>:requester
//!   COMPLETE|<key> ──────────────────────►    swap target slot
//! ```
//!
//! Same-node trades skip the messaging and exchange both slots in one
//! inventory call.
//!
//! ## Ownership of cleanup
//!
//! Every resolution (accept, deny, expiry, failure) starts with a
//! compare-and-set on the registry record. Only the caller that wins the CAS
//! releases locks, clears the requester's marker and removes the record, so
//! racing resolutions never double-release or leak.
//!
//! ## Partial failure
//!
//! There are no retries. If a peer vanishes mid-exchange the surviving side
//! marks the trade failed and cleans up what it owns. Anything left behind
//! in the store carries a TTL no longer than the trade timeout.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::error::TradeError;
use super::events::{TradeEvent, TradeListener};
use super::lock::{AssetLockKey, LockManager};
use super::registry::{RegistryError, TradeRegistry};
use super::types::{TradeId, TradeRequest, TradeState};
use crate::config::{is_valid_slot, requester_asset_key, target_asset_key, trade_key, TradeConfig};
use crate::inventory::{Asset, Inventory};
use crate::messaging::envelope::cleanup_notice;
use crate::messaging::{Envelope, EnvelopeError, MessageKind, NodeChannel, Reply};
use crate::transport::Transport;

pub struct TradeCoordinator {
    node_id: String,
    config: TradeConfig,
    transport: Arc<dyn Transport>,
    channel: NodeChannel,
    locks: LockManager,
    registry: Arc<TradeRegistry>,
    inventory: Arc<dyn Inventory>,
    listener: Arc<dyn TradeListener>,
}

impl TradeCoordinator {
    pub fn new(
        node_id: impl Into<String>,
        transport: Arc<dyn Transport>,
        inventory: Arc<dyn Inventory>,
        listener: Arc<dyn TradeListener>,
        config: TradeConfig,
    ) -> Self {
        let node_id = node_id.into();
        Self {
            channel: NodeChannel::new(node_id.clone(), Arc::clone(&transport)),
            locks: LockManager::new(Arc::clone(&transport)),
            registry: Arc::new(TradeRegistry::new()),
            node_id,
            config,
            transport,
            inventory,
            listener,
        }
    }

    /// Uses `registry` instead of a fresh one.
    pub fn with_registry(mut self, registry: Arc<TradeRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn config(&self) -> &TradeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<TradeRegistry> {
        &self.registry
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn channel(&self) -> &NodeChannel {
        &self.channel
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    /// The pending trade `requester_id` offered to `target_id`.
    pub fn find_pending(&self, requester_id: &str, target_id: &str) -> Option<TradeRequest> {
        self.registry.find_pending(requester_id, target_id)
    }

    // -----------------------------------------------------------------------
    // Requester operations
    // -----------------------------------------------------------------------

    /// Offers the asset in `requester_slot` to `target_id` on `target_node`.
    ///
    /// Returns once the offer is registered and, for a remote target, once
    /// the target node confirmed delivery. The target's decision arrives
    /// later through [`accept_trade`](Self::accept_trade) or
    /// [`deny_trade`](Self::deny_trade) on their node.
    pub async fn request_trade(
        &self,
        requester_id: &str,
        requester_node: &str,
        requester_slot: u8,
        target_id: &str,
        target_node: &str,
    ) -> Result<TradeId, TradeError> {
        if requester_node != self.node_id {
            return Err(TradeError::WrongNode {
                expected: requester_node.to_string(),
                actual: self.node_id.clone(),
            });
        }
        if requester_id == target_id {
            return Err(TradeError::SelfTrade);
        }
        if !is_valid_slot(requester_slot) {
            return Err(TradeError::InvalidSlot(requester_slot));
        }
        self.tradeable_asset(requester_id, requester_slot)?;

        let trade = TradeRequest::new(
            requester_id,
            requester_node,
            requester_slot,
            target_id,
            target_node,
        );
        let trade_id = trade.trade_id.clone();

        if !self.registry.claim_outbound(requester_id, &trade_id) {
            return Err(TradeError::AlreadyActive {
                requester_id: requester_id.to_string(),
            });
        }

        let lock = trade.requester_lock();
        match self
            .locks
            .try_acquire(&lock, &trade_id, self.config.trade_timeout)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                self.registry.release_outbound(requester_id, &trade_id);
                return Err(TradeError::AssetLocked {
                    lock: lock.storage_key(),
                });
            }
            Err(e) => {
                self.registry.release_outbound(requester_id, &trade_id);
                return Err(e.into());
            }
        }

        if let Err(e) = self.registry.insert(trade.clone()) {
            self.release_lock(&lock, &trade_id).await;
            self.registry.release_outbound(requester_id, &trade_id);
            return Err(e.into());
        }

        if trade.is_local() {
            info!(trade = %trade_id, requester = requester_id, target = target_id, "local trade requested");
            self.emit(TradeEvent::Requested {
                trade_id: trade_id.clone(),
                requester_id: requester_id.to_string(),
                target_id: target_id.to_string(),
            })
            .await;
            return Ok(trade_id);
        }

        if let Err(e) = self.deliver_request(&trade).await {
            warn!(trade = %trade_id, target_node, error = %e, "trade request not delivered, rolling back");
            self.abandon(&trade).await;
            return Err(match e {
                TradeError::Timeout { node, timeout_ms } => TradeError::PeerUnreachable {
                    node,
                    reason: format!("no acknowledgement within {}ms", timeout_ms),
                },
                other => other,
            });
        }

        info!(trade = %trade_id, requester = requester_id, target = target_id, target_node, "cross-node trade requested");
        Ok(trade_id)
    }

    /// Ships the record to the target node and waits for its `ACK`.
    async fn deliver_request(&self, trade: &TradeRequest) -> Result<(), TradeError> {
        let key = trade_key(trade.trade_id.as_str());
        let blob = serde_json::to_string(trade)?;
        self.transport
            .set_with_ttl(&key, &blob, self.config.trade_timeout)
            .await?;

        let reply = self
            .channel
            .send_and_wait(
                &trade.target_node,
                MessageKind::TradeRequest,
                vec![key, trade.trade_id.to_string()],
                self.config.handshake_timeout,
            )
            .await
            .map_err(|e| TradeError::from_channel(&trade.target_node, e))?;

        match reply {
            Reply::Ack => Ok(()),
            other => Err(TradeError::PeerUnreachable {
                node: trade.target_node.clone(),
                reason: format!("unexpected reply {}", other),
            }),
        }
    }

    /// Undoes a request whose delivery failed.
    async fn abandon(&self, trade: &TradeRequest) {
        if self
            .registry
            .transition(&trade.trade_id, TradeState::Pending, TradeState::Failed)
            .is_err()
        {
            return;
        }
        self.close(trade, &[]).await;
        if let Err(e) = self.transport.delete(&trade_key(trade.trade_id.as_str())).await {
            debug!(trade = %trade.trade_id, error = %e, "trade blob left to expire");
        }
    }

    // -----------------------------------------------------------------------
    // Target operations
    // -----------------------------------------------------------------------

    /// Accepts a pending trade, giving up the asset in `target_slot`.
    pub async fn accept_trade(
        &self,
        trade_id: &TradeId,
        target_id: &str,
        target_slot: u8,
    ) -> Result<TradeRequest, TradeError> {
        let trade = self.pending(trade_id, target_id)?;
        if !is_valid_slot(target_slot) {
            return Err(TradeError::InvalidSlot(target_slot));
        }
        let asset = self.tradeable_asset(target_id, target_slot)?;

        let mut held = Vec::with_capacity(2);
        for lock in trade.target_locks(target_slot) {
            let acquired = self
                .locks
                .try_acquire(&lock, trade_id, self.config.trade_timeout)
                .await;
            match acquired {
                Ok(true) => held.push(lock),
                Ok(false) => {
                    self.release_locks(&held, trade_id).await;
                    return Err(TradeError::AssetLocked {
                        lock: lock.storage_key(),
                    });
                }
                Err(e) => {
                    self.release_locks(&held, trade_id).await;
                    return Err(e.into());
                }
            }
        }

        let claimed = match self
            .registry
            .transition(trade_id, TradeState::Pending, TradeState::Accepted)
        {
            Ok(claimed) => claimed,
            Err(e) => {
                self.release_locks(&held, trade_id).await;
                return Err(lost_race(trade_id, e));
            }
        };

        if claimed.is_local() {
            self.complete_local(claimed, target_slot, held).await
        } else {
            self.complete_remote(claimed, target_slot, asset, held).await
        }
    }

    async fn complete_local(
        &self,
        trade: TradeRequest,
        target_slot: u8,
        target_locks: Vec<AssetLockKey>,
    ) -> Result<TradeRequest, TradeError> {
        if let Err(e) = self.inventory.exchange(
            &trade.requester_id,
            trade.requester_slot,
            &trade.target_id,
            target_slot,
        ) {
            self.fail(&trade, &target_locks, &e.to_string()).await;
            return Err(e.into());
        }

        let done = self.registry.transition(
            &trade.trade_id,
            TradeState::Accepted,
            TradeState::Completed,
        )?;
        self.close(&trade, &target_locks).await;
        info!(trade = %trade.trade_id, "local trade completed");

        for player_id in [&trade.requester_id, &trade.target_id] {
            self.emit(TradeEvent::Completed {
                trade_id: trade.trade_id.clone(),
                player_id: player_id.clone(),
            })
            .await;
        }
        Ok(done)
    }

    async fn complete_remote(
        &self,
        trade: TradeRequest,
        target_slot: u8,
        asset: Asset,
        target_locks: Vec<AssetLockKey>,
    ) -> Result<TradeRequest, TradeError> {
        let payload_key = target_asset_key(trade.trade_id.as_str());

        if let Err(e) = self
            .exchange_with_requester(&trade, target_slot, &asset, &payload_key)
            .await
        {
            warn!(trade = %trade.trade_id, error = %e, "cross-node accept failed");
            self.fail(&trade, &target_locks, &e.to_string()).await;
            if let Err(err) = self.channel.broadcast(&cleanup_notice(&payload_key)).await {
                debug!(key = %payload_key, error = %err, "cleanup notice not sent");
            }
            return Err(e);
        }

        let done = self.registry.transition(
            &trade.trade_id,
            TradeState::Accepted,
            TradeState::Completed,
        )?;
        self.close(&trade, &target_locks).await;
        info!(trade = %trade.trade_id, requester_node = %trade.requester_node, "cross-node trade completed");

        self.emit(TradeEvent::Completed {
            trade_id: trade.trade_id.clone(),
            player_id: trade.target_id.clone(),
        })
        .await;
        Ok(done)
    }

    /// Puts the target's asset in the store, asks the requester node to swap,
    /// then takes the requester's asset into the target's slot.
    async fn exchange_with_requester(
        &self,
        trade: &TradeRequest,
        target_slot: u8,
        asset: &Asset,
        payload_key: &str,
    ) -> Result<(), TradeError> {
        let payload = serde_json::to_string(asset)?;
        self.transport
            .set_with_ttl(payload_key, &payload, self.config.payload_ttl)
            .await?;

        let reply = self
            .channel
            .send_and_wait(
                &trade.requester_node,
                MessageKind::TradeAccept,
                vec![
                    payload_key.to_string(),
                    trade.trade_id.to_string(),
                    trade.target_id.clone(),
                    target_slot.to_string(),
                ],
                self.config.accept_timeout,
            )
            .await
            .map_err(|e| TradeError::from_channel(&trade.requester_node, e))?;

        let data_key = match reply {
            Reply::Complete { data_key } => data_key,
            other => {
                return Err(TradeError::PeerRejected {
                    node: trade.requester_node.clone(),
                    reply: other,
                })
            }
        };

        let incoming: Asset = self.load(&data_key).await?;
        self.inventory
            .replace(&trade.target_id, target_slot, incoming)?;
        self.delete_best_effort(&data_key).await;
        Ok(())
    }

    /// Refuses a pending trade.
    pub async fn deny_trade(
        &self,
        trade_id: &TradeId,
        target_id: &str,
    ) -> Result<TradeRequest, TradeError> {
        let trade = self.pending(trade_id, target_id)?;
        let denied = self
            .registry
            .transition(trade_id, TradeState::Pending, TradeState::Denied)
            .map_err(|e| lost_race(trade_id, e))?;
        self.close(&trade, &[]).await;

        if !trade.is_local() {
            let outcome = self
                .channel
                .send_and_wait(
                    &trade.requester_node,
                    MessageKind::TradeDeny,
                    vec![trade_id.to_string(), target_id.to_string()],
                    self.config.accept_timeout,
                )
                .await;
            match outcome {
                Ok(Reply::Ack) => debug!(trade = %trade_id, "requester node released the trade"),
                Ok(other) => {
                    warn!(trade = %trade_id, reply = %other, "requester node did not ack deny, lock will lapse")
                }
                Err(e) => {
                    warn!(trade = %trade_id, error = %e, "deny not delivered, lock will lapse")
                }
            }
        }

        info!(trade = %trade_id, requester = %trade.requester_id, target = target_id, "trade denied");
        self.emit(TradeEvent::Denied {
            trade_id: trade_id.clone(),
            requester_id: trade.requester_id.clone(),
            target_id: target_id.to_string(),
        })
        .await;
        Ok(denied)
    }

    // -----------------------------------------------------------------------
    // Inbound requests
    // -----------------------------------------------------------------------

    /// Handles an envelope delivered to this node's request channel.
    pub async fn handle(&self, envelope: &Envelope) -> Result<Reply, TradeError> {
        match envelope.kind {
            MessageKind::TradeRequest => {
                self.on_trade_request(envelope.field(0, "dataKey")?, envelope.field(1, "tradeId")?)
                    .await
            }
            MessageKind::TradeAccept => {
                let slot = envelope.field(3, "targetSlot")?;
                let target_slot: u8 = slot
                    .parse()
                    .map_err(|_| EnvelopeError::Malformed(format!("bad slot {}", slot)))?;
                Ok(self
                    .on_trade_accept(
                        envelope.field(0, "dataKey")?,
                        &TradeId::from(envelope.field(1, "tradeId")?),
                        envelope.field(2, "targetId")?,
                        target_slot,
                    )
                    .await)
            }
            MessageKind::TradeDeny => Ok(self
                .on_trade_deny(
                    &TradeId::from(envelope.field(0, "tradeId")?),
                    envelope.field(1, "targetId")?,
                )
                .await),
        }
    }

    /// Target side: registers the offer and tells the target player.
    async fn on_trade_request(&self, data_key: &str, trade_id: &str) -> Result<Reply, TradeError> {
        let trade: TradeRequest = self.load(data_key).await?;
        if trade.trade_id.as_str() != trade_id
            || trade.target_node != self.node_id
            || trade.state != TradeState::Pending
        {
            warn!(trade = trade_id, key = data_key, "trade blob does not match request");
            return Ok(Reply::Rejected);
        }
        self.delete_best_effort(data_key).await;

        match self.registry.insert(trade.clone()) {
            Ok(()) => {
                info!(trade = trade_id, requester = %trade.requester_id, target = %trade.target_id, "trade request received");
                self.emit(TradeEvent::Requested {
                    trade_id: trade.trade_id.clone(),
                    requester_id: trade.requester_id.clone(),
                    target_id: trade.target_id.clone(),
                })
                .await;
            }
            Err(RegistryError::Duplicate(_)) => debug!(trade = trade_id, "duplicate trade request ignored"),
            Err(e) => return Err(e.into()),
        }
        Ok(Reply::Ack)
    }

    /// Requester side: swaps the target's asset in and hands ours back.
    async fn on_trade_accept(
        &self,
        data_key: &str,
        trade_id: &TradeId,
        target_id: &str,
        target_slot: u8,
    ) -> Reply {
        let trade = match self.registry.get(trade_id) {
            Some(t) if t.target_id == target_id && t.requester_node == self.node_id => t,
            _ => {
                debug!(trade = %trade_id, "accept for unknown trade");
                return Reply::Rejected;
            }
        };
        if let Err(e) = self
            .registry
            .transition(trade_id, TradeState::Pending, TradeState::Accepted)
        {
            debug!(trade = %trade_id, error = %e, "accept lost to another resolution");
            return Reply::Rejected;
        }

        let response_key = match self.settle_requester_side(&trade, data_key).await {
            Ok(key) => key,
            Err(e) => {
                warn!(trade = %trade_id, error = %e, "requester side of exchange failed");
                self.fail(&trade, &[], &e.to_string()).await;
                return Reply::Failed;
            }
        };

        if let Err(e) = self
            .registry
            .transition(trade_id, TradeState::Accepted, TradeState::Completed)
        {
            warn!(trade = %trade_id, error = %e, "completed trade changed state underneath");
        }
        self.close(&trade, &[]).await;
        info!(trade = %trade_id, target_slot, "cross-node trade settled on requester side");

        self.emit(TradeEvent::Completed {
            trade_id: trade_id.clone(),
            player_id: trade.requester_id.clone(),
        })
        .await;
        Reply::Complete {
            data_key: response_key,
        }
    }

    /// Replaces the requester's slot with the target's asset and stores the
    /// displaced asset for the target node. Undoes the swap if the store
    /// write fails.
    async fn settle_requester_side(
        &self,
        trade: &TradeRequest,
        data_key: &str,
    ) -> Result<String, TradeError> {
        let incoming: Asset = self.load(data_key).await?;
        let outgoing = self
            .inventory
            .replace(&trade.requester_id, trade.requester_slot, incoming)?;

        let key = requester_asset_key(trade.trade_id.as_str());
        let stored = match serde_json::to_string(&outgoing) {
            Ok(payload) => self
                .transport
                .set_with_ttl(&key, &payload, self.config.payload_ttl)
                .await
                .map_err(TradeError::from),
            Err(e) => Err(e.into()),
        };
        if let Err(e) = stored {
            if let Err(undo) =
                self.inventory
                    .replace(&trade.requester_id, trade.requester_slot, outgoing)
            {
                warn!(trade = %trade.trade_id, error = %undo, "could not restore requester slot");
            }
            return Err(e);
        }

        self.delete_best_effort(data_key).await;
        Ok(key)
    }

    /// Requester side: the target refused, free the offered slot.
    async fn on_trade_deny(&self, trade_id: &TradeId, target_id: &str) -> Reply {
        let trade = match self.registry.get(trade_id) {
            Some(t) if t.target_id == target_id => t,
            _ => return Reply::Rejected,
        };
        if self
            .registry
            .transition(trade_id, TradeState::Pending, TradeState::Denied)
            .is_err()
        {
            return Reply::Rejected;
        }
        self.close(&trade, &[]).await;
        info!(trade = %trade_id, requester = %trade.requester_id, "trade denied by remote target");

        self.emit(TradeEvent::Denied {
            trade_id: trade_id.clone(),
            requester_id: trade.requester_id.clone(),
            target_id: target_id.to_string(),
        })
        .await;
        Reply::Ack
    }

    // -----------------------------------------------------------------------
    // Expiry
    // -----------------------------------------------------------------------

    /// Expires every pending trade older than the trade timeout at `now`.
    /// Returns the ids that this call expired.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<TradeId> {
        let mut expired = Vec::new();
        for trade_id in self
            .registry
            .sweep_candidates(now, self.config.trade_timeout)
        {
            let Ok(trade) = self
                .registry
                .transition(&trade_id, TradeState::Pending, TradeState::Expired)
            else {
                continue;
            };
            self.close(&trade, &[]).await;
            info!(trade = %trade_id, requester = %trade.requester_id, "trade expired");

            self.emit(TradeEvent::Expired {
                trade_id: trade_id.clone(),
                requester_id: trade.requester_id.clone(),
            })
            .await;
            expired.push(trade_id);
        }
        expired
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// The trade, if `player_id` is its target here and it is still open.
    fn pending(&self, trade_id: &TradeId, player_id: &str) -> Result<TradeRequest, TradeError> {
        let trade = self
            .registry
            .get(trade_id)
            .ok_or_else(|| TradeError::NotFound(trade_id.clone()))?;
        if trade.target_id != player_id {
            return Err(TradeError::NotParticipant {
                trade_id: trade_id.clone(),
                player_id: player_id.to_string(),
            });
        }
        if trade.target_node != self.node_id {
            return Err(TradeError::WrongNode {
                expected: trade.target_node.clone(),
                actual: self.node_id.clone(),
            });
        }
        if trade.state != TradeState::Pending {
            return Err(TradeError::AlreadyResolved {
                trade_id: trade_id.clone(),
                state: trade.state,
            });
        }
        if trade.is_expired(Utc::now(), self.config.trade_timeout) {
            return Err(TradeError::AlreadyResolved {
                trade_id: trade_id.clone(),
                state: TradeState::Expired,
            });
        }
        Ok(trade)
    }

    fn tradeable_asset(&self, owner: &str, slot: u8) -> Result<Asset, TradeError> {
        let asset = self
            .inventory
            .asset(owner, slot)
            .ok_or_else(|| TradeError::NoAsset {
                owner: owner.to_string(),
                slot,
            })?;
        if !self.inventory.can_trade(&asset) {
            return Err(TradeError::Untradeable {
                owner: owner.to_string(),
                slot,
            });
        }
        Ok(asset)
    }

    /// Marks a claimed trade failed and cleans up after it.
    async fn fail(&self, trade: &TradeRequest, extra_locks: &[AssetLockKey], reason: &str) {
        if let Err(e) =
            self.registry
                .transition(&trade.trade_id, TradeState::Accepted, TradeState::Failed)
        {
            debug!(trade = %trade.trade_id, error = %e, "failed trade already resolved");
        }
        self.close(trade, extra_locks).await;
        self.emit(TradeEvent::Failed {
            trade_id: trade.trade_id.clone(),
            reason: reason.to_string(),
        })
        .await;
    }

    /// Releases what this node holds for a resolved trade and forgets it.
    /// The requester's lock and marker are owned by the requester's node.
    async fn close(&self, trade: &TradeRequest, extra_locks: &[AssetLockKey]) {
        if trade.requester_node == self.node_id {
            self.release_lock(&trade.requester_lock(), &trade.trade_id)
                .await;
            self.registry
                .release_outbound(&trade.requester_id, &trade.trade_id);
        }
        self.release_locks(extra_locks, &trade.trade_id).await;
        self.registry.remove(&trade.trade_id);
    }

    async fn release_locks(&self, locks: &[AssetLockKey], holder: &TradeId) {
        for lock in locks {
            self.release_lock(lock, holder).await;
        }
    }

    async fn release_lock(&self, lock: &AssetLockKey, holder: &TradeId) {
        if let Err(e) = self.locks.release(lock, holder).await {
            warn!(lock = %lock, trade = %holder, error = %e, "lock release failed, will lapse");
        }
    }

    async fn load<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T, TradeError> {
        let raw = self
            .transport
            .get(key)
            .await?
            .ok_or_else(|| TradeError::PayloadMissing(key.to_string()))?;
        Ok(serde_json::from_str(&raw)?)
    }

    async fn delete_best_effort(&self, key: &str) {
        if let Err(e) = self.transport.delete(key).await {
            debug!(key, error = %e, "payload left to expire");
        }
    }

    async fn emit(&self, event: TradeEvent) {
        self.listener.on_event(&event);
        if let Err(e) = self.channel.fire_and_forget(&event.notice()).await {
            debug!(event = event.name(), error = %e, "event notice not published");
        }
    }
}

impl std::fmt::Debug for TradeCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeCoordinator")
            .field("node_id", &self.node_id)
            .field("config", &self.config)
            .field("trades", &self.registry.len())
            .finish()
    }
}

/// Maps a lost compare-and-set onto the error the caller reports.
fn lost_race(trade_id: &TradeId, err: RegistryError) -> TradeError {
    match err {
        RegistryError::StateMismatch { actual, .. } => TradeError::AlreadyResolved {
            trade_id: trade_id.clone(),
            state: actual,
        },
        RegistryError::NotFound(id) => TradeError::NotFound(id),
        other => other.into(),
    }
}
