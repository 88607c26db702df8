//! Per-node registry of live trades.
//!
//! Holds every trade this node participates in plus the one-outstanding-
//! trade marker of each local requester. Both maps are `DashMap`s, and state
//! changes go through [`TradeRegistry::transition`], a compare-and-set done
//! under the shard lock. Whoever wins that CAS owns the trade's cleanup.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use thiserror::Error;

use super::types::{TradeId, TradeRequest, TradeState};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("trade {0} already registered")]
    Duplicate(TradeId),

    #[error("trade {0} not found")]
    NotFound(TradeId),

    /// The trade was not in the state the caller expected.
    #[error("trade {trade_id} is {actual}, expected {expected}")]
    StateMismatch {
        trade_id: TradeId,
        expected: TradeState,
        actual: TradeState,
    },

    #[error("illegal transition {from} -> {to}")]
    InvalidTransition { from: TradeState, to: TradeState },
}

#[derive(Debug, Default)]
pub struct TradeRegistry {
    trades: DashMap<TradeId, TradeRequest>,
    /// requester id -> their outstanding trade.
    outbound: DashMap<String, TradeId>,
}

impl TradeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, trade: TradeRequest) -> Result<(), RegistryError> {
        match self.trades.entry(trade.trade_id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::Duplicate(trade.trade_id)),
            Entry::Vacant(slot) => {
                slot.insert(trade);
                Ok(())
            }
        }
    }

    /// A snapshot of the record.
    pub fn get(&self, trade_id: &TradeId) -> Option<TradeRequest> {
        self.trades.get(trade_id).map(|t| t.clone())
    }

    pub fn remove(&self, trade_id: &TradeId) -> Option<TradeRequest> {
        self.trades.remove(trade_id).map(|(_, t)| t)
    }

    /// Moves the trade from `from` to `to` if it is still in `from`.
    ///
    /// Returns the record as it stands after the transition. Exactly one of
    /// several racing callers with the same `from` succeeds.
    pub fn transition(
        &self,
        trade_id: &TradeId,
        from: TradeState,
        to: TradeState,
    ) -> Result<TradeRequest, RegistryError> {
        if !from.can_transition(to) {
            return Err(RegistryError::InvalidTransition { from, to });
        }
        let mut trade = self
            .trades
            .get_mut(trade_id)
            .ok_or_else(|| RegistryError::NotFound(trade_id.clone()))?;
        if trade.state != from {
            return Err(RegistryError::StateMismatch {
                trade_id: trade_id.clone(),
                expected: from,
                actual: trade.state,
            });
        }
        trade.state = to;
        Ok(trade.clone())
    }

    /// The pending trade `requester_id` offered to `target_id`, if any.
    pub fn find_pending(&self, requester_id: &str, target_id: &str) -> Option<TradeRequest> {
        self.trades
            .iter()
            .find(|t| {
                t.state == TradeState::Pending
                    && t.requester_id == requester_id
                    && t.target_id == target_id
            })
            .map(|t| t.clone())
    }

    /// Ids of pending trades older than `timeout` at `now`.
    pub fn sweep_candidates(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<TradeId> {
        self.trades
            .iter()
            .filter(|t| t.state == TradeState::Pending && t.is_expired(now, timeout))
            .map(|t| t.trade_id.clone())
            .collect()
    }

    /// Records `trade_id` as `requester_id`'s outstanding trade. Fails if
    /// they already have one.
    pub fn claim_outbound(&self, requester_id: &str, trade_id: &TradeId) -> bool {
        match self.outbound.entry(requester_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(trade_id.clone());
                true
            }
        }
    }

    /// Clears the marker, but only if it still points at `trade_id`.
    pub fn release_outbound(&self, requester_id: &str, trade_id: &TradeId) -> bool {
        self.outbound
            .remove_if(requester_id, |_, current| current == trade_id)
            .is_some()
    }

    pub fn outbound(&self, requester_id: &str) -> Option<TradeId> {
        self.outbound.get(requester_id).map(|t| t.clone())
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }
}
