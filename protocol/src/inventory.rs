//! # Inventory
//!
//! The node-local store of player assets the coordinator trades from. The
//! real implementation belongs to the game server. The protocol only needs
//! to read a slot, apply the tradeability rule, and write slots back.
//!
//! [`MemoryInventory`] is the in-process implementation used by the node
//! binary and the tests.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::is_valid_slot;

/// An opaque tradable asset.
///
/// `data` is whatever the game attaches to the asset. The protocol ships it
/// between nodes as JSON and never looks inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: Uuid,
    #[serde(default)]
    pub data: serde_json::Value,
    /// Bound assets may not change owner.
    #[serde(default)]
    pub bound: bool,
}

impl Asset {
    pub fn new(data: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            data,
            bound: false,
        }
    }

    pub fn bound(mut self) -> Self {
        self.bound = true;
        self
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("{owner} has no asset in slot {slot}")]
    EmptySlot { owner: String, slot: u8 },

    #[error("invalid slot {0}")]
    InvalidSlot(u8),
}

/// Node-local asset storage.
pub trait Inventory: Send + Sync {
    /// The asset `owner` holds in `slot`, if any.
    fn asset(&self, owner: &str, slot: u8) -> Option<Asset>;

    /// Whether `asset` may be traded at all.
    fn can_trade(&self, asset: &Asset) -> bool {
        !asset.bound
    }

    /// Puts `asset` into `owner`'s `slot`, returning the asset it displaced.
    /// Fails if the slot was empty.
    fn replace(&self, owner: &str, slot: u8, asset: Asset) -> Result<Asset, InventoryError>;

    /// Swaps two occupied slots in one step. Either both slots change or
    /// neither does.
    fn exchange(
        &self,
        a_owner: &str,
        a_slot: u8,
        b_owner: &str,
        b_slot: u8,
    ) -> Result<(), InventoryError>;
}

/// In-memory [`Inventory`] keyed by `(owner, slot)`.
#[derive(Debug, Default)]
pub struct MemoryInventory {
    slots: Mutex<HashMap<(String, u8), Asset>>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `asset` in `owner`'s `slot`, returning what was there.
    pub fn put(&self, owner: &str, slot: u8, asset: Asset) -> Result<Option<Asset>, InventoryError> {
        if !is_valid_slot(slot) {
            return Err(InventoryError::InvalidSlot(slot));
        }
        Ok(self.slots.lock().insert((owner.to_string(), slot), asset))
    }

    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}

impl Inventory for MemoryInventory {
    fn asset(&self, owner: &str, slot: u8) -> Option<Asset> {
        self.slots.lock().get(&(owner.to_string(), slot)).cloned()
    }

    fn replace(&self, owner: &str, slot: u8, asset: Asset) -> Result<Asset, InventoryError> {
        let mut slots = self.slots.lock();
        match slots.get_mut(&(owner.to_string(), slot)) {
            Some(current) => Ok(std::mem::replace(current, asset)),
            None => Err(InventoryError::EmptySlot {
                owner: owner.to_string(),
                slot,
            }),
        }
    }

    fn exchange(
        &self,
        a_owner: &str,
        a_slot: u8,
        b_owner: &str,
        b_slot: u8,
    ) -> Result<(), InventoryError> {
        let a_key = (a_owner.to_string(), a_slot);
        let b_key = (b_owner.to_string(), b_slot);
        let mut slots = self.slots.lock();

        for (owner, slot) in [(a_owner, a_slot), (b_owner, b_slot)] {
            if !slots.contains_key(&(owner.to_string(), slot)) {
                return Err(InventoryError::EmptySlot {
                    owner: owner.to_string(),
                    slot,
                });
            }
        }
        if a_key == b_key {
            return Ok(());
        }

        let (Some(a), Some(b)) = (slots.remove(&a_key), slots.remove(&b_key)) else {
            return Err(InventoryError::EmptySlot {
                owner: a_owner.to_string(),
                slot: a_slot,
            });
        };
        slots.insert(a_key, b);
        slots.insert(b_key, a);
        Ok(())
    }
}
