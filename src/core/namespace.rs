//! Namespaces and the Namespace Lifecycle Tracker
//!
//! A namespace moves through preorder → reveal → ready. The preorder only
//! carries a commitment, so until the reveal the namespace id is unknown and
//! the preordered phase lives in the preorder table. A revealed namespace
//! that is not launched within the reveal window is expired for good.

use crate::core::epoch::EpochTable;
use crate::core::operation::{split_name, PRICE_BUCKETS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Constants
// =============================================================================

/// Price unit of the name pricing function
pub const NAME_COST_UNIT: u64 = 100;

/// Namespace prices by id length
pub const NAMESPACE_1_CHAR_COST: u64 = 40_000_000_000;
pub const NAMESPACE_23_CHAR_COST: u64 = 4_000_000_000;
pub const NAMESPACE_4567_CHAR_COST: u64 = 400_000_000;
pub const NAMESPACE_8UP_CHAR_COST: u64 = 40_000_000;

/// Base price of a namespace id (before the epoch multiplier)
pub fn namespace_base_price(namespace_id: &str) -> u64 {
    match namespace_id.len() {
        0 | 1 => NAMESPACE_1_CHAR_COST,
        2..=3 => NAMESPACE_23_CHAR_COST,
        4..=7 => NAMESPACE_4567_CHAR_COST,
        _ => NAMESPACE_8UP_CHAR_COST,
    }
}

/// Price of a namespace id at a block height
pub fn namespace_price(namespace_id: &str, block_height: u64, epochs: &EpochTable) -> u64 {
    epochs
        .price_multiplier(block_height, namespace_id)
        .apply(namespace_base_price(namespace_id))
}

// =============================================================================
// Namespace
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamespaceStatus {
    Revealed,
    Ready,
    /// Revealed but never launched within the reveal window
    Expired,
}

/// Pending namespace preorder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespacePreorder {
    pub preorder_hash: String,
    pub sender: String,
    pub fee: u64,
    pub block_number: u64,
}

impl NamespacePreorder {
    pub fn key(&self) -> String {
        preorder_key(&self.preorder_hash, &self.sender)
    }

    pub fn is_expired(&self, block_height: u64, expire_blocks: u64) -> bool {
        block_height > self.block_number.saturating_add(expire_blocks)
    }
}

/// Table key for a preorder: the commitment plus the payer that made it
pub fn preorder_key(preorder_hash: &str, sender: &str) -> String {
    format!(
        "{}:{}",
        preorder_hash.to_ascii_lowercase(),
        sender.to_ascii_lowercase()
    )
}

/// A revealed namespace and its pricing parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    pub namespace_id: String,
    pub preorder_hash: String,
    /// Payer of the preorder
    pub sender: String,
    /// Revealing key's address
    pub address: String,
    /// Revealing key's script
    pub recipient: String,
    pub lifetime: u64,
    pub coeff: u32,
    pub base: u32,
    pub buckets: [u8; PRICE_BUCKETS],
    pub nonalpha_discount: u32,
    pub no_vowel_discount: u32,
    pub op_fee: u64,
    pub reveal_block: u64,
    pub ready_block: Option<u64>,
    pub status: NamespaceStatus,
    /// Height of the last change
    pub block_number: u64,
}

impl Namespace {
    pub fn is_ready(&self) -> bool {
        self.status == NamespaceStatus::Ready
    }

    /// Whether a revealed namespace has missed its launch window
    pub fn reveal_expired(&self, block_height: u64, reveal_expire: u64) -> bool {
        self.status == NamespaceStatus::Revealed
            && block_height > self.reveal_block.saturating_add(reveal_expire)
    }

    /// Price of a label (without the namespace suffix) before epoch multipliers
    pub fn base_price(&self, label: &str) -> u64 {
        let length = label.chars().count().max(1);
        let exponent = self.buckets[(length - 1).min(PRICE_BUCKETS - 1)];

        let mut discount = 1u64;
        if label.chars().any(|c| !c.is_ascii_alphabetic()) {
            discount = discount.max(self.nonalpha_discount as u64);
        }
        if !label.chars().any(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y')) {
            discount = discount.max(self.no_vowel_discount as u64);
        }

        let numerator = (self.coeff as u128) * (self.base as u128).pow(exponent as u32);
        let price = numerator / discount.max(1) as u128 * NAME_COST_UNIT as u128;
        u64::try_from(price).unwrap_or(u64::MAX)
    }

    /// Price of a fully-qualified name at a block height
    pub fn name_price(&self, name: &str, block_height: u64, epochs: &EpochTable) -> u64 {
        let label = split_name(name).map(|(label, _)| label).unwrap_or(name);
        epochs
            .price_multiplier(block_height, &self.namespace_id)
            .apply(self.base_price(label))
    }

    /// Name lifetime in blocks at a block height
    pub fn name_lifetime(&self, block_height: u64, epochs: &EpochTable) -> u64 {
        self.lifetime
            .saturating_mul(epochs.lifetime_multiplier(block_height, &self.namespace_id))
    }
}

// =============================================================================
// Namespace Tracker
// =============================================================================

/// Namespace and namespace-preorder tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceTracker {
    namespaces: BTreeMap<String, Namespace>,
    preorders: BTreeMap<String, NamespacePreorder>,
}

impl NamespaceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, namespace_id: &str) -> Option<&Namespace> {
        self.namespaces.get(namespace_id)
    }

    /// Launched namespace
    pub fn get_ready(&self, namespace_id: &str) -> Option<&Namespace> {
        self.get(namespace_id).filter(|ns| ns.is_ready())
    }

    /// Revealed namespace still inside its launch window
    pub fn get_revealed(
        &self,
        namespace_id: &str,
        block_height: u64,
        reveal_expire: u64,
    ) -> Option<&Namespace> {
        self.get(namespace_id).filter(|ns| {
            ns.status == NamespaceStatus::Revealed && !ns.reveal_expired(block_height, reveal_expire)
        })
    }

    pub fn get_preorder(&self, key: &str) -> Option<&NamespacePreorder> {
        self.preorders.get(key)
    }

    pub fn all(&self) -> impl Iterator<Item = &Namespace> {
        self.namespaces.values()
    }

    pub fn add_preorder(&mut self, preorder: NamespacePreorder) {
        self.preorders.insert(preorder.key(), preorder);
    }

    /// Consume a preorder and store the revealed namespace
    pub fn reveal(&mut self, preorder_key: &str, namespace: Namespace) {
        self.preorders.remove(preorder_key);
        log::info!(
            "Namespace {} revealed at block {}",
            namespace.namespace_id,
            namespace.reveal_block
        );
        self.namespaces.insert(namespace.namespace_id.clone(), namespace);
    }

    /// Launch a revealed namespace
    pub fn ready(&mut self, namespace_id: &str, block_height: u64) {
        if let Some(ns) = self.namespaces.get_mut(namespace_id) {
            ns.status = NamespaceStatus::Ready;
            ns.ready_block = Some(block_height);
            ns.block_number = block_height;
            log::info!("Namespace {} is ready at block {}", namespace_id, block_height);
        }
    }

    /// Drop preorders past their window; returns how many were removed
    pub fn expire_preorders(&mut self, block_height: u64, expire_blocks: u64) -> usize {
        let before = self.preorders.len();
        self.preorders
            .retain(|_, p| !p.is_expired(block_height, expire_blocks));
        before - self.preorders.len()
    }

    /// Mark revealed namespaces that missed their window; returns their ids
    pub fn expire_reveals(&mut self, block_height: u64, reveal_expire: u64) -> Vec<String> {
        let mut expired = Vec::new();

        for ns in self.namespaces.values_mut() {
            if ns.reveal_expired(block_height, reveal_expire) {
                ns.status = NamespaceStatus::Expired;
                ns.block_number = block_height;
                expired.push(ns.namespace_id.clone());
            }
        }

        for id in &expired {
            log::info!("Namespace {} was never launched and is now expired", id);
        }

        expired
    }

    pub fn namespace_count(&self) -> usize {
        self.namespaces.len()
    }

    pub fn preorder_count(&self) -> usize {
        self.preorders.len()
    }
}
