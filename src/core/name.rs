//! Names and the Name Lifecycle Tracker
//!
//! A name is preordered, registered (consuming the preorder), then updated,
//! transferred, renewed or revoked by its owner. Records are never deleted:
//! an expired name stays in the table, unresolvable, until someone
//! registers it again.

use crate::core::consensus::ConsensusHash;
use crate::core::namespace::preorder_key;
use crate::core::operation::OpKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Name Preorder
// =============================================================================

/// Pending name preorder, redeemable once
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamePreorder {
    pub preorder_hash: String,
    pub namespace_id: String,
    /// Payer's script
    pub sender: String,
    pub fee: u64,
    pub block_number: u64,
}

impl NamePreorder {
    pub fn key(&self) -> String {
        preorder_key(&self.preorder_hash, &self.sender)
    }

    pub fn is_expired(&self, block_height: u64, expire_blocks: u64) -> bool {
        block_height > self.block_number.saturating_add(expire_blocks)
    }
}

// =============================================================================
// Name Record
// =============================================================================

/// Where a name is in its lifetime at a given height
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameLiveness {
    Active,
    /// Past `expire_block` but still renewable by its owner
    GracePeriod,
    /// Unresolvable; may be registered again
    Expired,
}

/// The canonical record of a registered name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRecord {
    pub name: String,
    pub namespace_id: String,
    pub preorder_hash: String,
    /// Owner's address
    pub address: String,
    /// Owner's payment script
    pub sender: String,
    /// HASH160 of the off-chain metadata
    pub value_hash: Option<String>,
    pub first_registered: u64,
    pub last_renewed: u64,
    pub expire_block: u64,
    pub op_fee: u64,
    /// Registry consensus hash of the block before the last mutation
    pub consensus_hash: ConsensusHash,
    /// Height of the last mutation
    pub block_number: u64,
    /// Operation that produced this state
    pub last_op: OpKind,
    pub revoked: bool,
}

impl NameRecord {
    pub fn liveness(&self, block_height: u64, grace_period: u64) -> NameLiveness {
        if block_height < self.expire_block {
            NameLiveness::Active
        } else if block_height < self.expire_block.saturating_add(grace_period) {
            NameLiveness::GracePeriod
        } else {
            NameLiveness::Expired
        }
    }

    /// Whether the record answers lookups at this height
    pub fn is_resolvable(&self, block_height: u64, grace_period: u64) -> bool {
        !self.revoked && self.liveness(block_height, grace_period) != NameLiveness::Expired
    }

    pub fn is_owned_by(&self, script: &str) -> bool {
        self.sender.eq_ignore_ascii_case(script)
    }

    fn touch(&mut self, op: OpKind, block_height: u64, stamp: ConsensusHash) {
        self.last_op = op;
        self.block_number = block_height;
        self.consensus_hash = stamp;
    }
}

// =============================================================================
// Name Tracker
// =============================================================================

/// Name and name-preorder tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameTracker {
    records: BTreeMap<String, NameRecord>,
    preorders: BTreeMap<String, NamePreorder>,
}

impl NameTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw record, regardless of expiry
    pub fn get(&self, name: &str) -> Option<&NameRecord> {
        self.records.get(name)
    }

    pub fn get_preorder(&self, key: &str) -> Option<&NamePreorder> {
        self.preorders.get(key)
    }

    pub fn all(&self) -> impl Iterator<Item = &NameRecord> {
        self.records.values()
    }

    pub fn add_preorder(&mut self, preorder: NamePreorder) {
        self.preorders.insert(preorder.key(), preorder);
    }

    /// Consume a preorder and install a fresh record
    pub fn register(&mut self, preorder_key: &str, record: NameRecord) {
        self.preorders.remove(preorder_key);
        log::info!(
            "Name {} registered to {} at block {} (fee {})",
            record.name,
            record.address,
            record.block_number,
            record.op_fee
        );
        self.records.insert(record.name.clone(), record);
    }

    pub fn update(
        &mut self,
        name: &str,
        value_hash: &str,
        block_height: u64,
        stamp: ConsensusHash,
    ) -> Option<&NameRecord> {
        let record = self.records.get_mut(name)?;
        record.value_hash = Some(value_hash.to_ascii_lowercase());
        record.touch(OpKind::NameUpdate, block_height, stamp);
        Some(record)
    }

    pub fn transfer(
        &mut self,
        name: &str,
        address: &str,
        sender: &str,
        keep_data: bool,
        block_height: u64,
        stamp: ConsensusHash,
    ) -> Option<&NameRecord> {
        let record = self.records.get_mut(name)?;
        record.address = address.to_string();
        record.sender = sender.to_string();
        if !keep_data {
            record.value_hash = None;
        }
        record.touch(OpKind::NameTransfer, block_height, stamp);
        Some(record)
    }

    pub fn renew(
        &mut self,
        name: &str,
        op_fee: u64,
        expire_block: u64,
        block_height: u64,
        stamp: ConsensusHash,
    ) -> Option<&NameRecord> {
        let record = self.records.get_mut(name)?;
        record.op_fee = op_fee;
        record.last_renewed = block_height;
        record.expire_block = expire_block;
        record.touch(OpKind::NameRenew, block_height, stamp);
        Some(record)
    }

    pub fn revoke(
        &mut self,
        name: &str,
        block_height: u64,
        stamp: ConsensusHash,
    ) -> Option<&NameRecord> {
        let record = self.records.get_mut(name)?;
        record.revoked = true;
        record.value_hash = None;
        record.touch(OpKind::NameRevoke, block_height, stamp);
        Some(record)
    }

    /// Drop preorders past their window; returns how many were removed
    pub fn expire_preorders(&mut self, block_height: u64, expire_blocks: u64) -> usize {
        let before = self.preorders.len();
        self.preorders
            .retain(|_, p| !p.is_expired(block_height, expire_blocks));
        before - self.preorders.len()
    }

    /// Names whose current owner is `address`
    pub fn owned_by(&self, address: &str) -> Vec<&NameRecord> {
        self.records
            .values()
            .filter(|r| r.address == address)
            .collect()
    }

    pub fn name_count(&self) -> usize {
        self.records.len()
    }

    pub fn preorder_count(&self) -> usize {
        self.preorders.len()
    }
}
