//! SNV (Simple Name Verification) Support
//!
//! A light client that trusts one consensus hash can check that an operation
//! was accepted at an earlier block without replaying the chain:
//! - a merkle path from the operation digest to its block's operations root
//! - the operations roots of every later block up to the trusted one
//!
//! Folding these forward from the block's previous hash must land exactly on
//! the trusted consensus hash.

use crate::core::consensus::{fold_hash, ConsensusEngine, ConsensusHash};
use crate::core::operation::Operation;
use crate::crypto::MerkleProof;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A later block folded into the chain between the proven block and the
/// trusted one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainLink {
    pub height: u64,
    /// Operations root of the block (hex)
    pub operations_root: String,
}

/// Proof that an operation was accepted at `height`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnvProof {
    pub height: u64,
    /// Consensus hash of the block before `height`
    pub prev_consensus_hash: ConsensusHash,
    /// Digest of the proven operation (hex)
    pub operation_hash: String,
    pub path: MerkleProof,
    /// Blocks after `height`, in order, up to the trusted block
    pub later_blocks: Vec<ChainLink>,
}

impl SnvProof {
    /// Build a proof for `op` accepted at `height`, anchored at `trusted_height`
    pub fn create(
        consensus: &ConsensusEngine,
        height: u64,
        op: &Operation,
        trusted_height: u64,
    ) -> Option<Self> {
        if trusted_height < height {
            return None;
        }

        let digest = consensus.digest_at(height)?;
        let operation_hash = hex::encode(op.digest());
        let index = digest
            .operation_hashes
            .iter()
            .position(|h| *h == operation_hash)?;

        let leaves = digest
            .operation_hashes
            .iter()
            .map(hex::decode)
            .collect::<Result<Vec<_>, _>>()
            .ok()?;
        let path = MerkleProof::build(&leaves, index)?;

        let mut later_blocks = Vec::new();
        for h in (height + 1)..=trusted_height {
            let later = consensus.digest_at(h)?;
            later_blocks.push(ChainLink {
                height: later.height,
                operations_root: later.operations_root.clone(),
            });
        }

        Some(Self {
            height,
            prev_consensus_hash: digest.prev_hash,
            operation_hash,
            path,
            later_blocks,
        })
    }

    /// Consensus hash the proof implies for its last block
    pub fn implied_hash(&self, op: &Operation) -> Option<ConsensusHash> {
        let leaf = op.digest();
        if hex::encode(&leaf) != self.operation_hash {
            return None;
        }

        let root = self.path.root_from(&leaf)?;
        let mut hash = fold_hash(&self.prev_consensus_hash, self.height, &root);

        let mut expected_height = self.height + 1;
        for link in &self.later_blocks {
            if link.height != expected_height {
                return None;
            }
            let root = hex::decode(&link.operations_root).ok()?;
            hash = fold_hash(&hash, link.height, &root);
            expected_height += 1;
        }

        Some(hash)
    }

    /// Height of the block the proof is anchored at
    pub fn trusted_height(&self) -> u64 {
        self.height + self.later_blocks.len() as u64
    }

    /// Verify `op` against a trusted consensus hash
    pub fn verify(&self, op: &Operation, trusted_hash: &ConsensusHash) -> bool {
        self.implied_hash(op)
            .map(|hash| hash == *trusted_hash)
            .unwrap_or(false)
    }
}

/// Light client holding trusted consensus hashes
#[derive(Debug, Clone, Default)]
pub struct SnvClient {
    trusted: BTreeMap<u64, ConsensusHash>,
}

impl SnvClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trust a consensus hash obtained out of band
    pub fn trust(&mut self, height: u64, hash: ConsensusHash) {
        self.trusted.insert(height, hash);
    }

    pub fn trusted_hash(&self, height: u64) -> Option<&ConsensusHash> {
        self.trusted.get(&height)
    }

    /// Check a proof against the hash trusted at its anchor height
    pub fn verify_operation(&self, op: &Operation, proof: &SnvProof) -> bool {
        match self.trusted.get(&proof.trusted_height()) {
            Some(hash) => proof.verify(op, hash),
            None => {
                log::debug!(
                    "No trusted consensus hash at block {}",
                    proof.trusted_height()
                );
                false
            }
        }
    }
}
