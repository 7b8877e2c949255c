//! Consensus Hash Engine
//!
//! Each processed block gets a consensus hash:
//!
//! ```text
//! consensus(N) = DSHA256(consensus(N-1) ‖ height_be ‖ merkle_root(op digests))[..16]
//! ```
//!
//! The merkle root is taken over the accepted operations in delivery order,
//! so reordering, dropping or adding an operation changes the hash. Records
//! mutated in block N are stamped with consensus(N-1), never their own
//! block's hash.

use crate::core::operation::Operation;
use crate::crypto::{calculate_merkle_root, double_sha256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Length in bytes of a consensus hash
pub const CONSENSUS_HASH_LEN: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusHashError {
    #[error("Invalid consensus hash: {0}")]
    Invalid(String),
}

// =============================================================================
// Consensus Hash
// =============================================================================

/// Per-block consensus fingerprint
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ConsensusHash([u8; CONSENSUS_HASH_LEN]);

impl ConsensusHash {
    pub fn zero() -> Self {
        Self([0u8; CONSENSUS_HASH_LEN])
    }

    pub fn from_bytes(bytes: [u8; CONSENSUS_HASH_LEN]) -> Self {
        Self(bytes)
    }

    /// Take the first 16 bytes of a longer digest
    fn truncate(digest: &[u8]) -> Self {
        let mut bytes = [0u8; CONSENSUS_HASH_LEN];
        bytes.copy_from_slice(&digest[..CONSENSUS_HASH_LEN]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(value: &str) -> Result<Self, ConsensusHashError> {
        let bytes = hex::decode(value).map_err(|_| ConsensusHashError::Invalid(value.to_string()))?;
        let bytes: [u8; CONSENSUS_HASH_LEN] = bytes
            .try_into()
            .map_err(|_| ConsensusHashError::Invalid(value.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for ConsensusHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ConsensusHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConsensusHash({})", self.to_hex())
    }
}

impl FromStr for ConsensusHash {
    type Err = ConsensusHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for ConsensusHash {
    type Error = ConsensusHashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<ConsensusHash> for String {
    fn from(hash: ConsensusHash) -> Self {
        hash.to_hex()
    }
}

// =============================================================================
// Hashing
// =============================================================================

/// Merkle root over the digests of the ordered operations
pub fn operations_root(operations: &[Operation]) -> Vec<u8> {
    let digests: Vec<Vec<u8>> = operations.iter().map(|op| op.digest()).collect();
    calculate_merkle_root(&digests)
}

/// Fold a block's operations root into the previous consensus hash
pub fn fold_hash(prev_hash: &ConsensusHash, height: u64, operations_root: &[u8]) -> ConsensusHash {
    let mut data = Vec::with_capacity(CONSENSUS_HASH_LEN + 8 + operations_root.len());
    data.extend_from_slice(prev_hash.as_bytes());
    data.extend_from_slice(&height.to_be_bytes());
    data.extend_from_slice(operations_root);

    ConsensusHash::truncate(&double_sha256(&data))
}

/// Consensus hash of a block given the previous hash and its accepted operations
pub fn next_hash(prev_hash: &ConsensusHash, accepted: &[Operation], height: u64) -> ConsensusHash {
    fold_hash(prev_hash, height, &operations_root(accepted))
}

// =============================================================================
// Block Digests
// =============================================================================

/// Everything needed to recompute one block's consensus hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDigest {
    pub height: u64,
    pub prev_hash: ConsensusHash,
    pub consensus_hash: ConsensusHash,
    /// Merkle root of the accepted operations (hex)
    pub operations_root: String,
    /// Digests of the accepted operations, in order (hex)
    pub operation_hashes: Vec<String>,
}

impl BlockDigest {
    pub fn operation_count(&self) -> usize {
        self.operation_hashes.len()
    }

    /// Whether `op` is among the operations this block accepted
    pub fn contains(&self, op: &Operation) -> bool {
        let digest = hex::encode(op.digest());
        self.operation_hashes.iter().any(|h| *h == digest)
    }
}

/// Chain of per-block consensus hashes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusEngine {
    genesis: ConsensusHash,
    blocks: BTreeMap<u64, BlockDigest>,
}

impl ConsensusEngine {
    pub fn new(genesis: ConsensusHash) -> Self {
        Self {
            genesis,
            blocks: BTreeMap::new(),
        }
    }

    /// Hash of the latest committed block (the stamp for the next block)
    pub fn current(&self) -> ConsensusHash {
        self.blocks
            .values()
            .next_back()
            .map(|d| d.consensus_hash)
            .unwrap_or(self.genesis)
    }

    pub fn last_height(&self) -> Option<u64> {
        self.blocks.keys().next_back().copied()
    }

    /// Compute and record the consensus hash for a block
    pub fn commit_block(&mut self, height: u64, accepted: &[Operation]) -> ConsensusHash {
        let prev_hash = self.current();
        let digests: Vec<Vec<u8>> = accepted.iter().map(|op| op.digest()).collect();
        let root = calculate_merkle_root(&digests);
        let consensus_hash = fold_hash(&prev_hash, height, &root);

        self.blocks.insert(
            height,
            BlockDigest {
                height,
                prev_hash,
                consensus_hash,
                operations_root: hex::encode(&root),
                operation_hashes: digests.iter().map(hex::encode).collect(),
            },
        );

        consensus_hash
    }

    /// Consensus hash of a processed block
    pub fn hash_at(&self, height: u64) -> Option<ConsensusHash> {
        self.blocks.get(&height).map(|d| d.consensus_hash)
    }

    pub fn digest_at(&self, height: u64) -> Option<&BlockDigest> {
        self.blocks.get(&height)
    }

    /// Whether `hash` belongs to one of the `window` blocks before `height`
    pub fn is_recent(&self, hash: &ConsensusHash, height: u64, window: u64) -> bool {
        let start = height.saturating_sub(window);
        let mut recent = self.blocks.range(start..height);

        if recent.any(|(_, d)| &d.consensus_hash == hash) {
            return true;
        }

        // Before enough history exists, the genesis hash is still recent
        let first = self.blocks.keys().next().copied().unwrap_or(height);
        *hash == self.genesis && first >= start
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operation::{NameRevokeOp, NameUpdateOp};

    fn update(name: &str, value: &str) -> Operation {
        Operation::NameUpdate(NameUpdateOp {
            name: name.to_string(),
            sender: "76a914".to_string() + &"ab".repeat(20) + "88ac",
            value_hash: value.repeat(20),
            consensus_hash: None,
        })
    }

    #[test]
    fn test_hex_round_trip() {
        let hash = ConsensusHash::from_hex("17ac43c1d8549c3181b200f1bf97eb7d").unwrap();
        assert_eq!(hash.to_string(), "17ac43c1d8549c3181b200f1bf97eb7d");
        assert!(ConsensusHash::from_hex("17ac").is_err());
        assert!("zz".repeat(16).parse::<ConsensusHash>().is_err());

        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, "\"17ac43c1d8549c3181b200f1bf97eb7d\"");
    }

    #[test]
    fn test_next_hash_deterministic() {
        let ops = vec![update("foo.test", "11"), update("bar.test", "22")];
        let a = next_hash(&ConsensusHash::zero(), &ops, 100);
        let b = next_hash(&ConsensusHash::zero(), &ops, 100);
        assert_eq!(a, b);
    }

    #[test]
    fn test_next_hash_sensitivity() {
        let ops = vec![update("foo.test", "11"), update("bar.test", "22")];
        let base = next_hash(&ConsensusHash::zero(), &ops, 100);

        // Order
        let reversed: Vec<Operation> = ops.iter().rev().cloned().collect();
        assert_ne!(base, next_hash(&ConsensusHash::zero(), &reversed, 100));

        // Omission
        assert_ne!(base, next_hash(&ConsensusHash::zero(), &ops[..1], 100));

        // Field value
        let changed = vec![update("foo.test", "11"), update("bar.test", "33")];
        assert_ne!(base, next_hash(&ConsensusHash::zero(), &changed, 100));

        // Height and previous hash
        assert_ne!(base, next_hash(&ConsensusHash::zero(), &ops, 101));
        assert_ne!(base, next_hash(&base, &ops, 100));
    }

    #[test]
    fn test_engine_chain() {
        let mut engine = ConsensusEngine::new(ConsensusHash::zero());
        assert_eq!(engine.current(), ConsensusHash::zero());

        let h1 = engine.commit_block(10, &[]);
        assert_eq!(h1, next_hash(&ConsensusHash::zero(), &[], 10));
        assert_eq!(engine.current(), h1);

        let revoke = Operation::NameRevoke(NameRevokeOp {
            name: "foo.test".to_string(),
            sender: "a914".to_string() + &"cd".repeat(20) + "87",
        });
        let h2 = engine.commit_block(11, std::slice::from_ref(&revoke));
        assert_eq!(h2, next_hash(&h1, &[revoke], 11));

        let digest = engine.digest_at(11).unwrap();
        assert_eq!(digest.prev_hash, h1);
        assert_eq!(digest.operation_count(), 1);
        assert_eq!(engine.hash_at(10), Some(h1));
        assert_eq!(engine.hash_at(12), None);
        assert_eq!(engine.last_height(), Some(11));
    }

    #[test]
    fn test_recent_window() {
        let mut engine = ConsensusEngine::new(ConsensusHash::zero());
        let hashes: Vec<ConsensusHash> = (0..10).map(|h| engine.commit_block(h, &[])).collect();

        // Window of 3 blocks before height 10 covers heights 7, 8, 9
        assert!(engine.is_recent(&hashes[9], 10, 3));
        assert!(engine.is_recent(&hashes[7], 10, 3));
        assert!(!engine.is_recent(&hashes[6], 10, 3));
        assert!(!engine.is_recent(&ConsensusHash::zero(), 10, 3));

        // Genesis is recent while the window reaches before the first block
        assert!(engine.is_recent(&ConsensusHash::zero(), 10, 20));
    }
}
