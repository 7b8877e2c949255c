//! Merkle tree over the ordered operations of a block
//!
//! The consensus hash of a block folds the merkle root of its accepted
//! operation digests, so a single operation can later be proven against a
//! consensus hash without the rest of the block.

use super::hash::sha256;
use serde::{Deserialize, Serialize};

/// Calculate the merkle root from an ordered list of leaf hashes
pub fn calculate_merkle_root(hashes: &[Vec<u8>]) -> Vec<u8> {
    if hashes.is_empty() {
        return sha256(b"");
    }

    let mut current_level: Vec<Vec<u8>> = hashes.to_vec();

    while current_level.len() > 1 {
        current_level = current_level
            .chunks(2)
            .map(|chunk| {
                // Duplicate the last hash if odd number
                let right = chunk.get(1).unwrap_or(&chunk[0]);
                hash_pair(&chunk[0], right)
            })
            .collect();
    }

    current_level.remove(0)
}

fn hash_pair(left: &[u8], right: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(left.len() + right.len());
    data.extend_from_slice(left);
    data.extend_from_slice(right);
    sha256(&data)
}

/// One step of a merkle path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    /// Sibling hash (hex)
    pub hash: String,
    /// Whether the sibling sits on the left
    pub is_left: bool,
}

/// Merkle proof for verifying operation inclusion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Sibling hashes from leaf to root
    pub path: Vec<ProofStep>,
}

impl MerkleProof {
    /// Build the proof path for the leaf at `index`
    pub fn build(hashes: &[Vec<u8>], mut index: usize) -> Option<Self> {
        if index >= hashes.len() {
            return None;
        }

        let mut path = Vec::new();
        let mut level: Vec<Vec<u8>> = hashes.to_vec();

        while level.len() > 1 {
            if level.len() % 2 == 1 {
                let last = level[level.len() - 1].clone();
                level.push(last);
            }

            let sibling_idx = if index % 2 == 0 { index + 1 } else { index - 1 };
            path.push(ProofStep {
                hash: hex::encode(&level[sibling_idx]),
                is_left: index % 2 == 1,
            });

            level = level
                .chunks(2)
                .map(|chunk| hash_pair(&chunk[0], &chunk[1]))
                .collect();
            index /= 2;
        }

        Some(Self { path })
    }

    /// Fold the path starting at `leaf_hash`, returning the implied root
    pub fn root_from(&self, leaf_hash: &[u8]) -> Option<Vec<u8>> {
        let mut current = leaf_hash.to_vec();

        for step in &self.path {
            let sibling = hex::decode(&step.hash).ok()?;
            current = if step.is_left {
                hash_pair(&sibling, &current)
            } else {
                hash_pair(&current, &sibling)
            };
        }

        Some(current)
    }

    /// Verify the proof against a root hash
    pub fn verify(&self, leaf_hash: &[u8], root_hash: &[u8]) -> bool {
        self.root_from(leaf_hash)
            .map(|root| root == root_hash)
            .unwrap_or(false)
    }
}
