//! Consensus Checkpoints
//!
//! Trusted `(height, consensus hash)` pairs, from peers or hardcoded. After
//! each block the engine compares its own hash against the checkpoint at
//! that height; a mismatch means this replica diverged and must stop.

use crate::core::consensus::ConsensusHash;
use crate::storage::persistence::StorageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

// =============================================================================
// Checkpoint Entry
// =============================================================================

/// A consensus hash known to be correct at a height
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub height: u64,
    pub consensus_hash: ConsensusHash,
    /// Where the checkpoint came from (peer, release, operator)
    #[serde(default)]
    pub source: Option<String>,
}

impl Checkpoint {
    pub fn new(height: u64, consensus_hash: ConsensusHash) -> Self {
        Self {
            height,
            consensus_hash,
            source: None,
        }
    }

    pub fn from_peer(height: u64, consensus_hash: ConsensusHash, peer: &str) -> Self {
        Self {
            height,
            consensus_hash,
            source: Some(peer.to_string()),
        }
    }
}

// =============================================================================
// Checkpoint Manager
// =============================================================================

#[derive(Debug, Clone, Default)]
pub struct CheckpointManager {
    checkpoints: BTreeMap<u64, Checkpoint>,
}

impl CheckpointManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load checkpoints from a JSON array file
    pub fn from_file(path: &Path) -> Result<Self, StorageError> {
        let json = fs::read_to_string(path)?;
        let checkpoints: Vec<Checkpoint> = serde_json::from_str(&json)?;

        let mut manager = Self::new();
        manager.add_checkpoints(checkpoints);
        log::info!("Loaded {} checkpoints from {:?}", manager.len(), path);
        Ok(manager)
    }

    /// Add a checkpoint, replacing any at the same height
    pub fn add_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.checkpoints.insert(checkpoint.height, checkpoint);
    }

    pub fn add_checkpoints(&mut self, checkpoints: Vec<Checkpoint>) {
        for cp in checkpoints {
            self.add_checkpoint(cp);
        }
    }

    /// Compare a computed consensus hash with the checkpoint at its height
    pub fn verify_checkpoint(&self, height: u64, hash: &ConsensusHash) -> CheckpointResult {
        match self.checkpoints.get(&height) {
            Some(cp) if cp.consensus_hash == *hash => CheckpointResult::Match,
            Some(cp) => CheckpointResult::Mismatch {
                expected: cp.consensus_hash,
                got: *hash,
            },
            None => CheckpointResult::NoCheckpoint,
        }
    }

    pub fn get_checkpoint(&self, height: u64) -> Option<&Checkpoint> {
        self.checkpoints.get(&height)
    }

    pub fn get_highest(&self) -> Option<&Checkpoint> {
        self.checkpoints.values().next_back()
    }

    /// All checkpoints, lowest first
    pub fn all(&self) -> Vec<&Checkpoint> {
        self.checkpoints.values().collect()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}

// =============================================================================
// Checkpoint Result
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckpointResult {
    Match,
    Mismatch {
        expected: ConsensusHash,
        got: ConsensusHash,
    },
    NoCheckpoint,
}

impl CheckpointResult {
    pub fn is_valid(&self) -> bool {
        matches!(
            self,
            CheckpointResult::Match | CheckpointResult::NoCheckpoint
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
