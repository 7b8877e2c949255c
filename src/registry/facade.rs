//! Registry Facade
//!
//! Read API over the registry for RPC, CLI and the client queue. Block
//! application goes through a single writer; readers work on an immutable
//! snapshot of a completed block, so a reader never observes a partially
//! applied block.
//!
//! Snapshots are taken on demand. The writer only marks the published
//! snapshot stale, and the first reader after a change copies the state
//! under the writer lock. A replay with no interleaved readers never copies.

use crate::core::config::RegistryConfig;
use crate::core::consensus::ConsensusHash;
use crate::core::engine::{BlockReport, EngineError, StateEngine};
use crate::core::history::HistoricalEntry;
use crate::core::name::{NamePreorder, NameRecord};
use crate::core::namespace::Namespace;
use crate::core::operation::Operation;
use crate::core::snv::SnvProof;
use crate::core::state::RegistryState;
use crate::storage::persistence::{Storage, StorageError};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockWriteGuard};

/// Snapshot handed to readers
struct Published {
    state: Arc<RegistryState>,
    /// Blocks were applied after `state` was taken
    stale: bool,
}

pub struct Registry {
    engine: Mutex<StateEngine>,
    published: RwLock<Published>,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        Self::from_engine(StateEngine::new(config))
    }

    pub fn from_engine(engine: StateEngine) -> Self {
        let published = Published {
            state: Arc::new(engine.state().clone()),
            stale: false,
        };
        Self {
            engine: Mutex::new(engine),
            published: RwLock::new(published),
        }
    }

    fn engine(&self) -> MutexGuard<'_, StateEngine> {
        self.engine.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn published(&self) -> RwLockWriteGuard<'_, Published> {
        self.published
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy the engine state if blocks were applied since the last copy
    ///
    /// Lock order is engine then snapshot; callers hold the engine guard.
    fn refresh(&self, engine: &StateEngine) -> Arc<RegistryState> {
        let mut published = self.published();
        if published.stale {
            published.state = Arc::new(engine.state().clone());
            published.stale = false;
        }
        Arc::clone(&published.state)
    }

    fn apply(
        &self,
        engine: &mut StateEngine,
        height: u64,
        operations: &[Operation],
    ) -> Result<BlockReport, EngineError> {
        // A checkpoint mismatch is detected after the block is applied
        if engine.has_checkpoint(height) {
            self.refresh(engine);
        }

        match engine.process_block(height, operations) {
            Ok(report) => {
                self.published().stale = true;
                Ok(report)
            }
            Err(e) => {
                // The engine state now holds a rejected block; readers keep
                // the last snapshot taken before it
                if matches!(
                    e,
                    EngineError::ConsensusDivergence { .. } | EngineError::History(_)
                ) {
                    self.published().stale = false;
                }
                Err(e)
            }
        }
    }

    // ===== Writer =====

    /// Apply a block; readers see it from their next snapshot
    pub fn process_block(
        &self,
        height: u64,
        operations: &[Operation],
    ) -> Result<BlockReport, EngineError> {
        let mut engine = self.engine();
        self.apply(&mut engine, height, operations)
    }

    /// Process empty blocks up to `height`
    pub fn advance_to(&self, height: u64) -> Result<Vec<BlockReport>, EngineError> {
        let mut engine = self.engine();
        let mut reports = Vec::new();
        while engine.next_block() <= height {
            let next = engine.next_block();
            reports.push(self.apply(&mut engine, next, &[])?);
        }
        Ok(reports)
    }

    /// Next block the writer expects; does not take a snapshot
    pub fn next_block(&self) -> u64 {
        self.engine().next_block()
    }

    pub fn check_peer_hash(&self, height: u64, peer_hash: &ConsensusHash) -> Result<bool, EngineError> {
        self.engine().check_peer_hash(height, peer_hash)
    }

    pub fn is_halted(&self) -> bool {
        self.engine().is_halted()
    }

    /// Persist the last published snapshot
    pub fn save(&self, storage: &Storage) -> Result<(), StorageError> {
        storage.save(&self.snapshot())
    }

    // ===== Readers =====

    /// State as of the last completed block
    ///
    /// Waits for a block in progress when the published copy is stale.
    pub fn snapshot(&self) -> Arc<RegistryState> {
        {
            let published = self
                .published
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if !published.stale {
                return Arc::clone(&published.state);
            }
        }

        let engine = self.engine();
        self.refresh(&engine)
    }

    pub fn get_namespace(&self, namespace_id: &str) -> Option<Namespace> {
        self.snapshot().get_namespace(namespace_id).cloned()
    }

    pub fn get_namespace_reveal(&self, namespace_id: &str) -> Option<Namespace> {
        self.snapshot().get_namespace_reveal(namespace_id).cloned()
    }

    pub fn get_namespace_at(&self, namespace_id: &str, block_height: u64) -> Option<Namespace> {
        self.snapshot()
            .get_namespace_at(namespace_id, block_height)
            .cloned()
    }

    pub fn get_name(&self, name: &str) -> Option<NameRecord> {
        self.snapshot().get_name(name).cloned()
    }

    /// Records in force at `block_height`; empty before the first registration
    pub fn get_name_at(&self, name: &str, block_height: u64) -> Vec<NameRecord> {
        self.snapshot()
            .get_name_at(name, block_height)
            .cloned()
            .into_iter()
            .collect()
    }

    pub fn get_name_preorder(
        &self,
        name: &str,
        payer_script: &str,
        recipient_address: &str,
    ) -> Option<NamePreorder> {
        self.snapshot()
            .get_name_preorder(name, payer_script, recipient_address)
            .cloned()
    }

    pub fn name_history(&self, name: &str) -> Vec<HistoricalEntry<NameRecord>> {
        self.snapshot().history.name_history(name).to_vec()
    }

    pub fn names_owned_by(&self, address: &str) -> Vec<NameRecord> {
        self.snapshot()
            .names_owned_by(address)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn consensus_hash_at(&self, block_height: u64) -> Option<ConsensusHash> {
        self.snapshot().consensus_hash_at(block_height)
    }

    pub fn current_consensus_hash(&self) -> ConsensusHash {
        self.snapshot().current_consensus_hash()
    }

    pub fn last_block(&self) -> Option<u64> {
        self.snapshot().last_block
    }

    /// SNV proof for an operation accepted at `height`, anchored at `trusted_height`
    pub fn snv_proof(&self, height: u64, op: &Operation, trusted_height: u64) -> Option<SnvProof> {
        SnvProof::create(&self.snapshot().consensus, height, op, trusted_height)
    }
}
