//! State Engine
//!
//! Applies blocks of parsed operations to the registry, strictly in height
//! order and strictly sequentially within a block:
//!
//! 1. validate and apply each operation in delivery order, stamping mutated
//!    records with the previous block's consensus hash
//! 2. commit the block's consensus hash over the accepted operations
//! 3. snapshot every touched name and namespace into history and run the
//!    expiry sweeps
//!
//! A consensus hash that disagrees with a trusted checkpoint or a peer halts
//! the engine until an operator intervenes.

use crate::core::config::RegistryConfig;
use crate::core::consensus::ConsensusHash;
use crate::core::error::{RejectKind, RejectReason};
use crate::core::history::HistoryError;
use crate::core::operation::{OpKind, Operation};
use crate::core::state::{RegistryState, Touched};
use crate::core::validator::{validate, ValidationContext};
use crate::storage::checkpoint::{CheckpointManager, CheckpointResult};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Consensus divergence at block {height}: computed {local}, expected {expected}")]
    ConsensusDivergence {
        height: u64,
        local: ConsensusHash,
        expected: ConsensusHash,
    },
    #[error("Engine halted after divergence at block {0}")]
    Halted(u64),
    #[error("Block {got} delivered out of order, expected {expected}")]
    NonContiguousBlock { expected: u64, got: u64 },
    #[error("History error: {0}")]
    History(#[from] HistoryError),
}

// =============================================================================
// Block Report
// =============================================================================

/// A dropped operation and why
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedOperation {
    /// Position in the delivered block
    pub index: usize,
    pub kind: OpKind,
    pub reason: RejectReason,
}

/// Outcome of processing one block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReport {
    pub height: u64,
    pub consensus_hash: ConsensusHash,
    /// Stamp applied to records mutated in this block
    pub prev_consensus_hash: ConsensusHash,
    pub accepted: Vec<OpKind>,
    pub rejected: Vec<RejectedOperation>,
    pub expired_namespaces: Vec<String>,
}

impl BlockReport {
    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    pub fn rejected_count(&self) -> usize {
        self.rejected.len()
    }

    pub fn rejects_by_kind(&self) -> BTreeMap<RejectKind, usize> {
        let mut counts = BTreeMap::new();
        for r in &self.rejected {
            *counts.entry(r.reason.kind()).or_insert(0) += 1;
        }
        counts
    }

    pub fn summary(&self) -> BlockSummary {
        BlockSummary {
            height: self.height,
            consensus_hash: self.consensus_hash.to_hex(),
            accepted: self.accepted_count(),
            rejected: self.rejects_by_kind(),
        }
    }
}

/// Serializable per-block summary
#[derive(Debug, Clone, Serialize)]
pub struct BlockSummary {
    pub height: u64,
    pub consensus_hash: String,
    pub accepted: usize,
    pub rejected: BTreeMap<RejectKind, usize>,
}

// =============================================================================
// State Engine
// =============================================================================

pub struct StateEngine {
    state: RegistryState,
    checkpoints: CheckpointManager,
    halted_at: Option<u64>,
}

impl StateEngine {
    pub fn new(config: RegistryConfig) -> Self {
        Self::resume(RegistryState::new(config))
    }

    /// Continue from a persisted snapshot at `last_block + 1`
    pub fn resume(state: RegistryState) -> Self {
        if let Some(last) = state.last_block {
            log::info!(
                "Resuming registry after block {} ({})",
                last,
                state.current_consensus_hash()
            );
        }
        Self {
            state,
            checkpoints: CheckpointManager::new(),
            halted_at: None,
        }
    }

    pub fn with_checkpoints(mut self, checkpoints: CheckpointManager) -> Self {
        self.checkpoints = checkpoints;
        self
    }

    pub fn state(&self) -> &RegistryState {
        &self.state
    }

    pub fn into_state(self) -> RegistryState {
        self.state
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.state.config
    }

    pub fn next_block(&self) -> u64 {
        self.state.next_block()
    }

    pub fn is_halted(&self) -> bool {
        self.halted_at.is_some()
    }

    /// Whether a trusted checkpoint covers `height`
    pub fn has_checkpoint(&self, height: u64) -> bool {
        self.checkpoints.get_checkpoint(height).is_some()
    }

    /// Process every operation delivered for block `height`
    pub fn process_block(
        &mut self,
        height: u64,
        operations: &[Operation],
    ) -> Result<BlockReport, EngineError> {
        if let Some(at) = self.halted_at {
            return Err(EngineError::Halted(at));
        }

        let expected = self.state.next_block();
        if height != expected {
            return Err(EngineError::NonContiguousBlock {
                expected,
                got: height,
            });
        }

        // Phase 1: validate and apply against the previous block's hash
        let stamp = self.state.consensus.current();
        let ctx = ValidationContext {
            block_height: height,
            stamp,
        };

        let mut accepted_ops = Vec::new();
        let mut rejected = Vec::new();
        let mut touched = BTreeSet::new();

        for (index, op) in operations.iter().enumerate() {
            match validate(op, &self.state, &ctx) {
                Ok(effect) => {
                    if let Some(t) = self.state.apply(effect, height, stamp) {
                        touched.insert(t);
                    }
                    accepted_ops.push(op.clone());
                }
                Err(reason) => {
                    log::debug!(
                        "Block {}: rejected {} #{}: {}",
                        height,
                        op.kind(),
                        index,
                        reason
                    );
                    rejected.push(RejectedOperation {
                        index,
                        kind: op.kind(),
                        reason,
                    });
                }
            }
        }

        // Phase 2: commit
        let consensus_hash = self.state.consensus.commit_block(height, &accepted_ops);

        // Phase 3: expiry sweeps and history
        let config = &self.state.config;
        let expired_namespaces = self
            .state
            .namespaces
            .expire_reveals(height, config.namespace_reveal_expire);
        self.state
            .namespaces
            .expire_preorders(height, config.namespace_preorder_expire);
        self.state
            .names
            .expire_preorders(height, config.name_preorder_expire);
        touched.extend(expired_namespaces.iter().cloned().map(Touched::Namespace));

        self.snapshot_touched(height, &touched)?;

        self.state.last_block = Some(height);
        self.state.version += 1;

        let report = BlockReport {
            height,
            consensus_hash,
            prev_consensus_hash: stamp,
            accepted: accepted_ops.iter().map(Operation::kind).collect(),
            rejected,
            expired_namespaces,
        };

        log::info!(
            "Block {}: {} accepted, {} rejected, consensus {}",
            height,
            report.accepted_count(),
            report.rejected_count(),
            consensus_hash
        );

        if let CheckpointResult::Mismatch { expected, got } =
            self.checkpoints.verify_checkpoint(height, &consensus_hash)
        {
            return Err(self.halt(height, got, expected));
        }

        Ok(report)
    }

    fn snapshot_touched(
        &mut self,
        height: u64,
        touched: &BTreeSet<Touched>,
    ) -> Result<(), EngineError> {
        for entry in touched {
            match entry {
                Touched::Name(name) => {
                    if let Some(record) = self.state.names.get(name) {
                        self.state.history.append_name(height, record.clone())?;
                    }
                }
                Touched::Namespace(id) => {
                    if let Some(ns) = self.state.namespaces.get(id) {
                        self.state.history.append_namespace(height, ns.clone())?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Process empty blocks up to and including `height`
    pub fn advance_to(&mut self, height: u64) -> Result<Vec<BlockReport>, EngineError> {
        let mut reports = Vec::new();
        while self.state.next_block() <= height {
            let next = self.state.next_block();
            reports.push(self.process_block(next, &[])?);
        }
        Ok(reports)
    }

    /// Compare our hash at `height` with the one a peer reports
    pub fn check_peer_hash(
        &mut self,
        height: u64,
        peer_hash: &ConsensusHash,
    ) -> Result<bool, EngineError> {
        match self.state.consensus.hash_at(height) {
            Some(local) if local == *peer_hash => Ok(true),
            Some(local) => Err(self.halt(height, local, *peer_hash)),
            None => Ok(false),
        }
    }

    fn halt(&mut self, height: u64, local: ConsensusHash, expected: ConsensusHash) -> EngineError {
        log::error!(
            "Consensus divergence at block {}: computed {}, expected {}. Halting.",
            height,
            local,
            expected
        );
        self.halted_at = Some(height);
        EngineError::ConsensusDivergence {
            height,
            local,
            expected,
        }
    }
}
