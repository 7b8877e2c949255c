//! Versioned registry snapshot
//!
//! `RegistryState` is everything a replica knows after processing a block:
//! the live tables, the historical store and the consensus chain. The engine
//! owns one mutable copy; readers get immutable clones published per block.

use crate::core::config::RegistryConfig;
use crate::core::consensus::{ConsensusEngine, ConsensusHash};
use crate::core::history::HistoricalStore;
use crate::core::name::{NamePreorder, NameRecord, NameTracker};
use crate::core::namespace::{preorder_key, Namespace, NamespacePreorder, NamespaceTracker};
use crate::core::operation::name_preorder_hash;
use crate::core::validator::Effect;
use serde::{Deserialize, Serialize};

/// Entry changed by an applied operation
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Touched {
    Name(String),
    Namespace(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryState {
    pub config: RegistryConfig,
    pub namespaces: NamespaceTracker,
    pub names: NameTracker,
    pub history: HistoricalStore,
    pub consensus: ConsensusEngine,
    /// Last fully processed block
    pub last_block: Option<u64>,
    /// Number of blocks applied to this snapshot
    pub version: u64,
}

impl RegistryState {
    pub fn new(config: RegistryConfig) -> Self {
        let consensus = ConsensusEngine::new(config.genesis_consensus_hash);
        Self {
            config,
            namespaces: NamespaceTracker::new(),
            names: NameTracker::new(),
            history: HistoricalStore::new(),
            consensus,
            last_block: None,
            version: 0,
        }
    }

    /// Height the next block must have
    pub fn next_block(&self) -> u64 {
        self.last_block
            .map(|h| h + 1)
            .unwrap_or(self.config.first_block)
    }

    /// Height against which current lookups are judged
    fn current_height(&self) -> u64 {
        self.last_block.unwrap_or(self.config.first_block)
    }

    // ===== Mutation =====

    /// Apply a validated effect; returns the entry it changed, if any
    pub fn apply(&mut self, effect: Effect, block_height: u64, stamp: ConsensusHash) -> Option<Touched> {
        match effect {
            Effect::NamespacePreorder(preorder) => {
                self.namespaces.add_preorder(preorder);
                None
            }
            Effect::NamespaceReveal {
                preorder_key,
                namespace,
            } => {
                let id = namespace.namespace_id.clone();
                self.namespaces.reveal(&preorder_key, namespace);
                Some(Touched::Namespace(id))
            }
            Effect::NamespaceReady { namespace_id } => {
                self.namespaces.ready(&namespace_id, block_height);
                Some(Touched::Namespace(namespace_id))
            }
            Effect::NamePreorder(preorder) => {
                self.names.add_preorder(preorder);
                None
            }
            Effect::NameRegister {
                preorder_key,
                record,
            } => {
                let name = record.name.clone();
                self.names.register(&preorder_key, record);
                Some(Touched::Name(name))
            }
            Effect::NameUpdate { name, value_hash } => self
                .names
                .update(&name, &value_hash, block_height, stamp)
                .map(|_| Touched::Name(name.clone())),
            Effect::NameTransfer {
                name,
                address,
                sender,
                keep_data,
            } => self
                .names
                .transfer(&name, &address, &sender, keep_data, block_height, stamp)
                .map(|_| Touched::Name(name.clone())),
            Effect::NameRenew {
                name,
                op_fee,
                expire_block,
            } => self
                .names
                .renew(&name, op_fee, expire_block, block_height, stamp)
                .map(|_| Touched::Name(name.clone())),
            Effect::NameRevoke { name } => self
                .names
                .revoke(&name, block_height, stamp)
                .map(|_| Touched::Name(name.clone())),
        }
    }

    // ===== Queries =====

    /// Launched namespace
    pub fn get_namespace(&self, namespace_id: &str) -> Option<&Namespace> {
        self.namespaces.get_ready(namespace_id)
    }

    /// Namespace revealed but not yet launched (and still inside its window)
    pub fn get_namespace_reveal(&self, namespace_id: &str) -> Option<&Namespace> {
        self.namespaces.get_revealed(
            namespace_id,
            self.current_height(),
            self.config.namespace_reveal_expire,
        )
    }

    /// Current record of a resolvable name
    pub fn get_name(&self, name: &str) -> Option<&NameRecord> {
        let height = self.current_height();
        let grace = self.config.epochs.renewal_grace_period(height);
        self.names
            .get(name)
            .filter(|record| record.is_resolvable(height, grace))
    }

    /// Snapshot of a name in force at `block_height`
    pub fn get_name_at(&self, name: &str, block_height: u64) -> Option<&NameRecord> {
        self.history.name_at(name, block_height)
    }

    pub fn get_namespace_at(&self, namespace_id: &str, block_height: u64) -> Option<&Namespace> {
        self.history.namespace_at(namespace_id, block_height)
    }

    /// Live preorder committing to `name` for this payer and recipient
    pub fn get_name_preorder(
        &self,
        name: &str,
        payer_script: &str,
        recipient_address: &str,
    ) -> Option<&NamePreorder> {
        let hash = name_preorder_hash(name, payer_script, recipient_address);
        self.names
            .get_preorder(&preorder_key(&hash, payer_script))
            .filter(|p| !p.is_expired(self.current_height(), self.config.name_preorder_expire))
    }

    pub fn get_namespace_preorder(&self, key: &str) -> Option<&NamespacePreorder> {
        self.namespaces.get_preorder(key)
    }

    pub fn consensus_hash_at(&self, block_height: u64) -> Option<ConsensusHash> {
        self.consensus.hash_at(block_height)
    }

    /// Hash of the last processed block (genesis hash before any block)
    pub fn current_consensus_hash(&self) -> ConsensusHash {
        self.consensus.current()
    }

    /// Resolvable names owned by `address`
    pub fn names_owned_by(&self, address: &str) -> Vec<&NameRecord> {
        let height = self.current_height();
        let grace = self.config.epochs.renewal_grace_period(height);
        self.names
            .owned_by(address)
            .into_iter()
            .filter(|record| record.is_resolvable(height, grace))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::operation::OpKind;

    #[test]
    fn test_new_state() {
        let state = RegistryState::new(RegistryConfig::default().starting_at(680));
        assert_eq!(state.next_block(), 680);
        assert_eq!(state.current_consensus_hash(), ConsensusHash::zero());
        assert!(state.get_namespace("test").is_none());
        assert!(state.get_name("foo.test").is_none());
        assert!(state.names_owned_by("anyone").is_empty());
    }

    #[test]
    fn test_apply_preorder_is_not_touched() {
        let mut state = RegistryState::new(RegistryConfig::default());
        let touched = state.apply(
            Effect::NamePreorder(NamePreorder {
                preorder_hash: "ab".repeat(20),
                namespace_id: "test".to_string(),
                sender: "aa".to_string(),
                fee: 1,
                block_number: 0,
            }),
            0,
            ConsensusHash::zero(),
        );
        assert!(touched.is_none());
        assert_eq!(state.names.preorder_count(), 1);
    }

    #[test]
    fn test_apply_to_missing_name() {
        let mut state = RegistryState::new(RegistryConfig::default());
        let touched = state.apply(
            Effect::NameRevoke {
                name: "foo.test".to_string(),
            },
            0,
            ConsensusHash::zero(),
        );
        assert!(touched.is_none());
    }

    #[test]
    fn test_names_owned_by_temporary_address() {
        let mut state = RegistryState::new(RegistryConfig::default());
        state.names.register(
            "unused",
            NameRecord {
                name: "foo.test".to_string(),
                namespace_id: "test".to_string(),
                preorder_hash: "aa".repeat(20),
                address: "owner".to_string(),
                sender: "76a914".to_string() + &"01".repeat(20) + "88ac",
                value_hash: None,
                first_registered: 0,
                last_renewed: 0,
                expire_block: 1_000,
                op_fee: 0,
                consensus_hash: ConsensusHash::zero(),
                block_number: 0,
                last_op: OpKind::NameRegister,
                revoked: false,
            },
        );

        let owned = state.names_owned_by(&"owner".to_string());
        assert_eq!(owned.len(), 1);
    }
}
