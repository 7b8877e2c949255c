//! Registry configuration
//!
//! Every replica must run with the same configuration; it is part of the
//! consensus rules, not a local tuning knob.

use crate::core::consensus::ConsensusHash;
use crate::core::epoch::{EpochTable, EPOCH_2_END_BLOCK};
use serde::{Deserialize, Serialize};

/// Blocks a name preorder stays redeemable
pub const NAME_PREORDER_EXPIRE: u64 = 144;

/// Blocks a namespace preorder stays redeemable
pub const NAMESPACE_PREORDER_EXPIRE: u64 = 144;

/// Blocks a revealed namespace has to become ready
pub const NAMESPACE_REVEAL_EXPIRE: u64 = 52_595;

/// Number of recent blocks whose consensus hash an operation may reference
pub const CONSENSUS_HASH_WINDOW: u64 = 96;

/// Environment variable that moves the end of the first epoch
pub const EPOCH_1_END_ENV: &str = "REGISTRY_EPOCH_1_END_BLOCK";

/// Consensus rules shared by all replicas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// First block height the registry processes
    pub first_block: u64,
    /// Epoch schedule
    pub epochs: EpochTable,
    pub name_preorder_expire: u64,
    pub namespace_preorder_expire: u64,
    pub namespace_reveal_expire: u64,
    pub consensus_hash_window: u64,
    /// Consensus hash "before" the first block
    pub genesis_consensus_hash: ConsensusHash,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            first_block: 0,
            epochs: EpochTable::mainnet(),
            name_preorder_expire: NAME_PREORDER_EXPIRE,
            namespace_preorder_expire: NAMESPACE_PREORDER_EXPIRE,
            namespace_reveal_expire: NAMESPACE_REVEAL_EXPIRE,
            consensus_hash_window: CONSENSUS_HASH_WINDOW,
            genesis_consensus_hash: ConsensusHash::zero(),
        }
    }
}

impl RegistryConfig {
    /// Start processing at a given block height
    pub fn starting_at(mut self, first_block: u64) -> Self {
        self.first_block = first_block;
        self
    }

    /// Move the end of the first epoch (the second epoch keeps its mainnet end)
    pub fn with_epoch_1_end(mut self, epoch_1_end: u64) -> Self {
        self.epochs = EpochTable::with_boundaries(epoch_1_end, EPOCH_2_END_BLOCK.max(epoch_1_end));
        self
    }

    pub fn with_epochs(mut self, epochs: EpochTable) -> Self {
        self.epochs = epochs;
        self
    }

    pub fn with_namespace_reveal_expire(mut self, blocks: u64) -> Self {
        self.namespace_reveal_expire = blocks;
        self
    }

    pub fn with_name_preorder_expire(mut self, blocks: u64) -> Self {
        self.name_preorder_expire = blocks;
        self
    }

    /// Apply overrides from the process environment
    pub fn apply_env(self) -> Self {
        match std::env::var(EPOCH_1_END_ENV)
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            Some(end) => {
                log::info!("Epoch 1 ends at block {} ({})", end, EPOCH_1_END_ENV);
                self.with_epoch_1_end(end)
            }
            None => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::epoch::{EpochId, Multiplier};

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert_eq!(config.first_block, 0);
        assert_eq!(config.name_preorder_expire, NAME_PREORDER_EXPIRE);
        assert_eq!(config.genesis_consensus_hash, ConsensusHash::zero());
        assert_eq!(config.epochs, EpochTable::mainnet());
    }

    #[test]
    fn test_epoch_override() {
        let config = RegistryConfig::default().with_epoch_1_end(704);
        assert_eq!(config.epochs.epoch_at(704).id, EpochId::Epoch1);
        assert_eq!(config.epochs.epoch_at(705).id, EpochId::Epoch2);
        assert_eq!(config.epochs.price_multiplier(705, "test"), Multiplier::whole(4));
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = RegistryConfig::default().starting_at(680).with_epoch_1_end(704);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: RegistryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
