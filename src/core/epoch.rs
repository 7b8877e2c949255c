//! Epoch Price Table
//!
//! Pricing and lifetime rules change at a small set of statically-known
//! block heights. Each epoch is a plain descriptor selected by height; there
//! is no per-epoch behaviour beyond the numbers it carries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Constants
// =============================================================================

/// Last block of the first epoch on mainnet
pub const EPOCH_1_END_BLOCK: u64 = 436_650;

/// Last block of the second epoch on mainnet
pub const EPOCH_2_END_BLOCK: u64 = 488_500;

/// Renewal grace period (in blocks) introduced by the third epoch
pub const EPOCH_3_RENEWAL_GRACE_PERIOD: u64 = 5_000;

// =============================================================================
// Multiplier
// =============================================================================

/// Exact rational price multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Multiplier {
    pub numerator: u64,
    pub denominator: u64,
}

impl Multiplier {
    pub const ONE: Multiplier = Multiplier {
        numerator: 1,
        denominator: 1,
    };

    pub fn new(numerator: u64, denominator: u64) -> Self {
        Self {
            numerator,
            denominator: denominator.max(1),
        }
    }

    pub fn whole(value: u64) -> Self {
        Self::new(value, 1)
    }

    /// Scale an amount, rounding down; saturates at `u64::MAX`
    pub fn apply(&self, amount: u64) -> u64 {
        let scaled = amount as u128 * self.numerator as u128 / self.denominator.max(1) as u128;
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }
}

impl Default for Multiplier {
    fn default() -> Self {
        Self::ONE
    }
}

// =============================================================================
// Epoch Descriptors
// =============================================================================

/// Identifies an epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EpochId {
    /// Launch rules
    Epoch1,
    /// Price increase and doubled name lifetimes
    Epoch2,
    /// Renewal grace period
    Epoch3,
}

/// Pricing rules for one namespace within an epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochRules {
    pub price_multiplier: Multiplier,
    pub lifetime_multiplier: u64,
}

impl EpochRules {
    pub fn new(price_multiplier: Multiplier, lifetime_multiplier: u64) -> Self {
        Self {
            price_multiplier,
            lifetime_multiplier,
        }
    }
}

impl Default for EpochRules {
    fn default() -> Self {
        Self::new(Multiplier::ONE, 1)
    }
}

/// A block-height range with its own pricing and lifetime rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    pub id: EpochId,
    /// First block (inclusive) governed by this epoch
    pub start_block: u64,
    /// Rules for namespaces without an override
    pub default_rules: EpochRules,
    /// Per-namespace overrides
    #[serde(default)]
    pub namespace_rules: BTreeMap<String, EpochRules>,
    /// Blocks after expiry during which only renewals are accepted
    pub renewal_grace_period: u64,
}

impl Epoch {
    pub fn new(id: EpochId, start_block: u64, default_rules: EpochRules) -> Self {
        Self {
            id,
            start_block,
            default_rules,
            namespace_rules: BTreeMap::new(),
            renewal_grace_period: 0,
        }
    }

    pub fn with_grace_period(mut self, blocks: u64) -> Self {
        self.renewal_grace_period = blocks;
        self
    }

    pub fn with_namespace_rules(mut self, namespace_id: &str, rules: EpochRules) -> Self {
        self.namespace_rules.insert(namespace_id.to_string(), rules);
        self
    }

    /// Rules that apply to the given namespace
    pub fn rules_for(&self, namespace_id: &str) -> EpochRules {
        self.namespace_rules
            .get(namespace_id)
            .copied()
            .unwrap_or(self.default_rules)
    }
}

// =============================================================================
// Epoch Table
// =============================================================================

/// Ordered set of epochs; a pure lookup by block height
///
/// Serialized as a plain list of epochs. Deserialization goes through
/// [`EpochTable::new`], so a loaded table is always sorted and non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Epoch>", into = "Vec<Epoch>")]
pub struct EpochTable {
    epochs: Vec<Epoch>,
}

impl EpochTable {
    /// Build a table; epochs are sorted by start block
    pub fn new(mut epochs: Vec<Epoch>) -> Self {
        if epochs.is_empty() {
            epochs.push(Epoch::new(EpochId::Epoch1, 0, EpochRules::default()));
        }
        epochs.sort_by_key(|e| e.start_block);
        Self { epochs }
    }

    /// The mainnet schedule
    pub fn mainnet() -> Self {
        Self::with_boundaries(EPOCH_1_END_BLOCK, EPOCH_2_END_BLOCK)
    }

    /// Mainnet rules with custom epoch boundaries (last block of epochs 1 and 2)
    pub fn with_boundaries(epoch_1_end: u64, epoch_2_end: u64) -> Self {
        let increased = EpochRules::new(Multiplier::whole(4), 2);
        Self::new(vec![
            Epoch::new(EpochId::Epoch1, 0, EpochRules::default()),
            Epoch::new(EpochId::Epoch2, epoch_1_end.saturating_add(1), increased),
            Epoch::new(
                EpochId::Epoch3,
                epoch_2_end.max(epoch_1_end).saturating_add(1),
                increased,
            )
                .with_grace_period(EPOCH_3_RENEWAL_GRACE_PERIOD),
        ])
    }

    /// Epoch governing a block height
    ///
    /// Heights before the first epoch resolve to the first epoch; heights
    /// past the last boundary resolve to the last epoch.
    pub fn epoch_at(&self, block_height: u64) -> &Epoch {
        let idx = self
            .epochs
            .partition_point(|e| e.start_block <= block_height);
        &self.epochs[idx.saturating_sub(1)]
    }

    /// Price multiplier for a namespace at a block height
    pub fn price_multiplier(&self, block_height: u64, namespace_id: &str) -> Multiplier {
        self.epoch_at(block_height)
            .rules_for(namespace_id)
            .price_multiplier
    }

    /// Name lifetime multiplier for a namespace at a block height
    pub fn lifetime_multiplier(&self, block_height: u64, namespace_id: &str) -> u64 {
        self.epoch_at(block_height)
            .rules_for(namespace_id)
            .lifetime_multiplier
    }

    /// Renewal grace period in force at a block height
    pub fn renewal_grace_period(&self, block_height: u64) -> u64 {
        self.epoch_at(block_height).renewal_grace_period
    }

    pub fn epochs(&self) -> &[Epoch] {
        &self.epochs
    }
}

impl From<Vec<Epoch>> for EpochTable {
    fn from(epochs: Vec<Epoch>) -> Self {
        Self::new(epochs)
    }
}

impl From<EpochTable> for Vec<Epoch> {
    fn from(table: EpochTable) -> Self {
        table.epochs
    }
}

impl Default for EpochTable {
    fn default() -> Self {
        Self::mainnet()
    }
}
