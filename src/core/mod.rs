//! Core registry components
//!
//! This module contains the deterministic state machine:
//! - Parsed operations and their canonical encoding
//! - Epoch price table and registry configuration
//! - Namespace and name lifecycle trackers
//! - Operation validator and reject taxonomy
//! - Historical state store and SNV proofs
//! - Consensus hash engine and the block-processing state engine

pub mod config;
pub mod consensus;
pub mod engine;
pub mod epoch;
pub mod error;
pub mod history;
pub mod name;
pub mod namespace;
pub mod operation;
pub mod snv;
pub mod state;
pub mod validator;

pub use config::{
    RegistryConfig, CONSENSUS_HASH_WINDOW, EPOCH_1_END_ENV, NAMESPACE_PREORDER_EXPIRE,
    NAMESPACE_REVEAL_EXPIRE, NAME_PREORDER_EXPIRE,
};
pub use consensus::{
    fold_hash, next_hash, operations_root, BlockDigest, ConsensusEngine, ConsensusHash,
    ConsensusHashError, CONSENSUS_HASH_LEN,
};
pub use engine::{BlockReport, BlockSummary, EngineError, RejectedOperation, StateEngine};
pub use epoch::{
    Epoch, EpochId, EpochRules, EpochTable, Multiplier, EPOCH_1_END_BLOCK, EPOCH_2_END_BLOCK,
    EPOCH_3_RENEWAL_GRACE_PERIOD,
};
pub use error::{MalformedOperation, RejectKind, RejectReason, RuleViolation, StaleReference};
pub use history::{HistoricalEntry, HistoricalStore, HistoryError};
pub use name::{NameLiveness, NamePreorder, NameRecord, NameTracker};
pub use namespace::{
    namespace_base_price, namespace_price, preorder_key, Namespace, NamespacePreorder,
    NamespaceStatus, NamespaceTracker, NAME_COST_UNIT,
};
pub use operation::{
    is_valid_name, is_valid_namespace_id, name_preorder_hash, namespace_preorder_hash,
    split_name, NamePreorderOp, NameRegisterOp, NameRenewOp, NameRevokeOp, NameTransferOp,
    NameUpdateOp, NamespacePreorderOp, NamespaceReadyOp, NamespaceRevealOp, OpKind, Operation,
    MAX_NAMESPACE_LEN, MAX_NAME_LEN, PRICE_BUCKETS,
};
pub use snv::{ChainLink, SnvClient, SnvProof};
pub use state::{RegistryState, Touched};
pub use validator::{validate, Effect, ValidationContext};
