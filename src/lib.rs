//! Name Registry: the deterministic state engine of a blockchain-anchored
//! name registry
//!
//! This crate provides:
//! - Namespace and name lifecycles (preorder, reveal, ready, register,
//!   update, transfer, renew, revoke) with epoch-based pricing
//! - Chained consensus hashes over accepted operations
//! - Historical snapshots for point-in-time queries
//! - Simplified name verification (SNV) proofs
//! - JSON persistence with trusted checkpoints
//! - A client-side submission queue with retry and backoff
//!
//! # Example
//!
//! ```rust
//! use name_registry::core::RegistryConfig;
//! use name_registry::registry::Registry;
//!
//! // Start a registry at block 100
//! let registry = Registry::new(RegistryConfig::default().starting_at(100));
//!
//! // Feed it blocks in order
//! let report = registry.process_block(100, &[]).unwrap();
//! println!("Block {} -> {}", report.height, report.consensus_hash);
//!
//! assert_eq!(registry.last_block(), Some(100));
//! assert_eq!(registry.consensus_hash_at(100), Some(report.consensus_hash));
//! ```

pub mod cli;
pub mod core;
pub mod crypto;
pub mod queue;
pub mod registry;
pub mod storage;

// Re-export commonly used types
pub use crate::core::{
    BlockReport, ConsensusHash, EngineError, Namespace, NameRecord, OpKind, Operation,
    RegistryConfig, RegistryState, RejectReason, SnvClient, SnvProof, StateEngine,
};
pub use queue::{Broadcaster, QueuePoller, SubmissionQueue};
pub use registry::Registry;
pub use storage::{CheckpointManager, Storage};
