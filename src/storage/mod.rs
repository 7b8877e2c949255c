//! Storage module for registry persistence
//!
//! - JSON snapshots of the full registry state with rotating backups
//! - Trusted consensus checkpoints

pub mod checkpoint;
pub mod persistence;

pub use checkpoint::{Checkpoint, CheckpointManager, CheckpointResult};
pub use persistence::{
    load_from_file, save_to_file, Storage, StorageConfig, StorageError, StorageStats,
};
