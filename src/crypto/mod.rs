//! Cryptographic utilities for the registry
//!
//! This module provides:
//! - SHA-256 and HASH160 hashing
//! - Base58check addresses and payment scripts
//! - Merkle roots and inclusion proofs over block operations

pub mod address;
pub mod hash;
pub mod merkle;

pub use address::{
    decode_address, hash160_to_address, is_script_hex, payment_script, AddressError,
    P2PKH_TESTNET_VERSION, P2PKH_VERSION, P2SH_TESTNET_VERSION, P2SH_VERSION,
};
pub use hash::{
    double_sha256, hash160, hash160_hex, is_hex_digest, sha256, sha256_hex, HASH160_LEN,
};
pub use merkle::{calculate_merkle_root, MerkleProof, ProofStep};
