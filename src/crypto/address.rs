//! Address and payment-script handling
//!
//! Owners and payers are identified on-chain by base58check addresses; the
//! registry records the matching payment script (`sender`) alongside the
//! address so that ownership checks compare scripts, not address strings.

use sha2::{Digest, Sha256};
use thiserror::Error;

use super::hash::HASH160_LEN;

/// Version byte of a pay-to-pubkey-hash address (mainnet)
pub const P2PKH_VERSION: u8 = 0x00;

/// Version byte of a pay-to-script-hash address (mainnet)
pub const P2SH_VERSION: u8 = 0x05;

/// Version byte of a pay-to-pubkey-hash address (testnet / regtest)
pub const P2PKH_TESTNET_VERSION: u8 = 0x6f;

/// Version byte of a pay-to-script-hash address (testnet / regtest)
pub const P2SH_TESTNET_VERSION: u8 = 0xc4;

/// Errors that can occur while decoding addresses
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("Invalid base58 encoding")]
    InvalidEncoding,
    #[error("Invalid address length: {0}")]
    InvalidLength(usize),
    #[error("Invalid address checksum")]
    InvalidChecksum,
    #[error("Unsupported address version: {0:#04x}")]
    UnsupportedVersion(u8),
}

fn checksum(payload: &[u8]) -> [u8; 4] {
    let first = Sha256::digest(payload);
    let second = Sha256::digest(first);
    [second[0], second[1], second[2], second[3]]
}

/// Encode a HASH160 with a version byte as a base58check address
pub fn hash160_to_address(version: u8, hash: &[u8; HASH160_LEN]) -> String {
    let mut address_bytes = Vec::with_capacity(1 + HASH160_LEN + 4);
    address_bytes.push(version);
    address_bytes.extend_from_slice(hash);
    let check = checksum(&address_bytes);
    address_bytes.extend_from_slice(&check);

    bs58::encode(address_bytes).into_string()
}

/// Decode a base58check address into its version byte and HASH160
pub fn decode_address(address: &str) -> Result<(u8, [u8; HASH160_LEN]), AddressError> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|_| AddressError::InvalidEncoding)?;

    if bytes.len() != 1 + HASH160_LEN + 4 {
        return Err(AddressError::InvalidLength(bytes.len()));
    }

    let (payload, check) = bytes.split_at(1 + HASH160_LEN);
    if checksum(payload) != check {
        return Err(AddressError::InvalidChecksum);
    }

    let mut hash = [0u8; HASH160_LEN];
    hash.copy_from_slice(&payload[1..]);
    Ok((payload[0], hash))
}

/// Derive the hex-encoded payment script for an address
///
/// P2PKH addresses map to `76a914<hash>88ac`, P2SH addresses to `a914<hash>87`.
pub fn payment_script(address: &str) -> Result<String, AddressError> {
    let (version, hash) = decode_address(address)?;

    match version {
        P2PKH_VERSION | P2PKH_TESTNET_VERSION => Ok(format!("76a914{}88ac", hex::encode(hash))),
        P2SH_VERSION | P2SH_TESTNET_VERSION => Ok(format!("a914{}87", hex::encode(hash))),
        other => Err(AddressError::UnsupportedVersion(other)),
    }
}

/// Check whether a string is a hex-encoded script
pub fn is_script_hex(script: &str) -> bool {
    !script.is_empty() && script.len() % 2 == 0 && script.chars().all(|c| c.is_ascii_hexdigit())
}
