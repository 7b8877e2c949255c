//! Cryptographic hashing utilities for the registry
//!
//! Provides the SHA-256 and HASH160 primitives used for preorder
//! commitments, operation digests and consensus hashes.

use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Length in bytes of a HASH160 digest
pub const HASH160_LEN: usize = 20;

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes double SHA-256 hash (SHA-256 of SHA-256)
pub fn double_sha256(data: &[u8]) -> Vec<u8> {
    sha256(&sha256(data))
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Computes RIPEMD160(SHA256(data)), the Bitcoin-style HASH160
pub fn hash160(data: &[u8]) -> [u8; HASH160_LEN] {
    let mut ripemd = Ripemd160::new();
    ripemd.update(sha256(data));
    let digest = ripemd.finalize();

    let mut out = [0u8; HASH160_LEN];
    out.copy_from_slice(&digest);
    out
}

/// Computes HASH160 and returns it as a hex string
pub fn hash160_hex(data: &[u8]) -> String {
    hex::encode(hash160(data))
}

/// Checks that `value` is a lowercase or uppercase hex string of exactly `bytes` bytes
pub fn is_hex_digest(value: &str, bytes: usize) -> bool {
    value.len() == bytes * 2 && value.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256() {
        let data = b"hello world";
        let hash = sha256(data);
        assert_eq!(hash.len(), 32);
        assert_eq!(
            sha256_hex(data),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_double_sha256() {
        let data = b"hello world";
        let hash = double_sha256(data);
        assert_eq!(hash.len(), 32);
        assert_eq!(hash, sha256(&sha256(data)));
    }

    #[test]
    fn test_hash160() {
        // HASH160 of the empty string
        assert_eq!(hash160_hex(b""), "b472a266d0bd89c13706a4132ccfb16f7c3b9fcb");
        assert_eq!(hash160(b"foo.test").len(), HASH160_LEN);
    }

    #[test]
    fn test_is_hex_digest() {
        assert!(is_hex_digest(&"11".repeat(20), 20));
        assert!(!is_hex_digest(&"11".repeat(19), 20));
        assert!(!is_hex_digest(&"zz".repeat(20), 20));
    }
}
