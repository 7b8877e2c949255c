//! Parsed registry operations
//!
//! The transport layer delivers operations already parsed out of chain
//! transactions. This module defines their shape, the shape checks that make
//! an operation `Malformed`, and the canonical byte encoding that feeds the
//! consensus hash.

use crate::core::consensus::ConsensusHash;
use crate::core::error::MalformedOperation;
use crate::crypto::{hash160_hex, is_hex_digest, is_script_hex, payment_script, sha256, HASH160_LEN};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Constants
// =============================================================================

/// Maximum length of a fully-qualified name (`label.namespace`)
pub const MAX_NAME_LEN: usize = 37;

/// Maximum length of a namespace id
pub const MAX_NAMESPACE_LEN: usize = 19;

/// Number of price buckets revealed with a namespace
pub const PRICE_BUCKETS: usize = 16;

/// Largest bucket exponent
pub const MAX_BUCKET_EXPONENT: u8 = 15;

/// Largest price coefficient or base
pub const MAX_PRICE_PARAMETER: u32 = 255;

/// Largest discount divisor
pub const MAX_DISCOUNT: u32 = 15;

/// Length in bytes of a name's value hash
pub const VALUE_HASH_LEN: usize = HASH160_LEN;

// =============================================================================
// Op Codes
// =============================================================================

/// Operation kinds and their wire opcodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OpKind {
    NamespacePreorder,
    NamespaceReveal,
    NamespaceReady,
    NamePreorder,
    NameRegister,
    NameUpdate,
    NameTransfer,
    NameRenew,
    NameRevoke,
}

impl OpKind {
    pub fn opcode(&self) -> u8 {
        match self {
            OpKind::NamespacePreorder => b'*',
            OpKind::NamespaceReveal => b'&',
            OpKind::NamespaceReady => b'!',
            OpKind::NamePreorder => b'?',
            OpKind::NameRegister => b':',
            OpKind::NameUpdate => b'+',
            OpKind::NameTransfer => b'>',
            OpKind::NameRenew => b'=',
            OpKind::NameRevoke => b'~',
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::NamespacePreorder => "NAMESPACE_PREORDER",
            OpKind::NamespaceReveal => "NAMESPACE_REVEAL",
            OpKind::NamespaceReady => "NAMESPACE_READY",
            OpKind::NamePreorder => "NAME_PREORDER",
            OpKind::NameRegister => "NAME_REGISTRATION",
            OpKind::NameUpdate => "NAME_UPDATE",
            OpKind::NameTransfer => "NAME_TRANSFER",
            OpKind::NameRenew => "NAME_RENEWAL",
            OpKind::NameRevoke => "NAME_REVOKE",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Operation Payloads
// =============================================================================

/// Commit to creating a namespace without revealing its id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespacePreorderOp {
    /// HASH160(namespace_id ‖ sender script ‖ recipient address)
    pub preorder_hash: String,
    /// Payer's script
    pub sender: String,
    /// Amount burned
    pub fee: u64,
    #[serde(default)]
    pub consensus_hash: Option<ConsensusHash>,
}

/// Reveal a preordered namespace and fix its pricing parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceRevealOp {
    pub namespace_id: String,
    /// Script of the preorder's payer
    pub sender: String,
    /// Address whose key may launch the namespace
    pub recipient_address: String,
    /// Name lifetime in blocks (before epoch multipliers)
    pub lifetime: u64,
    pub coeff: u32,
    pub base: u32,
    pub buckets: [u8; PRICE_BUCKETS],
    pub nonalpha_discount: u32,
    pub no_vowel_discount: u32,
}

/// Open a revealed namespace for registrations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceReadyOp {
    pub namespace_id: String,
    /// Script of the revealing key
    pub sender: String,
}

/// Commit to registering a name in a namespace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamePreorderOp {
    /// HASH160(name ‖ sender script ‖ recipient address)
    pub preorder_hash: String,
    /// Namespace the name will live in
    pub namespace_id: String,
    /// Payer's script
    pub sender: String,
    /// Amount burned
    pub fee: u64,
    #[serde(default)]
    pub consensus_hash: Option<ConsensusHash>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRegisterOp {
    pub name: String,
    /// Script of the preorder's payer
    pub sender: String,
    /// New owner
    pub recipient_address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameUpdateOp {
    pub name: String,
    /// Owner's script
    pub sender: String,
    /// HASH160 of the off-chain metadata (hex)
    pub value_hash: String,
    #[serde(default)]
    pub consensus_hash: Option<ConsensusHash>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameTransferOp {
    pub name: String,
    /// Current owner's script
    pub sender: String,
    pub recipient_address: String,
    /// Keep the value hash across the transfer
    pub keep_data: bool,
    #[serde(default)]
    pub consensus_hash: Option<ConsensusHash>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRenewOp {
    pub name: String,
    /// Owner's script
    pub sender: String,
    /// Script paying for the renewal, if not the owner
    #[serde(default)]
    pub payer: Option<String>,
    pub fee: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRevokeOp {
    pub name: String,
    /// Owner's script
    pub sender: String,
}

// =============================================================================
// Operation
// =============================================================================

/// A parsed registry operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    NamespacePreorder(NamespacePreorderOp),
    NamespaceReveal(NamespaceRevealOp),
    NamespaceReady(NamespaceReadyOp),
    NamePreorder(NamePreorderOp),
    NameRegister(NameRegisterOp),
    NameUpdate(NameUpdateOp),
    NameTransfer(NameTransferOp),
    NameRenew(NameRenewOp),
    NameRevoke(NameRevokeOp),
}

impl Operation {
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::NamespacePreorder(_) => OpKind::NamespacePreorder,
            Operation::NamespaceReveal(_) => OpKind::NamespaceReveal,
            Operation::NamespaceReady(_) => OpKind::NamespaceReady,
            Operation::NamePreorder(_) => OpKind::NamePreorder,
            Operation::NameRegister(_) => OpKind::NameRegister,
            Operation::NameUpdate(_) => OpKind::NameUpdate,
            Operation::NameTransfer(_) => OpKind::NameTransfer,
            Operation::NameRenew(_) => OpKind::NameRenew,
            Operation::NameRevoke(_) => OpKind::NameRevoke,
        }
    }

    /// Script of the party that signed the operation
    pub fn sender(&self) -> &str {
        match self {
            Operation::NamespacePreorder(op) => &op.sender,
            Operation::NamespaceReveal(op) => &op.sender,
            Operation::NamespaceReady(op) => &op.sender,
            Operation::NamePreorder(op) => &op.sender,
            Operation::NameRegister(op) => &op.sender,
            Operation::NameUpdate(op) => &op.sender,
            Operation::NameTransfer(op) => &op.sender,
            Operation::NameRenew(op) => &op.sender,
            Operation::NameRevoke(op) => &op.sender,
        }
    }

    /// Name or namespace the operation targets, when it is in the clear
    pub fn target(&self) -> Option<&str> {
        match self {
            Operation::NamespacePreorder(_) | Operation::NamePreorder(_) => None,
            Operation::NamespaceReveal(op) => Some(&op.namespace_id),
            Operation::NamespaceReady(op) => Some(&op.namespace_id),
            Operation::NameRegister(op) => Some(&op.name),
            Operation::NameUpdate(op) => Some(&op.name),
            Operation::NameTransfer(op) => Some(&op.name),
            Operation::NameRenew(op) => Some(&op.name),
            Operation::NameRevoke(op) => Some(&op.name),
        }
    }

    /// Consensus hash the client embedded, if any
    pub fn referenced_consensus_hash(&self) -> Option<&ConsensusHash> {
        match self {
            Operation::NamespacePreorder(op) => op.consensus_hash.as_ref(),
            Operation::NamePreorder(op) => op.consensus_hash.as_ref(),
            Operation::NameUpdate(op) => op.consensus_hash.as_ref(),
            Operation::NameTransfer(op) => op.consensus_hash.as_ref(),
            _ => None,
        }
    }

    /// Shape checks that do not depend on registry state
    pub fn check_well_formed(&self) -> Result<(), MalformedOperation> {
        check_script(self.sender())?;

        match self {
            Operation::NamespacePreorder(op) => check_preorder_hash(&op.preorder_hash),
            Operation::NamespaceReveal(op) => {
                check_namespace_id(&op.namespace_id)?;
                check_address(&op.recipient_address)?;
                check_reveal_parameters(op)
            }
            Operation::NamespaceReady(op) => check_namespace_id(&op.namespace_id),
            Operation::NamePreorder(op) => {
                check_preorder_hash(&op.preorder_hash)?;
                check_namespace_id(&op.namespace_id)
            }
            Operation::NameRegister(op) => {
                check_name(&op.name)?;
                check_address(&op.recipient_address)
            }
            Operation::NameUpdate(op) => {
                check_name(&op.name)?;
                if !is_hex_digest(&op.value_hash, VALUE_HASH_LEN) {
                    return Err(MalformedOperation::InvalidHash {
                        field: "value_hash",
                        value: op.value_hash.clone(),
                    });
                }
                Ok(())
            }
            Operation::NameTransfer(op) => {
                check_name(&op.name)?;
                check_address(&op.recipient_address)
            }
            Operation::NameRenew(op) => {
                check_name(&op.name)?;
                match &op.payer {
                    Some(payer) => check_script(payer),
                    None => Ok(()),
                }
            }
            Operation::NameRevoke(op) => check_name(&op.name),
        }
    }

    /// Canonical encoding: opcode followed by length-prefixed fields
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut w = CanonicalWriter::new(self.kind());

        match self {
            Operation::NamespacePreorder(op) => {
                w.put_str(&op.preorder_hash);
                w.put_str(&op.sender);
                w.put_u64(op.fee);
                w.put_opt_hash(op.consensus_hash.as_ref());
            }
            Operation::NamespaceReveal(op) => {
                w.put_str(&op.namespace_id);
                w.put_str(&op.sender);
                w.put_str(&op.recipient_address);
                w.put_u64(op.lifetime);
                w.put_u64(op.coeff as u64);
                w.put_u64(op.base as u64);
                w.put_bytes(&op.buckets);
                w.put_u64(op.nonalpha_discount as u64);
                w.put_u64(op.no_vowel_discount as u64);
            }
            Operation::NamespaceReady(op) => {
                w.put_str(&op.namespace_id);
                w.put_str(&op.sender);
            }
            Operation::NamePreorder(op) => {
                w.put_str(&op.preorder_hash);
                w.put_str(&op.namespace_id);
                w.put_str(&op.sender);
                w.put_u64(op.fee);
                w.put_opt_hash(op.consensus_hash.as_ref());
            }
            Operation::NameRegister(op) => {
                w.put_str(&op.name);
                w.put_str(&op.sender);
                w.put_str(&op.recipient_address);
            }
            Operation::NameUpdate(op) => {
                w.put_str(&op.name);
                w.put_str(&op.sender);
                w.put_str(&op.value_hash.to_ascii_lowercase());
                w.put_opt_hash(op.consensus_hash.as_ref());
            }
            Operation::NameTransfer(op) => {
                w.put_str(&op.name);
                w.put_str(&op.sender);
                w.put_str(&op.recipient_address);
                w.put_bool(op.keep_data);
                w.put_opt_hash(op.consensus_hash.as_ref());
            }
            Operation::NameRenew(op) => {
                w.put_str(&op.name);
                w.put_str(&op.sender);
                w.put_opt_str(op.payer.as_deref());
                w.put_u64(op.fee);
            }
            Operation::NameRevoke(op) => {
                w.put_str(&op.name);
                w.put_str(&op.sender);
            }
        }

        w.finish()
    }

    /// SHA-256 of the canonical encoding
    pub fn digest(&self) -> Vec<u8> {
        sha256(&self.canonical_bytes())
    }
}

struct CanonicalWriter {
    buf: Vec<u8>,
}

impl CanonicalWriter {
    fn new(kind: OpKind) -> Self {
        Self {
            buf: vec![kind.opcode()],
        }
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        self.buf.extend_from_slice(bytes);
    }

    fn put_str(&mut self, value: &str) {
        self.put_bytes(value.as_bytes());
    }

    fn put_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn put_bool(&mut self, value: bool) {
        self.buf.push(value as u8);
    }

    fn put_opt_str(&mut self, value: Option<&str>) {
        match value {
            Some(v) => {
                self.buf.push(1);
                self.put_str(v);
            }
            None => self.buf.push(0),
        }
    }

    fn put_opt_hash(&mut self, value: Option<&ConsensusHash>) {
        match value {
            Some(hash) => {
                self.buf.push(1);
                self.put_bytes(hash.as_bytes());
            }
            None => self.buf.push(0),
        }
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

// =============================================================================
// Commitments
// =============================================================================

/// Preorder commitment for a name
pub fn name_preorder_hash(name: &str, sender_script: &str, recipient_address: &str) -> String {
    commitment(name, sender_script, recipient_address)
}

/// Preorder commitment for a namespace
pub fn namespace_preorder_hash(
    namespace_id: &str,
    sender_script: &str,
    recipient_address: &str,
) -> String {
    commitment(namespace_id, sender_script, recipient_address)
}

fn commitment(id: &str, sender_script: &str, recipient_address: &str) -> String {
    let mut data = Vec::with_capacity(id.len() + sender_script.len() + recipient_address.len());
    data.extend_from_slice(id.as_bytes());
    data.extend_from_slice(sender_script.to_ascii_lowercase().as_bytes());
    data.extend_from_slice(recipient_address.as_bytes());
    hash160_hex(&data)
}

// =============================================================================
// Name Helpers
// =============================================================================

/// Split `label.namespace` into its parts
pub fn split_name(name: &str) -> Option<(&str, &str)> {
    let (label, namespace_id) = name.rsplit_once('.')?;
    if label.is_empty() || namespace_id.is_empty() {
        return None;
    }
    Some((label, namespace_id))
}

pub fn is_valid_namespace_id(namespace_id: &str) -> bool {
    !namespace_id.is_empty()
        && namespace_id.len() <= MAX_NAMESPACE_LEN
        && namespace_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

pub fn is_valid_name(name: &str) -> bool {
    if name.len() > MAX_NAME_LEN {
        return false;
    }

    match split_name(name) {
        Some((label, namespace_id)) => {
            is_valid_namespace_id(namespace_id)
                && label.chars().all(|c| {
                    c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '+')
                })
        }
        None => false,
    }
}

fn check_name(name: &str) -> Result<(), MalformedOperation> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(MalformedOperation::InvalidName(name.to_string()))
    }
}

fn check_namespace_id(namespace_id: &str) -> Result<(), MalformedOperation> {
    if is_valid_namespace_id(namespace_id) {
        Ok(())
    } else {
        Err(MalformedOperation::InvalidNamespaceId(namespace_id.to_string()))
    }
}

fn check_preorder_hash(hash: &str) -> Result<(), MalformedOperation> {
    if is_hex_digest(hash, HASH160_LEN) {
        Ok(())
    } else {
        Err(MalformedOperation::InvalidHash {
            field: "preorder_hash",
            value: hash.to_string(),
        })
    }
}

fn check_script(script: &str) -> Result<(), MalformedOperation> {
    if is_script_hex(script) {
        Ok(())
    } else {
        Err(MalformedOperation::InvalidScript(script.to_string()))
    }
}

fn check_address(address: &str) -> Result<(), MalformedOperation> {
    payment_script(address)
        .map(|_| ())
        .map_err(|e| MalformedOperation::InvalidAddress {
            address: address.to_string(),
            reason: e,
        })
}

fn check_reveal_parameters(op: &NamespaceRevealOp) -> Result<(), MalformedOperation> {
    let invalid = |reason: &str| -> Result<(), MalformedOperation> {
        Err(MalformedOperation::InvalidRevealParameters(reason.to_string()))
    };

    if op.lifetime == 0 {
        return invalid("lifetime must be positive");
    }
    if op.coeff > MAX_PRICE_PARAMETER || op.base > MAX_PRICE_PARAMETER {
        return invalid("coefficient and base must be at most 255");
    }
    if op.buckets.iter().any(|b| *b > MAX_BUCKET_EXPONENT) {
        return invalid("bucket exponents must be at most 15");
    }
    // Longer names never cost more than shorter ones
    if op.buckets.windows(2).any(|w| w[1] > w[0]) {
        return invalid("bucket exponents must be non-increasing");
    }
    if !(1..=MAX_DISCOUNT).contains(&op.nonalpha_discount)
        || !(1..=MAX_DISCOUNT).contains(&op.no_vowel_discount)
    {
        return invalid("discounts must be between 1 and 15");
    }

    Ok(())
}
