//! Operation reject taxonomy
//!
//! Rejected operations are dropped locally: they never change registry state
//! and never enter the consensus hash. They are reported in the block report
//! and logged.

use crate::crypto::AddressError;
use serde::Serialize;
use thiserror::Error;

/// Operation fails shape checks
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedOperation {
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Invalid namespace id: {0}")]
    InvalidNamespaceId(String),
    #[error("Invalid {field}: {value}")]
    InvalidHash { field: &'static str, value: String },
    #[error("Invalid script: {0}")]
    InvalidScript(String),
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: AddressError },
    #[error("Invalid namespace parameters: {0}")]
    InvalidRevealParameters(String),
}

/// Operation references state that does not exist (any more)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StaleReference {
    #[error("No live preorder for {0}")]
    PreorderNotFound(String),
    #[error("Preorder {0} expired")]
    PreorderExpired(String),
    #[error("Namespace {0} is not revealed")]
    NamespaceNotRevealed(String),
    #[error("Name {0} is not registered")]
    NameNotFound(String),
    #[error("Sender does not own {0}")]
    NotOwner(String),
}

/// Well-formed operation that fails a registry rule
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuleViolation {
    #[error("Insufficient fee: required {required}, paid {paid}")]
    FeeInsufficient { required: u64, paid: u64 },
    #[error("Stale reference: {0}")]
    StaleReference(#[from] StaleReference),
    #[error("Preorder {0} already exists")]
    PreorderExists(String),
    #[error("Namespace {0} already exists")]
    NamespaceExists(String),
    #[error("Namespace {0} expired before it was launched and cannot be reused")]
    NamespaceBurned(String),
    #[error("Namespace {0} is not ready")]
    NamespaceNotReady(String),
    #[error("Namespace {0} reveal window has passed")]
    NamespaceRevealExpired(String),
    #[error("Sender is not the revealing key of {0}")]
    NotRevealer(String),
    #[error("Preorder namespace {preorder} does not match {name}")]
    NamespaceMismatch { preorder: String, name: String },
    #[error("Name {0} is already registered")]
    NameTaken(String),
    #[error("Name {0} has expired")]
    NameExpired(String),
    #[error("Name {0} is in its renewal grace period")]
    NameInGracePeriod(String),
    #[error("Name {0} is revoked")]
    NameRevoked(String),
    #[error("Consensus hash {0} is not recent")]
    UnknownConsensusHash(String),
}

/// Why an operation was dropped
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    #[error("Malformed operation: {0}")]
    Malformed(#[from] MalformedOperation),
    #[error("Rule violation: {0}")]
    Rule(#[from] RuleViolation),
}

impl From<StaleReference> for RejectReason {
    fn from(err: StaleReference) -> Self {
        RejectReason::Rule(RuleViolation::StaleReference(err))
    }
}

/// Coarse reject category, for counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RejectKind {
    Malformed,
    FeeInsufficient,
    StaleReference,
    RuleViolation,
}

impl RejectReason {
    pub fn kind(&self) -> RejectKind {
        match self {
            RejectReason::Malformed(_) => RejectKind::Malformed,
            RejectReason::Rule(RuleViolation::FeeInsufficient { .. }) => RejectKind::FeeInsufficient,
            RejectReason::Rule(RuleViolation::StaleReference(_)) => RejectKind::StaleReference,
            RejectReason::Rule(_) => RejectKind::RuleViolation,
        }
    }

    /// Fee the operation would have needed, for diagnostics
    pub fn required_fee(&self) -> Option<u64> {
        match self {
            RejectReason::Rule(RuleViolation::FeeInsufficient { required, .. }) => Some(*required),
            _ => None,
        }
    }

    pub fn is_stale_reference(&self) -> bool {
        self.kind() == RejectKind::StaleReference
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_kinds() {
        let fee: RejectReason = RuleViolation::FeeInsufficient {
            required: 100,
            paid: 10,
        }
        .into();
        assert_eq!(fee.kind(), RejectKind::FeeInsufficient);
        assert_eq!(fee.required_fee(), Some(100));

        let stale: RejectReason = StaleReference::PreorderNotFound("abc".to_string()).into();
        assert!(stale.is_stale_reference());
        assert_eq!(stale.required_fee(), None);

        let malformed: RejectReason = MalformedOperation::InvalidName("X".to_string()).into();
        assert_eq!(malformed.kind(), RejectKind::Malformed);

        let rule: RejectReason = RuleViolation::NameTaken("foo.test".to_string()).into();
        assert_eq!(rule.kind(), RejectKind::RuleViolation);
    }

    #[test]
    fn test_reject_messages() {
        let err: RejectReason = RuleViolation::FeeInsufficient {
            required: 6_400_000,
            paid: 1,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Rule violation: Insufficient fee: required 6400000, paid 1"
        );
    }
}
