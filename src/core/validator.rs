//! Operation Validator
//!
//! `validate` decides whether an operation is accepted against the current
//! registry snapshot and, if so, stages the effect to apply. It never mutates
//! state and never retries; the engine applies the effect before validating
//! the next operation of the block.

use crate::core::consensus::ConsensusHash;
use crate::core::error::{MalformedOperation, RejectReason, RuleViolation, StaleReference};
use crate::core::name::{NameLiveness, NamePreorder, NameRecord};
use crate::core::namespace::{
    namespace_price, preorder_key, Namespace, NamespacePreorder, NamespaceStatus,
    NAMESPACE_8UP_CHAR_COST,
};
use crate::core::operation::{
    name_preorder_hash, namespace_preorder_hash, split_name, NamePreorderOp, NameRegisterOp,
    NameRenewOp, NameRevokeOp, NameTransferOp, NameUpdateOp, NamespacePreorderOp,
    NamespaceReadyOp, NamespaceRevealOp, OpKind, Operation,
};
use crate::core::state::RegistryState;
use crate::crypto::payment_script;

/// Block-level inputs to validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationContext {
    pub block_height: u64,
    /// Consensus hash of the previous block
    pub stamp: ConsensusHash,
}

/// Staged state change of an accepted operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    NamespacePreorder(NamespacePreorder),
    NamespaceReveal {
        preorder_key: String,
        namespace: Namespace,
    },
    NamespaceReady {
        namespace_id: String,
    },
    NamePreorder(NamePreorder),
    NameRegister {
        preorder_key: String,
        record: NameRecord,
    },
    NameUpdate {
        name: String,
        value_hash: String,
    },
    NameTransfer {
        name: String,
        address: String,
        sender: String,
        keep_data: bool,
    },
    NameRenew {
        name: String,
        op_fee: u64,
        expire_block: u64,
    },
    NameRevoke {
        name: String,
    },
}

type Validation = Result<Effect, RejectReason>;

/// Accept or reject `op` against `state` at the context's height
pub fn validate(op: &Operation, state: &RegistryState, ctx: &ValidationContext) -> Validation {
    op.check_well_formed()?;

    if let Some(hash) = op.referenced_consensus_hash() {
        check_recent_hash(state, hash, ctx.block_height)?;
    }

    match op {
        Operation::NamespacePreorder(op) => namespace_preorder(op, state, ctx),
        Operation::NamespaceReveal(op) => namespace_reveal(op, state, ctx),
        Operation::NamespaceReady(op) => namespace_ready(op, state, ctx),
        Operation::NamePreorder(op) => name_preorder(op, state, ctx),
        Operation::NameRegister(op) => name_register(op, state, ctx),
        Operation::NameUpdate(op) => name_update(op, state, ctx),
        Operation::NameTransfer(op) => name_transfer(op, state, ctx),
        Operation::NameRenew(op) => name_renew(op, state, ctx),
        Operation::NameRevoke(op) => name_revoke(op, state, ctx),
    }
}

fn check_recent_hash(
    state: &RegistryState,
    hash: &ConsensusHash,
    block_height: u64,
) -> Result<(), RejectReason> {
    if state
        .consensus
        .is_recent(hash, block_height, state.config.consensus_hash_window)
    {
        Ok(())
    } else {
        Err(RuleViolation::UnknownConsensusHash(hash.to_hex()).into())
    }
}

fn check_fee(required: u64, paid: u64) -> Result<(), RejectReason> {
    if paid < required {
        Err(RuleViolation::FeeInsufficient { required, paid }.into())
    } else {
        Ok(())
    }
}

fn recipient_script(address: &str) -> Result<String, RejectReason> {
    payment_script(address).map_err(|reason| {
        MalformedOperation::InvalidAddress {
            address: address.to_string(),
            reason,
        }
        .into()
    })
}

// =============================================================================
// Namespace Operations
// =============================================================================

fn namespace_preorder(
    op: &NamespacePreorderOp,
    state: &RegistryState,
    ctx: &ValidationContext,
) -> Validation {
    let preorder = NamespacePreorder {
        preorder_hash: op.preorder_hash.to_ascii_lowercase(),
        sender: op.sender.to_ascii_lowercase(),
        fee: op.fee,
        block_number: ctx.block_height,
    };

    if let Some(existing) = state.namespaces.get_preorder(&preorder.key()) {
        if !existing.is_expired(ctx.block_height, state.config.namespace_preorder_expire) {
            return Err(RuleViolation::PreorderExists(op.preorder_hash.clone()).into());
        }
    }

    // The id is hidden; the burn must at least cover the cheapest namespace
    let minimum = state
        .config
        .epochs
        .price_multiplier(ctx.block_height, "")
        .apply(NAMESPACE_8UP_CHAR_COST);
    check_fee(minimum, op.fee)?;

    Ok(Effect::NamespacePreorder(preorder))
}

fn namespace_reveal(
    op: &NamespaceRevealOp,
    state: &RegistryState,
    ctx: &ValidationContext,
) -> Validation {
    let config = &state.config;
    let hash = namespace_preorder_hash(&op.namespace_id, &op.sender, &op.recipient_address);
    let key = preorder_key(&hash, &op.sender);

    let preorder = state
        .namespaces
        .get_preorder(&key)
        .ok_or_else(|| StaleReference::PreorderNotFound(hash.clone()))?;
    if preorder.is_expired(ctx.block_height, config.namespace_preorder_expire) {
        return Err(StaleReference::PreorderExpired(hash).into());
    }

    if let Some(existing) = state.namespaces.get(&op.namespace_id) {
        let burned = existing.status == NamespaceStatus::Expired
            || existing.reveal_expired(ctx.block_height, config.namespace_reveal_expire);
        return Err(if burned {
            RuleViolation::NamespaceBurned(op.namespace_id.clone())
        } else {
            RuleViolation::NamespaceExists(op.namespace_id.clone())
        }
        .into());
    }

    let required = namespace_price(&op.namespace_id, ctx.block_height, &config.epochs);
    check_fee(required, preorder.fee)?;

    Ok(Effect::NamespaceReveal {
        preorder_key: key,
        namespace: Namespace {
            namespace_id: op.namespace_id.clone(),
            preorder_hash: hash,
            sender: op.sender.to_ascii_lowercase(),
            address: op.recipient_address.clone(),
            recipient: recipient_script(&op.recipient_address)?,
            lifetime: op.lifetime,
            coeff: op.coeff,
            base: op.base,
            buckets: op.buckets,
            nonalpha_discount: op.nonalpha_discount,
            no_vowel_discount: op.no_vowel_discount,
            op_fee: required,
            reveal_block: ctx.block_height,
            ready_block: None,
            status: NamespaceStatus::Revealed,
            block_number: ctx.block_height,
        },
    })
}

fn namespace_ready(
    op: &NamespaceReadyOp,
    state: &RegistryState,
    ctx: &ValidationContext,
) -> Validation {
    let ns = state
        .namespaces
        .get(&op.namespace_id)
        .ok_or_else(|| StaleReference::NamespaceNotRevealed(op.namespace_id.clone()))?;

    match ns.status {
        NamespaceStatus::Ready => {
            return Err(RuleViolation::NamespaceExists(op.namespace_id.clone()).into())
        }
        NamespaceStatus::Expired => {
            return Err(RuleViolation::NamespaceRevealExpired(op.namespace_id.clone()).into())
        }
        NamespaceStatus::Revealed => {}
    }

    if ns.reveal_expired(ctx.block_height, state.config.namespace_reveal_expire) {
        return Err(RuleViolation::NamespaceRevealExpired(op.namespace_id.clone()).into());
    }
    if !ns.recipient.eq_ignore_ascii_case(&op.sender) {
        return Err(RuleViolation::NotRevealer(op.namespace_id.clone()).into());
    }

    Ok(Effect::NamespaceReady {
        namespace_id: op.namespace_id.clone(),
    })
}

// =============================================================================
// Name Operations
// =============================================================================

fn name_preorder(op: &NamePreorderOp, state: &RegistryState, ctx: &ValidationContext) -> Validation {
    if state.namespaces.get_ready(&op.namespace_id).is_none() {
        return Err(RuleViolation::NamespaceNotReady(op.namespace_id.clone()).into());
    }

    let preorder = NamePreorder {
        preorder_hash: op.preorder_hash.to_ascii_lowercase(),
        namespace_id: op.namespace_id.clone(),
        sender: op.sender.to_ascii_lowercase(),
        fee: op.fee,
        block_number: ctx.block_height,
    };

    if let Some(existing) = state.names.get_preorder(&preorder.key()) {
        if !existing.is_expired(ctx.block_height, state.config.name_preorder_expire) {
            return Err(RuleViolation::PreorderExists(op.preorder_hash.clone()).into());
        }
    }

    Ok(Effect::NamePreorder(preorder))
}

fn name_register(op: &NameRegisterOp, state: &RegistryState, ctx: &ValidationContext) -> Validation {
    let config = &state.config;
    let height = ctx.block_height;
    let hash = name_preorder_hash(&op.name, &op.sender, &op.recipient_address);
    let key = preorder_key(&hash, &op.sender);

    let preorder = state
        .names
        .get_preorder(&key)
        .ok_or_else(|| StaleReference::PreorderNotFound(hash.clone()))?;
    if preorder.is_expired(height, config.name_preorder_expire) {
        return Err(StaleReference::PreorderExpired(hash).into());
    }

    let namespace_id = split_name(&op.name)
        .map(|(_, ns)| ns)
        .ok_or_else(|| MalformedOperation::InvalidName(op.name.clone()))?;
    if preorder.namespace_id != namespace_id {
        return Err(RuleViolation::NamespaceMismatch {
            preorder: preorder.namespace_id.clone(),
            name: op.name.clone(),
        }
        .into());
    }

    let ns = state
        .namespaces
        .get_ready(namespace_id)
        .ok_or_else(|| RuleViolation::NamespaceNotReady(namespace_id.to_string()))?;

    if let Some(existing) = state.names.get(&op.name) {
        let grace = config.epochs.renewal_grace_period(height);
        if existing.liveness(height, grace) != NameLiveness::Expired {
            return Err(RuleViolation::NameTaken(op.name.clone()).into());
        }
    }

    let required = ns.name_price(&op.name, height, &config.epochs);
    check_fee(required, preorder.fee)?;

    Ok(Effect::NameRegister {
        preorder_key: key,
        record: NameRecord {
            name: op.name.clone(),
            namespace_id: namespace_id.to_string(),
            preorder_hash: hash,
            address: op.recipient_address.clone(),
            sender: recipient_script(&op.recipient_address)?,
            value_hash: None,
            first_registered: height,
            last_renewed: height,
            expire_block: height.saturating_add(ns.name_lifetime(height, &config.epochs)),
            op_fee: required,
            consensus_hash: ctx.stamp,
            block_number: height,
            last_op: OpKind::NameRegister,
            revoked: false,
        },
    })
}

/// Look up a name the sender owns and may still act on
fn owned_name<'a>(
    state: &'a RegistryState,
    name: &str,
    sender: &str,
    block_height: u64,
    allow_grace: bool,
) -> Result<&'a NameRecord, RejectReason> {
    let record = state
        .names
        .get(name)
        .ok_or_else(|| StaleReference::NameNotFound(name.to_string()))?;

    if record.revoked {
        return Err(RuleViolation::NameRevoked(name.to_string()).into());
    }

    let grace = state.config.epochs.renewal_grace_period(block_height);
    match record.liveness(block_height, grace) {
        NameLiveness::Active => {}
        NameLiveness::GracePeriod if allow_grace => {}
        NameLiveness::GracePeriod => {
            return Err(RuleViolation::NameInGracePeriod(name.to_string()).into())
        }
        NameLiveness::Expired => return Err(RuleViolation::NameExpired(name.to_string()).into()),
    }

    if !record.is_owned_by(sender) {
        return Err(StaleReference::NotOwner(name.to_string()).into());
    }

    Ok(record)
}

fn name_update(op: &NameUpdateOp, state: &RegistryState, ctx: &ValidationContext) -> Validation {
    owned_name(state, &op.name, &op.sender, ctx.block_height, false)?;

    Ok(Effect::NameUpdate {
        name: op.name.clone(),
        value_hash: op.value_hash.to_ascii_lowercase(),
    })
}

fn name_transfer(op: &NameTransferOp, state: &RegistryState, ctx: &ValidationContext) -> Validation {
    owned_name(state, &op.name, &op.sender, ctx.block_height, false)?;

    Ok(Effect::NameTransfer {
        name: op.name.clone(),
        address: op.recipient_address.clone(),
        sender: recipient_script(&op.recipient_address)?,
        keep_data: op.keep_data,
    })
}

fn name_renew(op: &NameRenewOp, state: &RegistryState, ctx: &ValidationContext) -> Validation {
    let config = &state.config;
    let height = ctx.block_height;
    let record = owned_name(state, &op.name, &op.sender, height, true)?;

    let ns = state
        .namespaces
        .get_ready(&record.namespace_id)
        .ok_or_else(|| RuleViolation::NamespaceNotReady(record.namespace_id.clone()))?;

    let required = ns.name_price(&op.name, height, &config.epochs);
    check_fee(required, op.fee)?;

    Ok(Effect::NameRenew {
        name: op.name.clone(),
        op_fee: required,
        expire_block: height.saturating_add(ns.name_lifetime(height, &config.epochs)),
    })
}

fn name_revoke(op: &NameRevokeOp, state: &RegistryState, ctx: &ValidationContext) -> Validation {
    owned_name(state, &op.name, &op.sender, ctx.block_height, false)?;

    Ok(Effect::NameRevoke {
        name: op.name.clone(),
    })
}
