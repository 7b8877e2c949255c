//! Client Submission Queue
//!
//! Each submitted operation runs its own sub-state machine:
//!
//! ```text
//! Staged ──broadcast──▶ Broadcast ──included──▶ Confirming ──enough confs──▶ Confirmed
//!   ▲  │                    │                                   │
//!   │  └─permanent error─┐  └─missed window─┐                   └─not applied─▶ Failed
//!   └──── backoff ◀──────┼──────────────────┘
//!                        ▼
//!                      Failed
//! ```
//!
//! The queue never writes registry state. It broadcasts through a
//! [`Broadcaster`] and learns the outcome by reading the registry snapshot
//! once the operation has enough confirmations.

use crate::core::operation::{
    name_preorder_hash, split_name, NamePreorderOp, NameRegisterOp, NameUpdateOp, Operation,
};
use crate::core::state::RegistryState;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// Configuration
// =============================================================================

/// Default confirmations before an operation is considered settled
pub const DEFAULT_CONFIRMATIONS: u64 = 6;

/// Default blocks a broadcast may stay unconfirmed before it is resent
pub const DEFAULT_CONFIRMATION_TIMEOUT: u64 = 72;

/// Default broadcast attempts before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub confirmations: u64,
    /// Blocks after broadcast without inclusion before a resend
    pub confirmation_timeout: u64,
    pub max_attempts: u32,
    /// Delay before the first retry; doubled on each further attempt
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Poll loop period
    pub poll_interval: std::time::Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            confirmations: DEFAULT_CONFIRMATIONS,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_backoff: Duration::seconds(10),
            max_backoff: Duration::minutes(10),
            poll_interval: std::time::Duration::from_secs(10),
        }
    }
}

impl QueueConfig {
    /// Backoff after `attempts` failed attempts
    pub fn backoff(&self, attempts: u32) -> Duration {
        let factor = 1i32 << attempts.saturating_sub(1).min(16);
        let delay = self.base_backoff * factor;
        if delay > self.max_backoff {
            self.max_backoff
        } else {
            delay
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Failure reported by the broadcaster
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("Fee too low: {0}")]
    FeeTooLow(String),
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Transaction rejected: {0}")]
    Rejected(String),
}

impl BroadcastError {
    /// Whether a later attempt may succeed
    pub fn is_transient(&self) -> bool {
        !matches!(self, BroadcastError::Rejected(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Unknown queue entry {0}")]
    UnknownEntry(u64),
    #[error("Entry {id} is {state} and can no longer be cancelled")]
    NotCancellable { id: u64, state: SubmissionState },
}

/// Sends operations to the chain and reports where they were included
pub trait Broadcaster: Send + Sync {
    /// Broadcast an operation, returning its transaction id
    fn broadcast(&self, op: &Operation) -> Result<String, BroadcastError>;

    /// Height of the block that included `txid`, once mined
    fn inclusion_height(&self, txid: &str) -> Option<u64>;
}

// =============================================================================
// Queue Entries
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubmissionState {
    Staged,
    Broadcast,
    Confirming,
    Confirmed,
    Failed,
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Confirmed | SubmissionState::Failed)
    }
}

impl fmt::Display for SubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubmissionState::Staged => "staged",
            SubmissionState::Broadcast => "broadcast",
            SubmissionState::Confirming => "confirming",
            SubmissionState::Confirmed => "confirmed",
            SubmissionState::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueEntry {
    pub id: u64,
    pub operation: Operation,
    pub state: SubmissionState,
    pub attempts: u32,
    pub txid: Option<String>,
    /// Registry height when last broadcast
    pub broadcast_at: Option<u64>,
    pub included_at: Option<u64>,
    pub next_attempt: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub last_error: Option<String>,
    /// Operations staged, in order, once this one is confirmed
    pub follow_ups: Vec<Operation>,
}

impl QueueEntry {
    fn new(id: u64, operation: Operation, follow_ups: Vec<Operation>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            operation,
            state: SubmissionState::Staged,
            attempts: 0,
            txid: None,
            broadcast_at: None,
            included_at: None,
            next_attempt: now,
            created: now,
            updated: now,
            last_error: None,
            follow_ups,
        }
    }

    fn set_state(&mut self, state: SubmissionState, now: DateTime<Utc>) {
        log::debug!("Queue entry {}: {} -> {}", self.id, self.state, state);
        self.state = state;
        self.updated = now;
    }
}

// =============================================================================
// Submission Queue
// =============================================================================

pub struct SubmissionQueue {
    config: QueueConfig,
    entries: BTreeMap<u64, QueueEntry>,
    finished: Vec<QueueEntry>,
    next_id: u64,
}

impl SubmissionQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            entries: BTreeMap::new(),
            finished: Vec::new(),
            next_id: 1,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Stage a single operation
    pub fn submit(&mut self, operation: Operation, now: DateTime<Utc>) -> u64 {
        self.submit_chain(vec![operation], now).unwrap_or(0)
    }

    /// Stage the first operation of a chain; the rest follow one by one
    pub fn submit_chain(&mut self, mut chain: Vec<Operation>, now: DateTime<Utc>) -> Option<u64> {
        if chain.is_empty() {
            return None;
        }
        let first = chain.remove(0);
        let id = self.next_id;
        self.next_id += 1;

        log::info!("Queued {} as entry {}", first.kind(), id);
        self.entries.insert(id, QueueEntry::new(id, first, chain, now));
        Some(id)
    }

    /// Cancel an entry that has not been broadcast yet
    pub fn cancel(&mut self, id: u64) -> Result<QueueEntry, QueueError> {
        let state = self
            .entries
            .get(&id)
            .map(|e| e.state)
            .ok_or(QueueError::UnknownEntry(id))?;

        if state != SubmissionState::Staged {
            return Err(QueueError::NotCancellable { id, state });
        }

        self.entries.remove(&id).ok_or(QueueError::UnknownEntry(id))
    }

    /// Entries that are not yet confirmed or failed
    pub fn queue_state(&self) -> Vec<&QueueEntry> {
        self.entries.values().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: u64) -> Option<&QueueEntry> {
        self.entries
            .get(&id)
            .or_else(|| self.finished.iter().find(|e| e.id == id))
    }

    /// Drain confirmed and failed entries
    pub fn take_finished(&mut self) -> Vec<QueueEntry> {
        std::mem::take(&mut self.finished)
    }

    /// Advance every entry one step
    pub fn tick(
        &mut self,
        registry: &RegistryState,
        broadcaster: &dyn Broadcaster,
        now: DateTime<Utc>,
    ) {
        let tip = registry.last_block.unwrap_or(0);
        let ids: Vec<u64> = self.entries.keys().copied().collect();
        let mut follow_ups = Vec::new();

        for id in ids {
            let Some(entry) = self.entries.get_mut(&id) else {
                continue;
            };

            match entry.state {
                SubmissionState::Staged => {
                    if now >= entry.next_attempt {
                        broadcast_entry(&self.config, entry, broadcaster, tip, now);
                    }
                }
                SubmissionState::Broadcast | SubmissionState::Confirming => {
                    poll_entry(&self.config, entry, registry, broadcaster, tip, now);
                }
                SubmissionState::Confirmed | SubmissionState::Failed => {}
            }

            if entry.state.is_terminal() {
                if let Some(done) = self.entries.remove(&id) {
                    if done.state == SubmissionState::Confirmed && !done.follow_ups.is_empty() {
                        follow_ups.push(done.follow_ups.clone());
                    }
                    self.finished.push(done);
                }
            }
        }

        for chain in follow_ups {
            self.submit_chain(chain, now);
        }
    }
}

fn broadcast_entry(
    config: &QueueConfig,
    entry: &mut QueueEntry,
    broadcaster: &dyn Broadcaster,
    tip: u64,
    now: DateTime<Utc>,
) {
    entry.attempts += 1;

    match broadcaster.broadcast(&entry.operation) {
        Ok(txid) => {
            log::info!(
                "Broadcast {} (entry {}) as {}",
                entry.operation.kind(),
                entry.id,
                txid
            );
            entry.txid = Some(txid);
            entry.broadcast_at = Some(tip);
            entry.included_at = None;
            entry.set_state(SubmissionState::Broadcast, now);
        }
        Err(e) => retry_or_fail(config, entry, e.to_string(), e.is_transient(), now),
    }
}

fn poll_entry(
    config: &QueueConfig,
    entry: &mut QueueEntry,
    registry: &RegistryState,
    broadcaster: &dyn Broadcaster,
    tip: u64,
    now: DateTime<Utc>,
) {
    let included = entry
        .txid
        .as_deref()
        .and_then(|txid| broadcaster.inclusion_height(txid));

    match included {
        None => {
            let sent = entry.broadcast_at.unwrap_or(tip);
            if tip > sent + config.confirmation_timeout {
                let reason = format!("not confirmed within {} blocks", config.confirmation_timeout);
                retry_or_fail(config, entry, reason, true, now);
            }
        }
        Some(height) => {
            if entry.state != SubmissionState::Confirming {
                entry.included_at = Some(height);
                entry.set_state(SubmissionState::Confirming, now);
            }

            let confirmations = (tip + 1).saturating_sub(height);
            if registry.last_block.is_none() || confirmations < config.confirmations {
                return;
            }

            if is_applied(registry, &entry.operation, height) {
                log::info!(
                    "{} (entry {}) confirmed at block {}",
                    entry.operation.kind(),
                    entry.id,
                    height
                );
                entry.set_state(SubmissionState::Confirmed, now);
            } else {
                entry.last_error = Some(format!("rejected by the registry at block {}", height));
                log::warn!(
                    "{} (entry {}) was mined at block {} but not accepted",
                    entry.operation.kind(),
                    entry.id,
                    height
                );
                entry.set_state(SubmissionState::Failed, now);
            }
        }
    }
}

fn retry_or_fail(
    config: &QueueConfig,
    entry: &mut QueueEntry,
    reason: String,
    transient: bool,
    now: DateTime<Utc>,
) {
    entry.last_error = Some(reason.clone());
    entry.txid = None;

    if transient && entry.attempts < config.max_attempts {
        let delay = config.backoff(entry.attempts);
        entry.next_attempt = now + delay;
        log::warn!(
            "Entry {} attempt {} failed ({}); retrying in {}s",
            entry.id,
            entry.attempts,
            reason,
            delay.num_seconds()
        );
        entry.set_state(SubmissionState::Staged, now);
    } else {
        log::warn!(
            "Entry {} failed permanently after {} attempts: {}",
            entry.id,
            entry.attempts,
            reason
        );
        entry.set_state(SubmissionState::Failed, now);
    }
}

/// Preorder, register and optional update for a single name
pub fn registration_chain(
    name: &str,
    payer_script: &str,
    owner_address: &str,
    owner_script: &str,
    fee: u64,
    value_hash: Option<&str>,
) -> Option<Vec<Operation>> {
    let (_, namespace_id) = split_name(name)?;

    let mut chain = vec![
        Operation::NamePreorder(NamePreorderOp {
            preorder_hash: name_preorder_hash(name, payer_script, owner_address),
            namespace_id: namespace_id.to_string(),
            sender: payer_script.to_string(),
            fee,
            consensus_hash: None,
        }),
        Operation::NameRegister(NameRegisterOp {
            name: name.to_string(),
            sender: payer_script.to_string(),
            recipient_address: owner_address.to_string(),
        }),
    ];

    if let Some(value_hash) = value_hash {
        chain.push(Operation::NameUpdate(NameUpdateOp {
            name: name.to_string(),
            sender: owner_script.to_string(),
            value_hash: value_hash.to_string(),
            consensus_hash: None,
        }));
    }

    Some(chain)
}

/// Whether the registry accepted `op` in the block at `height`
///
/// Checked against the block's accepted-operation digests, so later
/// operations on the same record in the same or following blocks do not
/// hide an earlier acceptance.
pub fn is_applied(registry: &RegistryState, op: &Operation, height: u64) -> bool {
    registry
        .consensus
        .digest_at(height)
        .map(|digest| digest.contains(op))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::RegistryConfig;
    use crate::core::engine::StateEngine;
    use crate::core::namespace::preorder_key;
    use crate::core::operation::{
        namespace_preorder_hash, NameTransferOp, NamespacePreorderOp, NamespaceReadyOp,
        NamespaceRevealOp, PRICE_BUCKETS,
    };
    use crate::crypto::{hash160, hash160_to_address, payment_script, P2PKH_VERSION};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Broadcaster whose transactions are mined by the test
    #[derive(Default)]
    struct ScriptedBroadcaster {
        failures: Mutex<Vec<BroadcastError>>,
        sent: Mutex<Vec<(String, Operation)>>,
        mined: Mutex<HashMap<String, u64>>,
    }

    impl ScriptedBroadcaster {
        fn fail_next(&self, err: BroadcastError) {
            self.failures.lock().unwrap().push(err);
        }

        fn mine_all(&self, height: u64) -> Vec<Operation> {
            let sent: Vec<(String, Operation)> = self.sent.lock().unwrap().drain(..).collect();
            let mut mined = self.mined.lock().unwrap();
            sent.into_iter()
                .map(|(txid, op)| {
                    mined.insert(txid, height);
                    op
                })
                .collect()
        }
    }

    impl Broadcaster for ScriptedBroadcaster {
        fn broadcast(&self, op: &Operation) -> Result<String, BroadcastError> {
            if let Some(err) = self.failures.lock().unwrap().pop() {
                return Err(err);
            }
            let mut sent = self.sent.lock().unwrap();
            let txid = format!("tx{}", sent.len() + self.mined.lock().unwrap().len());
            sent.push((txid.clone(), op.clone()));
            Ok(txid)
        }

        fn inclusion_height(&self, txid: &str) -> Option<u64> {
            self.mined.lock().unwrap().get(txid).copied()
        }
    }

    fn config() -> QueueConfig {
        QueueConfig {
            confirmations: 2,
            confirmation_timeout: 3,
            max_attempts: 3,
            ..Default::default()
        }
    }

    fn preorder() -> Operation {
        Operation::NamespacePreorder(NamespacePreorderOp {
            preorder_hash: "ab".repeat(20),
            sender: "76a914".to_string() + &"ab".repeat(20) + "88ac",
            fee: 40_000_000_000,
            consensus_hash: None,
        })
    }

    fn update() -> Operation {
        Operation::NameUpdate(NameUpdateOp {
            name: "foo.test".to_string(),
            sender: "76a914".to_string() + &"ab".repeat(20) + "88ac",
            value_hash: "11".repeat(20),
            consensus_hash: None,
        })
    }

    #[test]
    fn test_registration_chain() {
        let chain = registration_chain("foo.test", "76a914aa88ac", "1Owner", "76a914bb88ac", 10, None)
            .unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].kind(), crate::core::operation::OpKind::NamePreorder);

        let chain = registration_chain("foo.test", "76a914aa88ac", "1Owner", "76a914bb88ac", 10, Some("ff"))
            .unwrap();
        assert_eq!(chain[2].sender(), "76a914bb88ac");
        assert!(registration_chain("nonamespace", "76a914aa88ac", "1Owner", "", 10, None).is_none());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = QueueConfig::default();
        assert_eq!(config.backoff(1), Duration::seconds(10));
        assert_eq!(config.backoff(2), Duration::seconds(20));
        assert_eq!(config.backoff(3), Duration::seconds(40));
        assert_eq!(config.backoff(30), Duration::minutes(10));
    }

    #[test]
    fn test_cancel_only_while_staged() {
        let mut queue = SubmissionQueue::new(config());
        let broadcaster = ScriptedBroadcaster::default();
        let state = RegistryState::new(RegistryConfig::default());
        let now = Utc::now();

        let a = queue.submit(preorder(), now);
        let b = queue.submit(update(), now);
        assert!(queue.cancel(a).is_ok());
        assert_eq!(queue.cancel(a).unwrap_err(), QueueError::UnknownEntry(a));

        queue.tick(&state, &broadcaster, now);
        assert!(matches!(
            queue.cancel(b),
            Err(QueueError::NotCancellable {
                state: SubmissionState::Broadcast,
                ..
            })
        ));
    }

    #[test]
    fn test_transient_failure_backs_off() {
        let mut queue = SubmissionQueue::new(config());
        let broadcaster = ScriptedBroadcaster::default();
        let state = RegistryState::new(RegistryConfig::default());
        let now = Utc::now();

        broadcaster.fail_next(BroadcastError::FeeTooLow("congested".to_string()));
        let id = queue.submit(preorder(), now);

        queue.tick(&state, &broadcaster, now);
        let entry = queue.get(id).unwrap();
        assert_eq!(entry.state, SubmissionState::Staged);
        assert_eq!(entry.attempts, 1);

        // Not retried before the backoff elapses
        queue.tick(&state, &broadcaster, now + Duration::seconds(5));
        assert_eq!(queue.get(id).unwrap().attempts, 1);

        queue.tick(&state, &broadcaster, now + Duration::seconds(10));
        assert_eq!(queue.get(id).unwrap().state, SubmissionState::Broadcast);
    }

    #[test]
    fn test_permanent_failure() {
        let mut queue = SubmissionQueue::new(config());
        let broadcaster = ScriptedBroadcaster::default();
        let state = RegistryState::new(RegistryConfig::default());
        let now = Utc::now();

        broadcaster.fail_next(BroadcastError::Rejected("bad script".to_string()));
        let id = queue.submit(preorder(), now);
        queue.tick(&state, &broadcaster, now);

        assert!(queue.is_empty());
        let finished = queue.take_finished();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].id, id);
        assert_eq!(finished[0].state, SubmissionState::Failed);
    }

    #[test]
    fn test_confirmed_after_enough_blocks() {
        let mut queue = SubmissionQueue::new(config());
        let broadcaster = ScriptedBroadcaster::default();
        let mut engine = crate::core::engine::StateEngine::new(RegistryConfig::default());
        let now = Utc::now();

        let id = queue.submit(preorder(), now);
        queue.tick(engine.state(), &broadcaster, now);

        let ops = broadcaster.mine_all(0);
        engine.process_block(0, &ops).unwrap();
        queue.tick(engine.state(), &broadcaster, now);
        assert_eq!(queue.get(id).unwrap().state, SubmissionState::Confirming);

        engine.process_block(1, &[]).unwrap();
        queue.tick(engine.state(), &broadcaster, now);
        assert!(queue.is_empty());
        assert_eq!(queue.take_finished()[0].state, SubmissionState::Confirmed);
    }

    #[test]
    fn test_mined_but_rejected_fails() {
        let mut queue = SubmissionQueue::new(config());
        let broadcaster = ScriptedBroadcaster::default();
        let mut engine = crate::core::engine::StateEngine::new(RegistryConfig::default());
        let now = Utc::now();

        // No such name, so the registry drops the update
        queue.submit(update(), now);
        queue.tick(engine.state(), &broadcaster, now);
        let ops = broadcaster.mine_all(0);
        engine.process_block(0, &ops).unwrap();
        engine.process_block(1, &[]).unwrap();
        queue.tick(engine.state(), &broadcaster, now);

        assert!(queue.is_empty());
        assert_eq!(queue.take_finished()[0].state, SubmissionState::Failed);
    }

    #[test]
    fn test_missed_window_rebroadcasts() {
        let mut queue = SubmissionQueue::new(config());
        let broadcaster = ScriptedBroadcaster::default();
        let mut engine = crate::core::engine::StateEngine::new(RegistryConfig::default());
        let now = Utc::now();

        engine.process_block(0, &[]).unwrap();
        let id = queue.submit(preorder(), now);
        queue.tick(engine.state(), &broadcaster, now);
        broadcaster.sent.lock().unwrap().clear();

        engine.advance_to(4).unwrap();
        queue.tick(engine.state(), &broadcaster, now);
        let entry = queue.get(id).unwrap();
        assert_eq!(entry.state, SubmissionState::Staged);
        assert!(entry.last_error.is_some());
    }

    #[test]
    fn test_follow_ups_are_chained() {
        let mut queue = SubmissionQueue::new(config());
        let broadcaster = ScriptedBroadcaster::default();
        let mut engine = crate::core::engine::StateEngine::new(RegistryConfig::default());
        let now = Utc::now();

        queue.submit_chain(vec![preorder(), update()], now).unwrap();
        assert_eq!(queue.queue_state().len(), 1);

        queue.tick(engine.state(), &broadcaster, now);
        let ops = broadcaster.mine_all(0);
        engine.process_block(0, &ops).unwrap();
        engine.process_block(1, &[]).unwrap();
        queue.tick(engine.state(), &broadcaster, now);

        let pending = queue.queue_state();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].operation, update());
        assert_eq!(pending[0].state, SubmissionState::Staged);
    }

    fn address(seed: &str) -> String {
        hash160_to_address(P2PKH_VERSION, &hash160(seed.as_bytes()))
    }

    fn script(seed: &str) -> String {
        payment_script(&address(seed)).unwrap()
    }

    /// Engine with "foo.test" registered to alice; returns the name preorder
    fn engine_with_name() -> (StateEngine, Operation) {
        let mut engine = StateEngine::new(RegistryConfig::default());
        let mut buckets = [0u8; PRICE_BUCKETS];
        buckets[..6].copy_from_slice(&[6, 5, 4, 3, 2, 1]);

        let name_preorder = Operation::NamePreorder(NamePreorderOp {
            preorder_hash: name_preorder_hash("foo.test", &script("payer"), &address("alice")),
            namespace_id: "test".to_string(),
            sender: script("payer"),
            fee: 6_400_000,
            consensus_hash: None,
        });
        let blocks = vec![
            Operation::NamespacePreorder(NamespacePreorderOp {
                preorder_hash: namespace_preorder_hash("test", &script("payer"), &address("launcher")),
                sender: script("payer"),
                fee: 400_000_000,
                consensus_hash: None,
            }),
            Operation::NamespaceReveal(NamespaceRevealOp {
                namespace_id: "test".to_string(),
                sender: script("payer"),
                recipient_address: address("launcher"),
                lifetime: 10_000,
                coeff: 250,
                base: 4,
                buckets,
                nonalpha_discount: 10,
                no_vowel_discount: 10,
            }),
            Operation::NamespaceReady(NamespaceReadyOp {
                namespace_id: "test".to_string(),
                sender: script("launcher"),
            }),
            name_preorder.clone(),
            Operation::NameRegister(NameRegisterOp {
                name: "foo.test".to_string(),
                sender: script("payer"),
                recipient_address: address("alice"),
            }),
        ];

        for (height, op) in blocks.into_iter().enumerate() {
            let report = engine.process_block(height as u64, &[op]).unwrap();
            assert!(report.rejected.is_empty(), "{:?}", report.rejected);
        }
        (engine, name_preorder)
    }

    #[test]
    fn test_consumed_preorder_still_applied() {
        let (engine, name_preorder) = engine_with_name();
        // Consumed by the register in block 4
        let key = preorder_key(
            &name_preorder_hash("foo.test", &script("payer"), &address("alice")),
            &script("payer"),
        );
        assert!(engine.state().names.get_preorder(&key).is_none());
        assert!(is_applied(engine.state(), &name_preorder, 3));
        assert!(!is_applied(engine.state(), &name_preorder, 4));
    }

    #[test]
    fn test_same_block_update_and_transfer_confirm() {
        let (mut engine, _) = engine_with_name();
        let mut queue = SubmissionQueue::new(config());
        let broadcaster = ScriptedBroadcaster::default();
        let now = Utc::now();

        let update = Operation::NameUpdate(NameUpdateOp {
            name: "foo.test".to_string(),
            sender: script("alice"),
            value_hash: "11".repeat(20),
            consensus_hash: None,
        });
        let transfer = Operation::NameTransfer(NameTransferOp {
            name: "foo.test".to_string(),
            sender: script("alice"),
            recipient_address: address("bob"),
            keep_data: true,
            consensus_hash: None,
        });
        queue.submit(update, now);
        queue.submit(transfer, now);
        queue.tick(engine.state(), &broadcaster, now);

        let ops = broadcaster.mine_all(5);
        assert_eq!(ops.len(), 2);
        let report = engine.process_block(5, &ops).unwrap();
        assert!(report.rejected.is_empty());
        engine.process_block(6, &[]).unwrap();
        queue.tick(engine.state(), &broadcaster, now);

        assert!(queue.is_empty());
        let finished = queue.take_finished();
        assert_eq!(finished.len(), 2);
        assert!(finished
            .iter()
            .all(|e| e.state == SubmissionState::Confirmed));
    }
}
