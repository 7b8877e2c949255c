//! End-to-end replays through the registry facade

use chrono::Utc;
use name_registry::core::{
    name_preorder_hash, namespace_preorder_hash, BlockReport, EpochTable, NameRegisterOp,
    NameRenewOp, NameTransferOp, NameUpdateOp, NamePreorderOp, NamespacePreorderOp,
    NamespaceReadyOp, NamespaceRevealOp, OpKind, Operation, RegistryConfig, RejectKind,
    StateEngine, PRICE_BUCKETS,
};
use name_registry::crypto::{hash160, hash160_to_address, payment_script, P2PKH_VERSION};
use name_registry::queue::{
    registration_chain, BroadcastError, Broadcaster, QueueConfig, SubmissionQueue,
    SubmissionState,
};
use name_registry::registry::Registry;
use name_registry::storage::{Storage, StorageConfig};
use std::collections::HashMap;
use std::sync::Mutex;

const BUCKETS: [u8; PRICE_BUCKETS] = [6, 5, 4, 3, 2, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
const FOO_PRICE: u64 = 6_400_000;
const TEST_NAMESPACE_PRICE: u64 = 400_000_000;

fn address(seed: &str) -> String {
    hash160_to_address(P2PKH_VERSION, &hash160(seed.as_bytes()))
}

fn script(seed: &str) -> String {
    payment_script(&address(seed)).unwrap()
}

fn value_hash(seed: &str) -> String {
    hex::encode(hash160(seed.as_bytes()))
}

// ===== Operation builders =====

fn namespace_ops(namespace_id: &str, lifetime: u64) -> [Operation; 3] {
    [
        Operation::NamespacePreorder(NamespacePreorderOp {
            preorder_hash: namespace_preorder_hash(namespace_id, &script("payer"), &address("launcher")),
            sender: script("payer"),
            fee: TEST_NAMESPACE_PRICE,
            consensus_hash: None,
        }),
        Operation::NamespaceReveal(NamespaceRevealOp {
            namespace_id: namespace_id.to_string(),
            sender: script("payer"),
            recipient_address: address("launcher"),
            lifetime,
            coeff: 250,
            base: 4,
            buckets: BUCKETS,
            nonalpha_discount: 10,
            no_vowel_discount: 10,
        }),
        Operation::NamespaceReady(NamespaceReadyOp {
            namespace_id: namespace_id.to_string(),
            sender: script("launcher"),
        }),
    ]
}

fn preorder_op(name: &str, payer: &str, owner: &str, fee: u64) -> Operation {
    Operation::NamePreorder(NamePreorderOp {
        preorder_hash: name_preorder_hash(name, &script(payer), &address(owner)),
        namespace_id: "test".to_string(),
        sender: script(payer),
        fee,
        consensus_hash: None,
    })
}

fn register_op(name: &str, payer: &str, owner: &str) -> Operation {
    Operation::NameRegister(NameRegisterOp {
        name: name.to_string(),
        sender: script(payer),
        recipient_address: address(owner),
    })
}

fn update_op(name: &str, owner: &str, value: &str) -> Operation {
    Operation::NameUpdate(NameUpdateOp {
        name: name.to_string(),
        sender: script(owner),
        value_hash: value.to_string(),
        consensus_hash: None,
    })
}

fn transfer_op(name: &str, owner: &str, recipient: &str) -> Operation {
    Operation::NameTransfer(NameTransferOp {
        name: name.to_string(),
        sender: script(owner),
        recipient_address: address(recipient),
        keep_data: true,
        consensus_hash: None,
    })
}

fn renew_op(name: &str, owner: &str, fee: u64) -> Operation {
    Operation::NameRenew(NameRenewOp {
        name: name.to_string(),
        sender: script(owner),
        payer: None,
        fee,
    })
}

// ===== Harness =====

struct Chain {
    registry: Registry,
}

impl Chain {
    fn new(config: RegistryConfig) -> Self {
        Self {
            registry: Registry::new(config),
        }
    }

    fn next_height(&self) -> u64 {
        self.registry.snapshot().next_block()
    }

    fn block(&self, ops: &[Operation]) -> BlockReport {
        let height = self.next_height();
        self.registry.process_block(height, ops).unwrap()
    }

    /// Apply a block whose operations must all be accepted
    fn accept(&self, ops: &[Operation]) -> BlockReport {
        let report = self.block(ops);
        assert!(
            report.rejected.is_empty(),
            "block {} rejected {:?}",
            report.height,
            report.rejected
        );
        report
    }

    fn skip_to(&self, height: u64) {
        self.registry.advance_to(height).unwrap();
    }

    fn launch_test_namespace(&self, lifetime: u64) {
        for op in namespace_ops("test", lifetime) {
            self.accept(&[op]);
        }
        assert!(self.registry.get_namespace("test").is_some());
    }

    fn register(&self, name: &str, payer: &str, owner: &str) -> u64 {
        self.accept(&[preorder_op(name, payer, owner, FOO_PRICE)]);
        self.accept(&[register_op(name, payer, owner)]).height
    }
}

// ===== Scenarios =====

#[test]
fn renewal_after_epoch_boundary_charges_new_price() {
    let config = RegistryConfig::default().with_epochs(EpochTable::with_boundaries(20, 1_000));
    let chain = Chain::new(config);
    chain.launch_test_namespace(10_000);

    let registered_at = chain.register("foo.test", "payer", "owner");
    let record = chain.registry.get_name("foo.test").unwrap();
    assert_eq!(record.op_fee, FOO_PRICE);
    assert_eq!(record.expire_block, registered_at + 10_000);

    // Old price is no longer enough once the multiplier changes
    chain.skip_to(29);
    let report = chain.block(&[renew_op("foo.test", "owner", FOO_PRICE)]);
    assert_eq!(report.rejected[0].reason.kind(), RejectKind::FeeInsufficient);
    assert_eq!(report.rejected[0].reason.required_fee(), Some(FOO_PRICE * 4));

    let renewed_at = chain.accept(&[renew_op("foo.test", "owner", FOO_PRICE * 4)]).height;
    let k = renewed_at - registered_at;

    let record = chain.registry.get_name("foo.test").unwrap();
    assert_eq!(record.op_fee, 25_600_000);
    assert_eq!(record.last_renewed - record.first_registered, k);
    assert_eq!(record.expire_block, renewed_at + 20_000);

    // The snapshot from before the boundary keeps the epoch 1 fee
    let before = chain.registry.get_name_at("foo.test", registered_at);
    assert_eq!(before.len(), 1);
    assert_eq!(before[0].op_fee, FOO_PRICE);
    assert_eq!(before[0].last_renewed, registered_at);
}

#[test]
fn same_block_updates_and_transfers_share_stamp() {
    let chain = Chain::new(RegistryConfig::default());
    chain.launch_test_namespace(10_000);
    chain.register("foo.test", "payer", "alice");
    chain.register("bar.test", "payer", "bob");

    let value = value_hash("profile");
    let report = chain.accept(&[
        update_op("foo.test", "alice", &value),
        update_op("bar.test", "bob", &value),
        transfer_op("foo.test", "alice", "carol"),
        transfer_op("bar.test", "bob", "carol"),
    ]);

    let foo = chain.registry.get_name("foo.test").unwrap();
    let bar = chain.registry.get_name("bar.test").unwrap();
    let previous = chain.registry.consensus_hash_at(report.height - 1).unwrap();

    assert_eq!(foo.consensus_hash, bar.consensus_hash);
    assert_eq!(foo.consensus_hash, previous);
    assert_eq!(report.prev_consensus_hash, previous);
    assert_ne!(foo.consensus_hash, report.consensus_hash);
    assert_eq!(foo.value_hash.as_deref(), Some(value.as_str()));
    assert_eq!(chain.registry.names_owned_by(&address("carol")).len(), 2);
}

#[test]
fn preorder_is_consumed_exactly_once() {
    let chain = Chain::new(RegistryConfig::default());
    chain.launch_test_namespace(10_000);
    chain.register("foo.test", "payer", "owner");

    let report = chain.block(&[register_op("foo.test", "payer", "owner")]);
    assert_eq!(report.accepted_count(), 0);
    assert!(report.rejected[0].reason.is_stale_reference());

    // Rejects leave the consensus hash as an empty block would
    let empty = Chain::new(RegistryConfig::default());
    empty.launch_test_namespace(10_000);
    empty.register("foo.test", "payer", "owner");
    assert_eq!(empty.block(&[]).consensus_hash, report.consensus_hash);
}

#[test]
fn point_in_time_queries_never_return_future_snapshots() {
    let chain = Chain::new(RegistryConfig::default());
    chain.launch_test_namespace(10_000);

    let before = chain.next_height();
    chain.skip_to(before + 5);
    let registered_at = chain.register("foo.test", "payer", "owner");
    chain.skip_to(registered_at + 5);
    let updated_at = chain
        .accept(&[update_op("foo.test", "owner", &value_hash("v1"))])
        .height;

    assert!(chain.registry.get_name_at("foo.test", before).is_empty());
    assert!(chain.registry.get_name_at("foo.test", registered_at - 1).is_empty());

    let between = chain.registry.get_name_at("foo.test", updated_at - 1);
    assert_eq!(between[0].last_op, OpKind::NameRegister);
    assert_eq!(between[0].value_hash, None);

    let after = chain.registry.get_name_at("foo.test", updated_at + 100);
    assert_eq!(after[0].last_op, OpKind::NameUpdate);
    assert_eq!(chain.registry.name_history("foo.test").len(), 2);
}

#[test]
fn unlaunched_namespace_never_becomes_ready() {
    let chain = Chain::new(RegistryConfig::default().with_namespace_reveal_expire(5));
    let [preorder, reveal, ready] = namespace_ops("test", 10_000);
    chain.accept(&[preorder.clone()]);
    let revealed_at = chain.accept(&[reveal.clone()]).height;
    assert!(chain.registry.get_namespace_reveal("test").is_some());

    chain.skip_to(revealed_at + 6);
    assert!(chain.registry.get_namespace_reveal("test").is_none());

    let report = chain.block(&[ready]);
    assert_eq!(report.rejected_count(), 1);

    // The id stays burned for a fresh preorder and reveal
    chain.accept(&[preorder]);
    let report = chain.block(&[reveal]);
    assert_eq!(report.rejected[0].reason.kind(), RejectKind::RuleViolation);
    assert!(chain.registry.get_namespace("test").is_none());
}

#[test]
fn replay_is_deterministic_across_restarts() {
    let stream: Vec<Vec<Operation>> = {
        let mut blocks: Vec<Vec<Operation>> = namespace_ops("test", 10_000)
            .into_iter()
            .map(|op| vec![op])
            .collect();
        blocks.push(vec![
            preorder_op("foo.test", "payer", "alice", FOO_PRICE),
            preorder_op("bar.test", "payer", "bob", FOO_PRICE),
        ]);
        blocks.push(vec![
            register_op("foo.test", "payer", "alice"),
            register_op("bar.test", "payer", "bob"),
            // Never preordered
            register_op("baz.test", "payer", "carol"),
        ]);
        blocks.push(vec![]);
        blocks.push(vec![update_op("foo.test", "alice", &value_hash("v1"))]);
        blocks.push(vec![transfer_op("bar.test", "bob", "alice")]);
        blocks
    };

    let replay = |split_at: Option<usize>| {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(StorageConfig::in_dir(dir.path())).unwrap();
        let mut registry = Registry::new(RegistryConfig::default());
        let mut hashes = Vec::new();

        for (height, ops) in stream.iter().enumerate() {
            if Some(height) == split_at {
                registry.save(&storage).unwrap();
                registry = Registry::from_engine(StateEngine::resume(storage.load().unwrap()));
            }
            hashes.push(registry.process_block(height as u64, ops).unwrap().consensus_hash);
        }

        let state = serde_json::to_value(&*registry.snapshot()).unwrap();
        (hashes, state)
    };

    let (hashes_a, state_a) = replay(None);
    let (hashes_b, state_b) = replay(None);
    let (hashes_c, state_c) = replay(Some(4));

    assert_eq!(hashes_a, hashes_b);
    assert_eq!(hashes_a, hashes_c);
    assert_eq!(state_a, state_b);
    assert_eq!(state_a, state_c);
}

#[test]
fn accepted_operation_verifies_against_later_hash() {
    let chain = Chain::new(RegistryConfig::default());
    chain.launch_test_namespace(10_000);

    let op = register_op("foo.test", "payer", "owner");
    chain.accept(&[preorder_op("foo.test", "payer", "owner", FOO_PRICE)]);
    let height = chain.accept(&[op.clone()]).height;
    chain.skip_to(height + 10);

    let proof = chain.registry.snv_proof(height, &op, height + 10).unwrap();
    let trusted = chain.registry.consensus_hash_at(height + 10).unwrap();
    assert!(proof.verify(&op, &trusted));

    let forged = register_op("foo.test", "payer", "mallory");
    assert!(!proof.verify(&forged, &trusted));
}

// ===== Client queue =====

/// Broadcaster whose transactions the test mines into registry blocks
#[derive(Default)]
struct TestNet {
    mempool: Mutex<Vec<(String, Operation)>>,
    mined: Mutex<HashMap<String, u64>>,
    next_txid: Mutex<u64>,
    congested: Mutex<u32>,
}

impl TestNet {
    fn mine(&self, chain: &Chain) {
        let pending: Vec<_> = self.mempool.lock().unwrap().drain(..).collect();
        let ops: Vec<Operation> = pending.iter().map(|(_, op)| op.clone()).collect();
        let height = chain.block(&ops).height;

        let mut mined = self.mined.lock().unwrap();
        for (txid, _) in pending {
            mined.insert(txid, height);
        }
    }
}

impl Broadcaster for TestNet {
    fn broadcast(&self, op: &Operation) -> Result<String, BroadcastError> {
        let mut congested = self.congested.lock().unwrap();
        if *congested > 0 {
            *congested -= 1;
            return Err(BroadcastError::FeeTooLow("mempool full".to_string()));
        }

        let mut next = self.next_txid.lock().unwrap();
        *next += 1;
        let txid = format!("{:064x}", *next);
        self.mempool.lock().unwrap().push((txid.clone(), op.clone()));
        Ok(txid)
    }

    fn inclusion_height(&self, txid: &str) -> Option<u64> {
        self.mined.lock().unwrap().get(txid).copied()
    }
}

#[test]
fn queue_drains_after_register_update_transfer_renew() {
    let chain = Chain::new(RegistryConfig::default());
    chain.launch_test_namespace(10_000);

    let net = TestNet::default();
    *net.congested.lock().unwrap() = 1;

    let mut queue = SubmissionQueue::new(QueueConfig {
        confirmations: 2,
        base_backoff: chrono::Duration::zero(),
        ..Default::default()
    });

    let mut chain_ops = registration_chain(
        "foo.test",
        &script("payer"),
        &address("owner"),
        &script("owner"),
        FOO_PRICE,
        Some(&value_hash("profile")),
    )
    .unwrap();
    chain_ops.push(transfer_op("foo.test", "owner", "newowner"));
    chain_ops.push(renew_op("foo.test", "newowner", FOO_PRICE));
    queue.submit_chain(chain_ops, Utc::now()).unwrap();

    let mut finished = Vec::new();
    for _ in 0..100 {
        queue.tick(&chain.registry.snapshot(), &net, Utc::now());
        finished.extend(queue.take_finished());
        if queue.queue_state().is_empty() {
            break;
        }
        net.mine(&chain);
    }

    assert!(queue.queue_state().is_empty());
    assert_eq!(finished.len(), 5);
    assert!(finished.iter().all(|e| e.state == SubmissionState::Confirmed));
    assert_eq!(finished[0].attempts, 2);

    assert!(chain.registry.names_owned_by(&address("owner")).is_empty());
    let owned = chain.registry.names_owned_by(&address("newowner"));
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].last_op, OpKind::NameRenew);
    assert_eq!(owned[0].value_hash.as_deref(), Some(value_hash("profile").as_str()));
}
