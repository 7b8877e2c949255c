//! CLI commands for the registry
//!
//! Handlers for replaying operation streams into the local registry and for
//! querying names, namespaces and consensus hashes from its snapshot.

use crate::core::{
    ConsensusHash, NameLiveness, NameRecord, Operation, RegistryConfig, SnvClient, StateEngine,
};
use crate::registry::Registry;
use crate::storage::{CheckpointManager, Storage, StorageConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// One block of an operation stream file
#[derive(Debug, Clone, Deserialize)]
pub struct BlockOperations {
    pub height: u64,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

/// Application state
pub struct AppState {
    pub registry: Registry,
    pub storage: Storage,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Load the persisted registry, or start a new one from `config`
    pub fn new(
        data_dir: PathBuf,
        config: RegistryConfig,
        checkpoints: Option<&Path>,
    ) -> CliResult<Self> {
        let storage = Storage::new(StorageConfig::in_dir(&data_dir))?;

        let engine = if storage.exists() {
            println!("📂 Loading existing registry...");
            let state = storage.load()?;
            if state.config != config {
                log::warn!("Stored registry was created with different rules; keeping stored rules");
            }
            StateEngine::resume(state)
        } else {
            println!("🆕 Creating new registry (first block {})...", config.first_block);
            StateEngine::new(config)
        };

        let engine = match checkpoints {
            Some(path) => {
                let manager = CheckpointManager::from_file(path)?;
                println!("📌 Loaded {} checkpoints", manager.len());
                engine.with_checkpoints(manager)
            }
            None => engine,
        };

        Ok(Self {
            registry: Registry::from_engine(engine),
            storage,
            data_dir,
        })
    }

    /// Save the current state
    pub fn save(&self) -> CliResult<()> {
        self.registry.save(&self.storage)?;
        Ok(())
    }
}

/// Parse a JSON operation stream
pub fn read_operation_stream(path: &Path) -> CliResult<Vec<BlockOperations>> {
    let data = std::fs::read_to_string(path)?;
    let blocks: Vec<BlockOperations> = serde_json::from_str(&data)?;
    Ok(blocks)
}

/// Replay an operation stream file block by block
pub fn cmd_replay(state: &mut AppState, path: &Path) -> CliResult<()> {
    let blocks = read_operation_stream(path)?;
    println!("▶️  Replaying {} blocks from {:?}", blocks.len(), path);

    let mut accepted = 0;
    let mut rejected = 0;

    for block in &blocks {
        let next = state.registry.next_block();
        if block.height < next {
            println!("   ⏭️  Skipping block {} (already processed)", block.height);
            continue;
        }
        if block.height > next {
            state.registry.advance_to(block.height - 1)?;
        }

        let report = match state.registry.process_block(block.height, &block.operations) {
            Ok(report) => report,
            Err(e) => {
                state.save()?;
                println!("❌ Stopped at block {}: {}", block.height, e);
                return Err(e.into());
            }
        };

        accepted += report.accepted_count();
        rejected += report.rejected_count();

        if !block.operations.is_empty() {
            println!("   {}", serde_json::to_string(&report.summary())?);
        }
    }

    state.save()?;

    println!("✅ Replay complete");
    println!("   ├─ Last block: {:?}", state.registry.last_block());
    println!("   ├─ Accepted: {}", accepted);
    println!("   ├─ Rejected: {}", rejected);
    println!("   └─ Consensus hash: {}", state.registry.current_consensus_hash());

    Ok(())
}

/// Process empty blocks up to a height
pub fn cmd_advance(state: &mut AppState, height: u64) -> CliResult<()> {
    let reports = state.registry.advance_to(height)?;
    state.save()?;
    println!("⏩ Processed {} empty blocks", reports.len());
    println!("   └─ Consensus hash: {}", state.registry.current_consensus_hash());
    Ok(())
}

fn print_record(record: &NameRecord, grace_period: u64, height: u64) {
    let liveness = match record.liveness(height, grace_period) {
        NameLiveness::Active => "active",
        NameLiveness::GracePeriod => "grace period",
        NameLiveness::Expired => "expired",
    };

    println!("   ├─ Owner: {}", record.address);
    println!("   ├─ Value hash: {}", record.value_hash.as_deref().unwrap_or("-"));
    println!("   ├─ Registered: {}", record.first_registered);
    println!("   ├─ Last renewed: {}", record.last_renewed);
    println!("   ├─ Expires: {} ({})", record.expire_block, liveness);
    println!("   ├─ Fee paid: {}", record.op_fee);
    println!("   ├─ Last op: {} at block {}", record.last_op, record.block_number);
    if record.revoked {
        println!("   ├─ Revoked");
    }
    println!("   └─ Consensus hash: {}", record.consensus_hash);
}

/// Show a name, optionally as of a past block
pub fn cmd_name(state: &AppState, name: &str, at: Option<u64>) -> CliResult<()> {
    let snapshot = state.registry.snapshot();
    let height = at.or(snapshot.last_block).unwrap_or(snapshot.config.first_block);
    let grace = snapshot.config.epochs.renewal_grace_period(height);

    let record = match at {
        Some(h) => snapshot.get_name_at(name, h),
        None => snapshot.get_name(name),
    };

    match record {
        Some(record) => {
            println!("🏷️  {}", record.name);
            print_record(record, grace, height);
        }
        None => println!("❌ Name {} not found", name),
    }

    Ok(())
}

/// Show the full history of a name
pub fn cmd_history(state: &AppState, name: &str) -> CliResult<()> {
    let history = state.registry.name_history(name);
    if history.is_empty() {
        println!("❌ No history for {}", name);
        return Ok(());
    }

    println!("📜 History of {} ({} entries)", name, history.len());
    for entry in &history {
        println!(
            "   #{} | {} | owner {} | expires {}",
            entry.block_height, entry.record.last_op, entry.record.address, entry.record.expire_block
        );
    }

    Ok(())
}

/// Show a namespace, ready or still revealed
pub fn cmd_namespace(state: &AppState, namespace_id: &str) -> CliResult<()> {
    let namespace = state
        .registry
        .get_namespace(namespace_id)
        .or_else(|| state.registry.get_namespace_reveal(namespace_id));

    match namespace {
        Some(ns) => {
            println!("🗂️  Namespace .{} ({:?})", ns.namespace_id, ns.status);
            println!("   ├─ Revealed at: {}", ns.reveal_block);
            println!("   ├─ Ready at: {:?}", ns.ready_block);
            println!("   ├─ Lifetime: {}", ns.lifetime);
            println!("   ├─ Price: coeff {} base {} buckets {:?}", ns.coeff, ns.base, ns.buckets);
            println!(
                "   ├─ Discounts: nonalpha {} no-vowel {}",
                ns.nonalpha_discount, ns.no_vowel_discount
            );
            println!("   └─ Recipient: {}", ns.recipient);
        }
        None => println!("❌ Namespace {} not found", namespace_id),
    }

    Ok(())
}

/// List names owned by an address
pub fn cmd_owned(state: &AppState, address: &str) -> CliResult<()> {
    let names = state.registry.names_owned_by(address);
    println!("👛 {} names owned by {}", names.len(), address);
    for record in &names {
        println!("   └─ {} (expires {})", record.name, record.expire_block);
    }
    Ok(())
}

/// Print the consensus hash at a height (default: the latest block)
pub fn cmd_consensus(state: &AppState, height: Option<u64>) -> CliResult<()> {
    match height {
        Some(h) => match state.registry.consensus_hash_at(h) {
            Some(hash) => println!("{} {}", h, hash),
            None => println!("❌ Block {} has not been processed", h),
        },
        None => match state.registry.last_block() {
            Some(h) => println!("{} {}", h, state.registry.current_consensus_hash()),
            None => println!("❌ No blocks processed yet"),
        },
    }
    Ok(())
}

/// Compare our consensus hash with one reported by a peer
pub fn cmd_verify_peer(state: &mut AppState, height: u64, hash: &str) -> CliResult<()> {
    let peer_hash: ConsensusHash = hash.parse()?;

    match state.registry.check_peer_hash(height, &peer_hash) {
        Ok(true) => println!("✅ Consensus hash at block {} matches", height),
        Ok(false) => println!("⚠️  Block {} has not been processed yet", height),
        Err(e) => {
            println!("❌ Consensus hash at block {} differs; registry halted", height);
            println!("   ├─ Local: {:?}", state.registry.consensus_hash_at(height));
            println!("   └─ Peer:  {}", peer_hash);
            return Err(e.into());
        }
    }

    Ok(())
}

/// Prove an operation against a trusted consensus hash
pub fn cmd_snv(
    state: &AppState,
    height: u64,
    operation_file: &Path,
    trusted_height: u64,
    trusted_hash: Option<&str>,
) -> CliResult<()> {
    let op: Operation = serde_json::from_str(&std::fs::read_to_string(operation_file)?)?;

    let Some(proof) = state.registry.snv_proof(height, &op, trusted_height) else {
        println!("❌ No proof: operation not accepted at block {}", height);
        return Ok(());
    };

    let trusted = match trusted_hash {
        Some(hex) => hex.parse::<ConsensusHash>()?,
        None => state
            .registry
            .consensus_hash_at(trusted_height)
            .ok_or("trusted height has not been processed")?,
    };

    let mut client = SnvClient::new();
    client.trust(trusted_height, trusted);

    if client.verify_operation(&op, &proof) {
        println!("✅ {} at block {} verified against block {}", op.kind(), height, trusted_height);
    } else {
        println!("❌ Proof does not match trusted hash {}", trusted);
    }
    println!("{}", serde_json::to_string_pretty(&proof)?);

    Ok(())
}

/// Export the registry snapshot to a file
pub fn cmd_export(state: &AppState, path: &Path) -> CliResult<()> {
    crate::storage::save_to_file(&state.registry.snapshot(), path)?;
    println!("📦 Registry exported to {:?}", path);
    Ok(())
}

/// Replace the registry with a snapshot file
pub fn cmd_import(state: &mut AppState, path: &Path) -> CliResult<()> {
    let imported = crate::storage::load_from_file(path)?;
    let last_block = imported.last_block;

    state.registry = Registry::from_engine(StateEngine::resume(imported));
    state.save()?;

    println!("📥 Registry imported from {:?}", path);
    println!("   └─ Last block: {:?}", last_block);
    Ok(())
}

/// Show storage and registry status
pub fn cmd_status(state: &AppState) -> CliResult<()> {
    let snapshot = state.registry.snapshot();

    println!("📊 Registry Status");
    println!("   ├─ Last block: {:?}", snapshot.last_block);
    println!("   ├─ Namespaces: {}", snapshot.namespaces.namespace_count());
    println!("   ├─ Names: {}", snapshot.names.name_count());
    println!("   ├─ Pending preorders: {}", snapshot.names.preorder_count());
    println!("   ├─ Halted: {}", state.registry.is_halted());
    println!("   └─ Consensus hash: {}", snapshot.current_consensus_hash());

    if state.storage.exists() {
        let stats = state.storage.stats()?;
        println!("💾 Storage {:?}", stats.data_dir);
        println!("   ├─ Size: {} bytes", stats.file_size);
        println!("   └─ Backups: {}", stats.backup_count);
    }

    Ok(())
}
