//! Name Registry CLI Application
//!
//! A command-line interface for replaying and querying the registry.

use clap::{Parser, Subcommand};
use name_registry::cli::{self, AppState};
use name_registry::core::RegistryConfig;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "registry")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "Deterministic name registry state engine", long_about = None)]
struct Cli {
    /// Data directory for registry storage
    #[arg(short, long, default_value = ".registry_data")]
    data_dir: PathBuf,

    /// Registry rules as JSON (used when creating a new registry)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Trusted consensus checkpoints as JSON
    #[arg(long)]
    checkpoints: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON operation stream
    Replay {
        /// Stream file: [{"height": N, "operations": [...]}, ...]
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Process empty blocks up to a height
    Advance {
        #[arg(long)]
        height: u64,
    },

    /// Look up a name
    Name {
        name: String,

        /// Show the record as of this block
        #[arg(long)]
        at: Option<u64>,
    },

    /// Show every snapshot of a name
    History { name: String },

    /// Look up a namespace
    Namespace { namespace_id: String },

    /// List names owned by an address
    Owned { address: String },

    /// Show the consensus hash at a block
    Consensus {
        #[arg(long)]
        height: Option<u64>,
    },

    /// Check a peer's consensus hash
    Verify {
        #[arg(long)]
        height: u64,

        /// Peer consensus hash (hex)
        #[arg(long)]
        hash: String,
    },

    /// Build and check an SNV proof for an operation
    Snv {
        /// Block the operation was accepted in
        #[arg(long)]
        height: u64,

        /// Operation JSON file
        #[arg(short, long)]
        operation: PathBuf,

        /// Block whose consensus hash is trusted
        #[arg(long)]
        trusted_height: u64,

        /// Trusted consensus hash (defaults to the local one)
        #[arg(long)]
        trusted_hash: Option<String>,
    },

    /// Show registry and storage status
    Status,

    /// Export the registry snapshot
    Export {
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Import a registry snapshot
    Import {
        #[arg(short, long)]
        input: PathBuf,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<RegistryConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => RegistryConfig::default(),
    };
    Ok(config.apply_env())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    let mut state = AppState::new(cli.data_dir.clone(), config, cli.checkpoints.as_deref())?;

    // Process commands
    match cli.command {
        Commands::Replay { file } => {
            cli::cmd_replay(&mut state, &file)?;
        }

        Commands::Advance { height } => {
            cli::cmd_advance(&mut state, height)?;
        }

        Commands::Name { name, at } => {
            cli::cmd_name(&state, &name, at)?;
        }

        Commands::History { name } => {
            cli::cmd_history(&state, &name)?;
        }

        Commands::Namespace { namespace_id } => {
            cli::cmd_namespace(&state, &namespace_id)?;
        }

        Commands::Owned { address } => {
            cli::cmd_owned(&state, &address)?;
        }

        Commands::Consensus { height } => {
            cli::cmd_consensus(&state, height)?;
        }

        Commands::Verify { height, hash } => {
            cli::cmd_verify_peer(&mut state, height, &hash)?;
        }

        Commands::Snv {
            height,
            operation,
            trusted_height,
            trusted_hash,
        } => {
            cli::cmd_snv(
                &state,
                height,
                &operation,
                trusted_height,
                trusted_hash.as_deref(),
            )?;
        }

        Commands::Status => {
            cli::cmd_status(&state)?;
        }

        Commands::Export { output } => {
            cli::cmd_export(&state, &output)?;
        }

        Commands::Import { input } => {
            cli::cmd_import(&mut state, &input)?;
        }
    }

    Ok(())
}
