use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use scdb_ledger::ConsensusApplier;
use scdb_storage::ledger_store::LedgerStore;
use scdb_types::primitives::SlotId;

use crate::config::{NodeConfig, CONFIG_FILE_NAME};
use crate::error::NodeError;
use crate::node::{create_store, open_ledger, LedgerService, Node};

#[derive(Parser)]
#[command(
    name = "scdb",
    about = "Sidechain activation and withdrawal ledger node",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = CONFIG_FILE_NAME)]
    pub config: String,
    #[command(subcommand)]
    pub command: Command,
}

/// Storage overrides shared by every command that opens the ledger.
#[derive(Args, Debug, Clone, Default)]
pub struct StorageArgs {
    /// Storage backend: "memory", "sqlite", "rocksdb"
    #[arg(long)]
    pub storage: Option<String>,
    /// Override data directory path
    #[arg(long)]
    pub data_dir: Option<String>,
}

impl StorageArgs {
    fn apply(self, config: &mut NodeConfig) {
        if let Some(db) = self.storage {
            config.storage.db_type = db;
        }
        if let Some(dir) = self.data_dir {
            config.storage.data_dir = dir;
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the node and serve JSON-RPC
    Run {
        #[command(flatten)]
        storage: StorageArgs,
        /// Override RPC listen address (e.g., "0.0.0.0:9851" for LAN access)
        #[arg(long)]
        rpc_addr: Option<String>,
        /// Do not start the RPC server
        #[arg(long)]
        no_rpc: bool,
    },
    /// Initialize a new node configuration
    Init {
        /// Output directory
        #[arg(short, long, default_value = ".")]
        dir: String,
    },
    /// Apply a JSON-lines block feed to the ledger
    Replay {
        /// Path to the block feed
        #[arg(short, long)]
        blocks: PathBuf,
        #[command(flatten)]
        storage: StorageArgs,
    },
    /// Print the ledger state as tables
    Inspect {
        #[command(flatten)]
        storage: StorageArgs,
        /// Only show this slot
        #[arg(long)]
        slot: Option<SlotId>,
    },
    /// Export or import a ledger checkpoint
    Checkpoint {
        #[command(subcommand)]
        command: CheckpointCommand,
    },
}

#[derive(Subcommand)]
pub enum CheckpointCommand {
    /// Write the latest ledger state as JSON
    Export {
        /// Output path for the checkpoint
        #[arg(short, long, default_value = "checkpoint.json")]
        output: PathBuf,
        #[command(flatten)]
        storage: StorageArgs,
    },
    /// Seed the store from a JSON checkpoint
    Import {
        /// Checkpoint to import
        #[arg(short, long)]
        input: PathBuf,
        /// Replace a store that already holds ledger state
        #[arg(long)]
        force: bool,
        #[command(flatten)]
        storage: StorageArgs,
    },
}

/// Load the config named on the command line with storage overrides applied.
fn load_config(path: &str, storage: StorageArgs) -> Result<NodeConfig, NodeError> {
    let mut config = NodeConfig::load_or_default(path)?;
    storage.apply(&mut config);
    Ok(config)
}

pub async fn run(cli: Cli) -> Result<(), NodeError> {
    match cli.command {
        Command::Run {
            storage,
            rpc_addr,
            no_rpc,
        } => {
            crate::banner::print_banner();

            let mut config = load_config(&cli.config, storage)?;
            if let Some(addr) = rpc_addr {
                config.rpc.listen_addr = addr;
            }
            if no_rpc {
                config.rpc.enabled = false;
            }

            {
                let dim = console::Style::new().dim();
                let cyan = console::Style::new().cyan();
                println!(
                    "  {}  {} ({})",
                    dim.apply_to("Storage "),
                    cyan.apply_to(&config.storage.db_type),
                    cyan.apply_to(&config.storage.data_dir),
                );
                let rpc = if config.rpc.enabled {
                    config.rpc.listen_addr.clone()
                } else {
                    "disabled".to_string()
                };
                println!("  {}  {}", dim.apply_to("RPC     "), cyan.apply_to(rpc));
                println!(
                    "  {}  {} acks / {} blocks, maturity {}",
                    dim.apply_to("Params  "),
                    cyan.apply_to(config.consensus.required_acks),
                    cyan.apply_to(config.consensus.activation_window),
                    cyan.apply_to(config.consensus.maturity_threshold),
                );
                println!();
            }

            let mut node = Node::new(config)?;
            node.run().await
        }
        Command::Init { dir } => {
            NodeConfig::init(&dir)?;
            tracing::info!("Node configuration initialized in {}", dir);
            Ok(())
        }
        Command::Replay { blocks, storage } => {
            let config = load_config(&cli.config, storage)?;
            let entries = crate::feed::read_feed_file(&blocks)?;
            let service = LedgerService::new(open_ledger(&config)?);
            let summary = service.replay(entries).await?;
            println!(
                "Replayed {} connect and {} disconnect entries ({} commitments dropped, {} transitions)",
                summary.connected, summary.disconnected, summary.dropped, summary.transitions
            );
            if let Some(tip) = service.reader().tip() {
                println!(
                    "Tip {} state root {}",
                    tip.height,
                    hex::encode(service.reader().state_root())
                );
            }
            Ok(())
        }
        Command::Inspect { storage, slot } => {
            let config = load_config(&cli.config, storage)?;
            let applier = open_ledger(&config)?;
            crate::inspect::print_state(&applier.reader().snapshot(), slot);
            Ok(())
        }
        Command::Checkpoint { command } => match command {
            CheckpointCommand::Export { output, storage } => {
                let config = load_config(&cli.config, storage)?;
                let applier = open_ledger(&config)?;
                crate::checkpoint::export(&applier.reader(), &output)?;
                println!("Checkpoint written to {}", output.display());
                Ok(())
            }
            CheckpointCommand::Import {
                input,
                force,
                storage,
            } => {
                let config = load_config(&cli.config, storage)?;
                import_checkpoint(&config, &input, force)?;
                println!("Checkpoint {} imported", input.display());
                Ok(())
            }
        },
    }
}

/// Seed the configured store from a checkpoint file.
pub fn import_checkpoint(
    config: &NodeConfig,
    input: &Path,
    force: bool,
) -> Result<ConsensusApplier, NodeError> {
    let image = crate::checkpoint::load(input)?;
    let store = LedgerStore::new(create_store(config)?);
    if let Some(tip) = store.load_tip()? {
        if !force {
            return Err(NodeError::CheckpointError {
                reason: format!(
                    "store already holds ledger state at height {}; pass --force to replace it",
                    tip.height
                ),
            });
        }
        tracing::warn!(height = tip.height, "replacing existing ledger state");
    }
    Ok(ConsensusApplier::from_checkpoint(
        config.consensus.clone(),
        store,
        &image,
    )?)
}
