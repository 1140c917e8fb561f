use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

use scdb_ledger::{BlockReceipt, ConsensusApplier, LedgerError, LedgerEvent, StateReader};
use scdb_storage::ledger_store::LedgerStore;
use scdb_storage::memory::MemoryStore;
use scdb_storage::traits::BatchWriter;
use scdb_types::primitives::Height;
use scdb_types::record::CommitmentRecord;
use scdb_types::vote::BlockCommitments;

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::feed::FeedEntry;
use crate::metrics::NodeMetrics;

/// Create a storage backend from the node configuration.
pub fn create_store(config: &NodeConfig) -> Result<Arc<dyn BatchWriter>, NodeError> {
    match config.storage.db_type.as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        "sqlite" => {
            let data_dir = Path::new(&config.storage.data_dir);
            std::fs::create_dir_all(data_dir)?;
            let db_path = data_dir.join("scdb.db");
            let store =
                scdb_storage::sqlite::SqliteStore::new(db_path.to_str().unwrap_or("scdb.db"))
                    .map_err(NodeError::StorageError)?;
            Ok(Arc::new(store))
        }
        "rocksdb" => {
            let data_dir = Path::new(&config.storage.data_dir);
            std::fs::create_dir_all(data_dir)?;
            let db_path = data_dir.join("scdb.rocksdb");
            let store = scdb_storage::rocksdb::RocksDbStore::new(
                db_path.to_str().unwrap_or("scdb.rocksdb"),
            )
            .map_err(NodeError::StorageError)?;
            Ok(Arc::new(store))
        }
        other => Err(NodeError::ConfigError {
            reason: format!(
                "unknown storage backend '{}', expected 'memory', 'sqlite', or 'rocksdb'",
                other
            ),
        }),
    }
}

/// Open the ledger described by `config`.
///
/// An empty store is seeded from `checkpoint_path` when one is configured.
pub fn open_ledger(config: &NodeConfig) -> Result<ConsensusApplier, NodeError> {
    let store = LedgerStore::new(create_store(config)?);
    let params = config.consensus.clone();

    if let Some(ref checkpoint) = config.checkpoint_path {
        if store.load_tip()?.is_none() {
            let image = crate::checkpoint::load(Path::new(checkpoint))?;
            return Ok(ConsensusApplier::from_checkpoint(params, store, &image)?);
        }
        tracing::debug!(path = %checkpoint, "store already populated, ignoring checkpoint_path");
    }
    Ok(ConsensusApplier::with_store(params, store)?)
}

fn join_writer<T>(
    joined: Result<Result<T, LedgerError>, tokio::task::JoinError>,
) -> Result<T, NodeError> {
    match joined {
        Ok(result) => Ok(result?),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(NodeError::WriterTaskError {
            reason: e.to_string(),
        }),
    }
}

/// Counts reported after replaying a block feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub connected: usize,
    pub disconnected: usize,
    pub applied: usize,
    pub dropped: usize,
    pub transitions: usize,
}

/// Shared handle over the single ledger writer.
///
/// Writes are serialized through one async mutex; reads go through the
/// lock-free [`StateReader`].
#[derive(Clone)]
pub struct LedgerService {
    applier: Arc<Mutex<ConsensusApplier>>,
    reader: StateReader,
    metrics: Arc<NodeMetrics>,
}

impl LedgerService {
    pub fn new(applier: ConsensusApplier) -> Self {
        let reader = applier.reader();
        let metrics = Arc::new(NodeMetrics::new());
        metrics.refresh(&reader);
        Self {
            applier: Arc::new(Mutex::new(applier)),
            reader,
            metrics,
        }
    }

    pub fn reader(&self) -> &StateReader {
        &self.reader
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.metrics
    }

    /// Apply the next block.
    ///
    /// Decoding and the storage batch run on the blocking pool while the
    /// writer lock is held.
    pub async fn connect_block(&self, block: &BlockCommitments) -> Result<BlockReceipt, NodeError> {
        let mut applier = self.applier.clone().lock_owned().await;
        let block = block.clone();
        let receipt = join_writer(
            tokio::task::spawn_blocking(move || applier.apply_block(&block)).await,
        )?;
        self.metrics.record_connect(&receipt);
        self.metrics.refresh(&self.reader);
        Ok(receipt)
    }

    /// Disconnect the tip block at `height`.
    pub async fn disconnect_block(&self, height: Height) -> Result<CommitmentRecord, NodeError> {
        let mut applier = self.applier.clone().lock_owned().await;
        let record = join_writer(
            tokio::task::spawn_blocking(move || applier.disconnect_block(height)).await,
        )?;
        self.metrics.blocks_disconnected.inc();
        self.metrics.refresh(&self.reader);
        Ok(record)
    }

    /// Apply feed entries in order, stopping at the first fatal error.
    pub async fn replay(&self, entries: Vec<FeedEntry>) -> Result<ReplaySummary, NodeError> {
        let mut summary = ReplaySummary::default();
        for entry in entries {
            match entry {
                FeedEntry::Connect(block) => {
                    let receipt = self.connect_block(&block).await?;
                    summary.connected += 1;
                    summary.applied += receipt.applied;
                    summary.dropped += receipt.dropped;
                    summary.transitions += receipt.transitions.len();
                }
                FeedEntry::Disconnect(height) => {
                    self.disconnect_block(height).await?;
                    summary.disconnected += 1;
                }
            }
        }
        tracing::info!(
            connected = summary.connected,
            disconnected = summary.disconnected,
            dropped = summary.dropped,
            tip = ?self.reader.tip().map(|t| t.height),
            "replay finished"
        );
        Ok(summary)
    }
}

/// The running node: ledger service plus the optional RPC server.
pub struct Node {
    config: NodeConfig,
    service: LedgerService,
    rpc_handle: Option<jsonrpsee::server::ServerHandle>,
}

impl Node {
    /// Open storage and restore the ledger.
    pub fn new(config: NodeConfig) -> Result<Self, NodeError> {
        let applier = open_ledger(&config)?;
        let service = LedgerService::new(applier);
        tracing::info!(
            db_type = %config.storage.db_type,
            tip = ?service.reader().tip().map(|t| t.height),
            "ledger opened"
        );
        Ok(Self {
            config,
            service,
            rpc_handle: None,
        })
    }

    pub fn service(&self) -> &LedgerService {
        &self.service
    }

    /// Start the RPC server when enabled and serve until Ctrl+C.
    pub async fn run(&mut self) -> Result<(), NodeError> {
        if self.config.rpc.enabled {
            let handle = crate::rpc::server::start_rpc_server(
                &self.config.rpc.listen_addr,
                self.config.rpc.max_connections,
                self.service.clone(),
            )
            .await?;
            self.rpc_handle = Some(handle);
        } else {
            tracing::info!("RPC disabled; nothing will feed blocks to this node");
        }

        let mut events = self.service.reader().subscribe();
        tracing::info!("Node is running. Press Ctrl+C to stop.");

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(LedgerEvent::BlockConnected { height, transitions, .. }) => {
                        tracing::debug!(height, transitions = transitions.len(), "block connected");
                    }
                    Ok(LedgerEvent::BlockDisconnected { height, .. }) => {
                        tracing::debug!(height, "block disconnected");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event log lagged");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        self.shutdown().await;
                        return Ok(());
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Received shutdown signal");
                    self.shutdown().await;
                    return Ok(());
                }
            }
        }
    }

    /// Gracefully shut down the node.
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.rpc_handle.take() {
            if handle.stop().is_ok() {
                handle.stopped().await;
            }
        }
        tracing::info!(
            tip = ?self.service.reader().tip().map(|t| t.height),
            "Node shut down"
        );
    }
}
