use serde::{Deserialize, Serialize};
use std::path::Path;

use scdb_types::params::ConsensusParams;

use crate::error::NodeError;

/// Name of the configuration file written by `scdb init`.
pub const CONFIG_FILE_NAME: &str = "scdb.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// JSON checkpoint used to seed an empty store on startup.
    #[serde(default)]
    pub checkpoint_path: Option<String>,
    /// Consensus parameters. Every node of a network must use the same values.
    #[serde(default)]
    pub consensus: ConsensusParams,
    pub storage: StorageConfig,
    pub rpc: RpcConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,
    /// Storage backend: "memory", "sqlite", or "rocksdb"
    pub db_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub enabled: bool,
    pub listen_addr: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            checkpoint_path: None,
            consensus: ConsensusParams::default(),
            storage: StorageConfig {
                data_dir: dirs::home_dir()
                    .map(|h| h.join(".scdb").join("data").to_string_lossy().into_owned())
                    .unwrap_or_else(|| "./scdb-data".to_string()),
                db_type: "sqlite".to_string(),
            },
            rpc: RpcConfig {
                enabled: true,
                listen_addr: "127.0.0.1:9851".to_string(),
                max_connections: 100,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, NodeError> {
        let contents = std::fs::read_to_string(path).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to read config file '{}': {}", path, e),
        })?;
        let config: NodeConfig = toml::from_str(&contents).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to parse config file '{}': {}", path, e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `path`, or fall back to the defaults when the
    /// file does not exist.
    pub fn load_or_default(path: &str) -> Result<Self, NodeError> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            tracing::info!(path = %path, "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Reject parameter sets the ledger cannot run with.
    pub fn validate(&self) -> Result<(), NodeError> {
        self.consensus
            .validate()
            .map_err(|e| NodeError::ConfigError {
                reason: format!("invalid [consensus] section: {}", e),
            })
    }

    /// Initialize a default configuration file in the given directory.
    pub fn init(dir: &str) -> Result<(), NodeError> {
        let dir_path = Path::new(dir);
        if !dir_path.exists() {
            std::fs::create_dir_all(dir_path)?;
        }

        let config = NodeConfig::default();
        let toml_str = toml::to_string_pretty(&config).map_err(|e| NodeError::ConfigError {
            reason: format!("failed to serialize default config: {}", e),
        })?;

        let config_path = dir_path.join(CONFIG_FILE_NAME);
        std::fs::write(&config_path, toml_str)?;

        Ok(())
    }
}
