use thiserror::Error;

use scdb_ledger::LedgerError;

/// Errors that can occur in the node.
#[derive(Debug, Error)]
#[allow(clippy::enum_variant_names)]
pub enum NodeError {
    #[error("config error: {reason}")]
    ConfigError { reason: String },

    #[error("storage error: {0}")]
    StorageError(#[from] scdb_storage::error::StorageError),

    #[error("ledger error: {0}")]
    LedgerError(#[from] LedgerError),

    #[error("feed error at line {line}: {reason}")]
    FeedError { line: usize, reason: String },

    #[error("checkpoint error: {reason}")]
    CheckpointError { reason: String },

    #[error("rpc error: {reason}")]
    RpcError { reason: String },

    /// The blocking task that applies a block did not complete.
    #[error("ledger writer task failed: {reason}")]
    WriterTaskError { reason: String },

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = NodeError::ConfigError {
            reason: "missing field".to_string(),
        };
        assert!(err.to_string().contains("missing field"));
    }

    #[test]
    fn test_feed_error_display() {
        let err = NodeError::FeedError {
            line: 7,
            reason: "invalid hex".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("line 7"));
        assert!(msg.contains("invalid hex"));
    }

    #[test]
    fn test_ledger_error_from() {
        let err: NodeError = LedgerError::HeightMismatch {
            expected: 11,
            got: 13,
        }
        .into();
        assert!(matches!(err, NodeError::LedgerError(_)));
        assert!(err.to_string().contains("13"));
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let node_err: NodeError = io_err.into();
        assert!(matches!(node_err, NodeError::IoError(_)));
    }
}
