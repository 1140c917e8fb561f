use thiserror::Error;

/// Failures of the ledger's persistence layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A thread panicked while holding the store lock.
    #[error("{backend} store lock poisoned during {op}")]
    LockPoisoned {
        backend: &'static str,
        op: &'static str,
    },

    /// The underlying database rejected an operation.
    #[error("{backend} backend failure: {reason}")]
    Backend {
        backend: &'static str,
        reason: String,
    },

    #[error("cannot encode {what}: {reason}")]
    Encode { what: &'static str, reason: String },

    /// Persisted bytes do not decode; the store is corrupt or foreign.
    #[error("cannot decode {what}: {reason}")]
    Decode { what: String, reason: String },

    #[error("ledger schema v{stored} on disk, this build reads v{expected}")]
    SchemaMismatch { stored: u32, expected: u32 },
}

impl StorageError {
    pub(crate) fn poisoned(backend: &'static str, op: &'static str) -> Self {
        StorageError::LockPoisoned { backend, op }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend {
            backend: "sqlite",
            reason: err.to_string(),
        }
    }
}

impl From<rocksdb::Error> for StorageError {
    fn from(err: rocksdb::Error) -> Self {
        StorageError::Backend {
            backend: "rocksdb",
            reason: err.into_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_backend() {
        let err = StorageError::poisoned("memory", "write");
        assert_eq!(err.to_string(), "memory store lock poisoned during write");

        let err = StorageError::from(rusqlite::Error::InvalidQuery);
        assert!(matches!(err, StorageError::Backend { backend: "sqlite", .. }));
    }

    #[test]
    fn test_schema_mismatch_message() {
        let err = StorageError::SchemaMismatch {
            stored: 2,
            expected: 1,
        };
        assert_eq!(
            err.to_string(),
            "ledger schema v2 on disk, this build reads v1"
        );
    }
}
