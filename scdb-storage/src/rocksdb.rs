use rocksdb::{
    DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options, WriteBatchWithTransaction,
};

use crate::error::StorageError;
use crate::traits::{BatchOp, BatchWriter, KvPairs, KvStore};

/// RocksDB-backed key-value store.
///
/// The ledger keeps its log and latest-state tables in the default column
/// family; keys are namespaced by prefix (`log:`, `state:`, `meta:`).
pub struct RocksDbStore {
    db: DBWithThreadMode<MultiThreaded>,
}

impl RocksDbStore {
    /// Open (or create) a RocksDB store at the given path.
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DBWithThreadMode::<MultiThreaded>::open(&opts, path)?;
        Ok(Self { db })
    }

    fn scan_from(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        prefix: Option<&[u8]>,
    ) -> Result<KvPairs, StorageError> {
        let iter = self.db.iterator(IteratorMode::From(start, Direction::Forward));
        let mut results = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if let Some(end) = end {
                if key.as_ref() >= end {
                    break;
                }
            }
            if let Some(prefix) = prefix {
                if !key.starts_with(prefix) {
                    break;
                }
            }
            results.push((key.to_vec(), value.to_vec()));
        }
        Ok(results)
    }
}

impl KvStore for RocksDbStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let result = self.db.get(key)?;
        Ok(result)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        self.db.put(key, value)?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        self.db.delete(key)?;
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StorageError> {
        let result = self.db.get(key)?;
        Ok(result.is_some())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<KvPairs, StorageError> {
        self.scan_from(prefix, None, Some(prefix))
    }

    fn range_scan(&self, start: &[u8], end: &[u8]) -> Result<KvPairs, StorageError> {
        if start >= end {
            return Ok(Vec::new());
        }
        self.scan_from(start, Some(end), None)
    }
}

impl BatchWriter for RocksDbStore {
    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        let mut batch = WriteBatchWithTransaction::<false>::default();
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    batch.put(&key, &value);
                }
                BatchOp::Delete { key } => {
                    batch.delete(&key);
                }
            }
        }
        self.db.write(batch)?;
        Ok(())
    }
}
