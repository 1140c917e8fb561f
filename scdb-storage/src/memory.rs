use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::error::StorageError;
use crate::traits::{increment_prefix, BatchOp, BatchWriter, KvPairs, KvStore};

/// In-memory key-value store backed by a BTreeMap.
/// Ordered keys make prefix and range scans plain range iterations.
pub struct MemoryStore {
    data: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let data = self.data.read().map_err(|_| StorageError::poisoned("memory", "read"))?;
        Ok(data.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let mut data = self.data.write().map_err(|_| StorageError::poisoned("memory", "write"))?;
        data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        let mut data = self.data.write().map_err(|_| StorageError::poisoned("memory", "write"))?;
        data.remove(key);
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StorageError> {
        let data = self.data.read().map_err(|_| StorageError::poisoned("memory", "read"))?;
        Ok(data.contains_key(key))
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<KvPairs, StorageError> {
        match increment_prefix(prefix) {
            Some(upper) => self.range_scan(prefix, &upper),
            None => {
                let data = self.data.read().map_err(|_| StorageError::poisoned("memory", "read"))?;
                Ok(data
                    .range(prefix.to_vec()..)
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect())
            }
        }
    }

    fn range_scan(&self, start: &[u8], end: &[u8]) -> Result<KvPairs, StorageError> {
        if start >= end {
            return Ok(Vec::new());
        }
        let data = self.data.read().map_err(|_| StorageError::poisoned("memory", "read"))?;
        Ok(data
            .range(start.to_vec()..end.to_vec())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

impl BatchWriter for MemoryStore {
    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        let mut data = self.data.write().map_err(|_| StorageError::poisoned("memory", "batch"))?;
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    data.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    data.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_crud() {
        let store = MemoryStore::new();
        store.put(b"state:ctip:\x03", b"outpoint").unwrap();
        assert_eq!(
            store.get(b"state:ctip:\x03").unwrap(),
            Some(b"outpoint".to_vec())
        );
        assert!(store.exists(b"state:ctip:\x03").unwrap());
        assert!(!store.exists(b"state:ctip:\x04").unwrap());

        store.delete(b"state:ctip:\x03").unwrap();
        assert_eq!(store.get(b"state:ctip:\x03").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_prefix_scan_is_ordered() {
        let store = MemoryStore::new();
        store.put(b"log:\x00\x02", b"2").unwrap();
        store.put(b"log:\x00\x01", b"1").unwrap();
        store.put(b"log:\x00\x03", b"3").unwrap();
        store.put(b"meta:tip", b"t").unwrap();

        let results = store.prefix_scan(b"log:").unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].1, b"1".to_vec());
        assert_eq!(results[2].1, b"3".to_vec());
    }

    #[test]
    fn test_range_scan_half_open() {
        let store = MemoryStore::new();
        for i in 0u8..10 {
            store.put(&[b'h', i], &[i]).unwrap();
        }
        let results = store.range_scan(&[b'h', 2], &[b'h', 5]).unwrap();
        let values: Vec<u8> = results.iter().map(|(_, v)| v[0]).collect();
        assert_eq!(values, vec![2, 3, 4]);
        assert!(store.range_scan(&[b'h', 5], &[b'h', 2]).unwrap().is_empty());
    }

    #[test]
    fn test_batch_put_and_delete() {
        let store = MemoryStore::new();
        store.put(b"state:bundle:old", b"pending").unwrap();

        let ops = vec![
            BatchOp::Put {
                key: b"log:1".to_vec(),
                value: b"record".to_vec(),
            },
            BatchOp::Put {
                key: b"meta:tip".to_vec(),
                value: b"1".to_vec(),
            },
            BatchOp::Delete {
                key: b"state:bundle:old".to_vec(),
            },
        ];
        store.write_batch(ops).unwrap();

        assert_eq!(store.get(b"log:1").unwrap(), Some(b"record".to_vec()));
        assert_eq!(store.get(b"meta:tip").unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get(b"state:bundle:old").unwrap(), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_delete_nonexistent() {
        let store = MemoryStore::new();
        store.delete(b"no_such_key").unwrap();
    }

    proptest::proptest! {
        #[test]
        fn prop_prefix_scan_matches_filter(
            keys in proptest::collection::btree_set(
                proptest::collection::vec(0u8..4, 0..5),
                0..40,
            ),
            prefix in proptest::collection::vec(0u8..4, 0..3),
        ) {
            let store = MemoryStore::new();
            for k in &keys {
                store.put(k, k).unwrap();
            }
            let scanned: Vec<Vec<u8>> = store
                .prefix_scan(&prefix)
                .unwrap()
                .into_iter()
                .map(|(k, _)| k)
                .collect();
            let expected: Vec<Vec<u8>> = keys
                .iter()
                .filter(|k| k.starts_with(&prefix))
                .cloned()
                .collect();
            proptest::prop_assert_eq!(scanned, expected);
        }
    }
}
