use std::sync::Mutex;

use rusqlite::{params, Connection};

use crate::error::StorageError;
use crate::traits::{increment_prefix, BatchOp, BatchWriter, KvPairs, KvStore};

/// SQLite-backed key-value store.
/// Uses a single `ledger_kv` table with BLOB key and BLOB value columns; every
/// batch runs in one transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a SQLite store at the given path.
    /// Use `:memory:` for an in-memory database (useful for tests).
    pub fn new(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS ledger_kv (key BLOB PRIMARY KEY, value BLOB NOT NULL)",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn scan(
        conn: &Connection,
        start: &[u8],
        end: Option<&[u8]>,
    ) -> Result<KvPairs, StorageError> {
        let mut results = Vec::new();
        match end {
            Some(end) => {
                let mut stmt = conn.prepare_cached(
                    "SELECT key, value FROM ledger_kv WHERE key >= ?1 AND key < ?2 ORDER BY key",
                )?;
                let mut rows = stmt.query(params![start, end])?;
                while let Some(row) = rows.next()? {
                    results.push((row.get(0)?, row.get(1)?));
                }
            }
            None => {
                let mut stmt = conn
                    .prepare_cached("SELECT key, value FROM ledger_kv WHERE key >= ?1 ORDER BY key")?;
                let mut rows = stmt.query(params![start])?;
                while let Some(row) = rows.next()? {
                    results.push((row.get(0)?, row.get(1)?));
                }
            }
        }
        Ok(results)
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::poisoned("sqlite", "read"))?;
        let mut stmt = conn.prepare_cached("SELECT value FROM ledger_kv WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::poisoned("sqlite", "write"))?;
        conn.execute(
            "INSERT OR REPLACE INTO ledger_kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::poisoned("sqlite", "write"))?;
        conn.execute("DELETE FROM ledger_kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn exists(&self, key: &[u8]) -> Result<bool, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::poisoned("sqlite", "read"))?;
        let mut stmt = conn.prepare_cached("SELECT 1 FROM ledger_kv WHERE key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        Ok(rows.next()?.is_some())
    }

    fn prefix_scan(&self, prefix: &[u8]) -> Result<KvPairs, StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::poisoned("sqlite", "read"))?;
        let upper = increment_prefix(prefix);
        let mut results = Self::scan(&conn, prefix, upper.as_deref())?;
        // Without an upper bound the scan runs to the end of the table.
        results.retain(|(k, _)| k.starts_with(prefix));
        Ok(results)
    }

    fn range_scan(&self, start: &[u8], end: &[u8]) -> Result<KvPairs, StorageError> {
        if start >= end {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().map_err(|_| StorageError::poisoned("sqlite", "read"))?;
        Self::scan(&conn, start, Some(end))
    }
}

impl BatchWriter for SqliteStore {
    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StorageError> {
        let conn = self.conn.lock().map_err(|_| StorageError::poisoned("sqlite", "batch"))?;
        let tx = conn.unchecked_transaction()?;
        for op in ops {
            match op {
                BatchOp::Put { key, value } => {
                    tx.execute(
                        "INSERT OR REPLACE INTO ledger_kv (key, value) VALUES (?1, ?2)",
                        params![key, value],
                    )?;
                }
                BatchOp::Delete { key } => {
                    tx.execute("DELETE FROM ledger_kv WHERE key = ?1", params![key])?;
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}
