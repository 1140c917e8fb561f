use std::sync::Arc;

use borsh::{BorshDeserialize, BorshSerialize};

use scdb_types::bundle::WithdrawalBundle;
use scdb_types::ctip::Ctip;
use scdb_types::primitives::{ChainTip, Hash, Height, SlotId};
use scdb_types::record::{CommitmentRecord, LedgerImage, StateDiff};
use scdb_types::sidechain::{ProposalKey, SidechainProposal};

use crate::error::StorageError;
use crate::traits::{BatchOp, BatchWriter};

// Key layout.
const LOG_PREFIX: &[u8] = b"log:";
const PROPOSAL_PREFIX: &[u8] = b"state:proposal:";
const BUNDLE_PREFIX: &[u8] = b"state:bundle:";
const CTIP_PREFIX: &[u8] = b"state:ctip:";
const TIP_KEY: &[u8] = b"meta:tip";
const SCHEMA_VERSION_KEY: &[u8] = b"meta:schema_version";

/// Current schema version. Bump this whenever a breaking change is made to any
/// borsh-serialized type persisted through LedgerStore.
pub const SCHEMA_VERSION: u32 = 1;

/// Persisted ledger: an append-only per-height commitment log plus the latest
/// state table, both updated in a single batch per block.
pub struct LedgerStore {
    store: Arc<dyn BatchWriter>,
}

impl LedgerStore {
    pub fn new(store: Arc<dyn BatchWriter>) -> Self {
        Self { store }
    }

    // ── Schema Version ─────────────────────────────────────────────────

    /// Check the persisted schema version against the binary's version.
    ///
    /// An empty store is stamped with the current version.
    pub fn check_schema_version(&self) -> Result<(), StorageError> {
        let stored = match self.store.get(SCHEMA_VERSION_KEY)? {
            Some(bytes) => decode::<u32>(&bytes, "schema version")?,
            None => {
                if self.store.get(TIP_KEY)?.is_some() {
                    return Err(StorageError::SchemaMismatch {
                        stored: 0,
                        expected: SCHEMA_VERSION,
                    });
                }
                self.store.put(SCHEMA_VERSION_KEY, &encode(&SCHEMA_VERSION)?)?;
                return Ok(());
            }
        };

        if stored != SCHEMA_VERSION {
            return Err(StorageError::SchemaMismatch {
                stored,
                expected: SCHEMA_VERSION,
            });
        }
        Ok(())
    }

    // ── Block log ──────────────────────────────────────────────────────

    /// Persist an applied block: its commitment record plus the forward write
    /// set, as one atomic batch.
    pub fn commit_block(
        &self,
        record: &CommitmentRecord,
        redo: &StateDiff,
    ) -> Result<(), StorageError> {
        let mut ops = diff_ops(redo)?;
        ops.push(BatchOp::Put {
            key: log_key(record.height),
            value: encode(record)?,
        });
        let count = ops.len();
        self.store.write_batch(ops)?;
        tracing::debug!(height = record.height, ops = count, "committed block batch");
        Ok(())
    }

    /// Undo a persisted block: drop its log entry and write back the prior
    /// values captured in its undo snapshot, as one atomic batch.
    pub fn revert_block(&self, record: &CommitmentRecord) -> Result<(), StorageError> {
        self.revert_blocks(std::slice::from_ref(record))
    }

    /// Undo several persisted blocks, given newest first, as one atomic batch.
    /// Later undo snapshots in the batch overwrite earlier ones.
    pub fn revert_blocks(&self, records: &[CommitmentRecord]) -> Result<(), StorageError> {
        let mut ops = Vec::new();
        for record in records {
            ops.extend(diff_ops(&record.undo)?);
            ops.push(BatchOp::Delete {
                key: log_key(record.height),
            });
        }
        self.store.write_batch(ops)?;
        tracing::debug!(blocks = records.len(), "reverted block batch");
        Ok(())
    }

    /// Load a single commitment record.
    pub fn load_record(&self, height: Height) -> Result<Option<CommitmentRecord>, StorageError> {
        match self.store.get(&log_key(height))? {
            Some(bytes) => Ok(Some(decode(&bytes, "commitment record")?)),
            None => Ok(None),
        }
    }

    /// Load commitment records with `from <= height <= to`, ascending.
    pub fn load_records(
        &self,
        from: Height,
        to: Height,
    ) -> Result<Vec<CommitmentRecord>, StorageError> {
        if from > to {
            return Ok(Vec::new());
        }
        let start = log_key(from);
        let pairs = match to.checked_add(1) {
            Some(end) => self.store.range_scan(&start, &log_key(end))?,
            None => self.store.range_scan(&start, &increment(LOG_PREFIX))?,
        };
        pairs
            .iter()
            .map(|(_, v)| decode(v, "commitment record"))
            .collect()
    }

    /// Load up to `count` most recent commitment records ending at the tip, ascending.
    pub fn load_recent_records(
        &self,
        count: usize,
    ) -> Result<Vec<CommitmentRecord>, StorageError> {
        let tip = match self.load_tip()? {
            Some(tip) => tip,
            None => return Ok(Vec::new()),
        };
        if count == 0 {
            return Ok(Vec::new());
        }
        let from = tip.height.saturating_sub(count as u64 - 1);
        self.load_records(from, tip.height)
    }

    // ── Latest state ───────────────────────────────────────────────────

    pub fn load_tip(&self) -> Result<Option<ChainTip>, StorageError> {
        match self.store.get(TIP_KEY)? {
            Some(bytes) => Ok(Some(decode(&bytes, "chain tip")?)),
            None => Ok(None),
        }
    }

    /// Rebuild the latest ledger image from the state table.
    pub fn load_image(&self) -> Result<LedgerImage, StorageError> {
        let proposals = self
            .store
            .prefix_scan(PROPOSAL_PREFIX)?
            .iter()
            .map(|(_, v)| decode::<SidechainProposal>(v, "proposal"))
            .collect::<Result<Vec<_>, _>>()?;
        let bundles = self
            .store
            .prefix_scan(BUNDLE_PREFIX)?
            .iter()
            .map(|(_, v)| decode::<WithdrawalBundle>(v, "bundle"))
            .collect::<Result<Vec<_>, _>>()?;
        let ctips = self
            .store
            .prefix_scan(CTIP_PREFIX)?
            .iter()
            .map(|(_, v)| decode::<Ctip>(v, "ctip"))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LedgerImage {
            tip: self.load_tip()?,
            proposals,
            bundles,
            ctips,
        })
    }

    /// Replace the whole persisted ledger with `image` and an empty log.
    pub fn import_image(&self, image: &LedgerImage) -> Result<(), StorageError> {
        let mut ops = Vec::new();
        for prefix in [LOG_PREFIX, PROPOSAL_PREFIX, BUNDLE_PREFIX, CTIP_PREFIX] {
            for (key, _) in self.store.prefix_scan(prefix)? {
                ops.push(BatchOp::Delete { key });
            }
        }
        for proposal in &image.proposals {
            ops.push(BatchOp::Put {
                key: proposal_key(&proposal.key()),
                value: encode(proposal)?,
            });
        }
        for bundle in &image.bundles {
            ops.push(BatchOp::Put {
                key: bundle_key(&bundle.bundle_hash),
                value: encode(bundle)?,
            });
        }
        for ctip in &image.ctips {
            ops.push(BatchOp::Put {
                key: ctip_key(ctip.slot),
                value: encode(ctip)?,
            });
        }
        ops.push(tip_op(image.tip.as_ref())?);
        ops.push(BatchOp::Put {
            key: SCHEMA_VERSION_KEY.to_vec(),
            value: encode(&SCHEMA_VERSION)?,
        });
        self.store.write_batch(ops)
    }
}

/// Translate a diff into batch operations. The tip is always written: `None`
/// removes it.
fn diff_ops(diff: &StateDiff) -> Result<Vec<BatchOp>, StorageError> {
    let mut ops = Vec::with_capacity(diff.len() + 1);
    for (key, value) in &diff.proposals {
        ops.push(entry_op(proposal_key(key), value.as_ref())?);
    }
    for (hash, value) in &diff.bundles {
        ops.push(entry_op(bundle_key(hash), value.as_ref())?);
    }
    for (slot, value) in &diff.ctips {
        ops.push(entry_op(ctip_key(*slot), value.as_ref())?);
    }
    ops.push(tip_op(diff.tip.as_ref())?);
    Ok(ops)
}

fn entry_op<T: BorshSerialize>(key: Vec<u8>, value: Option<&T>) -> Result<BatchOp, StorageError> {
    Ok(match value {
        Some(v) => BatchOp::Put {
            key,
            value: encode(v)?,
        },
        None => BatchOp::Delete { key },
    })
}

fn tip_op(tip: Option<&ChainTip>) -> Result<BatchOp, StorageError> {
    entry_op(TIP_KEY.to_vec(), tip)
}

fn encode<T: BorshSerialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    borsh::to_vec(value).map_err(|e| StorageError::Encode {
        what: std::any::type_name::<T>(),
        reason: e.to_string(),
    })
}

fn decode<T: BorshDeserialize>(bytes: &[u8], what: &str) -> Result<T, StorageError> {
    T::try_from_slice(bytes).map_err(|e| StorageError::Decode {
        what: what.to_string(),
        reason: e.to_string(),
    })
}

fn log_key(height: Height) -> Vec<u8> {
    let mut key = LOG_PREFIX.to_vec();
    key.extend_from_slice(&height.to_be_bytes());
    key
}

fn proposal_key(key: &ProposalKey) -> Vec<u8> {
    let mut out = PROPOSAL_PREFIX.to_vec();
    out.push(key.0);
    out.extend_from_slice(&key.1);
    out
}

fn bundle_key(hash: &Hash) -> Vec<u8> {
    let mut key = BUNDLE_PREFIX.to_vec();
    key.extend_from_slice(hash);
    key
}

fn ctip_key(slot: SlotId) -> Vec<u8> {
    let mut key = CTIP_PREFIX.to_vec();
    key.push(slot);
    key
}

fn increment(prefix: &[u8]) -> Vec<u8> {
    crate::traits::increment_prefix(prefix).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::sqlite::SqliteStore;
    use crate::traits::KvStore;
    use scdb_types::bundle::{BundlePayout, BundleStatus};
    use scdb_types::primitives::OutPoint;
    use scdb_types::sidechain::{ProposalStatus, SidechainMetadata};

    fn make_store() -> (Arc<MemoryStore>, LedgerStore) {
        let backend = Arc::new(MemoryStore::new());
        let store = LedgerStore::new(backend.clone());
        (backend, store)
    }

    fn tip(height: Height) -> ChainTip {
        ChainTip {
            height,
            block_hash: [height as u8; 32],
        }
    }

    fn proposal(slot: SlotId, byte: u8) -> SidechainProposal {
        SidechainProposal {
            slot,
            proposal_hash: [byte; 32],
            metadata: SidechainMetadata {
                title: "Thunder".to_string(),
                description: "payments".to_string(),
                version: 1,
            },
            proposed_height: 100,
            deadline_height: 126,
            ack_count: 0,
            status: ProposalStatus::Proposed,
            resolved_height: None,
        }
    }

    fn bundle(slot: SlotId, byte: u8) -> WithdrawalBundle {
        WithdrawalBundle {
            slot,
            bundle_hash: [byte; 32],
            proposed_height: 200,
            deadline_height: 500,
            work_score: 0,
            payout: BundlePayout {
                outpoint: OutPoint::new([0xAB; 32], 1),
                amount: 50_000,
            },
            status: BundleStatus::Pending,
            resolved_height: None,
        }
    }

    fn record(height: Height, undo: StateDiff) -> CommitmentRecord {
        CommitmentRecord {
            height,
            block_hash: [height as u8; 32],
            state_root: [0xEE; 32],
            undo,
        }
    }

    #[test]
    fn test_schema_version_stamped_on_empty_store() {
        let (backend, store) = make_store();
        store.check_schema_version().unwrap();
        assert!(backend.exists(SCHEMA_VERSION_KEY).unwrap());
        store.check_schema_version().unwrap();
    }

    #[test]
    fn test_schema_version_mismatch() {
        let (backend, store) = make_store();
        backend
            .put(SCHEMA_VERSION_KEY, &borsh::to_vec(&99u32).unwrap())
            .unwrap();
        match store.check_schema_version() {
            Err(StorageError::SchemaMismatch { stored, expected }) => {
                assert_eq!(stored, 99);
                assert_eq!(expected, SCHEMA_VERSION);
            }
            other => panic!("expected SchemaMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_commit_then_load_image() {
        let (_backend, store) = make_store();
        let p = proposal(3, 0x11);
        let b = bundle(3, 0x22);
        let c = Ctip {
            slot: 3,
            outpoint: OutPoint::new([0x33; 32], 0),
            amount: 1_000,
        };
        let redo = StateDiff {
            tip: Some(tip(100)),
            proposals: vec![(p.key(), Some(p.clone()))],
            bundles: vec![(b.bundle_hash, Some(b.clone()))],
            ctips: vec![(3, Some(c))],
        };
        let undo = StateDiff {
            tip: None,
            proposals: vec![(p.key(), None)],
            bundles: vec![(b.bundle_hash, None)],
            ctips: vec![(3, None)],
        };
        store.commit_block(&record(100, undo), &redo).unwrap();

        let image = store.load_image().unwrap();
        assert_eq!(image.tip, Some(tip(100)));
        assert_eq!(image.proposals, vec![p]);
        assert_eq!(image.bundles, vec![b]);
        assert_eq!(image.ctips, vec![c]);
        assert_eq!(store.load_record(100).unwrap().unwrap().height, 100);
    }

    #[test]
    fn test_revert_restores_prior_state() {
        let (backend, store) = make_store();
        let p = proposal(3, 0x11);
        let mut acked = p.clone();
        acked.ack_count = 1;

        store
            .commit_block(
                &record(
                    100,
                    StateDiff {
                        tip: None,
                        proposals: vec![(p.key(), None)],
                        ..Default::default()
                    },
                ),
                &StateDiff {
                    tip: Some(tip(100)),
                    proposals: vec![(p.key(), Some(p.clone()))],
                    ..Default::default()
                },
            )
            .unwrap();
        let second = record(
            101,
            StateDiff {
                tip: Some(tip(100)),
                proposals: vec![(p.key(), Some(p.clone()))],
                ..Default::default()
            },
        );
        store
            .commit_block(
                &second,
                &StateDiff {
                    tip: Some(tip(101)),
                    proposals: vec![(p.key(), Some(acked))],
                    ..Default::default()
                },
            )
            .unwrap();

        store.revert_block(&second).unwrap();
        let image = store.load_image().unwrap();
        assert_eq!(image.tip, Some(tip(100)));
        assert_eq!(image.proposals, vec![p]);
        assert!(store.load_record(101).unwrap().is_none());
        assert!(!backend.exists(&log_key(101)).unwrap());
    }

    #[test]
    fn test_revert_blocks_in_one_batch() {
        let (_backend, store) = make_store();
        let c = |h: Height| Ctip {
            slot: 1,
            outpoint: OutPoint::new([h as u8; 32], 0),
            amount: h,
        };
        let mut records = Vec::new();
        let mut prior: Option<Ctip> = None;
        let mut prior_tip: Option<ChainTip> = None;
        for h in 1..=3 {
            let rec = record(
                h,
                StateDiff {
                    tip: prior_tip,
                    ctips: vec![(1, prior)],
                    ..Default::default()
                },
            );
            let redo = StateDiff {
                tip: Some(tip(h)),
                ctips: vec![(1, Some(c(h)))],
                ..Default::default()
            };
            store.commit_block(&rec, &redo).unwrap();
            records.push(rec);
            prior = Some(c(h));
            prior_tip = Some(tip(h));
        }

        // Newest first, down to height 2.
        let newest_first: Vec<CommitmentRecord> = records[1..].iter().rev().cloned().collect();
        store.revert_blocks(&newest_first).unwrap();

        let image = store.load_image().unwrap();
        assert_eq!(image.tip, Some(tip(1)));
        assert_eq!(image.ctips, vec![c(1)]);
        assert_eq!(store.load_records(0, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_load_records_range_and_recent() {
        let (_backend, store) = make_store();
        for h in 10..20 {
            let redo = StateDiff {
                tip: Some(tip(h)),
                ..Default::default()
            };
            store
                .commit_block(&record(h, StateDiff::default()), &redo)
                .unwrap();
        }

        let heights: Vec<Height> = store
            .load_records(12, 14)
            .unwrap()
            .iter()
            .map(|r| r.height)
            .collect();
        assert_eq!(heights, vec![12, 13, 14]);
        assert!(store.load_records(15, 12).unwrap().is_empty());

        let recent: Vec<Height> = store
            .load_recent_records(3)
            .unwrap()
            .iter()
            .map(|r| r.height)
            .collect();
        assert_eq!(recent, vec![17, 18, 19]);
        assert_eq!(store.load_recent_records(100).unwrap().len(), 10);
    }

    #[test]
    fn test_import_image_replaces_everything() {
        let (_backend, store) = make_store();
        let old = proposal(1, 0x01);
        store
            .commit_block(
                &record(5, StateDiff::default()),
                &StateDiff {
                    tip: Some(tip(5)),
                    proposals: vec![(old.key(), Some(old))],
                    ..Default::default()
                },
            )
            .unwrap();

        let image = LedgerImage {
            tip: Some(tip(900)),
            proposals: vec![proposal(7, 0x07)],
            bundles: vec![bundle(7, 0x08)],
            ctips: Vec::new(),
        };
        store.import_image(&image).unwrap();

        assert_eq!(store.load_image().unwrap(), image);
        assert!(store.load_record(5).unwrap().is_none());
        store.check_schema_version().unwrap();
    }

    #[test]
    fn test_persists_across_reopen_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        let path = path.to_str().unwrap().to_string();
        let p = proposal(2, 0x44);
        {
            let store = LedgerStore::new(Arc::new(SqliteStore::new(&path).unwrap()));
            store.check_schema_version().unwrap();
            store
                .commit_block(
                    &record(42, StateDiff::default()),
                    &StateDiff {
                        tip: Some(tip(42)),
                        proposals: vec![(p.key(), Some(p.clone()))],
                        ..Default::default()
                    },
                )
                .unwrap();
        }
        let store = LedgerStore::new(Arc::new(SqliteStore::new(&path).unwrap()));
        store.check_schema_version().unwrap();
        let image = store.load_image().unwrap();
        assert_eq!(image.tip, Some(tip(42)));
        assert_eq!(image.proposals, vec![p]);
    }
}
