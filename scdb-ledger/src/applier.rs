use std::sync::{Arc, RwLock, RwLockWriteGuard};

use tokio::sync::broadcast;

use scdb_storage::ledger_store::LedgerStore;
use scdb_types::params::ConsensusParams;
use scdb_types::primitives::{ChainTip, Height};
use scdb_types::record::{CommitmentRecord, LedgerImage};
use scdb_types::vote::BlockCommitments;

use crate::bundles::VoteRound;
use crate::codec;
use crate::error::LedgerError;
use crate::events::{LedgerEvent, Transition};
use crate::history::CommitmentHistory;
use crate::reader::{read_shared, Published, Shared, StateReader};
use crate::state::LedgerState;
use crate::votes::LocalVoteCache;

/// Capacity of the ledger event channel. Slow subscribers lag and skip events.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Outcome of a successfully applied block.
#[derive(Debug, Clone)]
pub struct BlockReceipt {
    pub record: CommitmentRecord,
    pub transitions: Vec<Transition>,
    /// Commitments that took effect.
    pub applied: usize,
    /// Commitments dropped as locally recoverable.
    pub dropped: usize,
}

/// The single writer of the ledger.
///
/// Each block is applied to a private copy of the latest state and published
/// with one pointer swap, so readers only ever see whole blocks. With a store
/// attached, every block is persisted in one batch before it is published.
pub struct ConsensusApplier {
    params: ConsensusParams,
    shared: Shared,
    store: Option<Arc<LedgerStore>>,
    events: broadcast::Sender<LedgerEvent>,
    votes: LocalVoteCache,
}

impl ConsensusApplier {
    /// An empty, memory-only ledger.
    pub fn new(params: ConsensusParams) -> Self {
        let history = CommitmentHistory::new(params.max_undo_depth);
        Self::assemble(params, LedgerState::new(), history, None)
    }

    /// Open a ledger backed by `store`, restoring the latest state and up to
    /// `max_undo_depth` records of undo history.
    pub fn with_store(params: ConsensusParams, store: LedgerStore) -> Result<Self, LedgerError> {
        store.check_schema_version()?;
        let image = store.load_image()?;
        let state = LedgerState::from_image(&image);
        let records = store.load_recent_records(params.max_undo_depth)?;
        let mut history = CommitmentHistory::from_records(records, params.max_undo_depth);

        let tip_height = state.tip.map(|t| t.height);
        if history.latest().map(|r| r.height) != tip_height {
            if !history.is_empty() {
                tracing::warn!(
                    tip = ?tip_height,
                    "persisted log does not end at the tip; starting with empty undo history"
                );
            }
            history = CommitmentHistory::new(params.max_undo_depth);
        } else if let Some(latest) = history.latest() {
            let computed = state.state_root();
            if latest.state_root != computed {
                tracing::error!(
                    height = latest.height,
                    logged = %hex::encode(latest.state_root),
                    computed = %hex::encode(computed),
                    "persisted state does not match the logged state root; resync from a checkpoint"
                );
                return Err(LedgerError::ConsensusMismatch {
                    height: latest.height,
                    declared: latest.state_root,
                    computed,
                });
            }
        }

        tracing::info!(
            tip = ?tip_height,
            proposals = state.registry.len(),
            bundles = state.bundles.len(),
            undo_records = history.len(),
            "restored ledger from store"
        );
        Ok(Self::assemble(params, state, history, Some(Arc::new(store))))
    }

    /// Seed `store` with a checkpoint image, discarding whatever it held, and
    /// open a ledger on it. The ledger starts with an empty undo history.
    pub fn from_checkpoint(
        params: ConsensusParams,
        store: LedgerStore,
        image: &LedgerImage,
    ) -> Result<Self, LedgerError> {
        store.import_image(image)?;
        tracing::info!(
            tip = ?image.tip.map(|t| t.height),
            "imported ledger checkpoint"
        );
        Self::with_store(params, store)
    }

    fn assemble(
        params: ConsensusParams,
        state: LedgerState,
        history: CommitmentHistory,
        store: Option<Arc<LedgerStore>>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            params,
            shared: Arc::new(RwLock::new(Published {
                state: Arc::new(state),
                history,
            })),
            store,
            events,
            votes: LocalVoteCache::new(),
        }
    }

    /// A read handle sharing this ledger's published state, events and vote cache.
    pub fn reader(&self) -> StateReader {
        StateReader::new(
            self.shared.clone(),
            self.events.clone(),
            self.votes.clone(),
            self.store.clone(),
        )
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    pub fn tip(&self) -> Option<ChainTip> {
        read_shared(&self.shared).state.tip
    }

    fn snapshot(&self) -> Arc<LedgerState> {
        read_shared(&self.shared).state.clone()
    }

    fn write(&self) -> RwLockWriteGuard<'_, Published> {
        self.shared.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply one block: decode its commitments, apply them in declared order,
    /// resolve proposals and bundles, then check the state root.
    ///
    /// All or nothing: on error nothing is persisted or published.
    pub fn apply_block(&mut self, block: &BlockCommitments) -> Result<BlockReceipt, LedgerError> {
        let height = block.height;
        let before = self.snapshot();
        if let Some(tip) = before.tip {
            let expected = tip.height.saturating_add(1);
            if height != expected {
                tracing::warn!(expected, got = height, "rejecting block: height mismatch");
                return Err(LedgerError::HeightMismatch {
                    expected,
                    got: height,
                });
            }
        }

        let mut state = (*before).clone();
        let mut round = VoteRound::new();
        let mut applied = 0;
        let mut dropped = 0;
        let decoded = codec::decode_block(&block.payloads, height, &self.params);
        for (index, commitment) in decoded.into_iter().enumerate() {
            let result = commitment
                .and_then(|c| state.apply_commitment(c, height, &mut round, &self.params));
            match result {
                Ok(()) => applied += 1,
                Err(e) if e.is_recoverable() => {
                    dropped += 1;
                    tracing::debug!(height, index, error = %e, "dropped commitment");
                }
                Err(e) => return Err(e),
            }
        }

        let mut transitions = state.registry.advance(height, &self.params);
        transitions.extend(state.bundles.advance(height, &mut state.ctips, &self.params));

        let state_root = state.state_root();
        if let Some(declared) = block.declared_root {
            if declared != state_root {
                tracing::warn!(
                    height,
                    declared = %hex::encode(declared),
                    computed = %hex::encode(state_root),
                    "rejecting block: state root mismatch"
                );
                return Err(LedgerError::ConsensusMismatch {
                    height,
                    declared,
                    computed: state_root,
                });
            }
        }

        state.tip = Some(ChainTip {
            height,
            block_hash: block.block_hash,
        });
        let (undo, redo) = before.diff(&state);
        let record = CommitmentRecord {
            height,
            block_hash: block.block_hash,
            state_root,
            undo,
        };
        if let Some(store) = &self.store {
            store.commit_block(&record, &redo)?;
        }

        let pruned = {
            let mut published = self.write();
            let pruned = published.history.append(record.clone());
            published.state = Arc::new(state);
            pruned
        };
        if pruned > 0 {
            tracing::debug!(height, pruned, "pruned undo history");
        }

        let _ = self.events.send(LedgerEvent::BlockConnected {
            height,
            block_hash: block.block_hash,
            state_root,
            transitions: transitions.clone(),
        });
        tracing::info!(
            height,
            hash = %hex::encode(block.block_hash),
            root = %hex::encode(state_root),
            applied,
            dropped,
            transitions = transitions.len(),
            "connected block"
        );

        Ok(BlockReceipt {
            record,
            transitions,
            applied,
            dropped,
        })
    }

    /// Disconnect the tip block, restoring the exact state before it.
    pub fn disconnect_block(&mut self, height: Height) -> Result<CommitmentRecord, LedgerError> {
        let tip = self.tip().ok_or(LedgerError::ReorgDepthExceeded {
            height,
            oldest: None,
        })?;
        if tip.height != height {
            return Err(LedgerError::HeightMismatch {
                expected: tip.height,
                got: height,
            });
        }

        let popped = match height.checked_sub(1) {
            Some(to_height) => self.rollback_with(|h, s| h.rollback(to_height, s))?,
            None => self.rollback_with(|h, s| h.rollback_all(s))?,
        };
        popped
            .into_iter()
            .next()
            .ok_or(LedgerError::ReorgDepthExceeded {
                height,
                oldest: None,
            })
    }

    /// Disconnect every block above `to_height`. Returns the removed records,
    /// newest first.
    pub fn rollback_to(&mut self, to_height: Height) -> Result<Vec<CommitmentRecord>, LedgerError> {
        self.rollback_with(|h, s| h.rollback(to_height, s))
    }

    fn rollback_with<F>(&mut self, rollback: F) -> Result<Vec<CommitmentRecord>, LedgerError>
    where
        F: FnOnce(
            &mut CommitmentHistory,
            &mut LedgerState,
        ) -> Result<Vec<CommitmentRecord>, LedgerError>,
    {
        let (current, mut history) = {
            let published = read_shared(&self.shared);
            (published.state.clone(), published.history.clone())
        };
        let mut state = (*current).clone();
        let popped = rollback(&mut history, &mut state)?;
        if popped.is_empty() {
            return Ok(popped);
        }

        if let Some(store) = &self.store {
            store.revert_blocks(&popped)?;
        }
        {
            let mut published = self.write();
            published.state = Arc::new(state);
            published.history = history;
        }

        for record in &popped {
            let _ = self.events.send(LedgerEvent::BlockDisconnected {
                height: record.height,
                block_hash: record.block_hash,
            });
            tracing::info!(
                height = record.height,
                hash = %hex::encode(record.block_hash),
                "disconnected block"
            );
        }
        Ok(popped)
    }
}
