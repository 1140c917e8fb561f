use std::sync::{Arc, RwLock, RwLockReadGuard};

use tokio::sync::broadcast;

use scdb_crypto::merkle::MerkleProof;
use scdb_storage::ledger_store::LedgerStore;
use scdb_types::bundle::WithdrawalBundle;
use scdb_types::ctip::Ctip;
use scdb_types::primitives::{ChainTip, Hash, Height, SlotId};
use scdb_types::record::{CommitmentRecord, LedgerImage};
use scdb_types::sidechain::SidechainProposal;

use crate::error::LedgerError;
use crate::events::LedgerEvent;
use crate::history::CommitmentHistory;
use crate::state::LedgerState;
use crate::votes::LocalVoteCache;

/// The latest fully applied state and its history, swapped as a unit by the applier.
#[derive(Debug)]
pub(crate) struct Published {
    pub(crate) state: Arc<LedgerState>,
    pub(crate) history: CommitmentHistory,
}

pub(crate) type Shared = Arc<RwLock<Published>>;

pub(crate) fn read_shared(shared: &Shared) -> RwLockReadGuard<'_, Published> {
    shared.read().unwrap_or_else(|e| e.into_inner())
}

/// Read-only view of the ledger for RPC and other out-of-band callers.
///
/// Every query works on one immutable snapshot, so a reader never observes a
/// partially applied block. Cheap to clone.
#[derive(Clone)]
pub struct StateReader {
    shared: Shared,
    events: broadcast::Sender<LedgerEvent>,
    votes: LocalVoteCache,
    store: Option<Arc<LedgerStore>>,
}

impl StateReader {
    pub(crate) fn new(
        shared: Shared,
        events: broadcast::Sender<LedgerEvent>,
        votes: LocalVoteCache,
        store: Option<Arc<LedgerStore>>,
    ) -> Self {
        Self {
            shared,
            events,
            votes,
            store,
        }
    }

    /// The latest committed state.
    pub fn snapshot(&self) -> Arc<LedgerState> {
        read_shared(&self.shared).state.clone()
    }

    pub fn tip(&self) -> Option<ChainTip> {
        self.snapshot().tip
    }

    pub fn state_root(&self) -> Hash {
        self.snapshot().state_root()
    }

    /// Active sidechains in slot order.
    pub fn active_sidechains(&self) -> Vec<SidechainProposal> {
        self.snapshot()
            .registry
            .active_sidechains()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Every tracked proposal, optionally restricted to one slot.
    pub fn proposals(&self, slot: Option<SlotId>) -> Vec<SidechainProposal> {
        self.snapshot()
            .registry
            .iter()
            .filter(|p| slot.map_or(true, |s| s == p.slot))
            .cloned()
            .collect()
    }

    pub fn ctip(&self, slot: SlotId) -> Option<Ctip> {
        self.snapshot().ctips.get(slot).copied()
    }

    pub fn ctips(&self) -> Vec<Ctip> {
        self.snapshot().ctips.iter().copied().collect()
    }

    pub fn pending_bundles(&self, slot: SlotId) -> Vec<WithdrawalBundle> {
        self.snapshot()
            .bundles
            .pending_in_slot(slot)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn bundle(&self, bundle_hash: &Hash) -> Option<WithdrawalBundle> {
        self.snapshot().bundles.get(bundle_hash).cloned()
    }

    /// Commitment records with `from <= height <= to`. Heights pruned from the
    /// in-memory history are read from the persisted log when one is attached.
    pub fn commitment_history(
        &self,
        from: Height,
        to: Height,
    ) -> Result<Vec<CommitmentRecord>, LedgerError> {
        if from > to {
            return Ok(Vec::new());
        }
        let (recent, oldest) = {
            let published = read_shared(&self.shared);
            (
                published.history.range(from, to),
                published.history.oldest_height(),
            )
        };
        match (&self.store, oldest) {
            (Some(store), Some(oldest)) if from < oldest => {
                let mut records = store.load_records(from, to.min(oldest - 1))?;
                records.extend(recent);
                Ok(records)
            }
            (Some(store), None) => Ok(store.load_records(from, to)?),
            _ => Ok(recent),
        }
    }

    /// Oldest height a rollback can still undo.
    pub fn oldest_undo_height(&self) -> Option<Height> {
        read_shared(&self.shared).history.oldest_height()
    }

    /// Root and inclusion proof of a slot's CTIP.
    pub fn ctip_proof(&self, slot: SlotId) -> Option<(Hash, MerkleProof)> {
        let state = self.snapshot();
        let proof = state.prove_ctip(slot)?;
        Some((state.state_root(), proof))
    }

    /// Root and inclusion proof of a Pending bundle's score.
    pub fn bundle_proof(&self, bundle_hash: &Hash) -> Option<(Hash, MerkleProof)> {
        let state = self.snapshot();
        let proof = state.prove_bundle(bundle_hash)?;
        Some((state.state_root(), proof))
    }

    /// Receive a [`LedgerEvent`] for every connected and disconnected block.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    pub fn votes(&self) -> &LocalVoteCache {
        &self.votes
    }

    /// Vote payloads for the next block, built from the cached intent.
    pub fn vote_commitments(&self) -> Result<Vec<Vec<u8>>, LedgerError> {
        self.votes.build_vote_commitments(&self.snapshot())
    }

    /// Full image of the latest state, used for checkpoints.
    pub fn image(&self) -> LedgerImage {
        self.snapshot().to_image()
    }
}
