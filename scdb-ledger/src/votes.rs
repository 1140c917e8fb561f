use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use scdb_types::primitives::Hash;
use scdb_types::sidechain::ProposalStatus;
use scdb_types::vote::{Vote, VoteKind, VoteTarget};

use crate::codec;
use crate::error::LedgerError;
use crate::state::LedgerState;

#[derive(Debug, Default)]
struct VoteIntent {
    acks: BTreeSet<Hash>,
    /// Bundle hash -> vote.
    custom: BTreeMap<Hash, Vote>,
}

/// This operator's voting intent for the blocks it will produce.
///
/// Purely local: nothing here touches consensus state. Clones share the same cache.
#[derive(Debug, Clone, Default)]
pub struct LocalVoteCache {
    inner: Arc<RwLock<VoteIntent>>,
}

impl LocalVoteCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, VoteIntent> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, VoteIntent> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Remember to ack a sidechain proposal. Returns false if already cached.
    pub fn cache_local_ack(&self, proposal_hash: Hash) -> bool {
        self.write().acks.insert(proposal_hash)
    }

    /// Forget an ack intent. Returns false if it was not cached.
    pub fn remove_local_ack(&self, proposal_hash: &Hash) -> bool {
        self.write().acks.remove(proposal_hash)
    }

    pub fn local_acks(&self) -> Vec<Hash> {
        self.read().acks.iter().copied().collect()
    }

    /// Remember a bundle vote, replacing any earlier intent for the same bundle.
    pub fn cache_custom_vote(&self, vote: Vote) -> Result<(), LedgerError> {
        let bundle_hash = match vote.target {
            VoteTarget::Bundle { bundle_hash, .. } => bundle_hash,
            VoteTarget::Sidechain { .. } => {
                return Err(LedgerError::rejected(
                    "custom votes target withdrawal bundles",
                ))
            }
        };
        if !matches!(
            vote.kind,
            VoteKind::Upvote | VoteKind::Downvote | VoteKind::Abstain
        ) {
            return Err(LedgerError::rejected(format!(
                "{:?} is not a bundle vote",
                vote.kind
            )));
        }
        self.write().custom.insert(bundle_hash, vote);
        Ok(())
    }

    pub fn remove_custom_vote(&self, bundle_hash: &Hash) -> bool {
        self.write().custom.remove(bundle_hash).is_some()
    }

    pub fn custom_votes(&self) -> Vec<Vote> {
        self.read().custom.values().copied().collect()
    }

    /// Payloads this node would embed in its next block, given `state`: an Ack
    /// for every cached hash still Proposed in some slot, then each custom vote
    /// whose bundle is still Pending.
    pub fn build_vote_commitments(
        &self,
        state: &LedgerState,
    ) -> Result<Vec<Vec<u8>>, LedgerError> {
        let intent = self.read();
        let mut payloads = Vec::new();

        for p in state.registry.iter() {
            if p.status == ProposalStatus::Proposed && intent.acks.contains(&p.proposal_hash) {
                payloads.push(codec::encode_ack(p.slot, &p.proposal_hash, VoteKind::Ack)?);
            }
        }
        for vote in intent.custom.values() {
            let (slot, bundle_hash) = (vote.target.slot(), vote.target.hash());
            let pending = state
                .bundles
                .get(&bundle_hash)
                .is_some_and(|b| b.is_pending() && b.slot == slot);
            if pending {
                payloads.push(codec::encode_bundle_vote(slot, &bundle_hash, vote.kind)?);
            }
        }
        Ok(payloads)
    }
}
