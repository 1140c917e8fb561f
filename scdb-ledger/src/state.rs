use std::collections::BTreeMap;

use scdb_crypto::hash::DomainHasher;
use scdb_crypto::merkle::{MerkleProof, StateTree};
use scdb_types::bundle::WithdrawalBundle;
use scdb_types::constants::{BUNDLE_LEAF_DOMAIN, CTIP_LEAF_DOMAIN};
use scdb_types::ctip::Ctip;
use scdb_types::params::ConsensusParams;
use scdb_types::primitives::{ChainTip, Hash, Height, SlotId};
use scdb_types::record::{LedgerImage, StateDiff};
use scdb_types::vote::{Commitment, VoteTarget};

use crate::bundles::{VoteRound, WithdrawalBundleLedger};
use crate::ctip::CtipStore;
use crate::error::LedgerError;
use crate::registry::SidechainRegistry;

/// Everything the ledger tracks, as of `tip`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerState {
    pub registry: SidechainRegistry,
    pub bundles: WithdrawalBundleLedger,
    pub ctips: CtipStore,
    pub tip: Option<ChainTip>,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one decoded commitment to the registry or the bundle ledger.
    pub fn apply_commitment(
        &mut self,
        commitment: Commitment,
        height: Height,
        round: &mut VoteRound,
        params: &ConsensusParams,
    ) -> Result<(), LedgerError> {
        match commitment {
            Commitment::ProposeSidechain {
                slot,
                proposal_hash,
                metadata,
            } => self
                .registry
                .propose(slot, proposal_hash, metadata, height, params),
            Commitment::ProposeBundle {
                slot,
                bundle_hash,
                payout,
            } => self
                .bundles
                .propose(slot, bundle_hash, payout, height, &self.registry, params),
            Commitment::Vote(vote) => match vote.target {
                VoteTarget::Sidechain {
                    slot,
                    proposal_hash,
                } => self
                    .registry
                    .apply_vote(slot, proposal_hash, vote.kind, vote.height),
                VoteTarget::Bundle { slot, bundle_hash } => {
                    self.bundles
                        .apply_vote(round, slot, bundle_hash, vote.kind, params)
                }
            },
        }
    }

    // ── State root ─────────────────────────────────────────────────────

    /// Leaves of the state tree: CTIPs by ascending slot, then Pending bundles
    /// by ascending hash.
    fn leaves(&self) -> Vec<Hash> {
        self.ctips
            .iter()
            .map(ctip_leaf)
            .chain(self.bundles.pending().map(bundle_leaf))
            .collect()
    }

    pub fn state_tree(&self) -> StateTree {
        StateTree::new(self.leaves())
    }

    /// Digest over the CTIPs and the Pending bundle scores.
    pub fn state_root(&self) -> Hash {
        self.state_tree().root()
    }

    /// Inclusion proof for the CTIP of `slot`.
    pub fn prove_ctip(&self, slot: SlotId) -> Option<MerkleProof> {
        let index = self.ctips.iter().position(|c| c.slot == slot)?;
        self.state_tree().prove(index).ok()
    }

    /// Inclusion proof for a Pending bundle's score.
    pub fn prove_bundle(&self, bundle_hash: &Hash) -> Option<MerkleProof> {
        let offset = self.ctips.len();
        let index = self
            .bundles
            .pending()
            .position(|b| &b.bundle_hash == bundle_hash)?;
        self.state_tree().prove(offset + index).ok()
    }

    // ── Diffs ──────────────────────────────────────────────────────────

    /// Compare with a later state. Returns `(undo, redo)`: prior values of every
    /// changed entry, and the values `after` holds for them.
    pub fn diff(&self, after: &LedgerState) -> (StateDiff, StateDiff) {
        let mut undo = StateDiff {
            tip: self.tip,
            ..StateDiff::default()
        };
        let mut redo = StateDiff {
            tip: after.tip,
            ..StateDiff::default()
        };
        diff_maps(
            self.registry.entries(),
            after.registry.entries(),
            &mut undo.proposals,
            &mut redo.proposals,
        );
        diff_maps(
            self.bundles.entries(),
            after.bundles.entries(),
            &mut undo.bundles,
            &mut redo.bundles,
        );
        diff_maps(
            self.ctips.entries(),
            after.ctips.entries(),
            &mut undo.ctips,
            &mut redo.ctips,
        );
        (undo, redo)
    }

    /// Write every entry of `diff`, including the tip.
    pub fn apply_diff(&mut self, diff: &StateDiff) {
        for (key, value) in &diff.proposals {
            self.registry.set_entry(*key, value.clone());
        }
        for (hash, value) in &diff.bundles {
            self.bundles.set_entry(*hash, value.clone());
        }
        for (slot, value) in &diff.ctips {
            self.ctips.set_entry(*slot, *value);
        }
        self.tip = diff.tip;
    }

    // ── Images ─────────────────────────────────────────────────────────

    pub fn to_image(&self) -> LedgerImage {
        LedgerImage {
            tip: self.tip,
            proposals: self.registry.iter().cloned().collect(),
            bundles: self.bundles.iter().cloned().collect(),
            ctips: self.ctips.iter().copied().collect(),
        }
    }

    pub fn from_image(image: &LedgerImage) -> Self {
        let mut state = LedgerState::new();
        for p in &image.proposals {
            state.registry.set_entry(p.key(), Some(p.clone()));
        }
        for b in &image.bundles {
            state.bundles.set_entry(b.bundle_hash, Some(b.clone()));
        }
        for c in &image.ctips {
            state.ctips.set_entry(c.slot, Some(*c));
        }
        state.tip = image.tip;
        state
    }
}

fn diff_maps<K: Ord + Copy, V: Clone + PartialEq>(
    before: &BTreeMap<K, V>,
    after: &BTreeMap<K, V>,
    undo: &mut Vec<(K, Option<V>)>,
    redo: &mut Vec<(K, Option<V>)>,
) {
    for (key, old) in before {
        match after.get(key) {
            Some(new) if new == old => {}
            new => {
                undo.push((*key, Some(old.clone())));
                redo.push((*key, new.cloned()));
            }
        }
    }
    for (key, new) in after {
        if !before.contains_key(key) {
            undo.push((*key, None));
            redo.push((*key, Some(new.clone())));
        }
    }
}

/// Canonical leaf for a CTIP: slot, txid, vout (LE), amount (LE).
pub fn ctip_leaf(ctip: &Ctip) -> Hash {
    DomainHasher::new(CTIP_LEAF_DOMAIN)
        .byte(ctip.slot)
        .bytes(&ctip.outpoint.txid)
        .u32_le(ctip.outpoint.vout)
        .u64_le(ctip.amount)
        .finish()
}

/// Canonical leaf for a Pending bundle: slot, hash, work score (LE).
pub fn bundle_leaf(bundle: &WithdrawalBundle) -> Hash {
    DomainHasher::new(BUNDLE_LEAF_DOMAIN)
        .byte(bundle.slot)
        .bytes(&bundle.bundle_hash)
        .u16_le(bundle.work_score)
        .finish()
}
