use std::collections::{BTreeMap, HashSet};

use scdb_types::bundle::{BundlePayout, BundleStatus, WithdrawalBundle};
use scdb_types::params::ConsensusParams;
use scdb_types::primitives::{Hash, Height, SlotId};
use scdb_types::vote::VoteKind;

use crate::ctip::CtipStore;
use crate::error::LedgerError;
use crate::events::{BundleFailure, Transition};
use crate::registry::SidechainRegistry;

/// Per-block vote bookkeeping. A bundle's score moves at most once per block
/// and each slot takes at most one Upvote per block.
#[derive(Debug, Default)]
pub struct VoteRound {
    touched: HashSet<Hash>,
    upvoted_slots: HashSet<SlotId>,
}

impl VoteRound {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_touched(&self, bundle_hash: &Hash) -> bool {
        self.touched.contains(bundle_hash)
    }
}

/// Withdrawal bundles and their work scores, keyed by bundle hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WithdrawalBundleLedger {
    bundles: BTreeMap<Hash, WithdrawalBundle>,
}

impl WithdrawalBundleLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a bundle for an Active slot with a zero score.
    pub fn propose(
        &mut self,
        slot: SlotId,
        bundle_hash: Hash,
        payout: BundlePayout,
        height: Height,
        registry: &SidechainRegistry,
        params: &ConsensusParams,
    ) -> Result<(), LedgerError> {
        if !registry.is_slot_active(slot) {
            return Err(LedgerError::UnknownSidechainReference {
                slot,
                hash: bundle_hash,
            });
        }
        if self.bundles.contains_key(&bundle_hash) {
            return Err(LedgerError::DuplicateProposal {
                slot,
                hash: bundle_hash,
            });
        }

        let bundle = WithdrawalBundle {
            slot,
            bundle_hash,
            proposed_height: height,
            deadline_height: height.saturating_add(params.bundle_window),
            work_score: 0,
            payout,
            status: BundleStatus::Pending,
            resolved_height: None,
        };
        tracing::debug!(
            slot,
            hash = %hex::encode(bundle_hash),
            payout = %payout.outpoint,
            deadline = bundle.deadline_height,
            "withdrawal bundle proposed"
        );
        self.bundles.insert(bundle_hash, bundle);
        Ok(())
    }

    /// Apply one Upvote, Downvote or Abstain.
    ///
    /// An Upvote raises its target and lowers every other untouched Pending
    /// bundle of the slot, so competing bundles never progress together.
    pub fn apply_vote(
        &mut self,
        round: &mut VoteRound,
        slot: SlotId,
        bundle_hash: Hash,
        kind: VoteKind,
        params: &ConsensusParams,
    ) -> Result<(), LedgerError> {
        let bundle = match self.bundles.get(&bundle_hash) {
            Some(b) if b.slot == slot => b,
            _ => {
                return Err(LedgerError::UnknownSidechainReference {
                    slot,
                    hash: bundle_hash,
                })
            }
        };
        if !bundle.is_pending() {
            return Err(LedgerError::rejected(format!(
                "bundle is {}",
                bundle.status.as_str()
            )));
        }
        if round.touched.contains(&bundle_hash) {
            return Err(LedgerError::rejected("bundle score already moved this block"));
        }

        match kind {
            VoteKind::Abstain => Ok(()),
            VoteKind::Downvote => {
                if let Some(b) = self.bundles.get_mut(&bundle_hash) {
                    b.work_score = b.work_score.saturating_sub(1);
                }
                round.touched.insert(bundle_hash);
                Ok(())
            }
            VoteKind::Upvote => {
                if !round.upvoted_slots.insert(slot) {
                    return Err(LedgerError::rejected(format!(
                        "slot {} already upvoted this block",
                        slot
                    )));
                }
                for b in self.bundles.values_mut() {
                    if b.slot != slot || !b.is_pending() || round.touched.contains(&b.bundle_hash)
                    {
                        continue;
                    }
                    if b.bundle_hash == bundle_hash {
                        b.work_score = b.work_score.saturating_add(1).min(params.max_work_score);
                    } else {
                        b.work_score = b.work_score.saturating_sub(1);
                    }
                    round.touched.insert(b.bundle_hash);
                }
                Ok(())
            }
            VoteKind::Ack | VoteKind::Nack => {
                Err(LedgerError::rejected("sidechain vote on a withdrawal bundle"))
            }
        }
    }

    /// Resolve bundles at the end of a block. A bundle at the maturity threshold
    /// succeeds and moves the slot's CTIP to its payout; the other Pending
    /// bundles of that slot fail. Bundles whose deadline is reached fail.
    pub fn advance(
        &mut self,
        height: Height,
        ctips: &mut CtipStore,
        params: &ConsensusParams,
    ) -> Vec<Transition> {
        let mut transitions = Vec::new();

        // Winner per slot: highest score, then earliest proposal, then lowest hash.
        let mut winners: BTreeMap<SlotId, &WithdrawalBundle> = BTreeMap::new();
        for b in self.bundles.values() {
            if !b.is_pending() || b.work_score < params.maturity_threshold {
                continue;
            }
            let better = match winners.get(&b.slot) {
                None => true,
                Some(best) => {
                    (std::cmp::Reverse(b.work_score), b.proposed_height, b.bundle_hash)
                        < (
                            std::cmp::Reverse(best.work_score),
                            best.proposed_height,
                            best.bundle_hash,
                        )
                }
            };
            if better {
                winners.insert(b.slot, b);
            }
        }
        let winners: BTreeMap<SlotId, Hash> = winners
            .into_iter()
            .map(|(slot, b)| (slot, b.bundle_hash))
            .collect();

        for b in self.bundles.values_mut() {
            if !b.is_pending() {
                continue;
            }
            let outcome = match winners.get(&b.slot) {
                Some(winner) if *winner == b.bundle_hash => Some(None),
                Some(_) => Some(Some(BundleFailure::Superseded)),
                None if height >= b.deadline_height => Some(Some(BundleFailure::Expired)),
                None => None,
            };
            match outcome {
                None => {}
                Some(None) => {
                    b.status = BundleStatus::Succeeded;
                    b.resolved_height = Some(height);
                    ctips.update(b.slot, b.payout.outpoint, b.payout.amount);
                    tracing::info!(
                        slot = b.slot,
                        hash = %hex::encode(b.bundle_hash),
                        score = b.work_score,
                        ctip = %b.payout.outpoint,
                        height,
                        "withdrawal bundle succeeded"
                    );
                    transitions.push(Transition::BundleSucceeded {
                        slot: b.slot,
                        bundle_hash: b.bundle_hash,
                        outpoint: b.payout.outpoint,
                        amount: b.payout.amount,
                    });
                }
                Some(Some(reason)) => {
                    b.status = BundleStatus::Failed;
                    b.resolved_height = Some(height);
                    tracing::info!(
                        slot = b.slot,
                        hash = %hex::encode(b.bundle_hash),
                        score = b.work_score,
                        ?reason,
                        height,
                        "withdrawal bundle failed"
                    );
                    transitions.push(Transition::BundleFailed {
                        slot: b.slot,
                        bundle_hash: b.bundle_hash,
                        reason,
                    });
                }
            }
        }

        transitions
    }

    pub fn get(&self, bundle_hash: &Hash) -> Option<&WithdrawalBundle> {
        self.bundles.get(bundle_hash)
    }

    /// Pending bundles of `slot` in ascending hash order.
    pub fn pending_in_slot(&self, slot: SlotId) -> Vec<&WithdrawalBundle> {
        self.bundles
            .values()
            .filter(|b| b.slot == slot && b.is_pending())
            .collect()
    }

    /// All Pending bundles in ascending hash order.
    pub fn pending(&self) -> impl Iterator<Item = &WithdrawalBundle> {
        self.bundles.values().filter(|b| b.is_pending())
    }

    pub fn iter(&self) -> impl Iterator<Item = &WithdrawalBundle> {
        self.bundles.values()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub(crate) fn entries(&self) -> &BTreeMap<Hash, WithdrawalBundle> {
        &self.bundles
    }

    pub(crate) fn set_entry(&mut self, bundle_hash: Hash, bundle: Option<WithdrawalBundle>) {
        match bundle {
            Some(b) => {
                self.bundles.insert(bundle_hash, b);
            }
            None => {
                self.bundles.remove(&bundle_hash);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scdb_types::primitives::OutPoint;
    use scdb_types::sidechain::SidechainMetadata;

    fn params() -> ConsensusParams {
        ConsensusParams::default()
    }

    fn active_registry(slot: SlotId) -> SidechainRegistry {
        let mut reg = SidechainRegistry::new();
        let md = SidechainMetadata {
            title: "sc".to_string(),
            description: String::new(),
            version: 1,
        };
        reg.propose(slot, [0xAA; 32], md, 1, &params()).unwrap();
        for _ in 0..13 {
            reg.apply_vote(slot, [0xAA; 32], VoteKind::Ack, 1).unwrap();
        }
        reg.advance(1, &params());
        reg
    }

    fn payout(byte: u8) -> BundlePayout {
        BundlePayout {
            outpoint: OutPoint::new([byte; 32], 0),
            amount: 10_000,
        }
    }

    fn vote(ledger: &mut WithdrawalBundleLedger, slot: SlotId, hash: Hash, kind: VoteKind) {
        let mut round = VoteRound::new();
        ledger
            .apply_vote(&mut round, slot, hash, kind, &params())
            .unwrap();
    }

    #[test]
    fn test_propose_requires_active_slot() {
        let reg = SidechainRegistry::new();
        let mut ledger = WithdrawalBundleLedger::new();
        assert!(matches!(
            ledger.propose(3, [1; 32], payout(1), 10, &reg, &params()),
            Err(LedgerError::UnknownSidechainReference { slot: 3, .. })
        ));
    }

    #[test]
    fn test_duplicate_bundle() {
        let reg = active_registry(3);
        let mut ledger = WithdrawalBundleLedger::new();
        ledger.propose(3, [1; 32], payout(1), 10, &reg, &params()).unwrap();
        assert!(matches!(
            ledger.propose(3, [1; 32], payout(1), 11, &reg, &params()),
            Err(LedgerError::DuplicateProposal { .. })
        ));
    }

    #[test]
    fn test_score_bounds() {
        let reg = active_registry(3);
        let mut ledger = WithdrawalBundleLedger::new();
        ledger.propose(3, [1; 32], payout(1), 10, &reg, &params()).unwrap();

        vote(&mut ledger, 3, [1; 32], VoteKind::Downvote);
        assert_eq!(ledger.get(&[1; 32]).unwrap().work_score, 0);

        for _ in 0..200 {
            vote(&mut ledger, 3, [1; 32], VoteKind::Upvote);
        }
        assert_eq!(ledger.get(&[1; 32]).unwrap().work_score, 131);

        vote(&mut ledger, 3, [1; 32], VoteKind::Abstain);
        assert_eq!(ledger.get(&[1; 32]).unwrap().work_score, 131);
    }

    #[test]
    fn test_one_move_per_block() {
        let reg = active_registry(3);
        let mut ledger = WithdrawalBundleLedger::new();
        ledger.propose(3, [1; 32], payout(1), 10, &reg, &params()).unwrap();

        let mut round = VoteRound::new();
        let p = params();
        ledger
            .apply_vote(&mut round, 3, [1; 32], VoteKind::Upvote, &p)
            .unwrap();
        assert!(round.is_touched(&[1; 32]));
        assert!(matches!(
            ledger.apply_vote(&mut round, 3, [1; 32], VoteKind::Upvote, &p),
            Err(LedgerError::VoteRejected { .. })
        ));
        assert!(ledger
            .apply_vote(&mut round, 3, [1; 32], VoteKind::Downvote, &p)
            .is_err());
        assert_eq!(ledger.get(&[1; 32]).unwrap().work_score, 1);
    }

    #[test]
    fn test_upvote_lowers_competitors() {
        let reg = active_registry(3);
        let mut ledger = WithdrawalBundleLedger::new();
        let p = params();
        ledger.propose(3, [1; 32], payout(1), 10, &reg, &p).unwrap();
        ledger.propose(3, [2; 32], payout(2), 10, &reg, &p).unwrap();
        for _ in 0..5 {
            vote(&mut ledger, 3, [2; 32], VoteKind::Upvote);
        }
        assert_eq!(ledger.get(&[1; 32]).unwrap().work_score, 0);
        assert_eq!(ledger.get(&[2; 32]).unwrap().work_score, 5);

        let mut round = VoteRound::new();
        ledger
            .apply_vote(&mut round, 3, [1; 32], VoteKind::Upvote, &p)
            .unwrap();
        assert_eq!(ledger.get(&[1; 32]).unwrap().work_score, 1);
        assert_eq!(ledger.get(&[2; 32]).unwrap().work_score, 4);

        // Second upvote on the same slot in the same block is dropped.
        assert!(ledger
            .apply_vote(&mut round, 3, [2; 32], VoteKind::Upvote, &p)
            .is_err());
    }

    #[test]
    fn test_wrong_slot_is_unknown_reference() {
        let reg = active_registry(3);
        let mut ledger = WithdrawalBundleLedger::new();
        ledger.propose(3, [1; 32], payout(1), 10, &reg, &params()).unwrap();
        let mut round = VoteRound::new();
        assert!(matches!(
            ledger.apply_vote(&mut round, 4, [1; 32], VoteKind::Upvote, &params()),
            Err(LedgerError::UnknownSidechainReference { slot: 4, .. })
        ));
    }

    #[test]
    fn test_success_updates_ctip_and_supersedes() {
        let reg = active_registry(3);
        let mut ledger = WithdrawalBundleLedger::new();
        let mut ctips = CtipStore::new();
        let p = ConsensusParams {
            maturity_threshold: 3,
            max_work_score: 3,
            ..ConsensusParams::default()
        };
        ledger.propose(3, [1; 32], payout(1), 10, &reg, &p).unwrap();
        ledger.propose(3, [2; 32], payout(2), 10, &reg, &p).unwrap();

        for _ in 0..3 {
            let mut round = VoteRound::new();
            ledger
                .apply_vote(&mut round, 3, [1; 32], VoteKind::Upvote, &p)
                .unwrap();
        }
        let transitions = ledger.advance(13, &mut ctips, &p);
        assert_eq!(transitions.len(), 2);
        assert_eq!(
            ledger.get(&[1; 32]).unwrap().status,
            BundleStatus::Succeeded
        );
        assert_eq!(ledger.get(&[2; 32]).unwrap().status, BundleStatus::Failed);
        assert!(transitions.contains(&Transition::BundleFailed {
            slot: 3,
            bundle_hash: [2; 32],
            reason: BundleFailure::Superseded,
        }));
        assert_eq!(ctips.get(3).unwrap().outpoint, payout(1).outpoint);

        // Terminal bundles take no more votes.
        let mut round = VoteRound::new();
        assert!(ledger
            .apply_vote(&mut round, 3, [1; 32], VoteKind::Upvote, &p)
            .is_err());
    }

    #[test]
    fn test_deadline_fails_without_ctip_change() {
        let reg = active_registry(3);
        let mut ledger = WithdrawalBundleLedger::new();
        let mut ctips = CtipStore::new();
        ledger.propose(3, [1; 32], payout(1), 10, &reg, &params()).unwrap();

        assert!(ledger.advance(309, &mut ctips, &params()).is_empty());
        let transitions = ledger.advance(310, &mut ctips, &params());
        assert_eq!(
            transitions,
            vec![Transition::BundleFailed {
                slot: 3,
                bundle_hash: [1; 32],
                reason: BundleFailure::Expired,
            }]
        );
        assert!(ctips.is_empty());
    }
}
