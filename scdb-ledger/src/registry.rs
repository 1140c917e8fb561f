use std::collections::BTreeMap;

use scdb_types::params::ConsensusParams;
use scdb_types::primitives::{Hash, Height, SlotId};
use scdb_types::sidechain::{ProposalKey, ProposalStatus, SidechainMetadata, SidechainProposal};
use scdb_types::vote::VoteKind;

use crate::error::LedgerError;
use crate::events::Transition;

/// Sidechain proposals and their activation tallies, keyed by (slot, hash).
///
/// Terminal proposals are retained so a (slot, hash) pair can never be
/// proposed again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SidechainRegistry {
    proposals: BTreeMap<ProposalKey, SidechainProposal>,
    /// Slot -> hash of the Active proposal occupying it.
    active: BTreeMap<SlotId, Hash>,
}

impl SidechainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new proposal open for acks until `height + activation_window`.
    pub fn propose(
        &mut self,
        slot: SlotId,
        proposal_hash: Hash,
        metadata: SidechainMetadata,
        height: Height,
        params: &ConsensusParams,
    ) -> Result<(), LedgerError> {
        let key = (slot, proposal_hash);
        if self.proposals.contains_key(&key) {
            return Err(LedgerError::DuplicateProposal {
                slot,
                hash: proposal_hash,
            });
        }
        if self.active.contains_key(&slot) {
            return Err(LedgerError::SlotOccupied { slot });
        }

        let proposal = SidechainProposal {
            slot,
            proposal_hash,
            metadata,
            proposed_height: height,
            deadline_height: height.saturating_add(params.activation_window),
            ack_count: 0,
            status: ProposalStatus::Proposed,
            resolved_height: None,
        };
        tracing::debug!(
            slot,
            hash = %hex::encode(proposal_hash),
            title = %proposal.metadata.title,
            deadline = proposal.deadline_height,
            "sidechain proposed"
        );
        self.proposals.insert(key, proposal);
        Ok(())
    }

    /// Count an Ack, Nack or Abstain against a proposal still inside its window.
    pub fn apply_vote(
        &mut self,
        slot: SlotId,
        proposal_hash: Hash,
        kind: VoteKind,
        height: Height,
    ) -> Result<(), LedgerError> {
        let proposal = self
            .proposals
            .get_mut(&(slot, proposal_hash))
            .ok_or(LedgerError::UnknownSidechainReference {
                slot,
                hash: proposal_hash,
            })?;

        if proposal.status != ProposalStatus::Proposed {
            return Err(LedgerError::rejected(format!(
                "proposal is {}",
                proposal.status.as_str()
            )));
        }
        if height > proposal.deadline_height {
            return Err(LedgerError::rejected(format!(
                "height {} past deadline {}",
                height, proposal.deadline_height
            )));
        }

        match kind {
            VoteKind::Ack => proposal.ack_count = proposal.ack_count.saturating_add(1),
            VoteKind::Nack => proposal.ack_count = proposal.ack_count.saturating_sub(1),
            VoteKind::Abstain => {}
            VoteKind::Upvote | VoteKind::Downvote => {
                return Err(LedgerError::rejected("bundle vote on a sidechain proposal"))
            }
        }
        Ok(())
    }

    /// Resolve proposals at the end of a block: activate those at threshold on a
    /// free slot, then expire those whose deadline has been reached.
    pub fn advance(&mut self, height: Height, params: &ConsensusParams) -> Vec<Transition> {
        let mut transitions = Vec::new();

        // Best candidate per free slot: most acks, then earliest proposal, then lowest hash.
        let mut winners: BTreeMap<SlotId, &SidechainProposal> = BTreeMap::new();
        for p in self.proposals.values() {
            if p.status != ProposalStatus::Proposed
                || p.ack_count < params.required_acks
                || self.active.contains_key(&p.slot)
            {
                continue;
            }
            let better = match winners.get(&p.slot) {
                None => true,
                Some(best) => {
                    (std::cmp::Reverse(p.ack_count), p.proposed_height, p.proposal_hash)
                        < (
                            std::cmp::Reverse(best.ack_count),
                            best.proposed_height,
                            best.proposal_hash,
                        )
                }
            };
            if better {
                winners.insert(p.slot, p);
            }
        }
        let activated: Vec<ProposalKey> = winners.values().map(|p| p.key()).collect();

        for key in activated {
            if let Some(p) = self.proposals.get_mut(&key) {
                p.status = ProposalStatus::Active;
                p.resolved_height = Some(height);
                self.active.insert(p.slot, p.proposal_hash);
                tracing::info!(
                    slot = p.slot,
                    hash = %hex::encode(p.proposal_hash),
                    acks = p.ack_count,
                    height,
                    "sidechain activated"
                );
                transitions.push(Transition::SidechainActivated {
                    slot: p.slot,
                    proposal_hash: p.proposal_hash,
                });
            }
        }

        for p in self.proposals.values_mut() {
            if p.status == ProposalStatus::Proposed && height >= p.deadline_height {
                p.status = ProposalStatus::Expired;
                p.resolved_height = Some(height);
                tracing::info!(
                    slot = p.slot,
                    hash = %hex::encode(p.proposal_hash),
                    acks = p.ack_count,
                    height,
                    "sidechain proposal expired"
                );
                transitions.push(Transition::SidechainExpired {
                    slot: p.slot,
                    proposal_hash: p.proposal_hash,
                });
            }
        }

        transitions
    }

    pub fn get(&self, slot: SlotId, proposal_hash: &Hash) -> Option<&SidechainProposal> {
        self.proposals.get(&(slot, *proposal_hash))
    }

    pub fn is_slot_active(&self, slot: SlotId) -> bool {
        self.active.contains_key(&slot)
    }

    /// The Active sidechain of `slot`, if any.
    pub fn active_in_slot(&self, slot: SlotId) -> Option<&SidechainProposal> {
        self.active
            .get(&slot)
            .and_then(|hash| self.proposals.get(&(slot, *hash)))
    }

    /// Active sidechains in ascending slot order.
    pub fn active_sidechains(&self) -> Vec<&SidechainProposal> {
        self.active
            .iter()
            .filter_map(|(slot, hash)| self.proposals.get(&(*slot, *hash)))
            .collect()
    }

    /// All tracked proposals in (slot, hash) order.
    pub fn iter(&self) -> impl Iterator<Item = &SidechainProposal> {
        self.proposals.values()
    }

    pub fn len(&self) -> usize {
        self.proposals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proposals.is_empty()
    }

    pub(crate) fn entries(&self) -> &BTreeMap<ProposalKey, SidechainProposal> {
        &self.proposals
    }

    /// Overwrite or remove one entry, keeping the active-slot index consistent.
    pub(crate) fn set_entry(&mut self, key: ProposalKey, proposal: Option<SidechainProposal>) {
        let (slot, hash) = key;
        if self.active.get(&slot) == Some(&hash) {
            self.active.remove(&slot);
        }
        match proposal {
            Some(p) => {
                if p.is_active() {
                    self.active.insert(slot, hash);
                }
                self.proposals.insert(key, p);
            }
            None => {
                self.proposals.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> ConsensusParams {
        ConsensusParams::default()
    }

    fn metadata(title: &str) -> SidechainMetadata {
        SidechainMetadata {
            title: title.to_string(),
            description: String::new(),
            version: 1,
        }
    }

    fn ack_n(reg: &mut SidechainRegistry, slot: SlotId, hash: Hash, n: u32, height: Height) {
        for _ in 0..n {
            reg.apply_vote(slot, hash, VoteKind::Ack, height).unwrap();
        }
    }

    #[test]
    fn test_propose_sets_deadline() {
        let mut reg = SidechainRegistry::new();
        reg.propose(3, [1; 32], metadata("a"), 100, &params()).unwrap();
        let p = reg.get(3, &[1; 32]).unwrap();
        assert_eq!(p.deadline_height, 126);
        assert_eq!(p.status, ProposalStatus::Proposed);
    }

    #[test]
    fn test_duplicate_proposal_rejected() {
        let mut reg = SidechainRegistry::new();
        reg.propose(3, [1; 32], metadata("a"), 100, &params()).unwrap();
        assert!(matches!(
            reg.propose(3, [1; 32], metadata("a"), 101, &params()),
            Err(LedgerError::DuplicateProposal { slot: 3, .. })
        ));
        // Same hash in another slot is a different proposal.
        reg.propose(4, [1; 32], metadata("a"), 101, &params()).unwrap();
    }

    #[test]
    fn test_activation_at_threshold() {
        let mut reg = SidechainRegistry::new();
        reg.propose(3, [1; 32], metadata("a"), 100, &params()).unwrap();
        ack_n(&mut reg, 3, [1; 32], 12, 101);
        assert!(reg.advance(101, &params()).is_empty());

        ack_n(&mut reg, 3, [1; 32], 1, 102);
        let transitions = reg.advance(102, &params());
        assert_eq!(
            transitions,
            vec![Transition::SidechainActivated {
                slot: 3,
                proposal_hash: [1; 32]
            }]
        );
        assert!(reg.is_slot_active(3));
        assert_eq!(reg.get(3, &[1; 32]).unwrap().resolved_height, Some(102));

        // Frozen once active.
        assert!(matches!(
            reg.apply_vote(3, [1; 32], VoteKind::Ack, 103),
            Err(LedgerError::VoteRejected { .. })
        ));
        assert_eq!(reg.get(3, &[1; 32]).unwrap().ack_count, 13);
    }

    #[test]
    fn test_expiry_bars_reproposal() {
        let mut reg = SidechainRegistry::new();
        reg.propose(3, [1; 32], metadata("a"), 100, &params()).unwrap();
        ack_n(&mut reg, 3, [1; 32], 5, 110);
        assert!(reg.advance(125, &params()).is_empty());
        let transitions = reg.advance(126, &params());
        assert!(matches!(
            transitions[0],
            Transition::SidechainExpired { slot: 3, .. }
        ));
        assert!(matches!(
            reg.propose(3, [1; 32], metadata("a"), 200, &params()),
            Err(LedgerError::DuplicateProposal { .. })
        ));
        assert!(!reg.is_slot_active(3));
    }

    #[test]
    fn test_votes_after_deadline_rejected() {
        let mut reg = SidechainRegistry::new();
        reg.propose(3, [1; 32], metadata("a"), 100, &params()).unwrap();
        reg.apply_vote(3, [1; 32], VoteKind::Ack, 126).unwrap();
        assert!(reg.apply_vote(3, [1; 32], VoteKind::Ack, 127).is_err());
    }

    #[test]
    fn test_nack_saturates_and_abstain_is_noop() {
        let mut reg = SidechainRegistry::new();
        reg.propose(3, [1; 32], metadata("a"), 100, &params()).unwrap();
        reg.apply_vote(3, [1; 32], VoteKind::Nack, 101).unwrap();
        assert_eq!(reg.get(3, &[1; 32]).unwrap().ack_count, 0);
        ack_n(&mut reg, 3, [1; 32], 2, 101);
        reg.apply_vote(3, [1; 32], VoteKind::Abstain, 101).unwrap();
        reg.apply_vote(3, [1; 32], VoteKind::Nack, 101).unwrap();
        assert_eq!(reg.get(3, &[1; 32]).unwrap().ack_count, 1);
    }

    #[test]
    fn test_unknown_proposal() {
        let mut reg = SidechainRegistry::new();
        assert!(matches!(
            reg.apply_vote(3, [9; 32], VoteKind::Ack, 1),
            Err(LedgerError::UnknownSidechainReference { slot: 3, .. })
        ));
    }

    #[test]
    fn test_same_block_tie_break() {
        let mut reg = SidechainRegistry::new();
        reg.propose(5, [2; 32], metadata("late"), 101, &params()).unwrap();
        reg.propose(5, [1; 32], metadata("early"), 100, &params()).unwrap();
        reg.propose(5, [3; 32], metadata("more"), 102, &params()).unwrap();
        ack_n(&mut reg, 5, [1; 32], 13, 110);
        ack_n(&mut reg, 5, [2; 32], 13, 110);
        // Most acks wins.
        ack_n(&mut reg, 5, [3; 32], 14, 110);

        let transitions = reg.advance(110, &params());
        assert_eq!(transitions.len(), 1);
        assert_eq!(reg.active_in_slot(5).unwrap().proposal_hash, [3; 32]);

        // Losers stay Proposed until their deadline, then expire.
        assert_eq!(
            reg.get(5, &[1; 32]).unwrap().status,
            ProposalStatus::Proposed
        );
        reg.advance(126, &params());
        assert_eq!(reg.get(5, &[1; 32]).unwrap().status, ProposalStatus::Expired);
        assert_eq!(
            reg.get(5, &[2; 32]).unwrap().status,
            ProposalStatus::Proposed
        );
    }

    #[test]
    fn test_earlier_proposal_wins_on_equal_acks() {
        let mut reg = SidechainRegistry::new();
        reg.propose(5, [1; 32], metadata("later"), 101, &params()).unwrap();
        reg.propose(5, [2; 32], metadata("earlier"), 100, &params()).unwrap();
        ack_n(&mut reg, 5, [1; 32], 13, 110);
        ack_n(&mut reg, 5, [2; 32], 13, 110);
        reg.advance(110, &params());
        assert_eq!(reg.active_in_slot(5).unwrap().proposal_hash, [2; 32]);
    }

    #[test]
    fn test_slot_occupied() {
        let mut reg = SidechainRegistry::new();
        reg.propose(3, [1; 32], metadata("a"), 100, &params()).unwrap();
        ack_n(&mut reg, 3, [1; 32], 13, 100);
        reg.advance(100, &params());
        assert!(matches!(
            reg.propose(3, [2; 32], metadata("b"), 101, &params()),
            Err(LedgerError::SlotOccupied { slot: 3 })
        ));
    }

    #[test]
    fn test_set_entry_maintains_active_index() {
        let mut reg = SidechainRegistry::new();
        reg.propose(3, [1; 32], metadata("a"), 100, &params()).unwrap();
        ack_n(&mut reg, 3, [1; 32], 13, 100);
        reg.advance(100, &params());

        let mut reverted = reg.get(3, &[1; 32]).unwrap().clone();
        reverted.status = ProposalStatus::Proposed;
        reverted.resolved_height = None;
        reg.set_entry((3, [1; 32]), Some(reverted));
        assert!(!reg.is_slot_active(3));

        reg.set_entry((3, [1; 32]), None);
        assert!(reg.is_empty());
    }
}
