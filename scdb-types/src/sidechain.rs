use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::primitives::*;

/// Descriptive data carried by a sidechain proposal commitment.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct SidechainMetadata {
    pub title: String,
    pub description: String,
    /// Sidechain software version announced by the proposer.
    pub version: u32,
}

/// Lifecycle status of a sidechain proposal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum ProposalStatus {
    Proposed,
    /// Terminal: the slot hosts this sidechain.
    Active,
    /// Terminal: the hash is barred from this slot.
    Expired,
}

impl ProposalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Proposed => "proposed",
            ProposalStatus::Active => "active",
            ProposalStatus::Expired => "expired",
        }
    }
}

/// Registry key: one proposal per (slot, proposal hash).
pub type ProposalKey = (SlotId, Hash);

/// A sidechain proposal tracked by the registry.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct SidechainProposal {
    pub slot: SlotId,
    pub proposal_hash: Hash,
    pub metadata: SidechainMetadata,
    pub proposed_height: Height,
    pub deadline_height: Height,
    pub ack_count: u32,
    pub status: ProposalStatus,
    /// Height of the block that activated or expired the proposal.
    pub resolved_height: Option<Height>,
}

impl SidechainProposal {
    pub fn key(&self) -> ProposalKey {
        (self.slot, self.proposal_hash)
    }

    pub fn is_active(&self) -> bool {
        self.status == ProposalStatus::Active
    }
}
