use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::bundle::BundlePayout;
use crate::primitives::*;
use crate::sidechain::SidechainMetadata;

/// The signal carried by a vote commitment.
///
/// Ack/Nack address sidechain proposals; Upvote/Downvote address withdrawal
/// bundles. Abstain is valid for both.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub enum VoteKind {
    Ack,
    Nack,
    Upvote,
    Downvote,
    Abstain,
}

/// What a vote refers to.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub enum VoteTarget {
    Sidechain { slot: SlotId, proposal_hash: Hash },
    Bundle { slot: SlotId, bundle_hash: Hash },
}

impl VoteTarget {
    pub fn slot(&self) -> SlotId {
        match self {
            VoteTarget::Sidechain { slot, .. } | VoteTarget::Bundle { slot, .. } => *slot,
        }
    }

    pub fn hash(&self) -> Hash {
        match self {
            VoteTarget::Sidechain { proposal_hash, .. } => *proposal_hash,
            VoteTarget::Bundle { bundle_hash, .. } => *bundle_hash,
        }
    }
}

/// A single vote. Consumed by block application and never stored individually.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Vote {
    pub target: VoteTarget,
    pub kind: VoteKind,
    pub height: Height,
}

/// A decoded commitment, in the order it was declared in the block.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum Commitment {
    ProposeSidechain {
        slot: SlotId,
        proposal_hash: Hash,
        metadata: SidechainMetadata,
    },
    ProposeBundle {
        slot: SlotId,
        bundle_hash: Hash,
        payout: BundlePayout,
    },
    Vote(Vote),
}

/// The vote-bearing payloads of one connected block.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct BlockCommitments {
    pub height: Height,
    pub block_hash: Hash,
    /// Raw payloads in declared order.
    pub payloads: Vec<Vec<u8>>,
    /// State root the block claims; checked against the computed root when present.
    pub declared_root: Option<Hash>,
}
