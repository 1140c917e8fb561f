use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::bundle::WithdrawalBundle;
use crate::ctip::Ctip;
use crate::primitives::*;
use crate::sidechain::{ProposalKey, SidechainProposal};

/// A set of ledger entries, each paired with the value it should hold.
///
/// `None` means the entry must not exist. Used both as an undo snapshot (prior
/// values) and as the forward write set of a block.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct StateDiff {
    pub tip: Option<ChainTip>,
    pub proposals: Vec<(ProposalKey, Option<SidechainProposal>)>,
    pub bundles: Vec<(Hash, Option<WithdrawalBundle>)>,
    pub ctips: Vec<(SlotId, Option<Ctip>)>,
}

impl StateDiff {
    /// Number of entries (excluding the tip) the diff touches.
    pub fn len(&self) -> usize {
        self.proposals.len() + self.bundles.len() + self.ctips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-block entry of the commitment history.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct CommitmentRecord {
    pub height: Height,
    pub block_hash: Hash,
    /// Digest over active CTIPs and pending bundle scores after the block.
    pub state_root: Hash,
    /// Prior values of everything the block changed.
    pub undo: StateDiff,
}

/// A full image of the ledger's tracked state, used for persistence restore and checkpoints.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct LedgerImage {
    pub tip: Option<ChainTip>,
    pub proposals: Vec<SidechainProposal>,
    pub bundles: Vec<WithdrawalBundle>,
    pub ctips: Vec<Ctip>,
}
