use serde::{Deserialize, Serialize};

use scdb_crypto::merkle::MerkleProof;
use scdb_ledger::{BlockReceipt, Transition};
use scdb_types::bundle::WithdrawalBundle;
use scdb_types::ctip::Ctip;
use scdb_types::primitives::Hash;
use scdb_types::record::CommitmentRecord;
use scdb_types::sidechain::SidechainProposal;
use scdb_types::vote::{Vote, VoteKind};

/// The ledger's chain tip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TipInfo {
    pub height: u64,
    /// Block hash as hex string.
    pub block_hash: String,
    /// State root after the tip block, as hex string.
    pub state_root: String,
    /// Oldest height that can still be disconnected.
    pub oldest_undo_height: Option<u64>,
}

/// A sidechain proposal, active or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalInfo {
    pub slot: u8,
    /// Proposal hash as hex string.
    pub proposal_hash: String,
    pub title: String,
    pub description: String,
    pub version: u32,
    pub proposed_height: u64,
    pub deadline_height: u64,
    pub ack_count: u32,
    /// "proposed", "active" or "expired".
    pub status: String,
    pub resolved_height: Option<u64>,
}

impl From<&SidechainProposal> for ProposalInfo {
    fn from(p: &SidechainProposal) -> Self {
        Self {
            slot: p.slot,
            proposal_hash: hex::encode(p.proposal_hash),
            title: p.metadata.title.clone(),
            description: p.metadata.description.clone(),
            version: p.metadata.version,
            proposed_height: p.proposed_height,
            deadline_height: p.deadline_height,
            ack_count: p.ack_count,
            status: p.status.as_str().to_string(),
            resolved_height: p.resolved_height,
        }
    }
}

/// The critical transaction-index pair of a slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CtipInfo {
    pub slot: u8,
    /// Txid as hex string.
    pub txid: String,
    pub vout: u32,
    /// Amount as decimal string.
    pub amount: String,
}

impl From<&Ctip> for CtipInfo {
    fn from(c: &Ctip) -> Self {
        Self {
            slot: c.slot,
            txid: hex::encode(c.outpoint.txid),
            vout: c.outpoint.vout,
            amount: c.amount.to_string(),
        }
    }
}

/// A withdrawal bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleInfo {
    pub slot: u8,
    /// Bundle hash as hex string.
    pub bundle_hash: String,
    pub proposed_height: u64,
    pub deadline_height: u64,
    pub work_score: u16,
    /// Outpoint the bundle creates as the new CTIP, `txid:vout`.
    pub outpoint: String,
    /// Amount as decimal string.
    pub amount: String,
    /// "pending", "succeeded" or "failed".
    pub status: String,
}

impl From<&WithdrawalBundle> for BundleInfo {
    fn from(b: &WithdrawalBundle) -> Self {
        Self {
            slot: b.slot,
            bundle_hash: hex::encode(b.bundle_hash),
            proposed_height: b.proposed_height,
            deadline_height: b.deadline_height,
            work_score: b.work_score,
            outpoint: b.payout.outpoint.to_string(),
            amount: b.payout.amount.to_string(),
            status: b.status.as_str().to_string(),
        }
    }
}

/// One entry of the commitment history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitmentRecordInfo {
    pub height: u64,
    /// Block hash as hex string.
    pub block_hash: String,
    /// State root as hex string.
    pub state_root: String,
    /// Number of entries the block changed.
    pub changed_entries: usize,
}

impl From<&CommitmentRecord> for CommitmentRecordInfo {
    fn from(r: &CommitmentRecord) -> Self {
        Self {
            height: r.height,
            block_hash: hex::encode(r.block_hash),
            state_root: hex::encode(r.state_root),
            changed_entries: r.undo.len(),
        }
    }
}

/// A Merkle inclusion proof against the current state root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateProofInfo {
    /// State root as hex string.
    pub state_root: String,
    pub leaf_index: u64,
    pub leaf_count: u64,
    /// Leaf value as hex string.
    pub leaf: String,
    /// Sibling hashes from the bottom level upward, as hex strings.
    pub siblings: Vec<String>,
}

impl StateProofInfo {
    pub fn new(root: &Hash, proof: &MerkleProof) -> Self {
        Self {
            state_root: hex::encode(root),
            leaf_index: proof.leaf_index,
            leaf_count: proof.leaf_count,
            leaf: hex::encode(proof.leaf),
            siblings: proof.siblings.iter().map(hex::encode).collect(),
        }
    }
}

/// Result of connecting a block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockReceiptInfo {
    pub height: u64,
    /// State root as hex string.
    pub state_root: String,
    pub applied: usize,
    pub dropped: usize,
    pub transitions: Vec<Transition>,
}

impl From<&BlockReceipt> for BlockReceiptInfo {
    fn from(r: &BlockReceipt) -> Self {
        Self {
            height: r.record.height,
            state_root: hex::encode(r.record.state_root),
            applied: r.applied,
            dropped: r.dropped,
            transitions: r.transitions.clone(),
        }
    }
}

/// A cached bundle vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomVoteInfo {
    pub slot: u8,
    /// Bundle hash as hex string.
    pub bundle_hash: String,
    /// "upvote", "downvote" or "abstain".
    pub kind: String,
}

impl From<&Vote> for CustomVoteInfo {
    fn from(v: &Vote) -> Self {
        Self {
            slot: v.target.slot(),
            bundle_hash: hex::encode(v.target.hash()),
            kind: vote_kind_name(v.kind).to_string(),
        }
    }
}

pub fn vote_kind_name(kind: VoteKind) -> &'static str {
    match kind {
        VoteKind::Ack => "ack",
        VoteKind::Nack => "nack",
        VoteKind::Upvote => "upvote",
        VoteKind::Downvote => "downvote",
        VoteKind::Abstain => "abstain",
    }
}

pub fn parse_bundle_vote_kind(name: &str) -> Option<VoteKind> {
    match name.to_ascii_lowercase().as_str() {
        "upvote" => Some(VoteKind::Upvote),
        "downvote" => Some(VoteKind::Downvote),
        "abstain" => Some(VoteKind::Abstain),
        _ => None,
    }
}

/// Result of a vote cache mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResult {
    pub success: bool,
    pub reason: Option<String>,
}
