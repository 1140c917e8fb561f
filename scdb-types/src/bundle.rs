use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::primitives::*;

/// The escrow output a withdrawal bundle leaves behind once it is paid out.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct BundlePayout {
    pub outpoint: OutPoint,
    pub amount: Amount,
}

/// Lifecycle status of a withdrawal bundle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub enum BundleStatus {
    Pending,
    Succeeded,
    Failed,
}

impl BundleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleStatus::Pending => "pending",
            BundleStatus::Succeeded => "succeeded",
            BundleStatus::Failed => "failed",
        }
    }
}

/// A withdrawal bundle (WT^) and its work score.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct WithdrawalBundle {
    pub slot: SlotId,
    pub bundle_hash: Hash,
    pub proposed_height: Height,
    pub deadline_height: Height,
    pub work_score: WorkScore,
    pub payout: BundlePayout,
    pub status: BundleStatus,
    /// Height of the block that settled the bundle.
    pub resolved_height: Option<Height>,
}

impl WithdrawalBundle {
    pub fn is_pending(&self) -> bool {
        self.status == BundleStatus::Pending
    }
}
