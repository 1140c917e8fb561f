use serde::{Deserialize, Serialize};

use scdb_types::primitives::{Amount, Hash, Height, OutPoint, SlotId};

/// Why a withdrawal bundle failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleFailure {
    /// Deadline reached below the maturity threshold.
    Expired,
    /// Another bundle of the same slot succeeded and spent the CTIP.
    Superseded,
}

/// A lifecycle transition caused by one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transition {
    SidechainActivated {
        slot: SlotId,
        proposal_hash: Hash,
    },
    SidechainExpired {
        slot: SlotId,
        proposal_hash: Hash,
    },
    BundleSucceeded {
        slot: SlotId,
        bundle_hash: Hash,
        outpoint: OutPoint,
        amount: Amount,
    },
    BundleFailed {
        slot: SlotId,
        bundle_hash: Hash,
        reason: BundleFailure,
    },
}

/// Notification published after every successful connect or disconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    BlockConnected {
        height: Height,
        block_hash: Hash,
        state_root: Hash,
        transitions: Vec<Transition>,
    },
    BlockDisconnected {
        height: Height,
        block_hash: Hash,
    },
}

impl LedgerEvent {
    pub fn height(&self) -> Height {
        match self {
            LedgerEvent::BlockConnected { height, .. }
            | LedgerEvent::BlockDisconnected { height, .. } => *height,
        }
    }
}
