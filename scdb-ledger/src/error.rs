use scdb_storage::error::StorageError;
use scdb_types::primitives::{Hash, Height, SlotId};
use thiserror::Error;

/// Errors raised while applying or rolling back blocks.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("malformed commitment: {reason}")]
    MalformedCommitment { reason: String },

    #[error("unknown sidechain reference: slot {slot}, hash {}", hex::encode(.hash))]
    UnknownSidechainReference { slot: SlotId, hash: Hash },

    #[error("duplicate proposal: slot {slot}, hash {}", hex::encode(.hash))]
    DuplicateProposal { slot: SlotId, hash: Hash },

    #[error("slot {slot} already hosts an active sidechain")]
    SlotOccupied { slot: SlotId },

    #[error("vote rejected: {reason}")]
    VoteRejected { reason: String },

    #[error(
        "cannot roll back height {height}: oldest retained undo record is {}",
        fmt_oldest(.oldest)
    )]
    ReorgDepthExceeded {
        height: Height,
        oldest: Option<Height>,
    },

    #[error(
        "state root mismatch at height {height}: declared {}, computed {}",
        hex::encode(.declared),
        hex::encode(.computed)
    )]
    ConsensusMismatch {
        height: Height,
        declared: Hash,
        computed: Hash,
    },

    #[error("height mismatch: expected {expected}, got {got}")]
    HeightMismatch { expected: Height, got: Height },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

fn fmt_oldest(oldest: &Option<Height>) -> String {
    match oldest {
        Some(h) => h.to_string(),
        None => "none".to_string(),
    }
}

impl LedgerError {
    /// Whether the error only drops the offending commitment. Anything else
    /// aborts the whole block or rollback.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            LedgerError::MalformedCommitment { .. }
                | LedgerError::UnknownSidechainReference { .. }
                | LedgerError::DuplicateProposal { .. }
                | LedgerError::SlotOccupied { .. }
                | LedgerError::VoteRejected { .. }
        )
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        LedgerError::MalformedCommitment {
            reason: reason.into(),
        }
    }

    pub(crate) fn rejected(reason: impl Into<String>) -> Self {
        LedgerError::VoteRejected {
            reason: reason.into(),
        }
    }
}
