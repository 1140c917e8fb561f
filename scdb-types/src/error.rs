use thiserror::Error;

use crate::primitives::WorkScore;

/// A consensus parameter set the ledger cannot run with.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamsError {
    #[error("{field} must be positive")]
    NotPositive { field: &'static str },

    #[error("max_work_score {max} below maturity_threshold {threshold}")]
    ScoreCeilingBelowThreshold {
        max: WorkScore,
        threshold: WorkScore,
    },

    #[error("slot_count must be within 1..={limit}, got {got}")]
    SlotCountOutOfRange { got: u16, limit: u16 },
}
