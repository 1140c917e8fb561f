use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::ParamsError;
use crate::primitives::{Height, WorkScore};

/// Consensus parameters of the ledger.
///
/// Every node of a network must run with identical values; any difference
/// produces diverging state roots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusParams {
    pub required_acks: u32,
    pub activation_window: Height,
    pub maturity_threshold: WorkScore,
    pub max_work_score: WorkScore,
    pub bundle_window: Height,
    pub max_undo_depth: usize,
    pub slot_count: u16,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            required_acks: REQUIRED_ACKS,
            activation_window: ACTIVATION_WINDOW,
            maturity_threshold: MATURITY_THRESHOLD,
            max_work_score: MAX_WORK_SCORE,
            bundle_window: BUNDLE_WINDOW,
            max_undo_depth: MAX_UNDO_DEPTH,
            slot_count: SLOT_COUNT,
        }
    }
}

impl ConsensusParams {
    /// Check internal consistency of the parameter set.
    pub fn validate(&self) -> Result<(), ParamsError> {
        let positive = [
            ("required_acks", self.required_acks as u64),
            ("activation_window", self.activation_window),
            ("maturity_threshold", self.maturity_threshold as u64),
            ("bundle_window", self.bundle_window),
            ("max_undo_depth", self.max_undo_depth as u64),
        ];
        if let Some((field, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(ParamsError::NotPositive { field: *field });
        }
        if self.max_work_score < self.maturity_threshold {
            return Err(ParamsError::ScoreCeilingBelowThreshold {
                max: self.max_work_score,
                threshold: self.maturity_threshold,
            });
        }
        if self.slot_count == 0 || self.slot_count > SLOT_COUNT {
            return Err(ParamsError::SlotCountOutOfRange {
                got: self.slot_count,
                limit: SLOT_COUNT,
            });
        }
        Ok(())
    }
}
