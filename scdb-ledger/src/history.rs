use std::collections::VecDeque;

use scdb_types::primitives::Height;
use scdb_types::record::CommitmentRecord;

use crate::error::LedgerError;
use crate::state::LedgerState;

/// Per-block commitment records with undo snapshots, oldest first.
///
/// Holds at most `max_depth` records; rollback cannot reach below the oldest
/// one retained.
#[derive(Debug, Clone)]
pub struct CommitmentHistory {
    records: VecDeque<CommitmentRecord>,
    max_depth: usize,
}

impl CommitmentHistory {
    pub fn new(max_depth: usize) -> Self {
        Self {
            records: VecDeque::new(),
            max_depth,
        }
    }

    /// Seed from persisted records. Only the contiguous run ending at the
    /// newest record is kept.
    pub fn from_records(records: Vec<CommitmentRecord>, max_depth: usize) -> Self {
        let mut history = Self::new(max_depth);
        for record in records {
            let contiguous = history
                .records
                .back()
                .map_or(true, |last| last.height + 1 == record.height);
            if !contiguous {
                history.records.clear();
            }
            history.append(record);
        }
        history
    }

    /// Push the record of a newly applied block. Returns how many old records
    /// were pruned to stay within the retention depth.
    pub fn append(&mut self, record: CommitmentRecord) -> usize {
        self.records.push_back(record);
        let mut pruned = 0;
        while self.records.len() > self.max_depth {
            self.records.pop_front();
            pruned += 1;
        }
        pruned
    }

    /// Pop every record above `to_height`, writing each undo snapshot back into
    /// `state`. Returns the popped records, newest first.
    ///
    /// Fails without touching anything if the records needed are not all retained.
    pub fn rollback(
        &mut self,
        to_height: Height,
        state: &mut LedgerState,
    ) -> Result<Vec<CommitmentRecord>, LedgerError> {
        let tip = match state.tip {
            Some(tip) if tip.height > to_height => tip,
            _ => return Ok(Vec::new()),
        };
        self.check_depth(to_height.saturating_add(1), tip.height)?;

        let mut popped = Vec::new();
        while let Some(record) = self.records.back() {
            if record.height <= to_height {
                break;
            }
            if let Some(record) = self.records.pop_back() {
                state.apply_diff(&record.undo);
                popped.push(record);
            }
        }
        Ok(popped)
    }

    /// Roll back every retained block, returning the state to before the
    /// oldest record. Used when a block at height 0 is disconnected.
    pub fn rollback_all(
        &mut self,
        state: &mut LedgerState,
    ) -> Result<Vec<CommitmentRecord>, LedgerError> {
        let first = match self.records.front() {
            Some(r) => r.height,
            None => {
                return Err(LedgerError::ReorgDepthExceeded {
                    height: state.tip.map_or(0, |t| t.height),
                    oldest: None,
                })
            }
        };
        let tip = state.tip.map_or(first, |t| t.height);
        self.check_depth(first, tip)?;

        let mut popped = Vec::new();
        while let Some(record) = self.records.pop_back() {
            state.apply_diff(&record.undo);
            popped.push(record);
        }
        Ok(popped)
    }

    fn check_depth(&self, lowest: Height, tip: Height) -> Result<(), LedgerError> {
        let covered = match (self.records.front(), self.records.back()) {
            (Some(oldest), Some(newest)) => oldest.height <= lowest && newest.height == tip,
            _ => false,
        };
        if !covered {
            return Err(LedgerError::ReorgDepthExceeded {
                height: lowest,
                oldest: self.oldest_height(),
            });
        }
        Ok(())
    }

    pub fn get(&self, height: Height) -> Option<&CommitmentRecord> {
        let oldest = self.oldest_height()?;
        let index = usize::try_from(height.checked_sub(oldest)?).ok()?;
        self.records.get(index)
    }

    /// Records with `from <= height <= to`, ascending.
    pub fn range(&self, from: Height, to: Height) -> Vec<CommitmentRecord> {
        self.records
            .iter()
            .filter(|r| r.height >= from && r.height <= to)
            .cloned()
            .collect()
    }

    pub fn oldest_height(&self) -> Option<Height> {
        self.records.front().map(|r| r.height)
    }

    pub fn latest(&self) -> Option<&CommitmentRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}
