use std::collections::BTreeMap;

use scdb_types::ctip::Ctip;
use scdb_types::primitives::{Amount, OutPoint, SlotId};

/// Current escrow outpoint per sidechain slot. At most one CTIP per slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CtipStore {
    ctips: BTreeMap<SlotId, Ctip>,
}

impl CtipStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: SlotId) -> Option<&Ctip> {
        self.ctips.get(&slot)
    }

    /// Replace the CTIP of `slot`, returning the previous one.
    ///
    /// The caller guarantees the slot hosts an Active sidechain.
    pub fn update(&mut self, slot: SlotId, outpoint: OutPoint, amount: Amount) -> Option<Ctip> {
        self.ctips.insert(
            slot,
            Ctip {
                slot,
                outpoint,
                amount,
            },
        )
    }

    /// CTIPs in ascending slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Ctip> {
        self.ctips.values()
    }

    pub fn len(&self) -> usize {
        self.ctips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ctips.is_empty()
    }

    pub(crate) fn entries(&self) -> &BTreeMap<SlotId, Ctip> {
        &self.ctips
    }

    pub(crate) fn set_entry(&mut self, slot: SlotId, ctip: Option<Ctip>) {
        match ctip {
            Some(c) => {
                self.ctips.insert(slot, c);
            }
            None => {
                self.ctips.remove(&slot);
            }
        }
    }
}
