use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::primitives::*;

/// Current escrow output backing an active sidechain.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct Ctip {
    pub slot: SlotId,
    pub outpoint: OutPoint,
    pub amount: Amount,
}
