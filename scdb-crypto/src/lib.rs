//! Hashing and state-tree primitives for the sidechain ledger.

pub mod hash;
pub mod merkle;
