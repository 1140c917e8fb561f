//! The sidechain activation and withdrawal ledger.
//!
//! A deterministic, reorg-safe state machine driven by the vote commitments
//! embedded in each parent-chain block:
//!
//! - [`codec`] decodes tagged commitment payloads.
//! - [`registry`] tracks sidechain proposals through Proposed, Active and Expired.
//! - [`bundles`] tallies withdrawal bundle work scores.
//! - [`ctip`] holds the current escrow outpoint per slot.
//! - [`history`] keeps per-block undo records for rollback.
//! - [`applier`] is the single writer that applies and disconnects blocks.
//! - [`reader`] is the concurrent read view handed to RPC and other callers.

pub mod applier;
pub mod bundles;
pub mod codec;
pub mod ctip;
pub mod error;
pub mod events;
pub mod history;
pub mod reader;
pub mod registry;
pub mod state;
pub mod votes;

pub use applier::{BlockReceipt, ConsensusApplier};
pub use error::LedgerError;
pub use events::{LedgerEvent, Transition};
pub use reader::StateReader;
pub use state::LedgerState;
