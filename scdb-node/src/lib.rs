//! Node for the sidechain activation and withdrawal ledger: configuration,
//! storage wiring, block feed replay, checkpoints, metrics and JSON-RPC.

pub mod banner;
pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod error;
pub mod feed;
pub mod inspect;
pub mod metrics;
pub mod node;
pub mod rpc;
