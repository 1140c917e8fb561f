use crate::primitives::{Height, WorkScore};

// ─── Sidechain Activation ────────────────────────────────────────────────────

/// Acks a proposal needs before it activates.
pub const REQUIRED_ACKS: u32 = 13;

/// Blocks a proposal stays open for acks, counted from its proposal height.
pub const ACTIVATION_WINDOW: Height = 26;

/// Number of addressable sidechain slots.
pub const SLOT_COUNT: u16 = 256;

// ─── Withdrawal Bundles ──────────────────────────────────────────────────────

/// Work score at which a pending bundle succeeds.
pub const MATURITY_THRESHOLD: WorkScore = 131;

/// Ceiling for a bundle's work score.
pub const MAX_WORK_SCORE: WorkScore = 131;

/// Blocks a bundle stays pending, counted from its proposal height.
pub const BUNDLE_WINDOW: Height = 300;

// ─── Commitment History ──────────────────────────────────────────────────────

/// Number of undo snapshots kept for reorg rollback (two days of blocks).
pub const MAX_UNDO_DEPTH: usize = 288;

// ─── Commitment Wire Schema ──────────────────────────────────────────────────

/// Tag of a sidechain proposal commitment.
pub const PROPOSE_SIDECHAIN_TAG: [u8; 4] = [0xD5, 0xE0, 0xC4, 0xAF];

/// Tag of a sidechain ack/nack commitment.
pub const ACK_SIDECHAIN_TAG: [u8; 4] = [0xD6, 0xE1, 0xC5, 0xBF];

/// Tag of a withdrawal bundle proposal commitment.
pub const PROPOSE_BUNDLE_TAG: [u8; 4] = [0xD4, 0x5A, 0xA9, 0x43];

/// Tag of a withdrawal bundle vote commitment.
pub const BUNDLE_VOTE_TAG: [u8; 4] = [0xD7, 0x7D, 0x17, 0x76];

/// Length of the tag that opens every commitment payload.
pub const TAG_LEN: usize = 4;

/// Tag + slot + hash + code.
pub const VOTE_PAYLOAD_LEN: usize = TAG_LEN + 1 + 32 + 1;

/// Current schema version carried in the code byte of proposal commitments.
pub const COMMITMENT_SCHEMA_VERSION: u8 = 1;

/// Maximum size of any commitment payload in bytes.
pub const MAX_COMMITMENT_SIZE: usize = 8_192;

/// Maximum sidechain title length in bytes.
pub const MAX_TITLE_LEN: usize = 120;

/// Maximum sidechain description length in bytes.
pub const MAX_DESCRIPTION_LEN: usize = 4_096;

// ─── Hash Domains ────────────────────────────────────────────────────────────

/// BLAKE3 derive-key context for sidechain proposal identities.
pub const PROPOSAL_HASH_DOMAIN: &str = "scdb 2024 sidechain proposal v1";

/// BLAKE3 derive-key context for state tree CTIP leaves.
pub const CTIP_LEAF_DOMAIN: &str = "scdb 2024 state leaf ctip v1";

/// BLAKE3 derive-key context for state tree bundle leaves.
pub const BUNDLE_LEAF_DOMAIN: &str = "scdb 2024 state leaf bundle v1";
