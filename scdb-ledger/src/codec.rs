//! Commitment wire codec.
//!
//! Every payload starts with a 4-byte tag naming its kind, followed by a slot
//! byte, a 32-byte hash and a code byte. Votes end there; proposals use the code
//! byte as a schema version and carry a borsh body.

use borsh::BorshDeserialize;
use rayon::prelude::*;

use scdb_crypto::hash::blake3_hash_domain;
use scdb_types::bundle::BundlePayout;
use scdb_types::constants::*;
use scdb_types::params::ConsensusParams;
use scdb_types::primitives::{Hash, Height, SlotId};
use scdb_types::sidechain::SidechainMetadata;
use scdb_types::vote::{Commitment, Vote, VoteKind, VoteTarget};

use crate::error::LedgerError;

const CODE_ACCEPT: u8 = 0;
const CODE_ABSTAIN: u8 = 1;
const CODE_REJECT: u8 = 2;

/// Identity of a sidechain proposal: the domain-separated hash of its borsh-encoded metadata.
pub fn proposal_hash(metadata: &SidechainMetadata) -> Result<Hash, LedgerError> {
    let body = borsh::to_vec(metadata).map_err(|e| LedgerError::malformed(e.to_string()))?;
    Ok(blake3_hash_domain(PROPOSAL_HASH_DOMAIN, &body))
}

/// Decode one payload. Votes are stamped with the height of the block carrying them.
pub fn decode_payload(
    payload: &[u8],
    height: Height,
    params: &ConsensusParams,
) -> Result<Commitment, LedgerError> {
    if payload.len() < VOTE_PAYLOAD_LEN {
        return Err(LedgerError::malformed(format!(
            "payload is {} bytes, minimum is {}",
            payload.len(),
            VOTE_PAYLOAD_LEN
        )));
    }
    if payload.len() > MAX_COMMITMENT_SIZE {
        return Err(LedgerError::malformed(format!(
            "payload is {} bytes, maximum is {}",
            payload.len(),
            MAX_COMMITMENT_SIZE
        )));
    }

    let tag: [u8; TAG_LEN] = [payload[0], payload[1], payload[2], payload[3]];
    let slot = payload[TAG_LEN];
    if u16::from(slot) >= params.slot_count {
        return Err(LedgerError::malformed(format!(
            "slot {} out of range (slot count {})",
            slot, params.slot_count
        )));
    }
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&payload[TAG_LEN + 1..TAG_LEN + 33]);
    let code = payload[TAG_LEN + 33];
    let body = &payload[VOTE_PAYLOAD_LEN..];

    match tag {
        PROPOSE_SIDECHAIN_TAG => decode_sidechain_proposal(slot, hash, code, body),
        PROPOSE_BUNDLE_TAG => decode_bundle_proposal(slot, hash, code, body),
        ACK_SIDECHAIN_TAG => {
            expect_no_body(body)?;
            let kind = match code {
                CODE_ACCEPT => VoteKind::Ack,
                CODE_ABSTAIN => VoteKind::Abstain,
                CODE_REJECT => VoteKind::Nack,
                other => return Err(LedgerError::malformed(format!("unknown ack code {}", other))),
            };
            Ok(Commitment::Vote(Vote {
                target: VoteTarget::Sidechain {
                    slot,
                    proposal_hash: hash,
                },
                kind,
                height,
            }))
        }
        BUNDLE_VOTE_TAG => {
            expect_no_body(body)?;
            let kind = match code {
                CODE_ACCEPT => VoteKind::Upvote,
                CODE_ABSTAIN => VoteKind::Abstain,
                CODE_REJECT => VoteKind::Downvote,
                other => {
                    return Err(LedgerError::malformed(format!(
                        "unknown bundle vote code {}",
                        other
                    )))
                }
            };
            Ok(Commitment::Vote(Vote {
                target: VoteTarget::Bundle {
                    slot,
                    bundle_hash: hash,
                },
                kind,
                height,
            }))
        }
        other => Err(LedgerError::malformed(format!(
            "unrecognized tag {}",
            hex_tag(&other)
        ))),
    }
}

/// Decode every payload of a block in parallel, preserving declared order.
pub fn decode_block(
    payloads: &[Vec<u8>],
    height: Height,
    params: &ConsensusParams,
) -> Vec<Result<Commitment, LedgerError>> {
    payloads
        .par_iter()
        .map(|payload| decode_payload(payload, height, params))
        .collect()
}

fn decode_sidechain_proposal(
    slot: SlotId,
    hash: Hash,
    version: u8,
    body: &[u8],
) -> Result<Commitment, LedgerError> {
    check_schema_version(version)?;
    let metadata = SidechainMetadata::try_from_slice(body)
        .map_err(|e| LedgerError::malformed(format!("bad sidechain metadata: {}", e)))?;
    check_metadata(&metadata)?;
    let computed = blake3_hash_domain(PROPOSAL_HASH_DOMAIN, body);
    if computed != hash {
        return Err(LedgerError::malformed(
            "proposal hash does not match metadata",
        ));
    }
    Ok(Commitment::ProposeSidechain {
        slot,
        proposal_hash: hash,
        metadata,
    })
}

fn decode_bundle_proposal(
    slot: SlotId,
    hash: Hash,
    version: u8,
    body: &[u8],
) -> Result<Commitment, LedgerError> {
    check_schema_version(version)?;
    let payout = BundlePayout::try_from_slice(body)
        .map_err(|e| LedgerError::malformed(format!("bad bundle payout: {}", e)))?;
    Ok(Commitment::ProposeBundle {
        slot,
        bundle_hash: hash,
        payout,
    })
}

fn check_schema_version(version: u8) -> Result<(), LedgerError> {
    if version != COMMITMENT_SCHEMA_VERSION {
        return Err(LedgerError::malformed(format!(
            "unsupported schema version {}",
            version
        )));
    }
    Ok(())
}

fn check_metadata(metadata: &SidechainMetadata) -> Result<(), LedgerError> {
    if metadata.title.is_empty() || metadata.title.len() > MAX_TITLE_LEN {
        return Err(LedgerError::malformed(format!(
            "title length {} outside 1..={}",
            metadata.title.len(),
            MAX_TITLE_LEN
        )));
    }
    if metadata.description.len() > MAX_DESCRIPTION_LEN {
        return Err(LedgerError::malformed(format!(
            "description length {} exceeds {}",
            metadata.description.len(),
            MAX_DESCRIPTION_LEN
        )));
    }
    Ok(())
}

fn expect_no_body(body: &[u8]) -> Result<(), LedgerError> {
    if !body.is_empty() {
        return Err(LedgerError::malformed(format!(
            "vote payload has {} trailing bytes",
            body.len()
        )));
    }
    Ok(())
}

fn hex_tag(tag: &[u8; TAG_LEN]) -> String {
    tag.iter().map(|b| format!("{:02x}", b)).collect()
}

// ─── Encoders ────────────────────────────────────────────────────────────────

fn header(tag: [u8; TAG_LEN], slot: SlotId, hash: &Hash, code: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(VOTE_PAYLOAD_LEN);
    out.extend_from_slice(&tag);
    out.push(slot);
    out.extend_from_slice(hash);
    out.push(code);
    out
}

/// Encode a sidechain proposal; the embedded hash is derived from the metadata.
pub fn encode_sidechain_proposal(
    slot: SlotId,
    metadata: &SidechainMetadata,
) -> Result<Vec<u8>, LedgerError> {
    check_metadata(metadata)?;
    let body = borsh::to_vec(metadata).map_err(|e| LedgerError::malformed(e.to_string()))?;
    let hash = blake3_hash_domain(PROPOSAL_HASH_DOMAIN, &body);
    let mut out = header(PROPOSE_SIDECHAIN_TAG, slot, &hash, COMMITMENT_SCHEMA_VERSION);
    out.extend_from_slice(&body);
    if out.len() > MAX_COMMITMENT_SIZE {
        return Err(LedgerError::malformed("encoded proposal exceeds size limit"));
    }
    Ok(out)
}

/// Encode an ack, nack or abstain on a sidechain proposal.
pub fn encode_ack(
    slot: SlotId,
    proposal_hash: &Hash,
    kind: VoteKind,
) -> Result<Vec<u8>, LedgerError> {
    let code = match kind {
        VoteKind::Ack => CODE_ACCEPT,
        VoteKind::Abstain => CODE_ABSTAIN,
        VoteKind::Nack => CODE_REJECT,
        other => {
            return Err(LedgerError::malformed(format!(
                "{:?} is not a sidechain vote",
                other
            )))
        }
    };
    Ok(header(ACK_SIDECHAIN_TAG, slot, proposal_hash, code))
}

/// Encode a withdrawal bundle proposal.
pub fn encode_bundle_proposal(
    slot: SlotId,
    bundle_hash: &Hash,
    payout: &BundlePayout,
) -> Result<Vec<u8>, LedgerError> {
    let body = borsh::to_vec(payout).map_err(|e| LedgerError::malformed(e.to_string()))?;
    let mut out = header(PROPOSE_BUNDLE_TAG, slot, bundle_hash, COMMITMENT_SCHEMA_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Encode an upvote, downvote or abstain on a withdrawal bundle.
pub fn encode_bundle_vote(
    slot: SlotId,
    bundle_hash: &Hash,
    kind: VoteKind,
) -> Result<Vec<u8>, LedgerError> {
    let code = match kind {
        VoteKind::Upvote => CODE_ACCEPT,
        VoteKind::Abstain => CODE_ABSTAIN,
        VoteKind::Downvote => CODE_REJECT,
        other => {
            return Err(LedgerError::malformed(format!(
                "{:?} is not a bundle vote",
                other
            )))
        }
    };
    Ok(header(BUNDLE_VOTE_TAG, slot, bundle_hash, code))
}
