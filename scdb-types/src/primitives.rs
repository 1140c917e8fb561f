use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// 32-byte hash (BLAKE3 for ledger digests, opaque identity for proposals and bundles).
pub type Hash = [u8; 32];

/// Transaction id on the parent chain.
pub type Txid = [u8; 32];

/// Sidechain slot number (0–255).
pub type SlotId = u8;

/// Parent-chain block height.
pub type Height = u64;

/// Amount in base units (satoshis).
pub type Amount = u64;

/// Work score of a withdrawal bundle.
pub type WorkScore = u16;

/// The all-zero hash.
pub const ZERO_HASH: Hash = [0u8; 32];

/// A reference to a transaction output on the parent chain.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct OutPoint {
    pub txid: Txid,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Txid, vout: u32) -> Self {
        Self { txid, vout }
    }
}

impl std::fmt::Display for OutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", hex::encode(self.txid), self.vout)
    }
}

/// The most recently applied block.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct ChainTip {
    pub height: Height,
    pub block_hash: Hash,
}

/// Parse a hex string into a 32-byte hash.
pub fn parse_hash_hex(s: &str) -> Result<Hash, String> {
    let bytes = hex::decode(s.trim_start_matches("0x")).map_err(|e| format!("invalid hex: {}", e))?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| format!("expected 32 bytes, got {}", b.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outpoint_display() {
        let op = OutPoint::new([0xab; 32], 3);
        let s = op.to_string();
        assert!(s.starts_with("abab"));
        assert!(s.ends_with(":3"));
    }

    #[test]
    fn test_parse_hash_hex() {
        let h = [7u8; 32];
        assert_eq!(parse_hash_hex(&hex::encode(h)).unwrap(), h);
        assert_eq!(parse_hash_hex(&format!("0x{}", hex::encode(h))).unwrap(), h);
        assert!(parse_hash_hex("abcd").is_err());
        assert!(parse_hash_hex("zz").is_err());
    }

    #[test]
    fn test_outpoint_ordering() {
        let a = OutPoint::new([1u8; 32], 0);
        let b = OutPoint::new([1u8; 32], 1);
        let c = OutPoint::new([2u8; 32], 0);
        assert!(a < b);
        assert!(b < c);
    }
}
