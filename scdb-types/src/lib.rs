//! Shared type definitions for the sidechain activation and withdrawal ledger.
//!
//! Sidechain proposals, withdrawal bundles, CTIPs, votes, commitment records and
//! the consensus parameters every node of a network must agree on.

pub mod bundle;
pub mod constants;
pub mod ctip;
pub mod error;
pub mod params;
pub mod primitives;
pub mod record;
pub mod sidechain;
pub mod vote;

#[cfg(test)]
mod tests {
    use borsh::{BorshDeserialize, BorshSerialize};

    /// Helper: borsh round-trip test.
    fn borsh_roundtrip<T: BorshSerialize + BorshDeserialize + PartialEq + std::fmt::Debug>(
        value: &T,
    ) {
        let encoded = borsh::to_vec(value).expect("borsh serialize failed");
        let decoded = T::try_from_slice(&encoded).expect("borsh deserialize failed");
        assert_eq!(*value, decoded);
    }

    #[test]
    fn test_commitment_record_roundtrip() {
        use crate::bundle::*;
        use crate::ctip::Ctip;
        use crate::primitives::*;
        use crate::record::*;

        let bundle = WithdrawalBundle {
            slot: 3,
            bundle_hash: [4u8; 32],
            proposed_height: 200,
            deadline_height: 500,
            work_score: 17,
            payout: BundlePayout {
                outpoint: OutPoint::new([5u8; 32], 1),
                amount: 50_000,
            },
            status: BundleStatus::Pending,
            resolved_height: None,
        };
        let record = CommitmentRecord {
            height: 201,
            block_hash: [6u8; 32],
            state_root: [7u8; 32],
            undo: StateDiff {
                tip: Some(ChainTip {
                    height: 200,
                    block_hash: [8u8; 32],
                }),
                proposals: vec![],
                bundles: vec![([4u8; 32], Some(bundle))],
                ctips: vec![(
                    3,
                    Some(Ctip {
                        slot: 3,
                        outpoint: OutPoint::new([9u8; 32], 0),
                        amount: 1_000,
                    }),
                )],
            },
        };
        borsh_roundtrip(&record);
    }

    #[test]
    fn test_ledger_image_json_roundtrip() {
        use crate::record::LedgerImage;
        use crate::sidechain::*;

        let image = LedgerImage {
            tip: None,
            proposals: vec![SidechainProposal {
                slot: 0,
                proposal_hash: [1u8; 32],
                metadata: SidechainMetadata {
                    title: "thunder".to_string(),
                    description: "payments".to_string(),
                    version: 2,
                },
                proposed_height: 10,
                deadline_height: 36,
                ack_count: 13,
                status: ProposalStatus::Active,
                resolved_height: Some(22),
            }],
            bundles: vec![],
            ctips: vec![],
        };
        let json = serde_json::to_string(&image).unwrap();
        assert!(json.contains("thunder"));
        let back: LedgerImage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, image);
    }
}
