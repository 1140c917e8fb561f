use borsh::{BorshDeserialize, BorshSerialize};
use scdb_types::primitives::Hash;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hash::DomainHasher;

const LEAF_PREFIX: u8 = 0x00;
const INTERNAL_PREFIX: u8 = 0x01;

/// Root of a tree with no leaves.
pub const EMPTY_HASH: Hash = [0u8; 32];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MerkleError {
    #[error("merkle proof verification failed")]
    ProofInvalid,

    #[error("leaf index {index} out of range for {count} leaves")]
    IndexOutOfRange { index: u64, count: u64 },
}

/// A proof that a leaf sits at `leaf_index` in a tree of `leaf_count` leaves.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct MerkleProof {
    pub leaf_index: u64,
    pub leaf_count: u64,
    /// The leaf value (before leaf hashing).
    pub leaf: Hash,
    /// Sibling hashes from the bottom level upward. Levels where the node was
    /// promoted without a sibling contribute nothing.
    pub siblings: Vec<Hash>,
}

/// Ordered binary Merkle tree over a fixed list of leaf values.
///
/// Leaf order is part of consensus: callers must supply leaves in a canonical
/// order. An unpaired node at the end of a level is promoted unchanged, so no
/// node is ever hashed with itself.
pub struct StateTree {
    /// levels[0] holds hashed leaves; the last level holds the root.
    levels: Vec<Vec<Hash>>,
    leaves: Vec<Hash>,
}

impl StateTree {
    /// Build a tree over the given leaf values.
    pub fn new(leaves: Vec<Hash>) -> Self {
        let mut levels = Vec::new();
        if !leaves.is_empty() {
            let mut level: Vec<Hash> = leaves.iter().map(hash_leaf).collect();
            while level.len() > 1 {
                let next = level
                    .chunks(2)
                    .map(|pair| match pair {
                        [left, right] => hash_internal(left, right),
                        [single] => *single,
                        _ => unreachable!("chunks(2) yields one or two items"),
                    })
                    .collect();
                levels.push(level);
                level = next;
            }
            levels.push(level);
        }
        Self { levels, leaves }
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Get the root hash.
    pub fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|top| top.first().copied())
            .unwrap_or(EMPTY_HASH)
    }

    /// Generate an inclusion proof for the leaf at `index`.
    pub fn prove(&self, index: usize) -> Result<MerkleProof, MerkleError> {
        if index >= self.leaves.len() {
            return Err(MerkleError::IndexOutOfRange {
                index: index as u64,
                count: self.leaves.len() as u64,
            });
        }

        let mut siblings = Vec::new();
        let mut idx = index;
        // Every level except the root contributes at most one sibling.
        for level in &self.levels[..self.levels.len() - 1] {
            let sibling = if idx % 2 == 1 {
                Some(idx - 1)
            } else if idx + 1 < level.len() {
                Some(idx + 1)
            } else {
                None
            };
            if let Some(s) = sibling {
                siblings.push(level[s]);
            }
            idx /= 2;
        }

        Ok(MerkleProof {
            leaf_index: index as u64,
            leaf_count: self.leaves.len() as u64,
            leaf: self.leaves[index],
            siblings,
        })
    }

    /// Verify a Merkle proof against a given root.
    pub fn verify_proof(root: &Hash, proof: &MerkleProof) -> Result<(), MerkleError> {
        if proof.leaf_index >= proof.leaf_count {
            return Err(MerkleError::IndexOutOfRange {
                index: proof.leaf_index,
                count: proof.leaf_count,
            });
        }

        let mut current = hash_leaf(&proof.leaf);
        let mut idx = proof.leaf_index;
        let mut width = proof.leaf_count;
        let mut siblings = proof.siblings.iter();

        while width > 1 {
            if idx % 2 == 1 {
                let left = siblings.next().ok_or(MerkleError::ProofInvalid)?;
                current = hash_internal(left, &current);
            } else if idx + 1 < width {
                let right = siblings.next().ok_or(MerkleError::ProofInvalid)?;
                current = hash_internal(&current, right);
            }
            idx /= 2;
            width = width.div_ceil(2);
        }

        if siblings.next().is_some() || current != *root {
            return Err(MerkleError::ProofInvalid);
        }
        Ok(())
    }
}

// ─── Hash helpers ────────────────────────────────────────────────────────────

pub fn hash_leaf(value: &Hash) -> Hash {
    DomainHasher::tagged(LEAF_PREFIX).bytes(value).finish()
}

pub fn hash_internal(left: &Hash, right: &Hash) -> Hash {
    DomainHasher::tagged(INTERNAL_PREFIX)
        .bytes(left)
        .bytes(right)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::blake3_hash;
    use proptest::prelude::*;

    fn leaves(n: u8) -> Vec<Hash> {
        (0..n).map(|i| blake3_hash(&[i])).collect()
    }

    #[test]
    fn test_empty_tree() {
        let tree = StateTree::new(vec![]);
        assert!(tree.is_empty());
        assert_eq!(tree.root(), EMPTY_HASH);
        assert!(tree.prove(0).is_err());
    }

    #[test]
    fn test_single_leaf_root() {
        let leaf = blake3_hash(b"ctip");
        let tree = StateTree::new(vec![leaf]);
        assert_eq!(tree.root(), hash_leaf(&leaf));
    }

    #[test]
    fn test_odd_node_is_promoted() {
        let l = leaves(3);
        let tree = StateTree::new(l.clone());
        let left = hash_internal(&hash_leaf(&l[0]), &hash_leaf(&l[1]));
        let expected = hash_internal(&left, &hash_leaf(&l[2]));
        assert_eq!(tree.root(), expected);
    }

    #[test]
    fn test_order_matters() {
        let mut l = leaves(4);
        let a = StateTree::new(l.clone()).root();
        l.swap(0, 1);
        let b = StateTree::new(l).root();
        assert_ne!(a, b);
    }

    #[test]
    fn test_proof_invalid_root() {
        let tree = StateTree::new(leaves(5));
        let proof = tree.prove(2).unwrap();
        let wrong_root = blake3_hash(b"wrong");
        assert_eq!(
            StateTree::verify_proof(&wrong_root, &proof),
            Err(MerkleError::ProofInvalid)
        );
    }

    #[test]
    fn test_proof_with_extra_sibling_rejected() {
        let tree = StateTree::new(leaves(4));
        let mut proof = tree.prove(1).unwrap();
        proof.siblings.push([0u8; 32]);
        assert!(StateTree::verify_proof(&tree.root(), &proof).is_err());
    }

    #[test]
    fn test_proof_wrong_leaf_rejected() {
        let tree = StateTree::new(leaves(6));
        let mut proof = tree.prove(4).unwrap();
        proof.leaf = [0xffu8; 32];
        assert!(StateTree::verify_proof(&tree.root(), &proof).is_err());
    }

    proptest! {
        #[test]
        fn prop_every_leaf_proves(n in 1u8..40, pick in 0u8..40) {
            let tree = StateTree::new(leaves(n));
            let index = (pick % n) as usize;
            let proof = tree.prove(index).unwrap();
            prop_assert!(StateTree::verify_proof(&tree.root(), &proof).is_ok());
        }
    }
}
