//! Deterministic binary Merkle tree over claim leaves.
//!
//! Leaves are sorted by address, hashed with [`Leaf::hash`] and paired
//! bottom-up with [`hash_pair`]. A node without a sibling is carried to the
//! next level unchanged.

use tracing::debug;

use crate::common::{hash_pair, hex_encode, parse_hash, Hash};
use crate::error::{Error, Result};
use crate::leaf::Leaf;
use crate::normalize::normalize_address;

/// Immutable tree, stored level by level from the leaf hashes up to the root.
#[derive(Debug, Clone)]
pub struct MerkleTree {
    leaves: Vec<Leaf>,
    levels: Vec<Vec<Hash>>,
}

impl MerkleTree {
    /// Builds the tree from an unordered set of leaves.
    ///
    /// Leaves are sorted by address first, so any permutation of the same set
    /// yields the same root. An address repeated with an identical value is
    /// collapsed into one leaf.
    ///
    /// # Errors
    /// * `EmptySnapshot` when `leaves` is empty
    /// * `DuplicateAddress` when an address carries two different values
    /// * `InvalidRecord` when a value does not fit `uint256`
    pub fn build(mut leaves: Vec<Leaf>) -> Result<Self> {
        if leaves.is_empty() {
            return Err(Error::EmptySnapshot { rejected: 0 });
        }

        leaves.sort_by(|a, b| a.address.cmp(&b.address).then_with(|| a.value.cmp(&b.value)));

        for pair in leaves.windows(2) {
            if pair[0].address == pair[1].address && pair[0].value != pair[1].value {
                return Err(Error::DuplicateAddress {
                    address: pair[0].address.clone(),
                    first: pair[0].value.clone(),
                    second: pair[1].value.clone(),
                });
            }
        }
        let before = leaves.len();
        leaves.dedup();
        if leaves.len() != before {
            debug!("Collapsed {} repeated leaves", before - leaves.len());
        }

        let hashes = leaves.iter().map(Leaf::hash).collect::<Result<Vec<_>>>()?;
        let levels = build_levels(hashes);

        Ok(Self { leaves, levels })
    }

    pub fn root(&self) -> Hash {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or([0u8; 32])
    }

    pub fn root_hex(&self) -> String {
        hex_encode(self.root())
    }

    /// Leaves in canonical (address) order
    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Number of levels above the leaves
    pub fn depth(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    /// Index of `address` in canonical order.
    pub fn position(&self, address: &str) -> Option<usize> {
        self.leaves
            .binary_search_by(|leaf| leaf.address.as_str().cmp(address))
            .ok()
    }

    /// Generates the inclusion proof for the leaf at `leaf_index`.
    ///
    /// # Returns
    /// Sibling hashes from the leaf level upwards. Levels where the node was
    /// promoted without a sibling contribute nothing.
    pub fn proof(&self, leaf_index: usize) -> Result<Vec<Hash>> {
        if leaf_index >= self.leaves.len() {
            return Err(Error::InvalidRecord(format!(
                "leaf index {} is out of bounds for tree with {} leaves",
                leaf_index,
                self.leaves.len()
            )));
        }

        let mut proof = Vec::with_capacity(self.depth());
        let mut current_index = leaf_index;

        for level in &self.levels[..self.levels.len() - 1] {
            let sibling_index = current_index ^ 1;
            if sibling_index < level.len() {
                proof.push(level[sibling_index]);
            }
            current_index /= 2;
        }

        Ok(proof)
    }

    /// Proofs for every leaf, in canonical order.
    pub fn proofs(&self) -> Vec<Vec<Hash>> {
        (0..self.leaves.len())
            .map(|index| self.proof(index).unwrap_or_default())
            .collect()
    }
}

fn build_levels(leaf_hashes: Vec<Hash>) -> Vec<Vec<Hash>> {
    let mut levels = vec![leaf_hashes];

    while levels[levels.len() - 1].len() > 1 {
        let next_level = levels[levels.len() - 1]
            .chunks(2)
            .map(|chunk| match chunk {
                [left, right] => hash_pair(*left, *right),
                _ => chunk[0],
            })
            .collect();
        levels.push(next_level);
    }

    levels
}

/// Folds `proof` onto `leaf` and compares the result with `root`.
pub fn verify_proof(root: &Hash, leaf: &Hash, proof: &[Hash]) -> bool {
    let computed = proof
        .iter()
        .fold(*leaf, |current, sibling| hash_pair(current, *sibling));
    computed == *root
}

/// Checks a claim as it travels over the wire: hex root, raw address and
/// value, hex proof. The address is normalized the same way as snapshot rows.
///
/// Returns `Ok(false)` for a well-formed claim that does not verify and an
/// error when one of the hashes cannot be parsed.
pub fn verify_claim(root: &str, address: &str, value: &str, proof: &[String]) -> Result<bool> {
    let root = parse_hash(root)?;
    let proof = proof
        .iter()
        .map(|node| parse_hash(node))
        .collect::<Result<Vec<_>>>()?;
    let Some(address) = normalize_address(address) else {
        return Ok(false);
    };
    let leaf = match Leaf::new(address, value).hash() {
        Ok(hash) => hash,
        Err(_) => return Ok(false),
    };
    Ok(verify_proof(&root, &leaf, &proof))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<Leaf> {
        (0..n)
            .map(|i| Leaf::new(format!("addr{:03}", i), format!("{}", (i + 1) * 100)))
            .collect()
    }

    #[test]
    fn test_empty_tree_rejected() {
        assert!(matches!(
            MerkleTree::build(Vec::new()),
            Err(Error::EmptySnapshot { .. })
        ));
    }

    #[test]
    fn test_single_leaf_root_is_leaf_hash() {
        let leaf = Leaf::new("solo", "5");
        let tree = MerkleTree::build(vec![leaf.clone()]).unwrap();
        assert_eq!(tree.root(), leaf.hash().unwrap());
        assert!(tree.proof(0).unwrap().is_empty());
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn test_two_leaf_root() {
        let a = Leaf::new("addr1", "100");
        let b = Leaf::new("addr2", "250");
        let tree = MerkleTree::build(vec![b.clone(), a.clone()]).unwrap();
        let expected = hash_pair(a.hash().unwrap(), b.hash().unwrap());
        assert_eq!(tree.root(), expected);
        assert_eq!(tree.proof(0).unwrap(), vec![b.hash().unwrap()]);
        assert_eq!(tree.proof(1).unwrap(), vec![a.hash().unwrap()]);
    }

    #[test]
    fn test_input_order_does_not_change_root() {
        let forward = leaves(7);
        let mut reversed = forward.clone();
        reversed.reverse();
        let mut rotated = forward.clone();
        rotated.rotate_left(3);

        let root = MerkleTree::build(forward).unwrap().root();
        assert_eq!(MerkleTree::build(reversed).unwrap().root(), root);
        assert_eq!(MerkleTree::build(rotated).unwrap().root(), root);
    }

    #[test]
    fn test_leaves_sorted_by_address() {
        let tree = MerkleTree::build(vec![
            Leaf::new("c", "1"),
            Leaf::new("a", "2"),
            Leaf::new("b", "3"),
        ])
        .unwrap();
        let order: Vec<_> = tree.leaves().iter().map(|l| l.address.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(tree.position("b"), Some(1));
        assert_eq!(tree.position("z"), None);
    }

    #[test]
    fn test_duplicate_address_with_different_values() {
        let result = MerkleTree::build(vec![
            Leaf::new("addr1", "100"),
            Leaf::new("addr2", "5"),
            Leaf::new("addr1", "200"),
        ]);
        match result {
            Err(Error::DuplicateAddress { address, .. }) => assert_eq!(address, "addr1"),
            other => panic!("expected DuplicateAddress, got {:?}", other),
        }
    }

    #[test]
    fn test_identical_duplicates_collapse() {
        let tree = MerkleTree::build(vec![
            Leaf::new("addr1", "100"),
            Leaf::new("addr1", "100"),
            Leaf::new("addr2", "5"),
        ])
        .unwrap();
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_odd_leaf_promoted_not_duplicated() {
        let three = leaves(3);
        let tree = MerkleTree::build(three.clone()).unwrap();
        let h: Vec<Hash> = three.iter().map(|l| l.hash().unwrap()).collect();

        let expected = hash_pair(hash_pair(h[0], h[1]), h[2]);
        assert_eq!(tree.root(), expected);

        let two = MerkleTree::build(three[..2].to_vec()).unwrap();
        assert_ne!(tree.root(), two.root());

        let duplicated = hash_pair(hash_pair(h[0], h[1]), hash_pair(h[2], h[2]));
        assert_ne!(tree.root(), duplicated);

        // The promoted leaf skips the level where it had no sibling
        assert_eq!(tree.proof(2).unwrap(), vec![hash_pair(h[0], h[1])]);
        assert_eq!(tree.proof(0).unwrap().len(), 2);
    }

    #[test]
    fn test_every_proof_verifies() {
        for n in [1, 2, 3, 4, 5, 8, 9, 17] {
            let tree = MerkleTree::build(leaves(n)).unwrap();
            let root = tree.root();
            for (index, proof) in tree.proofs().iter().enumerate() {
                let leaf = tree.leaves()[index].hash().unwrap();
                assert!(verify_proof(&root, &leaf, proof), "n={} index={}", n, index);
                assert!(proof.len() <= tree.depth());
            }
        }
    }

    #[test]
    fn test_proof_length_power_of_two() {
        let tree = MerkleTree::build(leaves(8)).unwrap();
        assert_eq!(tree.depth(), 3);
        assert!(tree.proofs().iter().all(|p| p.len() == 3));
    }

    #[test]
    fn test_proof_out_of_bounds() {
        let tree = MerkleTree::build(leaves(2)).unwrap();
        assert!(tree.proof(5).is_err());
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let tree = MerkleTree::build(leaves(5)).unwrap();
        let root = tree.root();
        let leaf = tree.leaves()[1].hash().unwrap();
        let proof = tree.proof(1).unwrap();

        let mut bad_root = root;
        bad_root[0] ^= 1;
        assert!(!verify_proof(&bad_root, &leaf, &proof));

        let mut bad_proof = proof.clone();
        bad_proof[0][31] ^= 0x80;
        assert!(!verify_proof(&root, &leaf, &bad_proof));

        assert!(!verify_proof(&root, &leaf, &proof[..proof.len() - 1]));
    }

    #[test]
    fn test_verify_claim_from_hex() {
        let tree = MerkleTree::build(leaves(4)).unwrap();
        let proof: Vec<String> = tree.proof(2).unwrap().iter().map(hex_encode).collect();
        let leaf = &tree.leaves()[2];

        let upper = leaf.address.to_uppercase();
        assert!(verify_claim(&tree.root_hex(), &upper, &leaf.value, &proof).unwrap());
        assert!(!verify_claim(&tree.root_hex(), &leaf.address, "1", &proof).unwrap());
        assert!(!verify_claim(&tree.root_hex(), "", &leaf.value, &proof).unwrap());
        assert!(!verify_claim(&tree.root_hex(), &leaf.address, "x", &proof).unwrap());
        assert!(verify_claim("0x12", &leaf.address, &leaf.value, &proof).is_err());
    }
}
