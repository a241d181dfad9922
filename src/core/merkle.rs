//! # Merkle tree
//!
//! Binary hash tree committing to a block's transaction set in a fixed-size
//! field. Leaves are the serialized transactions, not their ids.

use crate::util::sha256_digest;

#[derive(Clone)]
pub struct MerkleNode {
    pub left: Option<Box<MerkleNode>>,
    pub right: Option<Box<MerkleNode>>,
    pub data: Vec<u8>,
}

pub struct MerkleTree {
    root: MerkleNode,
}

impl MerkleNode {
    /// A leaf hashes its payload; an interior node hashes the concatenation of
    /// its children's hashes.
    fn new(left: Option<MerkleNode>, right: Option<MerkleNode>, data: &[u8]) -> MerkleNode {
        let data = match (&left, &right) {
            (None, None) => sha256_digest(data),
            (Some(l), Some(r)) => {
                let mut combined = l.data.clone();
                combined.extend_from_slice(r.data.as_slice());
                sha256_digest(combined.as_slice())
            }
            // Levels are padded to even length before pairing.
            _ => unreachable!("merkle nodes are paired"),
        };
        MerkleNode {
            left: left.map(Box::new),
            right: right.map(Box::new),
            data,
        }
    }

    pub fn get_data(&self) -> &[u8] {
        self.data.as_slice()
    }
}

impl MerkleTree {
    /// Builds the tree bottom-up. A level of odd length duplicates its last
    /// node before pairing; a single-leaf tree's root is the leaf's hash.
    pub fn new(items: &[Vec<u8>]) -> MerkleTree {
        let mut nodes: Vec<MerkleNode> = items
            .iter()
            .map(|item| MerkleNode::new(None, None, item.as_slice()))
            .collect();

        if nodes.is_empty() {
            nodes.push(MerkleNode::new(None, None, &[]));
        }

        while nodes.len() > 1 {
            if nodes.len() % 2 != 0 {
                let last = nodes.last().cloned().expect("non-empty level");
                nodes.push(last);
            }
            let mut level = vec![];
            for pair in nodes.chunks(2) {
                level.push(MerkleNode::new(
                    Some(pair[0].clone()),
                    Some(pair[1].clone()),
                    &[],
                ));
            }
            nodes = level;
        }

        MerkleTree {
            root: nodes.remove(0),
        }
    }

    pub fn root_hash(&self) -> &[u8] {
        self.root.get_data()
    }
}
