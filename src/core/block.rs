//! # Block
//!
//! Block structure and operations: proof-of-work driven construction, the
//! Merkle commitment over its transactions, and serialization.

use crate::core::merkle::MerkleTree;
use crate::core::proof_of_work::ProofOfWork;
use crate::core::transaction::Transaction;
use crate::error::{CoinError, Result};
use serde::{Deserialize, Serialize};

/// `timestamp`: creation time in seconds since the epoch.
/// `prev_block_hash`: hash of the previous block; empty for the genesis block,
/// which is how the iterator knows where the chain ends.
/// `hash`: proof-of-work hash of this block.
/// `nonce`: the solution found by the nonce search.
/// `height`: position in the chain, genesis is 0.
#[derive(Clone, Serialize, Deserialize)]
pub struct BlockHeader {
    timestamp: i64,
    prev_block_hash: Vec<u8>,
    hash: Vec<u8>,
    nonce: i64,
    height: usize,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Block {
    header: BlockHeader,
    transactions: Vec<Transaction>,
}

impl Block {
    /// Assembles a block and runs the proof-of-work search to fill in its
    /// nonce and hash. Blocking for the duration of the search.
    pub fn new_block(
        prev_block_hash: Vec<u8>,
        transactions: &[Transaction],
        height: usize,
    ) -> Result<Block> {
        let header = BlockHeader {
            timestamp: crate::current_timestamp(),
            prev_block_hash,
            hash: vec![],
            nonce: 0,
            height,
        };
        let mut block = Block {
            header,
            transactions: transactions.to_vec(),
        };
        let pow = ProofOfWork::new_proof_of_work(block.clone());
        let (nonce, hash) = pow.run()?;
        block.header.nonce = nonce;
        block.header.hash = hash;
        Ok(block)
    }

    pub fn generate_genesis_block(transaction: &Transaction) -> Result<Block> {
        Block::new_block(vec![], &[transaction.clone()], 0)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| CoinError::BlockDeserialization(e.to_string()))
            .map(|(block, _)| block)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CoinError::BlockSerialization(e.to_string()))
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_prev_block_hash(&self) -> &[u8] {
        self.header.prev_block_hash.as_slice()
    }

    pub fn get_hash(&self) -> &[u8] {
        self.header.hash.as_slice()
    }

    pub fn get_hash_bytes(&self) -> Vec<u8> {
        self.header.hash.clone()
    }

    pub fn get_timestamp(&self) -> i64 {
        self.header.timestamp
    }

    pub fn get_height(&self) -> usize {
        self.header.height
    }

    pub fn get_nonce(&self) -> i64 {
        self.header.nonce
    }

    /// The Merkle root over the serialized transactions, the commitment the
    /// proof-of-work input carries.
    pub fn hash_transactions(&self) -> Result<Vec<u8>> {
        let mut tx_bytes = vec![];
        for transaction in &self.transactions {
            tx_bytes.push(transaction.serialize()?);
        }
        let tree = MerkleTree::new(tx_bytes.as_slice());
        Ok(tree.root_hash().to_vec())
    }

    #[cfg(test)]
    pub(crate) fn set_nonce(&mut self, nonce: i64) {
        self.header.nonce = nonce;
    }
}
