use super::block::Block;
use crate::error::Result;
use data_encoding::HEXLOWER;
use num_bigint::{BigInt, Sign};
use std::ops::ShlAssign;
use tracing::debug;

pub struct ProofOfWork {
    block: Block,
    target: BigInt,
}

/// Difficulty: a valid block hash, read as a big-endian integer, must be below
/// `1 << (256 - DIFFICULTY)`.
pub const DIFFICULTY: i64 = 12;

const MAX_NONCE: i64 = i64::MAX;

impl ProofOfWork {
    pub fn new_proof_of_work(block: Block) -> ProofOfWork {
        let mut target = BigInt::from(1);
        target.shl_assign(256 - DIFFICULTY as usize);
        ProofOfWork { block, target }
    }

    /// The hashing input for a nonce: previous block hash, Merkle root of the
    /// transactions, then timestamp, difficulty and nonce as big-endian bytes.
    fn prepare_data(&self, nonce: i64) -> Result<Vec<u8>> {
        let mut data_bytes = vec![];
        data_bytes.extend(self.block.get_prev_block_hash());
        data_bytes.extend(self.block.hash_transactions()?);
        data_bytes.extend(self.block.get_timestamp().to_be_bytes());
        data_bytes.extend(DIFFICULTY.to_be_bytes());
        data_bytes.extend(nonce.to_be_bytes());
        Ok(data_bytes)
    }

    /// Counts nonces up from zero until the hash drops below the target,
    /// returning the first solution. Deterministic for a given block.
    pub fn run(&self) -> Result<(i64, Vec<u8>)> {
        let mut nonce = 0;
        let mut hash = Vec::new();
        debug!("Mining the block");
        while nonce < MAX_NONCE {
            let data = self.prepare_data(nonce)?;
            hash = crate::sha256_digest(data.as_slice());
            let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());

            if hash_int < self.target {
                debug!("{}", HEXLOWER.encode(hash.as_slice()));
                break;
            } else {
                nonce += 1;
            }
        }
        Ok((nonce, hash))
    }

    /// Recomputes the hash once with the stored nonce and checks the target
    /// inequality.
    pub fn validate(&self) -> Result<bool> {
        let data = self.prepare_data(self.block.get_nonce())?;
        let hash = crate::sha256_digest(data.as_slice());
        let hash_int = BigInt::from_bytes_be(Sign::Plus, hash.as_slice());
        Ok(hash_int < self.target)
    }
}
