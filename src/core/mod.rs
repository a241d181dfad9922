// Declare and defines a module for the core layer
pub mod block;
pub mod memory_pool;
pub mod merkle;
pub mod proof_of_work;
pub mod transaction;

// Re-export the modules
pub use block::Block;
pub use memory_pool::BlockInTransit;
pub use memory_pool::MemoryPool;
pub use merkle::MerkleTree;
pub use proof_of_work::ProofOfWork;
pub use transaction::{REWARD, TXInput, TXOutput, TXOutputs, Transaction};
