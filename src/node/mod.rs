// Declare and defines a module for the node layer
pub mod context;
pub mod miner;
pub mod peers;

// Re-export the modules
pub use context::NodeContext;
pub use miner::mine_transactions;
pub use peers::KnownNodes;
