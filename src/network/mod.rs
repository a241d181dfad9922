// Declare and defines a module for the network layer
pub mod message;
pub mod message_handler;
pub mod operations;
pub mod server;

// Re-export the modules
pub use message::{COMMAND_LENGTH, OpType};
pub use message_handler::serve;
pub use server::Server;

/// Protocol version announced in the handshake. Exchanged but not branched on.
pub const NODE_VERSION: usize = 1;

/// Mempool size at which a miner node assembles a block.
pub const TRANSACTION_THRESHOLD: usize = 2;
