// Declare and defines a module for the wallet layer
pub mod wallet;
pub mod wallets;

// Re-export the modules
pub use wallet::{
    ADDRESS_CHECK_SUM_LEN, Wallet, convert_address, get_pub_key_hash, hash_pub_key,
    validate_address,
};
pub use wallets::Wallets;
