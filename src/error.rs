use thiserror::Error;

#[derive(Clone, Error, Debug)]
pub enum CoinError {
    // Recoverable errors
    #[error("Blockchain not found error: {0}")]
    BlockchainNotFound(String),

    #[error("NODE_ID env is not available")]
    NodeIdMissing,

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    // Unrecoverable errors
    #[error("Blockchain already exists at {0}")]
    BlockchainAlreadyExists(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Not enough funds")]
    NotEnoughFunds,

    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("Transaction not found error: {0}")]
    TransactionNotFound(String),

    #[error("Block serialization error: {0}")]
    BlockSerialization(String),
    #[error("Block deserialization error: {0}")]
    BlockDeserialization(String),

    #[error("Transaction serialization error: {0}")]
    TransactionSerialization(String),
    #[error("Transaction deserialization error: {0}")]
    TransactionDeserialization(String),

    #[error("Transaction id hex decoding error: {0}")]
    TransactionIdHexDecoding(String),

    #[error("Transaction signature error: {0}")]
    TransactionSignature(String),

    #[error("Address encoding error: {0}")]
    AddressEncoding(String),
    #[error("Address decoding error: {0}")]
    AddressDecoding(String),

    #[error("Wallet key pair error: {0}")]
    WalletKeyPair(String),
    #[error("Wallet not found for address: {0}")]
    WalletNotFound(String),

    #[error("Saving wallets error: {0}")]
    SavingWallets(String),
    #[error("Wallets file read error: {0}")]
    WalletsFileRead(String),
    #[error("Wallets serialization error: {0}")]
    WalletsSerialization(String),
    #[error("Wallets deserialization error: {0}")]
    WalletsDeserialization(String),

    #[error("Miner address is not configured")]
    MinerAddressMissing,

    #[error("UTXO not found error: {0}")]
    UtxoNotFound(String),

    // Store I/O errors
    #[error("Store connection error: {0}")]
    StoreConnection(String),
    #[error("Store read error: {0}")]
    StoreRead(String),
    #[error("Store write error: {0}")]
    StoreWrite(String),
    #[error("Chain tip error: {0}")]
    ChainTip(String),

    #[error("Poisoned lock error: {0}")]
    PoisonedLock(String),
}

pub type Result<T> = std::result::Result<T, CoinError>;
