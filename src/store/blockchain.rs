//! # Chain store
//!
//! A persistent, crash-safe log of blocks keyed by hash. One sled keyspace
//! holds every serialized block, the `lh` pointer to the current tip, and the
//! `utxo-`-prefixed index maintained by the UTXO set. Multi-key writes go
//! through sled transactions so a block and the tip pointer always land
//! together.

use crate::core::block::Block;
use crate::core::transaction::Transaction;
use crate::error::{CoinError, Result};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Db;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

const TIP_KEY: &str = "lh";
const GENESIS_COINBASE_DATA: &str = "First Transaction from Genesis";

#[derive(Clone)]
pub struct Blockchain {
    db: Db,
    tip_hash: Arc<RwLock<Vec<u8>>>,
}

/// A store directory counts as existing once sled has written its data file.
pub fn store_exists(path: &Path) -> bool {
    path.join("db").is_file()
}

pub(crate) fn map_txn_err(e: TransactionError<CoinError>) -> CoinError {
    match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => CoinError::StoreWrite(e.to_string()),
    }
}

impl Blockchain {
    /// Creates a fresh store at `path` and mines the genesis block: a single
    /// coinbase paying the reward to `genesis_address`.
    pub async fn create(path: &Path, genesis_address: &str) -> Result<Blockchain> {
        if store_exists(path) {
            return Err(CoinError::BlockchainAlreadyExists(
                path.display().to_string(),
            ));
        }
        let db = sled::open(path).map_err(|e| CoinError::StoreConnection(e.to_string()))?;

        let coinbase_tx = Transaction::new_coinbase_tx(genesis_address, GENESIS_COINBASE_DATA)?;
        let genesis = Block::generate_genesis_block(&coinbase_tx)?;
        let genesis_hash = genesis.get_hash_bytes();
        let genesis_bytes = genesis.serialize()?;

        db.transaction(|txn| {
            txn.insert(genesis_hash.as_slice(), genesis_bytes.clone())?;
            txn.insert(TIP_KEY, genesis_hash.as_slice())?;
            Ok::<(), ConflictableTransactionError<CoinError>>(())
        })
        .map_err(map_txn_err)?;
        info!("Genesis block created");

        Ok(Blockchain {
            db,
            tip_hash: Arc::new(RwLock::new(genesis_hash)),
        })
    }

    /// Opens an existing store; fails with `BlockchainNotFound` when none has
    /// been created at `path` yet.
    pub async fn open(path: &Path) -> Result<Blockchain> {
        if !store_exists(path) {
            return Err(CoinError::BlockchainNotFound(
                "No existing blockchain found. Create one first.".to_string(),
            ));
        }
        let db = sled::open(path).map_err(|e| CoinError::StoreConnection(e.to_string()))?;
        let tip_bytes = db
            .get(TIP_KEY)
            .map_err(|e| CoinError::StoreRead(e.to_string()))?
            .ok_or(CoinError::BlockchainNotFound(
                "No existing blockchain found. Create one first.".to_string(),
            ))?;

        Ok(Blockchain {
            db,
            tip_hash: Arc::new(RwLock::new(tip_bytes.to_vec())),
        })
    }

    pub fn get_db(&self) -> &Db {
        &self.db
    }

    pub async fn get_tip_hash(&self) -> Vec<u8> {
        self.tip_hash.read().await.clone()
    }

    async fn set_tip_hash(&self, new_tip_hash: &[u8]) {
        let mut tip_hash = self.tip_hash.write().await;
        *tip_hash = new_tip_hash.to_vec();
    }

    /// Stores a block received from a peer. Idempotent on resends; the `lh`
    /// pointer only advances when the block's height exceeds the tip height,
    /// so shorter forks are stored but stay unreachable from the tip walk.
    pub async fn add_block(&self, block: &Block) -> Result<()> {
        let existing = self
            .db
            .get(block.get_hash())
            .map_err(|e| CoinError::StoreRead(e.to_string()))?;
        if existing.is_some() {
            return Ok(());
        }

        let block_bytes = block.serialize()?;
        let block_hash = block.get_hash_bytes();
        let block_height = block.get_height();

        let advanced = self
            .db
            .transaction(|txn| {
                txn.insert(block_hash.as_slice(), block_bytes.clone())?;

                let tip_bytes = txn.get(TIP_KEY)?.ok_or(ConflictableTransactionError::Abort(
                    CoinError::ChainTip("tip hash is missing".to_string()),
                ))?;
                let tip_block_bytes =
                    txn.get(tip_bytes)?.ok_or(ConflictableTransactionError::Abort(
                        CoinError::ChainTip("tip block is missing".to_string()),
                    ))?;
                let tip_block = Block::deserialize(tip_block_bytes.as_ref())
                    .map_err(ConflictableTransactionError::Abort)?;

                if block_height > tip_block.get_height() {
                    txn.insert(TIP_KEY, block_hash.as_slice())?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            })
            .map_err(map_txn_err)?;

        if advanced {
            self.set_tip_hash(block.get_hash()).await;
            info!("Added block at height {}", block.get_height());
        } else {
            info!(
                "Stored block at height {} without moving the tip",
                block.get_height()
            );
        }
        Ok(())
    }

    /// Verifies the candidate transactions against the chain, mines a block on
    /// top of the tip and persists it, advancing `lh` in the same transaction.
    pub async fn mine_block(&self, transactions: &[Transaction]) -> Result<Block> {
        for tx in transactions {
            if tx.not_coinbase() && !self.verify_transaction(tx).await? {
                return Err(CoinError::InvalidTransaction(tx.get_tx_id_hex()));
            }
        }

        let best_height = self.get_best_height().await?;
        let tip_hash = self.get_tip_hash().await;
        let block = Block::new_block(tip_hash, transactions, best_height + 1)?;

        let block_bytes = block.serialize()?;
        let block_hash = block.get_hash_bytes();
        self.db
            .transaction(|txn| {
                txn.insert(block_hash.as_slice(), block_bytes.clone())?;
                txn.insert(TIP_KEY, block_hash.as_slice())?;
                Ok::<(), ConflictableTransactionError<CoinError>>(())
            })
            .map_err(map_txn_err)?;
        self.set_tip_hash(block.get_hash()).await;

        Ok(block)
    }

    pub async fn get_best_height(&self) -> Result<usize> {
        let tip_hash = self.get_tip_hash().await;
        let tip_block = self
            .get_block(tip_hash.as_slice())
            .await?
            .ok_or(CoinError::ChainTip("tip block is missing".to_string()))?;
        Ok(tip_block.get_height())
    }

    pub async fn get_block(&self, block_hash: &[u8]) -> Result<Option<Block>> {
        let block_bytes = self
            .db
            .get(block_hash)
            .map_err(|e| CoinError::StoreRead(e.to_string()))?;
        match block_bytes {
            Some(bytes) => Ok(Some(Block::deserialize(bytes.as_ref())?)),
            None => Ok(None),
        }
    }

    /// A lazy, finite, non-restartable walk from the tip to genesis. Each step
    /// is one store read.
    pub async fn iterator(&self) -> BlockchainIterator {
        BlockchainIterator::new(self.get_tip_hash().await, self.db.clone())
    }

    /// Every block hash on the tip walk, tip first.
    pub async fn get_block_hashes(&self) -> Result<Vec<Vec<u8>>> {
        let mut iterator = self.iterator().await;
        let mut hashes = vec![];
        while let Some(block) = iterator.next() {
            hashes.push(block.get_hash_bytes());
        }
        Ok(hashes)
    }

    pub async fn find_transaction(&self, txid: &[u8]) -> Result<Option<Transaction>> {
        let mut iterator = self.iterator().await;
        while let Some(block) = iterator.next() {
            for transaction in block.get_transactions() {
                if txid.eq(transaction.get_id()) {
                    return Ok(Some(transaction.clone()));
                }
            }
        }
        Ok(None)
    }

    /// The unspent outputs of the whole chain, grouped by hex transaction id.
    ///
    /// The walk runs tip-first, so a spending transaction is always seen
    /// before the transaction whose output it consumes.
    pub async fn find_utxo(&self) -> Result<HashMap<String, crate::core::transaction::TXOutputs>> {
        use crate::core::transaction::TXOutputs;

        let mut utxo: HashMap<String, TXOutputs> = HashMap::new();
        let mut spent_txos: HashMap<String, Vec<i64>> = HashMap::new();

        let mut iterator = self.iterator().await;
        while let Some(block) = iterator.next() {
            for tx in block.get_transactions() {
                let txid_hex = tx.get_tx_id_hex();

                for (out_idx, out) in tx.get_vout().iter().enumerate() {
                    let spent = spent_txos
                        .get(&txid_hex)
                        .is_some_and(|spent| spent.contains(&(out_idx as i64)));
                    if spent {
                        continue;
                    }
                    utxo.entry(txid_hex.clone())
                        .or_default()
                        .outputs
                        .push(out.clone());
                }

                if tx.not_coinbase() {
                    for tx_in in tx.get_vin() {
                        spent_txos
                            .entry(tx_in.get_txid_hex())
                            .or_default()
                            .push(tx_in.get_vout());
                    }
                }
            }
        }
        Ok(utxo)
    }

    /// Collects every transaction referenced by `tx`'s inputs and signs. A
    /// missing previous transaction is a fatal error.
    pub async fn sign_transaction(&self, tx: &mut Transaction, pkcs8: &[u8]) -> Result<()> {
        let prev_txs = self.collect_prev_transactions(tx).await?;
        tx.sign(pkcs8, &prev_txs)
    }

    /// Verifies `tx` against the chain. Coinbase transactions are valid by
    /// construction.
    pub async fn verify_transaction(&self, tx: &Transaction) -> Result<bool> {
        if tx.is_coinbase() {
            return Ok(true);
        }
        let prev_txs = self.collect_prev_transactions(tx).await?;
        tx.verify(&prev_txs)
    }

    async fn collect_prev_transactions(
        &self,
        tx: &Transaction,
    ) -> Result<HashMap<String, Transaction>> {
        let mut prev_txs = HashMap::new();
        for input in tx.get_vin() {
            let prev_tx = self.find_transaction(input.get_txid()).await?.ok_or(
                CoinError::TransactionNotFound(input.get_txid_hex()),
            )?;
            prev_txs.insert(prev_tx.get_tx_id_hex(), prev_tx);
        }
        Ok(prev_txs)
    }

    /// Flushes outstanding writes; used by the shutdown path.
    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map(|_| ())
            .map_err(|e| CoinError::StoreWrite(e.to_string()))
    }
}

pub struct BlockchainIterator {
    db: Db,
    current_hash: Vec<u8>,
}

impl BlockchainIterator {
    fn new(tip_hash: Vec<u8>, db: Db) -> BlockchainIterator {
        BlockchainIterator {
            current_hash: tip_hash,
            db,
        }
    }

    pub fn next(&mut self) -> Option<Block> {
        if self.current_hash.is_empty() {
            return None;
        }
        let data = self.db.get(self.current_hash.as_slice()).ok()??;
        let block = Block::deserialize(data.as_ref()).ok()?;
        self.current_hash = block.get_prev_block_hash().to_vec();
        Some(block)
    }
}
