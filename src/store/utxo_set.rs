//! # UTXO index
//!
//! A denormalization of the chain: one `utxo-`-prefixed entry per transaction
//! holding its still-unspent outputs, kept in the same keyspace as the block
//! log. Balance and spend queries read the index instead of rescanning
//! history; `reindex` rebuilds it from scratch and `update` applies one block
//! incrementally.

use crate::core::block::Block;
use crate::core::transaction::{TXOutput, TXOutputs};
use crate::error::{CoinError, Result};
use crate::store::blockchain::{Blockchain, map_txn_err};
use crate::wallet::get_pub_key_hash;
use data_encoding::HEXLOWER;
use sled::transaction::ConflictableTransactionError;
use std::collections::HashMap;
use tracing::debug;

const UTXO_PREFIX: &[u8] = b"utxo-";

// Keys deleted per batch, keeping any single write bounded.
const DELETE_BATCH_SIZE: usize = 100_000;

pub struct UTXOSet {
    blockchain: Blockchain,
}

impl UTXOSet {
    pub fn new(blockchain: Blockchain) -> UTXOSet {
        UTXOSet { blockchain }
    }

    pub fn get_blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    fn utxo_key(txid: &[u8]) -> Vec<u8> {
        let mut key = UTXO_PREFIX.to_vec();
        key.extend_from_slice(txid);
        key
    }

    ///
    /// The `find_spendable_outputs` function walks the index collecting
    /// outputs locked to `pub_key_hash` and stops as soon as the accumulated
    /// value reaches `amount`.
    ///
    /// # Returns
    ///
    /// The accumulated value and a map of hex transaction id to the selected
    /// output indices.
    pub async fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: i64,
    ) -> Result<(i64, HashMap<String, Vec<usize>>)> {
        let mut unspent_outputs: HashMap<String, Vec<usize>> = HashMap::new();
        let mut accumulated = 0;

        for item in self.blockchain.get_db().scan_prefix(UTXO_PREFIX) {
            let (key, value) = item.map_err(|e| CoinError::StoreRead(e.to_string()))?;
            let txid_hex = HEXLOWER.encode(&key.as_ref()[UTXO_PREFIX.len()..]);
            let outs = TXOutputs::deserialize(value.as_ref())?;

            for (out_idx, out) in outs.outputs.iter().enumerate() {
                if out.is_locked_with_key(pub_key_hash) && accumulated < amount {
                    accumulated += out.get_value();
                    unspent_outputs
                        .entry(txid_hex.clone())
                        .or_default()
                        .push(out_idx);
                }
                if accumulated >= amount {
                    return Ok((accumulated, unspent_outputs));
                }
            }
        }
        Ok((accumulated, unspent_outputs))
    }

    /// Every output locked to `pub_key_hash`, used for balance queries.
    pub async fn find_unspent_transactions(&self, pub_key_hash: &[u8]) -> Result<Vec<TXOutput>> {
        let mut utxos = vec![];
        for item in self.blockchain.get_db().scan_prefix(UTXO_PREFIX) {
            let (_, value) = item.map_err(|e| CoinError::StoreRead(e.to_string()))?;
            let outs = TXOutputs::deserialize(value.as_ref())?;
            for out in outs.outputs {
                if out.is_locked_with_key(pub_key_hash) {
                    utxos.push(out);
                }
            }
        }
        Ok(utxos)
    }

    pub async fn get_balance(&self, address: &str) -> Result<i64> {
        let pub_key_hash = get_pub_key_hash(address)?;
        let utxos = self.find_unspent_transactions(pub_key_hash.as_slice()).await?;
        Ok(utxos.iter().map(|out| out.get_value()).sum())
    }

    /// Number of transactions with at least one unspent output.
    pub async fn count_transactions(&self) -> Result<usize> {
        let mut counter = 0;
        for item in self.blockchain.get_db().scan_prefix(UTXO_PREFIX) {
            item.map_err(|e| CoinError::StoreRead(e.to_string()))?;
            counter += 1;
        }
        Ok(counter)
    }

    ///
    /// The `reindex` function rebuilds the index from the chain: every
    /// existing entry is dropped, then one entry per transaction with unspent
    /// outputs is written back. Callers must not serve reads while this runs.
    pub async fn reindex(&self) -> Result<()> {
        debug!("Rebuilding the UTXO index");
        self.delete_by_prefix(UTXO_PREFIX).await?;

        let utxo_map = self.blockchain.find_utxo().await?;
        let db = self.blockchain.get_db();
        for (txid_hex, outs) in &utxo_map {
            let txid = HEXLOWER
                .decode(txid_hex.as_bytes())
                .map_err(|e| CoinError::TransactionIdHexDecoding(e.to_string()))?;
            db.insert(Self::utxo_key(&txid), outs.serialize()?)
                .map_err(|e| CoinError::StoreWrite(e.to_string()))?;
        }
        debug!("UTXO index holds {} transactions", utxo_map.len());
        Ok(())
    }

    ///
    /// The `update` function folds one block into the index: every output
    /// spent by the block is dropped from its entry (the entry is removed
    /// when emptied) and every transaction's outputs are written as a fresh
    /// entry. The whole block is applied in a single store transaction,
    /// sequenced by the caller right after the block itself is persisted.
    ///
    /// # Arguments
    ///
    /// * `block` - The block to fold in.
    pub async fn update(&self, block: &Block) -> Result<()> {
        self.blockchain
            .get_db()
            .transaction(|txn| {
                for tx in block.get_transactions() {
                    if tx.not_coinbase() {
                        for tx_in in tx.get_vin() {
                            let spent_key = Self::utxo_key(tx_in.get_txid());
                            let entry_bytes = txn.get(spent_key.as_slice())?.ok_or(
                                ConflictableTransactionError::Abort(CoinError::UtxoNotFound(
                                    tx_in.get_txid_hex(),
                                )),
                            )?;
                            let entry = TXOutputs::deserialize(entry_bytes.as_ref())
                                .map_err(ConflictableTransactionError::Abort)?;

                            let updated_outputs = TXOutputs {
                                outputs: entry
                                    .outputs
                                    .iter()
                                    .enumerate()
                                    .filter(|(out_idx, _)| *out_idx as i64 != tx_in.get_vout())
                                    .map(|(_, out)| out.clone())
                                    .collect(),
                            };

                            if updated_outputs.outputs.is_empty() {
                                txn.remove(spent_key.as_slice())?;
                            } else {
                                let out_bytes = updated_outputs
                                    .serialize()
                                    .map_err(ConflictableTransactionError::Abort)?;
                                txn.insert(spent_key.as_slice(), out_bytes)?;
                            }
                        }
                    }

                    let new_outputs = TXOutputs {
                        outputs: tx.get_vout().to_vec(),
                    };
                    let out_bytes = new_outputs
                        .serialize()
                        .map_err(ConflictableTransactionError::Abort)?;
                    txn.insert(Self::utxo_key(tx.get_id()).as_slice(), out_bytes)?;
                }
                Ok(())
            })
            .map_err(map_txn_err)
    }

    ///
    /// The `delete_by_prefix` function removes every key under `prefix` in
    /// batches, so a rebuild never issues one oversized write.
    pub async fn delete_by_prefix(&self, prefix: &[u8]) -> Result<()> {
        let db = self.blockchain.get_db();

        let apply = |keys: &[sled::IVec]| -> Result<()> {
            let mut batch = sled::Batch::default();
            for key in keys {
                batch.remove(key.as_ref());
            }
            db.apply_batch(batch)
                .map_err(|e| CoinError::StoreWrite(e.to_string()))
        };

        let mut keys_for_delete = Vec::with_capacity(DELETE_BATCH_SIZE);
        for item in db.scan_prefix(prefix) {
            let (key, _) = item.map_err(|e| CoinError::StoreRead(e.to_string()))?;
            keys_for_delete.push(key);
            if keys_for_delete.len() == DELETE_BATCH_SIZE {
                apply(keys_for_delete.as_slice())?;
                keys_for_delete.clear();
            }
        }
        if !keys_for_delete.is_empty() {
            apply(keys_for_delete.as_slice())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transaction::{REWARD, Transaction};
    use crate::wallet::{Wallet, hash_pub_key};

    async fn create_test_chain(genesis_wallet: &Wallet) -> (Blockchain, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let address = genesis_wallet.get_address().expect("Failed to get address");
        let blockchain = Blockchain::create(&dir.path().join("blocks"), &address)
            .await
            .expect("Failed to create test blockchain");
        (blockchain, dir)
    }

    /// All (txid, value-multiset) pairs currently in the index.
    async fn index_snapshot(utxo_set: &UTXOSet) -> Vec<(String, Vec<i64>)> {
        let mut snapshot = vec![];
        for item in utxo_set.get_blockchain().get_db().scan_prefix(UTXO_PREFIX) {
            let (key, value) = item.expect("Failed to read index");
            let txid_hex = HEXLOWER.encode(&key.as_ref()[UTXO_PREFIX.len()..]);
            let outs = TXOutputs::deserialize(value.as_ref()).expect("Failed to decode entry");
            let mut values: Vec<i64> = outs.outputs.iter().map(|o| o.get_value()).collect();
            values.sort_unstable();
            snapshot.push((txid_hex, values));
        }
        snapshot.sort();
        snapshot
    }

    async fn total_value(utxo_set: &UTXOSet) -> i64 {
        index_snapshot(utxo_set)
            .await
            .iter()
            .flat_map(|(_, values)| values.iter())
            .sum()
    }

    #[tokio::test]
    async fn test_reindex_after_genesis() {
        let wallet = Wallet::new().expect("Failed to create wallet");
        let address = wallet.get_address().expect("Failed to get address");
        let (blockchain, _dir) = create_test_chain(&wallet).await;

        let utxo_set = UTXOSet::new(blockchain);
        utxo_set.reindex().await.expect("Failed to reindex");

        assert_eq!(
            utxo_set.count_transactions().await.expect("Failed to count"),
            1
        );
        assert_eq!(
            utxo_set.get_balance(&address).await.expect("Failed to get balance"),
            REWARD
        );
    }

    #[tokio::test]
    async fn test_spend_with_change_updates_balances() {
        let sender = Wallet::new().expect("Failed to create wallet");
        let recipient = Wallet::new().expect("Failed to create wallet");
        let sender_address = sender.get_address().expect("Failed to get address");
        let recipient_address = recipient.get_address().expect("Failed to get address");

        let (blockchain, _dir) = create_test_chain(&sender).await;
        let utxo_set = UTXOSet::new(blockchain.clone());
        utxo_set.reindex().await.expect("Failed to reindex");

        // Sender holds exactly one UTXO of REWARD; send 7, mine locally.
        let tx = Transaction::new_utxo_transaction(&sender, &recipient_address, 7, &utxo_set)
            .await
            .expect("Failed to build transaction");
        let coinbase = Transaction::new_coinbase_tx(&sender_address, "")
            .expect("Failed to create coinbase tx");
        let block = blockchain
            .mine_block(&[coinbase, tx])
            .await
            .expect("Failed to mine block");
        utxo_set.update(&block).await.expect("Failed to update");

        assert_eq!(
            utxo_set
                .get_balance(&sender_address)
                .await
                .expect("Failed to get balance"),
            REWARD - 7 + REWARD
        );
        assert_eq!(
            utxo_set
                .get_balance(&recipient_address)
                .await
                .expect("Failed to get balance"),
            7
        );
    }

    #[tokio::test]
    async fn test_insufficient_funds_leaves_state_untouched() {
        let sender = Wallet::new().expect("Failed to create wallet");
        let recipient = Wallet::new().expect("Failed to create wallet");
        let sender_address = sender.get_address().expect("Failed to get address");
        let recipient_address = recipient.get_address().expect("Failed to get address");

        let (blockchain, _dir) = create_test_chain(&sender).await;
        let utxo_set = UTXOSet::new(blockchain.clone());
        utxo_set.reindex().await.expect("Failed to reindex");

        let result =
            Transaction::new_utxo_transaction(&sender, &recipient_address, 9999, &utxo_set).await;
        assert!(matches!(result, Err(CoinError::NotEnoughFunds)));

        assert_eq!(
            blockchain.get_best_height().await.expect("Failed to get height"),
            0
        );
        assert_eq!(
            utxo_set
                .get_balance(&sender_address)
                .await
                .expect("Failed to get balance"),
            REWARD
        );
    }

    #[tokio::test]
    async fn test_update_matches_reindex() {
        let sender = Wallet::new().expect("Failed to create wallet");
        let recipient = Wallet::new().expect("Failed to create wallet");
        let sender_address = sender.get_address().expect("Failed to get address");
        let recipient_address = recipient.get_address().expect("Failed to get address");

        let (blockchain, _dir) = create_test_chain(&sender).await;
        let utxo_set = UTXOSet::new(blockchain.clone());
        utxo_set.reindex().await.expect("Failed to reindex");

        let tx = Transaction::new_utxo_transaction(&sender, &recipient_address, 5, &utxo_set)
            .await
            .expect("Failed to build transaction");
        let coinbase = Transaction::new_coinbase_tx(&sender_address, "")
            .expect("Failed to create coinbase tx");
        let block = blockchain
            .mine_block(&[coinbase, tx])
            .await
            .expect("Failed to mine block");

        utxo_set.update(&block).await.expect("Failed to update");
        let incremental = index_snapshot(&utxo_set).await;

        utxo_set.reindex().await.expect("Failed to reindex");
        let rebuilt = index_snapshot(&utxo_set).await;

        assert_eq!(incremental, rebuilt);
    }

    #[tokio::test]
    async fn test_total_value_equals_reward_times_blocks() {
        let sender = Wallet::new().expect("Failed to create wallet");
        let recipient = Wallet::new().expect("Failed to create wallet");
        let sender_address = sender.get_address().expect("Failed to get address");
        let recipient_address = recipient.get_address().expect("Failed to get address");

        let (blockchain, _dir) = create_test_chain(&sender).await;
        let utxo_set = UTXOSet::new(blockchain.clone());
        utxo_set.reindex().await.expect("Failed to reindex");

        let tx = Transaction::new_utxo_transaction(&sender, &recipient_address, 3, &utxo_set)
            .await
            .expect("Failed to build transaction");
        let coinbase = Transaction::new_coinbase_tx(&sender_address, "")
            .expect("Failed to create coinbase tx");
        let block = blockchain
            .mine_block(&[coinbase, tx])
            .await
            .expect("Failed to mine block");
        utxo_set.update(&block).await.expect("Failed to update");

        let height = blockchain.get_best_height().await.expect("Failed to get height");
        assert_eq!(
            total_value(&utxo_set).await,
            REWARD * (height as i64 + 1)
        );
    }

    #[tokio::test]
    async fn test_spent_entry_is_removed_when_emptied() {
        let sender = Wallet::new().expect("Failed to create wallet");
        let recipient = Wallet::new().expect("Failed to create wallet");
        let sender_address = sender.get_address().expect("Failed to get address");
        let recipient_address = recipient.get_address().expect("Failed to get address");

        let (blockchain, _dir) = create_test_chain(&sender).await;
        let utxo_set = UTXOSet::new(blockchain.clone());
        utxo_set.reindex().await.expect("Failed to reindex");

        // Spend the whole genesis output; no change output is created.
        let tx = Transaction::new_utxo_transaction(&sender, &recipient_address, REWARD, &utxo_set)
            .await
            .expect("Failed to build transaction");
        let spent_txid_hex = tx.get_vin()[0].get_txid_hex();
        let coinbase = Transaction::new_coinbase_tx(&sender_address, "")
            .expect("Failed to create coinbase tx");
        let block = blockchain
            .mine_block(&[coinbase, tx])
            .await
            .expect("Failed to mine block");
        utxo_set.update(&block).await.expect("Failed to update");

        let snapshot = index_snapshot(&utxo_set).await;
        assert!(snapshot.iter().all(|(txid, _)| txid != &spent_txid_hex));
        assert_eq!(
            utxo_set
                .get_balance(&recipient_address)
                .await
                .expect("Failed to get balance"),
            REWARD
        );
    }

    #[tokio::test]
    async fn test_find_spendable_outputs_stops_at_threshold() {
        let miner = Wallet::new().expect("Failed to create wallet");
        let miner_address = miner.get_address().expect("Failed to get address");

        let (blockchain, _dir) = create_test_chain(&miner).await;
        let utxo_set = UTXOSet::new(blockchain.clone());

        // Two more coinbase rewards on top of genesis.
        for _ in 0..2 {
            let coinbase = Transaction::new_coinbase_tx(&miner_address, "")
                .expect("Failed to create coinbase tx");
            blockchain
                .mine_block(&[coinbase])
                .await
                .expect("Failed to mine block");
        }
        utxo_set.reindex().await.expect("Failed to reindex");

        let pub_key_hash = hash_pub_key(miner.get_public_key());
        let (accumulated, outputs) = utxo_set
            .find_spendable_outputs(pub_key_hash.as_slice(), REWARD + 1)
            .await
            .expect("Failed to find outputs");

        assert!(accumulated >= REWARD + 1);
        // Stops as soon as the threshold is met.
        assert!(accumulated <= REWARD * 2);
        assert_eq!(outputs.values().flatten().count(), 2);
    }

    #[tokio::test]
    async fn test_delete_by_prefix_clears_index_only() {
        let wallet = Wallet::new().expect("Failed to create wallet");
        let (blockchain, _dir) = create_test_chain(&wallet).await;
        let utxo_set = UTXOSet::new(blockchain.clone());
        utxo_set.reindex().await.expect("Failed to reindex");

        utxo_set
            .delete_by_prefix(UTXO_PREFIX)
            .await
            .expect("Failed to delete");
        assert_eq!(
            utxo_set.count_transactions().await.expect("Failed to count"),
            0
        );
        // The block log is untouched.
        assert_eq!(
            blockchain.get_best_height().await.expect("Failed to get height"),
            0
        );
    }
}
