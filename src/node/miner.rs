//! Mining: turn the mempool into blocks once the transaction threshold is
//! reached, rebuild the UTXO index and announce the result.

use crate::core::Transaction;
use crate::error::Result;
use crate::network::operations::send_inv;
use crate::network::OpType;
use crate::node::NodeContext;
use crate::store::UTXOSet;
use tracing::{info, warn};

///
/// The `mine_transactions` function drains the mempool into mined blocks.
/// Each round selects every transaction that still verifies against the
/// chain (failures are skipped, never fatal to the round), leads the set with
/// a coinbase for the miner, mines, rebuilds the UTXO index and announces the
/// new block to every other peer. Rounds repeat while transactions keep
/// arriving in the mempool.
pub async fn mine_transactions(ctx: &NodeContext) -> Result<()> {
    let miner_address = ctx
        .miner_address()
        .ok_or(crate::error::CoinError::MinerAddressMissing)?
        .to_string();

    loop {
        let mut txs = vec![];
        for tx in ctx.memory_pool().get_all()? {
            match ctx.blockchain().verify_transaction(&tx).await {
                Ok(true) => txs.push(tx),
                Ok(false) => {
                    warn!("Skipping transaction {} with a bad signature", tx.get_tx_id_hex());
                    ctx.memory_pool().remove(&tx.get_tx_id_hex())?;
                }
                Err(e) => {
                    warn!("Skipping unverifiable transaction {}: {}", tx.get_tx_id_hex(), e);
                    ctx.memory_pool().remove(&tx.get_tx_id_hex())?;
                }
            }
        }

        if txs.is_empty() {
            info!("No valid transactions to mine");
            return Ok(());
        }

        // The coinbase leads the block's transaction list.
        txs.insert(0, Transaction::new_coinbase_tx(&miner_address, "")?);

        let new_block = ctx.blockchain().mine_block(txs.as_slice()).await?;
        let utxo_set = UTXOSet::new(ctx.blockchain().clone());
        utxo_set.reindex().await?;
        info!("New block at height {} was mined", new_block.get_height());

        for tx in &txs {
            ctx.memory_pool().remove(&tx.get_tx_id_hex())?;
        }

        for node in ctx.broadcast_targets(ctx.node_addr())? {
            send_inv(ctx, &node, OpType::Block, &[new_block.get_hash_bytes()]).await;
        }

        if ctx.memory_pool().is_empty()? {
            return Ok(());
        }
    }
}
