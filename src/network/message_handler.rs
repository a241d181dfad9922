//! Inbound message dispatch: one connection, one message, handled to
//! completion. Store mutations serialize through the chain store's
//! transactions; mempool and transit-list mutations go through the context's
//! locks.

use crate::core::{Block, Transaction};
use crate::error::{CoinError, Result};
use crate::network::message::{
    Addr, BlockMessage, GetBlocks, GetData, Inv, OpType, TxMessage, Version, bytes_to_cmd,
    decode_payload,
};
use crate::network::operations::{
    send_block, send_get_blocks, send_get_data, send_inv, send_tx, send_version,
};
use crate::network::{COMMAND_LENGTH, TRANSACTION_THRESHOLD};
use crate::node::{NodeContext, miner};
use crate::store::UTXOSet;
use data_encoding::HEXLOWER;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

///
/// The `serve` function reads one framed message from an accepted connection
/// and dispatches on its command. A decode failure surfaces as
/// `MalformedMessage`; the caller logs it and the connection is dropped.
pub async fn serve(ctx: NodeContext, mut stream: TcpStream) -> Result<()> {
    let peer_addr = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let mut request = vec![];
    stream
        .read_to_end(&mut request)
        .await
        .map_err(|e| CoinError::MalformedMessage(e.to_string()))?;
    if request.len() < COMMAND_LENGTH {
        return Err(CoinError::MalformedMessage(format!(
            "request of {} bytes is shorter than a command",
            request.len()
        )));
    }

    let cmd = bytes_to_cmd(&request[..COMMAND_LENGTH])?;
    let payload = &request[COMMAND_LENGTH..];
    info!("Received {} command from {}", cmd, peer_addr);

    match cmd.as_str() {
        "version" => handle_version(&ctx, decode_payload(payload)?).await,
        "addr" => handle_addr(&ctx, decode_payload(payload)?).await,
        "getblocks" => handle_get_blocks(&ctx, decode_payload(payload)?).await,
        "inv" => handle_inv(&ctx, decode_payload(payload)?).await,
        "getdata" => handle_get_data(&ctx, decode_payload(payload)?).await,
        "block" => handle_block(&ctx, decode_payload(payload)?).await,
        "tx" => handle_tx(&ctx, decode_payload(payload)?).await,
        _ => {
            warn!("Unknown command {} from {}", cmd, peer_addr);
            Ok(())
        }
    }
}

/// Height comparison: the taller side announces itself, the shorter side asks
/// for hashes. The version integer itself is only logged.
async fn handle_version(ctx: &NodeContext, payload: Version) -> Result<()> {
    debug!(
        "version = {}, best_height = {}",
        payload.version, payload.best_height
    );
    let local_best_height = ctx.blockchain().get_best_height().await?;
    if local_best_height > payload.best_height {
        send_version(ctx, &payload.addr_from, local_best_height).await;
    }
    if local_best_height < payload.best_height {
        send_get_blocks(ctx, &payload.addr_from).await;
    }

    if !ctx.known_nodes().node_is_known(&payload.addr_from)? {
        ctx.known_nodes().add_node(payload.addr_from)?;
    }
    Ok(())
}

/// Merge the advertised peers, then ask everyone for their chain.
async fn handle_addr(ctx: &NodeContext, payload: Addr) -> Result<()> {
    for node in payload.addr_list {
        ctx.known_nodes().add_node(node)?;
    }
    info!(
        "There are {} known nodes",
        ctx.known_nodes().len()?
    );
    for node in ctx.broadcast_targets(ctx.node_addr())? {
        send_get_blocks(ctx, &node).await;
    }
    Ok(())
}

async fn handle_get_blocks(ctx: &NodeContext, payload: GetBlocks) -> Result<()> {
    let hashes = ctx.blockchain().get_block_hashes().await?;
    send_inv(ctx, &payload.addr_from, OpType::Block, hashes.as_slice()).await;
    Ok(())
}

/// A block inventory resets the transit list and fetches its head; a
/// transaction inventory fetches the id unless it is already pooled.
async fn handle_inv(ctx: &NodeContext, payload: Inv) -> Result<()> {
    info!(
        "Received inventory with {} {:?} items",
        payload.items.len(),
        payload.op_type
    );
    let Some(head) = payload.items.first().cloned() else {
        return Err(CoinError::MalformedMessage("empty inventory".to_string()));
    };

    match payload.op_type {
        OpType::Block => {
            ctx.blocks_in_transit().replace(payload.items.as_slice())?;
            send_get_data(ctx, &payload.addr_from, OpType::Block, head.as_slice()).await;
            ctx.blocks_in_transit().remove(head.as_slice())?;
        }
        OpType::Tx => {
            let txid_hex = HEXLOWER.encode(head.as_slice());
            if !ctx.memory_pool().contains(&txid_hex)? {
                send_get_data(ctx, &payload.addr_from, OpType::Tx, head.as_slice()).await;
            }
        }
    }
    Ok(())
}

async fn handle_get_data(ctx: &NodeContext, payload: GetData) -> Result<()> {
    match payload.op_type {
        OpType::Block => {
            if let Some(block) = ctx.blockchain().get_block(payload.id.as_slice()).await? {
                send_block(ctx, &payload.addr_from, &block).await;
            } else {
                debug!("Requested block is unknown");
            }
        }
        OpType::Tx => {
            let txid_hex = HEXLOWER.encode(payload.id.as_slice());
            if let Some(tx) = ctx.memory_pool().get(&txid_hex)? {
                send_tx(ctx, &payload.addr_from, &tx).await;
            } else {
                info!(
                    "Requested transaction {} is not in the memory pool, most likely mined already",
                    txid_hex
                );
            }
        }
    }
    Ok(())
}

/// Store the delivered block, drop its transactions from the mempool, then
/// either fetch the next block in transit or rebuild the UTXO index once the
/// catch-up is done.
async fn handle_block(ctx: &NodeContext, payload: BlockMessage) -> Result<()> {
    let block = Block::deserialize(payload.block.as_slice())?;
    ctx.blockchain().add_block(&block).await?;
    info!("Added block at height {}", block.get_height());

    for tx in block.get_transactions() {
        ctx.memory_pool().remove(&tx.get_tx_id_hex())?;
    }

    if ctx.blocks_in_transit().is_not_empty()? {
        if let Some(next_hash) = ctx.blocks_in_transit().first()? {
            send_get_data(ctx, &payload.addr_from, OpType::Block, next_hash.as_slice()).await;
            ctx.blocks_in_transit().remove(next_hash.as_slice())?;
        }
    } else {
        let utxo_set = UTXOSet::new(ctx.blockchain().clone());
        utxo_set.reindex().await?;
    }
    Ok(())
}

/// Pool the transaction. The central node relays it to everyone else; a miner
/// node checks the threshold and mines.
async fn handle_tx(ctx: &NodeContext, payload: TxMessage) -> Result<()> {
    let tx = Transaction::deserialize(payload.transaction.as_slice())?;
    let txid = tx.get_id_bytes();
    ctx.memory_pool().add(tx)?;
    info!(
        "Memory pool of {} holds {} transactions",
        ctx.node_addr(),
        ctx.memory_pool().len()?
    );

    if ctx.is_central_node()? {
        for node in ctx.broadcast_targets(&payload.addr_from)? {
            send_inv(ctx, &node, OpType::Tx, &[txid.clone()]).await;
        }
    } else if ctx.is_miner() && ctx.memory_pool().len()? >= TRANSACTION_THRESHOLD {
        miner::mine_transactions(ctx).await?;
    }
    Ok(())
}
