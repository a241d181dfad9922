//! Outbound message operations. Every send dials a fresh connection, writes
//! one framed message and closes. A peer that cannot be dialed is dropped
//! from the known node list; nothing here is fatal to the caller.

use crate::core::{Block, Transaction};
use crate::network::message::{
    Addr, BlockMessage, GetBlocks, GetData, Inv, OpType, TxMessage, Version, encode_request,
};
use crate::network::NODE_VERSION;
use crate::node::NodeContext;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, error};

///
/// The `send_version` function opens the handshake with `addr_to`, announcing
/// this node's best height.
pub async fn send_version(ctx: &NodeContext, addr_to: &str, best_height: usize) {
    let payload = Version {
        addr_from: ctx.node_addr().to_string(),
        version: NODE_VERSION,
        best_height,
    };
    send_message(ctx, addr_to, "version", &payload).await;
}

/// The `send_addr` function shares this node's peer list with `addr_to`.
pub async fn send_addr(ctx: &NodeContext, addr_to: &str) {
    let addr_list = match ctx.known_nodes().get_nodes() {
        Ok(nodes) => nodes,
        Err(e) => {
            error!("Failed to read known nodes: {}", e);
            return;
        }
    };
    send_message(ctx, addr_to, "addr", &Addr { addr_list }).await;
}

/// The `send_get_blocks` function asks `addr_to` for its block hash list.
pub async fn send_get_blocks(ctx: &NodeContext, addr_to: &str) {
    let payload = GetBlocks {
        addr_from: ctx.node_addr().to_string(),
    };
    send_message(ctx, addr_to, "getblocks", &payload).await;
}

///
/// The `send_inv` function advertises block hashes or transaction ids to
/// `addr_to`.
pub async fn send_inv(ctx: &NodeContext, addr_to: &str, op_type: OpType, items: &[Vec<u8>]) {
    let payload = Inv {
        addr_from: ctx.node_addr().to_string(),
        op_type,
        items: items.to_vec(),
    };
    send_message(ctx, addr_to, "inv", &payload).await;
}

/// The `send_get_data` function requests one block or transaction by id.
pub async fn send_get_data(ctx: &NodeContext, addr_to: &str, op_type: OpType, id: &[u8]) {
    let payload = GetData {
        addr_from: ctx.node_addr().to_string(),
        op_type,
        id: id.to_vec(),
    };
    send_message(ctx, addr_to, "getdata", &payload).await;
}

/// The `send_block` function delivers one block to `addr_to`.
pub async fn send_block(ctx: &NodeContext, addr_to: &str, block: &Block) {
    let block_bytes = match block.serialize() {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to serialize block: {}", e);
            return;
        }
    };
    let payload = BlockMessage {
        addr_from: ctx.node_addr().to_string(),
        block: block_bytes,
    };
    send_message(ctx, addr_to, "block", &payload).await;
}

/// The `send_tx` function delivers one transaction to `addr_to`.
pub async fn send_tx(ctx: &NodeContext, addr_to: &str, tx: &Transaction) {
    let tx_bytes = match tx.serialize() {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Failed to serialize transaction: {}", e);
            return;
        }
    };
    let payload = TxMessage {
        addr_from: ctx.node_addr().to_string(),
        transaction: tx_bytes,
    };
    send_message(ctx, addr_to, "tx", &payload).await;
}

async fn send_message<T: Serialize>(ctx: &NodeContext, addr_to: &str, cmd: &str, payload: &T) {
    let request = match encode_request(cmd, payload) {
        Ok(request) => request,
        Err(e) => {
            error!("Failed to encode {} message: {}", cmd, e);
            return;
        }
    };
    debug!("Sending {} to {}", cmd, addr_to);
    send_data(ctx, addr_to, request).await;
}

///
/// The `send_data` function dials the peer and writes one framed message. A
/// dial failure evicts the peer from the known node list; no retry, no
/// backoff.
async fn send_data(ctx: &NodeContext, addr_to: &str, request: Vec<u8>) {
    let stream = TcpStream::connect(addr_to).await;
    let mut stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            error!("The peer {} is not available: {}", addr_to, e);
            if let Err(e) = ctx.known_nodes().evict_node(addr_to) {
                error!("Failed to evict {}: {}", addr_to, e);
            }
            return;
        }
    };

    if let Err(e) = stream.write_all(request.as_slice()).await {
        error!("Failed to write to {}: {}", addr_to, e);
    }
    // Half-close so the receiver sees EOF for this single-message connection.
    let _ = stream.shutdown().await;
}
