//! # Node context
//!
//! The single owner of all process-wide node state: the chain store handle,
//! the mempool, the blocks-in-transit list, the peer set, this node's address
//! and the optional mining address. Handlers receive a clone (the fields are
//! shared behind `Arc`s) instead of reaching for globals, which keeps
//! initialization order explicit and lets tests build isolated nodes.

use crate::core::{BlockInTransit, MemoryPool};
use crate::error::Result;
use crate::node::peers::KnownNodes;
use crate::store::Blockchain;
use std::sync::Arc;

#[derive(Clone)]
pub struct NodeContext {
    blockchain: Blockchain,
    node_addr: String,
    miner_address: Option<String>,
    known_nodes: Arc<KnownNodes>,
    memory_pool: Arc<MemoryPool>,
    blocks_in_transit: Arc<BlockInTransit>,
}

impl NodeContext {
    pub fn new(
        blockchain: Blockchain,
        node_addr: String,
        central_node: String,
        miner_address: Option<String>,
    ) -> NodeContext {
        NodeContext {
            blockchain,
            node_addr,
            miner_address,
            known_nodes: Arc::new(KnownNodes::new(central_node)),
            memory_pool: Arc::new(MemoryPool::new()),
            blocks_in_transit: Arc::new(BlockInTransit::new()),
        }
    }

    pub fn blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    pub fn node_addr(&self) -> &str {
        self.node_addr.as_str()
    }

    pub fn miner_address(&self) -> Option<&str> {
        self.miner_address.as_deref()
    }

    pub fn is_miner(&self) -> bool {
        self.miner_address.is_some()
    }

    /// True when this node is the hub every transaction is relayed through.
    pub fn is_central_node(&self) -> Result<bool> {
        Ok(self.known_nodes.central_node()? == self.node_addr)
    }

    pub fn known_nodes(&self) -> &KnownNodes {
        &self.known_nodes
    }

    pub fn memory_pool(&self) -> &MemoryPool {
        &self.memory_pool
    }

    pub fn blocks_in_transit(&self) -> &BlockInTransit {
        &self.blocks_in_transit
    }

    /// Every known peer except this node and `exclude`, the broadcast set for
    /// relayed inventories.
    pub fn broadcast_targets(&self, exclude: &str) -> Result<Vec<String>> {
        Ok(self
            .known_nodes
            .get_nodes()?
            .into_iter()
            .filter(|node| node != self.node_addr() && node != exclude)
            .collect())
    }
}
