use crate::core::transaction::Transaction;
use crate::error::{CoinError, Result};
use std::collections::HashMap;
use std::sync::RwLock;

/// Unconfirmed transactions pending inclusion in a block, keyed by hex
/// transaction id. Process lifetime only; never persisted.
pub struct MemoryPool {
    inner: RwLock<HashMap<String, Transaction>>,
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn contains(&self, txid_hex: &str) -> Result<bool> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CoinError::PoisonedLock(e.to_string()))?;
        Ok(inner.contains_key(txid_hex))
    }

    pub fn add(&self, tx: Transaction) -> Result<()> {
        let txid_hex = tx.get_tx_id_hex();
        self.inner
            .write()
            .map_err(|e| CoinError::PoisonedLock(e.to_string()))?
            .insert(txid_hex, tx);
        Ok(())
    }

    pub fn get(&self, txid_hex: &str) -> Result<Option<Transaction>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CoinError::PoisonedLock(e.to_string()))?;
        Ok(inner.get(txid_hex).cloned())
    }

    pub fn remove(&self, txid_hex: &str) -> Result<Option<Transaction>> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CoinError::PoisonedLock(e.to_string()))?;
        Ok(inner.remove(txid_hex))
    }

    pub fn get_all(&self) -> Result<Vec<Transaction>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CoinError::PoisonedLock(e.to_string()))?;
        Ok(inner.values().cloned().collect())
    }

    pub fn len(&self) -> Result<usize> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CoinError::PoisonedLock(e.to_string()))?;
        Ok(inner.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Block hashes announced by a peer that have not been fetched yet. Drained
/// head-first while catching up to a longer chain.
pub struct BlockInTransit {
    inner: RwLock<Vec<Vec<u8>>>,
}

impl BlockInTransit {
    pub fn new() -> BlockInTransit {
        BlockInTransit {
            inner: RwLock::new(vec![]),
        }
    }

    /// Replaces the transit list with a freshly announced inventory.
    pub fn replace(&self, blocks: &[Vec<u8>]) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CoinError::PoisonedLock(e.to_string()))?;
        inner.clear();
        inner.extend(blocks.iter().cloned());
        Ok(())
    }

    pub fn first(&self) -> Result<Option<Vec<u8>>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CoinError::PoisonedLock(e.to_string()))?;
        Ok(inner.first().cloned())
    }

    pub fn remove(&self, block_hash: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CoinError::PoisonedLock(e.to_string()))?;
        if let Some(idx) = inner.iter().position(|hash| hash.eq(block_hash)) {
            inner.remove(idx);
            Ok(Some(block_hash.to_vec()))
        } else {
            Ok(None)
        }
    }

    pub fn len(&self) -> Result<usize> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CoinError::PoisonedLock(e.to_string()))?;
        Ok(inner.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn is_not_empty(&self) -> Result<bool> {
        Ok(!self.is_empty()?)
    }
}

impl Default for BlockInTransit {
    fn default() -> Self {
        Self::new()
    }
}
