use crate::error::{CoinError, Result};
use std::sync::RwLock;

/// The ordered peer list. Index 0 is the central node by convention and never
/// moves; discovered peers append, unreachable peers are evicted.
pub struct KnownNodes {
    inner: RwLock<Vec<String>>,
}

impl KnownNodes {
    pub fn new(central_node: String) -> KnownNodes {
        KnownNodes {
            inner: RwLock::new(vec![central_node]),
        }
    }

    pub fn central_node(&self) -> Result<String> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CoinError::PoisonedLock(e.to_string()))?;
        inner
            .first()
            .cloned()
            .ok_or(CoinError::PoisonedLock("known nodes list is empty".to_string()))
    }

    pub fn get_nodes(&self) -> Result<Vec<String>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CoinError::PoisonedLock(e.to_string()))?;
        Ok(inner.clone())
    }

    pub fn node_is_known(&self, addr: &str) -> Result<bool> {
        let inner = self
            .inner
            .read()
            .map_err(|e| CoinError::PoisonedLock(e.to_string()))?;
        Ok(inner.iter().any(|node| node == addr))
    }

    /// Appends `addr` unless it is already present.
    pub fn add_node(&self, addr: String) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CoinError::PoisonedLock(e.to_string()))?;
        if !inner.iter().any(|node| *node == addr) {
            inner.push(addr);
        }
        Ok(())
    }

    /// Drops an unreachable peer. No retry, no backoff.
    pub fn evict_node(&self, addr: &str) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| CoinError::PoisonedLock(e.to_string()))?;
        inner.retain(|node| node != addr);
        Ok(())
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
