use crate::error::{CoinError, Result};
use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;

const NODE_ID_KEY: &str = "NODE_ID";
const CENTRAL_NODE_KEY: &str = "CENTRAL_NODE";
const DEFAULT_CENTRAL_NODE: &str = "localhost:3000";

/// Address of the bootstrap peer, `KnownNodes[0]` by convention. Read from the
/// environment once so every node in a test cluster can be repointed together.
pub static CENTRAL_NODE: Lazy<String> = Lazy::new(|| {
    env::var(CENTRAL_NODE_KEY).unwrap_or_else(|_| DEFAULT_CENTRAL_NODE.to_string())
});

/// Per-process configuration derived from the `NODE_ID` environment variable.
///
/// `NODE_ID` doubles as the TCP port suffix (`localhost:<NODE_ID>`) and as the
/// scope for the on-disk paths, so several nodes can share one working
/// directory.
#[derive(Clone, Debug)]
pub struct Config {
    node_id: String,
}

impl Config {
    pub fn from_env() -> Result<Config> {
        let node_id = env::var(NODE_ID_KEY).map_err(|_| CoinError::NodeIdMissing)?;
        if node_id.is_empty() {
            return Err(CoinError::NodeIdMissing);
        }
        Ok(Config { node_id })
    }

    pub fn node_id(&self) -> &str {
        self.node_id.as_str()
    }

    pub fn node_addr(&self) -> String {
        format!("localhost:{}", self.node_id)
    }

    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(format!("./tmp/blocks_{}", self.node_id))
    }

    pub fn wallet_file(&self) -> PathBuf {
        PathBuf::from(format!("./tmp/wallets_{}.data", self.node_id))
    }
}
