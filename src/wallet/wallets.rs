use crate::error::{CoinError, Result};
use crate::wallet::Wallet;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// The wallet collection persisted next to the chain store, one file per node.
pub struct Wallets {
    wallets: HashMap<String, Wallet>,
    wallet_file: PathBuf,
}

impl Wallets {
    /// Loads the collection from `wallet_file`, starting empty when the file
    /// does not exist yet.
    pub fn new(wallet_file: &Path) -> Result<Wallets> {
        let mut wallets = Wallets {
            wallets: HashMap::new(),
            wallet_file: wallet_file.to_path_buf(),
        };
        wallets.load_from_file()?;
        Ok(wallets)
    }

    pub fn create_wallet(&mut self) -> Result<String> {
        let wallet = Wallet::new()?;
        let address = wallet.get_address()?;
        self.wallets.insert(address.clone(), wallet);
        self.save_to_file()?;
        Ok(address)
    }

    pub fn get_addresses(&self) -> Vec<String> {
        self.wallets.keys().cloned().collect()
    }

    pub fn get_wallet(&self, address: &str) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    fn load_from_file(&mut self) -> Result<()> {
        if !self.wallet_file.exists() {
            return Ok(());
        }
        let bytes = fs::read(&self.wallet_file)
            .map_err(|e| CoinError::WalletsFileRead(e.to_string()))?;
        self.wallets =
            bincode::serde::decode_from_slice(bytes.as_slice(), bincode::config::standard())
                .map_err(|e| CoinError::WalletsDeserialization(e.to_string()))?
                .0;
        Ok(())
    }

    fn save_to_file(&self) -> Result<()> {
        if let Some(parent) = self.wallet_file.parent() {
            fs::create_dir_all(parent).map_err(|e| CoinError::SavingWallets(e.to_string()))?;
        }
        let bytes = bincode::serde::encode_to_vec(&self.wallets, bincode::config::standard())
            .map_err(|e| CoinError::WalletsSerialization(e.to_string()))?;
        let mut file = fs::File::create(&self.wallet_file)
            .map_err(|e| CoinError::SavingWallets(e.to_string()))?;
        file.write_all(bytes.as_slice())
            .map_err(|e| CoinError::SavingWallets(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_wallet_persists_across_reload() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let wallet_file = dir.path().join("wallets.data");

        let address = {
            let mut wallets = Wallets::new(&wallet_file).expect("Failed to load wallets");
            wallets.create_wallet().expect("Failed to create wallet")
        };

        let wallets = Wallets::new(&wallet_file).expect("Failed to reload wallets");
        assert_eq!(wallets.get_addresses(), vec![address.clone()]);

        let wallet = wallets.get_wallet(&address).expect("Wallet should exist");
        assert_eq!(
            wallet.get_address().expect("Failed to derive address"),
            address
        );
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let wallets =
            Wallets::new(&dir.path().join("absent.data")).expect("Failed to load wallets");
        assert!(wallets.get_addresses().is_empty());
    }
}
