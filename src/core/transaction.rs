use crate::error::{CoinError, Result};
use crate::store::UTXOSet;
use crate::util::{
    base58_decode, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify, sha256_digest,
};
use crate::wallet::{ADDRESS_CHECK_SUM_LEN, Wallet, hash_pub_key};
use data_encoding::HEXLOWER;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Amount issued to the miner by every coinbase transaction.
pub const REWARD: i64 = 20;

/// Sentinel output index of a coinbase input.
const COINBASE_VOUT: i64 = -1;

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TXInput {
    txid: Vec<u8>,
    vout: i64,
    signature: Vec<u8>,
    pub_key: Vec<u8>,
}

impl TXInput {
    pub fn new(txid: &[u8], vout: i64) -> TXInput {
        TXInput {
            txid: txid.to_vec(),
            vout,
            signature: vec![],
            pub_key: vec![],
        }
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_txid_hex(&self) -> String {
        HEXLOWER.encode(self.txid.as_slice())
    }

    pub fn get_vout(&self) -> i64 {
        self.vout
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }

    /// True when the embedded public key hashes to `pub_key_hash`, i.e. this
    /// input spends an output locked to that address.
    pub fn uses_key(&self, pub_key_hash: &[u8]) -> bool {
        let locking_hash = hash_pub_key(self.pub_key.as_slice());
        locking_hash.eq(pub_key_hash)
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct TXOutput {
    value: i64,
    pub_key_hash: Vec<u8>,
}

impl TXOutput {
    pub fn new(value: i64, address: &str) -> Result<TXOutput> {
        let mut output = TXOutput {
            value,
            pub_key_hash: vec![],
        };
        output.lock(address)?;
        Ok(output)
    }

    pub fn get_value(&self) -> i64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    // Locks the output to the public key hash embedded in a Base58 address.
    fn lock(&mut self, address: &str) -> Result<()> {
        let payload = base58_decode(address)?;
        if payload.len() <= ADDRESS_CHECK_SUM_LEN + 1 {
            return Err(CoinError::InvalidAddress(address.to_string()));
        }
        self.pub_key_hash = payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN].to_vec();
        Ok(())
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash.eq(pub_key_hash)
    }
}

/// The stored value of one UTXO index entry: the still-unspent outputs of a
/// single transaction.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct TXOutputs {
    pub outputs: Vec<TXOutput>,
}

impl TXOutputs {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CoinError::TransactionSerialization(e.to_string()))
    }

    pub fn deserialize(bytes: &[u8]) -> Result<TXOutputs> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| CoinError::TransactionDeserialization(e.to_string()))
            .map(|(outputs, _)| outputs)
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    /// The `new_coinbase_tx` function creates the block-reward transaction: a
    /// single sentinel input and one output paying `REWARD` to `to`. An empty
    /// `data` is replaced with 24 random bytes hex-encoded so coinbases minted
    /// in the same second still get distinct ids.
    pub fn new_coinbase_tx(to: &str, data: &str) -> Result<Transaction> {
        let data = if data.is_empty() {
            let mut rand_data = [0u8; 24];
            rand::rng().fill(&mut rand_data[..]);
            HEXLOWER.encode(&rand_data)
        } else {
            data.to_string()
        };

        let tx_input = TXInput {
            txid: vec![],
            vout: COINBASE_VOUT,
            signature: vec![],
            pub_key: data.into_bytes(),
        };
        let tx_output = TXOutput::new(REWARD, to)?;

        let mut tx = Transaction {
            id: vec![],
            vin: vec![tx_input],
            vout: vec![tx_output],
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    ///
    /// This function constructs a new UTXO-based transaction by selecting
    /// spendable outputs from the index, creating one input per selected
    /// output, an output for the recipient and a change output back to the
    /// sender when anything is left over. The transaction is signed against
    /// the chain behind the UTXO set.
    ///
    /// # Arguments
    ///
    /// * `wallet` - The sender's wallet.
    /// * `to` - The address of the recipient.
    /// * `amount` - The amount to transfer.
    /// * `utxo_set` - The UTXO index to select outputs from.
    pub async fn new_utxo_transaction(
        wallet: &Wallet,
        to: &str,
        amount: i64,
        utxo_set: &UTXOSet,
    ) -> Result<Transaction> {
        let pub_key_hash = hash_pub_key(wallet.get_public_key());

        let (accumulated, valid_outputs) =
            utxo_set.find_spendable_outputs(pub_key_hash.as_slice(), amount).await?;
        if accumulated < amount {
            return Err(CoinError::NotEnoughFunds);
        }

        let mut inputs = vec![];
        for (txid_hex, outs) in valid_outputs {
            let txid = HEXLOWER
                .decode(txid_hex.as_bytes())
                .map_err(|e| CoinError::TransactionIdHexDecoding(e.to_string()))?;
            for out_idx in outs {
                inputs.push(TXInput {
                    txid: txid.clone(),
                    vout: out_idx as i64,
                    signature: vec![],
                    pub_key: wallet.get_public_key().to_vec(),
                });
            }
        }

        let mut outputs = vec![TXOutput::new(amount, to)?];
        if accumulated > amount {
            // Return change to the sender
            outputs.push(TXOutput::new(accumulated - amount, &wallet.get_address()?)?);
        }

        let mut tx = Transaction {
            id: vec![],
            vin: inputs,
            vout: outputs,
        };
        tx.id = tx.hash()?;
        utxo_set
            .get_blockchain()
            .sign_transaction(&mut tx, wallet.get_pkcs8())
            .await?;
        Ok(tx)
    }

    ///
    /// `trimmed_copy` creates a copy of the transaction with every input's
    /// signature and public key cleared, the shape both signing and
    /// verification work against.
    fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .vin
            .iter()
            .map(|input| TXInput::new(input.get_txid(), input.get_vout()))
            .collect();
        Transaction {
            id: self.id.clone(),
            vin: inputs,
            vout: self.vout.clone(),
        }
    }

    /// The canonical signing pre-image: the lowercase-hex rendering of the
    /// serialized trimmed copy. Pinned for the network; both ends must agree
    /// byte for byte.
    fn signing_payload(tx_copy: &Transaction) -> Result<Vec<u8>> {
        Ok(HEXLOWER.encode(tx_copy.serialize()?.as_slice()).into_bytes())
    }

    ///
    /// The `sign` function signs every input of the transaction. For input `i`
    /// the pre-image is the trimmed copy with input `i`'s public key replaced
    /// by the referenced previous output's public key hash. The signature is
    /// stored as the raw `r || s` concatenation.
    ///
    /// # Arguments
    ///
    /// * `pkcs8` - The sender's private key document.
    /// * `prev_txs` - Every transaction referenced by an input, keyed by hex id.
    pub fn sign(&mut self, pkcs8: &[u8], prev_txs: &HashMap<String, Transaction>) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        for input in &self.vin {
            if !prev_txs.contains_key(&input.get_txid_hex()) {
                return Err(CoinError::TransactionNotFound(
                    "previous transaction is not available".to_string(),
                ));
            }
        }

        let mut tx_copy = self.trimmed_copy();
        for (idx, vin) in self.vin.iter_mut().enumerate() {
            let prev_tx = &prev_txs[&HEXLOWER.encode(vin.txid.as_slice())];
            tx_copy.vin[idx].signature = vec![];
            tx_copy.vin[idx].pub_key = prev_tx.vout[vin.vout as usize].pub_key_hash.clone();

            let payload = Self::signing_payload(&tx_copy)?;
            vin.signature = ecdsa_p256_sha256_sign_digest(pkcs8, payload.as_slice())?;
            tx_copy.vin[idx].pub_key = vec![];
        }
        Ok(())
    }

    ///
    /// The `verify` function checks every input signature against the embedded
    /// public key, rebuilding the same pre-image used by `sign`. Returns false
    /// on the first failing input. A referenced transaction missing from
    /// `prev_txs` is a fatal error, not a verification failure.
    ///
    /// # Arguments
    ///
    /// * `prev_txs` - Every transaction referenced by an input, keyed by hex id.
    pub fn verify(&self, prev_txs: &HashMap<String, Transaction>) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }

        for input in &self.vin {
            if !prev_txs.contains_key(&input.get_txid_hex()) {
                return Err(CoinError::TransactionNotFound(
                    "previous transaction is not available".to_string(),
                ));
            }
        }

        let mut tx_copy = self.trimmed_copy();
        for (idx, vin) in self.vin.iter().enumerate() {
            let prev_tx = &prev_txs[&vin.get_txid_hex()];
            tx_copy.vin[idx].signature = vec![];
            tx_copy.vin[idx].pub_key = prev_tx.vout[vin.vout as usize].pub_key_hash.clone();

            let payload = Self::signing_payload(&tx_copy)?;
            let valid = ecdsa_p256_sha256_sign_verify(
                vin.pub_key.as_slice(),
                vin.signature.as_slice(),
                payload.as_slice(),
            );
            tx_copy.vin[idx].pub_key = vec![];
            if !valid {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// A transaction is coinbase iff it has exactly one input and that input
    /// is the sentinel: empty previous id, output index -1.
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].txid.is_empty() && self.vin[0].vout == COINBASE_VOUT
    }

    pub fn not_coinbase(&self) -> bool {
        !self.is_coinbase()
    }

    ///
    /// The `hash` function computes the transaction id: the SHA-256 digest of
    /// the serialization with the id field cleared.
    fn hash(&self) -> Result<Vec<u8>> {
        let tx_copy = Transaction {
            id: vec![],
            vin: self.vin.clone(),
            vout: self.vout.clone(),
        };
        Ok(sha256_digest(tx_copy.serialize()?.as_slice()))
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_id_bytes(&self) -> Vec<u8> {
        self.id.clone()
    }

    pub fn get_tx_id_hex(&self) -> String {
        HEXLOWER.encode(self.id.as_slice())
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| CoinError::TransactionSerialization(e.to_string()))
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| CoinError::TransactionDeserialization(e.to_string()))
            .map(|(tx, _)| tx)
    }
}
