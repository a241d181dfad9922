//!
//! # Wallet
//!
//! Key pair generation and the address codec: derivation, validation and the
//! conversion between addresses and public key hashes.

use crate::error::{CoinError, Result};
use crate::util::{
    base58_decode, base58_encode, new_key_pair, public_key_from_pkcs8, ripemd160_digest,
    sha256_digest,
};
use serde::{Deserialize, Serialize};

// Address version byte, the first payload byte of every address.
const VERSION: u8 = 0x00;
pub const ADDRESS_CHECK_SUM_LEN: usize = 4;

#[derive(Clone, Serialize, Deserialize)]
pub struct Wallet {
    // ECDSA P-256 private key as a PKCS#8 document.
    pkcs8: Vec<u8>,
    // Raw public key, the affine coordinates X || Y.
    public_key: Vec<u8>,
}

impl Wallet {
    ///
    /// The `new` function creates a wallet with a fresh ECDSA P-256 key pair.
    ///
    /// # Returns
    ///
    /// A new `Wallet` instance.
    pub fn new() -> Result<Wallet> {
        let pkcs8 = new_key_pair()?;
        let public_key = public_key_from_pkcs8(pkcs8.as_slice())?;
        Ok(Wallet { pkcs8, public_key })
    }

    ///
    /// The `get_address` function derives the wallet address: Base58 of
    /// `version || pub_key_hash || checksum`.
    ///
    /// # Returns
    ///
    /// The address as a `String`.
    pub fn get_address(&self) -> Result<String> {
        convert_address(hash_pub_key(self.public_key.as_slice()).as_slice())
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_pkcs8(&self) -> &[u8] {
        self.pkcs8.as_slice()
    }
}

///
/// The `hash_pub_key` function computes the 20-byte public key hash:
/// `RIPEMD160(SHA256(pub_key))`.
///
/// # Arguments
///
/// * `pub_key` - A reference to the raw public key.
pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    ripemd160_digest(sha256_digest(pub_key).as_slice())
}

///
/// The `checksum` function is the first four bytes of the double SHA-256 of
/// the versioned payload.
fn checksum(payload: &[u8]) -> Vec<u8> {
    let first_sha = sha256_digest(payload);
    let second_sha = sha256_digest(first_sha.as_slice());
    second_sha[0..ADDRESS_CHECK_SUM_LEN].to_vec()
}

///
/// The `validate_address` function decodes an address, separates its
/// components and recomputes the checksum.
///
/// # Arguments
///
/// * `address` - A reference to the address.
pub fn validate_address(address: &str) -> Result<bool> {
    let payload = base58_decode(address)?;
    if payload.len() <= ADDRESS_CHECK_SUM_LEN + 1 {
        return Ok(false);
    }
    let actual_checksum = &payload[payload.len() - ADDRESS_CHECK_SUM_LEN..];
    let version = payload[0];
    let pub_key_hash = &payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN];

    let mut target_vec = vec![version];
    target_vec.extend_from_slice(pub_key_hash);
    let target_checksum = checksum(target_vec.as_slice());
    Ok(actual_checksum.eq(target_checksum.as_slice()))
}

///
/// The `convert_address` function turns a public key hash back into an
/// address by prepending the version byte and appending the checksum.
///
/// # Arguments
///
/// * `pub_key_hash` - A reference to the public key hash.
pub fn convert_address(pub_key_hash: &[u8]) -> Result<String> {
    let mut payload: Vec<u8> = vec![VERSION];
    payload.extend_from_slice(pub_key_hash);
    let checksum = checksum(payload.as_slice());
    payload.extend(checksum.as_slice());
    Ok(base58_encode(payload.as_slice()))
}

///
/// The `get_pub_key_hash` function extracts the public key hash embedded in a
/// valid address.
///
/// # Arguments
///
/// * `address` - A reference to the address.
pub fn get_pub_key_hash(address: &str) -> Result<Vec<u8>> {
    if !validate_address(address)? {
        return Err(CoinError::InvalidAddress(address.to_string()));
    }
    let payload = base58_decode(address)?;
    Ok(payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN].to_vec())
}
