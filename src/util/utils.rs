use crate::error::{CoinError, Result};
use ring::digest::{Context, SHA256};
use ring::rand::SystemRandom;
use ring::signature::{
    ECDSA_P256_SHA256_FIXED, ECDSA_P256_SHA256_FIXED_SIGNING, EcdsaKeyPair, KeyPair,
};
use ripemd::{Digest, Ripemd160};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_secs() as i64
}

///
/// The `sha256_digest` function performs a SHA-256 hash operation on the provided data input,
/// returning the resulting hash as a vector of bytes.
///
/// # Arguments
///
/// * `data` - A reference to the input data.
pub fn sha256_digest(data: &[u8]) -> Vec<u8> {
    let mut context = Context::new(&SHA256);
    context.update(data);
    let digest = context.finish();
    digest.as_ref().to_vec()
}

///
/// The `ripemd160_digest` function hashes the input with RIPEMD-160, the second
/// step of public-key-hash derivation.
///
/// # Arguments
///
/// * `data` - A reference to the input data.
pub fn ripemd160_digest(data: &[u8]) -> Vec<u8> {
    let mut hasher = Ripemd160::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

///
/// The `base58_encode` function encodes the given byte slice using the Base58 encoding scheme
/// and returns the encoded string representation.
///
/// # Arguments
///
/// * `data` - A reference to the input data.
pub fn base58_encode(data: &[u8]) -> String {
    bs58::encode(data).into_string()
}

///
/// The `base58_decode` function decodes a Base58-encoded string back to its original byte
/// representation.
///
/// # Arguments
///
/// * `data` - A reference to the input data.
pub fn base58_decode(data: &str) -> Result<Vec<u8>> {
    bs58::decode(data)
        .into_vec()
        .map_err(|e| CoinError::AddressDecoding(e.to_string()))
}

///
/// The `new_key_pair` function generates a new ECDSA P-256 key pair and returns the private
/// key serialized as a PKCS#8 document.
///
/// # Returns
///
/// A new key pair.
///
pub fn new_key_pair() -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng)
        .map_err(|e| CoinError::WalletKeyPair(e.to_string()))?;
    Ok(pkcs8.as_ref().to_vec())
}

///
/// The `public_key_from_pkcs8` function derives the raw public key from a PKCS#8 private key
/// document. The key is the affine coordinates `X || Y` as big-endian byte strings, with the
/// SEC1 `0x04` point prefix stripped.
///
/// # Arguments
///
/// * `pkcs8` - A reference to the PKCS#8 document.
pub fn public_key_from_pkcs8(pkcs8: &[u8]) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
        .map_err(|e| CoinError::WalletKeyPair(e.to_string()))?;
    // Uncompressed point: 0x04 || X || Y
    let point = key_pair.public_key().as_ref();
    Ok(point[1..].to_vec())
}

///
/// The `ecdsa_p256_sha256_sign_digest` function signs the provided message using ECDSA P-256
/// with SHA-256. The returned signature is the fixed-width `r || s` concatenation, both halves
/// big-endian and equal length.
///
/// # Arguments
///
/// * `pkcs8` - A reference to the PKCS#8 document.
/// * `message` - A reference to the message.
pub fn ecdsa_p256_sha256_sign_digest(pkcs8: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    let rng = SystemRandom::new();
    let key_pair = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8, &rng)
        .map_err(|e| CoinError::TransactionSignature(e.to_string()))?;
    key_pair
        .sign(&rng, message)
        .map(|signature| signature.as_ref().to_vec())
        .map_err(|e| CoinError::TransactionSignature(e.to_string()))
}

///
/// The `ecdsa_p256_sha256_sign_verify` function verifies an `r || s` signature against a
/// message using a raw `X || Y` public key, returning a boolean for validity.
///
/// # Arguments
///
/// * `public_key` - A reference to the raw `X || Y` public key.
/// * `signature` - A reference to the signature.
/// * `message` - A reference to the message.
pub fn ecdsa_p256_sha256_sign_verify(public_key: &[u8], signature: &[u8], message: &[u8]) -> bool {
    // ring wants the SEC1 uncompressed form back.
    let mut point = Vec::with_capacity(public_key.len() + 1);
    point.push(0x04);
    point.extend_from_slice(public_key);
    let peer_public_key = ring::signature::UnparsedPublicKey::new(&ECDSA_P256_SHA256_FIXED, point);
    peer_public_key.verify(message, signature).is_ok()
}
