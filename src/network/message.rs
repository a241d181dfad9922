//! # Wire codec
//!
//! Every message is a 12-byte zero-padded ASCII command followed by a bincode
//! payload. A connection carries exactly one message; the sender closes its
//! end and the receiver reads to EOF, so the payload delimits itself.

use crate::error::{CoinError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const COMMAND_LENGTH: usize = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpType {
    Block,
    Tx,
}

/// Opening handshake: announce our best height so either side can catch up.
#[derive(Debug, Serialize, Deserialize)]
pub struct Version {
    pub addr_from: String,
    pub version: usize,
    pub best_height: usize,
}

/// Peer discovery: the sender's known node list.
#[derive(Debug, Serialize, Deserialize)]
pub struct Addr {
    pub addr_list: Vec<String>,
}

/// Ask for the tip-walk list of block hashes.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetBlocks {
    pub addr_from: String,
}

/// Advertise block hashes or transaction ids available from the sender.
#[derive(Debug, Serialize, Deserialize)]
pub struct Inv {
    pub addr_from: String,
    pub op_type: OpType,
    pub items: Vec<Vec<u8>>,
}

/// Request one block or one transaction by id.
#[derive(Debug, Serialize, Deserialize)]
pub struct GetData {
    pub addr_from: String,
    pub op_type: OpType,
    pub id: Vec<u8>,
}

/// Deliver one serialized block.
#[derive(Debug, Serialize, Deserialize)]
pub struct BlockMessage {
    pub addr_from: String,
    pub block: Vec<u8>,
}

/// Deliver one serialized transaction.
#[derive(Debug, Serialize, Deserialize)]
pub struct TxMessage {
    pub addr_from: String,
    pub transaction: Vec<u8>,
}

pub fn cmd_to_bytes(cmd: &str) -> [u8; COMMAND_LENGTH] {
    let mut bytes = [0u8; COMMAND_LENGTH];
    for (idx, byte) in cmd.bytes().enumerate() {
        bytes[idx] = byte;
    }
    bytes
}

pub fn bytes_to_cmd(bytes: &[u8]) -> Result<String> {
    let cmd: Vec<u8> = bytes.iter().copied().filter(|b| *b != 0x00).collect();
    String::from_utf8(cmd).map_err(|e| CoinError::MalformedMessage(e.to_string()))
}

/// Frames a request: command prefix followed by the serialized payload.
pub fn encode_request<T: Serialize>(cmd: &str, payload: &T) -> Result<Vec<u8>> {
    let mut request = cmd_to_bytes(cmd).to_vec();
    let payload_bytes = bincode::serde::encode_to_vec(payload, bincode::config::standard())
        .map_err(|e| CoinError::MalformedMessage(e.to_string()))?;
    request.extend(payload_bytes);
    Ok(request)
}

pub fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| CoinError::MalformedMessage(e.to_string()))
        .map(|(payload, _)| payload)
}
