//! Core chain types
//!
//! - `Address`: 20-byte account / contract address
//! - `TransactionRequest`: what gets handed to `eth_sendTransaction`
//! - `TxReceipt` and `LogEntry`: mined transaction results
//! - Hex quantity helpers for JSON-RPC encoding

use primitive_types::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A 20-byte account or contract address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero address
    pub const ZERO: Address = Address([0u8; 20]);

    /// Build an address from a 20-byte slice
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; 20] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Whether this is the zero address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

/// Error parsing an address from text
#[derive(Debug, Error, PartialEq)]
#[error("Invalid address: {0}")]
pub struct InvalidAddress(pub String);

impl FromStr for Address {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.len() != 40 {
            return Err(InvalidAddress(s.to_string()));
        }

        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes).map_err(|_| InvalidAddress(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================
// Hex quantities
// ============================================

/// Errors decoding JSON-RPC hex values
#[derive(Debug, Error, PartialEq)]
pub enum HexError {
    #[error("Missing 0x prefix: {0}")]
    MissingPrefix(String),

    #[error("Invalid hex value: {0}")]
    Invalid(String),

    #[error("Value does not fit in 64 bits: {0}")]
    Overflow(String),
}

/// Encode a U256 as a JSON-RPC quantity ("0x0", "0x1f", ...)
pub fn to_quantity(value: U256) -> String {
    if value.is_zero() {
        "0x0".to_string()
    } else {
        format!("0x{:x}", value)
    }
}

/// Decode a JSON-RPC quantity into a U256
pub fn parse_quantity(text: &str) -> Result<U256, HexError> {
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| HexError::MissingPrefix(text.to_string()))?;

    if digits.is_empty() {
        return Ok(U256::zero());
    }

    U256::from_str_radix(digits, 16).map_err(|_| HexError::Invalid(text.to_string()))
}

/// Decode a JSON-RPC quantity that must fit in a u64
pub fn parse_quantity_u64(text: &str) -> Result<u64, HexError> {
    let value = parse_quantity(text)?;
    if value > U256::from(u64::MAX) {
        return Err(HexError::Overflow(text.to_string()));
    }
    Ok(value.low_u64())
}

/// Encode raw bytes as 0x-prefixed hex data
pub fn to_hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Decode 0x-prefixed hex data
pub fn parse_hex_data(text: &str) -> Result<Vec<u8>, HexError> {
    let digits = text
        .strip_prefix("0x")
        .ok_or_else(|| HexError::MissingPrefix(text.to_string()))?;
    hex::decode(digits).map_err(|_| HexError::Invalid(text.to_string()))
}

// ============================================
// Transactions
// ============================================

/// A contract-call transaction ready for `eth_sendTransaction`
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub data: Vec<u8>,
    pub value: U256,
    pub gas: u64,
}

impl TransactionRequest {
    /// JSON-RPC transaction object
    pub fn to_json(&self) -> Value {
        json!({
            "from": self.from.to_string(),
            "to": self.to.to_string(),
            "data": to_hex_data(&self.data),
            "value": to_quantity(self.value),
            "gas": format!("{:#x}", self.gas),
        })
    }
}

/// A log emitted by a mined transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
}

/// Receipt of a mined transaction
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: String,
    pub block_number: u64,
    pub from: Address,
    pub to: Option<Address>,
    pub contract_address: Option<Address>,
    /// 1 = success, 0 = reverted
    pub status: u64,
    pub gas_used: u64,
    pub logs: Vec<LogEntry>,
}

impl TxReceipt {
    /// Whether execution succeeded
    pub fn succeeded(&self) -> bool {
        self.status == 1
    }

    /// Address of the first log emitter, if any
    ///
    /// The factory emits its creation event from the new campaign contract,
    /// so this is how a freshly deployed campaign is identified.
    pub fn first_log_address(&self) -> Option<Address> {
        self.logs.first().map(|log| log.address)
    }

    /// Decode a receipt object returned by `eth_getTransactionReceipt`
    ///
    /// Some nodes return a receipt with a null `blockNumber` while the
    /// transaction is pending; that decodes to `None`.
    pub fn from_json(value: Value) -> Result<Option<Self>, HexError> {
        let raw: RawReceipt =
            serde_json::from_value(value).map_err(|e| HexError::Invalid(e.to_string()))?;
        let Some(block_number) = raw.block_number else {
            return Ok(None);
        };

        Ok(Some(Self {
            transaction_hash: raw.transaction_hash,
            block_number: parse_quantity_u64(&block_number)?,
            from: raw.from,
            to: raw.to,
            contract_address: raw.contract_address,
            // Pre-Byzantium receipts have no status; treat them as success
            status: match raw.status {
                Some(status) => parse_quantity_u64(&status)?,
                None => 1,
            },
            gas_used: match raw.gas_used {
                Some(gas) => parse_quantity_u64(&gas)?,
                None => 0,
            },
            logs: raw.logs,
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    from: Address,
    to: Option<Address>,
    contract_address: Option<Address>,
    status: Option<String>,
    gas_used: Option<String>,
    #[serde(default)]
    logs: Vec<LogEntry>,
}
