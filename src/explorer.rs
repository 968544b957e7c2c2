use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

use crate::events::TxHash;
use crate::warnings::MessageLog;

/// Failure talking to the chain explorer or making sense of its response
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("explorer API request failed due to {0}")]
    Transport(String),
    #[error("explorer returned invalid response: {0}")]
    InvalidResponse(String),
}

/// A single malformed field in an explorer transaction entry
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DeserializationError {
    #[error("failed to read {0} as a hash during explorer transaction query")]
    InvalidHash(&'static str),
    #[error("failed to read {0} as an integer during explorer transaction query")]
    InvalidInteger(&'static str),
    #[error("failed to read {0} as an amount during explorer transaction query")]
    InvalidAmount(&'static str),
    #[error("explorer transaction missing expected key {0}")]
    MissingKey(&'static str),
}

/// A transaction as reported by the chain explorer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmTransaction {
    pub timestamp: DateTime<Utc>,
    pub block_number: u64,
    pub tx_hash: TxHash,
    pub from_address: String,
    pub to_address: String,
    pub value: Decimal,
    pub gas: Decimal,
    /// Absent for internal transactions, which carry no gas price
    pub gas_price: Option<Decimal>,
    pub gas_used: Decimal,
    pub input_data: Vec<u8>,
    /// Absent for internal transactions
    pub nonce: Option<u64>,
}

/// The explorer API surface the transaction pipeline consumes.
///
/// Implementations translate transport and malformed-response failures into
/// [`RemoteError`]; they never panic on bad remote data.
pub trait ExplorerApi {
    /// Transactions (normal or internal) touching an address, in an optional
    /// block range
    fn get_transactions(
        &self,
        address: &str,
        internal: bool,
        from_block: Option<u64>,
        to_block: Option<u64>,
    ) -> Result<Vec<EvmTransaction>, RemoteError>;

    /// Native balance of an address, in wei
    fn get_account_balance(&self, address: &str) -> Result<Decimal, RemoteError>;
}

fn read_str<'a>(data: &'a Value, key: &'static str) -> Result<&'a str, DeserializationError> {
    data.get(key)
        .and_then(Value::as_str)
        .ok_or(DeserializationError::MissingKey(key))
}

fn read_hash_bytes(data: &Value, key: &'static str) -> Result<Vec<u8>, DeserializationError> {
    let raw = read_str(data, key)?;
    let raw = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(raw).map_err(|_| DeserializationError::InvalidHash(key))
}

fn read_tx_hash(data: &Value, key: &'static str) -> Result<TxHash, DeserializationError> {
    TxHash::from_hex(read_str(data, key)?).map_err(|_| DeserializationError::InvalidHash(key))
}

fn read_integer(data: &Value, key: &'static str) -> Result<u64, DeserializationError> {
    read_str(data, key)?
        .parse()
        .map_err(|_| DeserializationError::InvalidInteger(key))
}

fn read_amount(data: &Value, key: &'static str) -> Result<Decimal, DeserializationError> {
    Decimal::from_str(read_str(data, key)?).map_err(|_| DeserializationError::InvalidAmount(key))
}

fn read_timestamp(data: &Value, key: &'static str) -> Result<DateTime<Utc>, DeserializationError> {
    let seconds = read_integer(data, key)? as i64;
    DateTime::from_timestamp(seconds, 0).ok_or(DeserializationError::InvalidInteger(key))
}

/// Deserialize one transaction entry from an explorer response.
///
/// Internal transaction lists carry no gas price or nonce.
pub fn deserialize_transaction(
    data: &Value,
    internal: bool,
) -> Result<EvmTransaction, DeserializationError> {
    Ok(EvmTransaction {
        timestamp: read_timestamp(data, "timeStamp")?,
        block_number: read_integer(data, "blockNumber")?,
        tx_hash: read_tx_hash(data, "hash")?,
        from_address: read_str(data, "from")?.to_string(),
        to_address: read_str(data, "to")?.to_string(),
        value: read_amount(data, "value")?,
        gas: read_amount(data, "gas")?,
        gas_price: if internal {
            None
        } else {
            Some(read_amount(data, "gasPrice")?)
        },
        gas_used: read_amount(data, "gasUsed")?,
        input_data: read_hash_bytes(data, "input")?,
        nonce: if internal {
            None
        } else {
            Some(read_integer(data, "nonce")?)
        },
    })
}

/// Deserialize an explorer transaction list, skipping malformed entries.
///
/// Every skipped entry is surfaced as a user-visible warning instead of
/// aborting the whole query.
pub fn transactions_from_response(
    entries: &[Value],
    internal: bool,
    messages: &mut MessageLog,
) -> Vec<EvmTransaction> {
    entries
        .iter()
        .filter_map(|entry| match deserialize_transaction(entry, internal) {
            Ok(tx) => Some(tx),
            Err(err) => {
                messages.warn(format!("{err}. Skipping transaction"));
                None
            }
        })
        .collect()
}
