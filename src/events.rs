use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Broad classification of a history event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    Spend,
    Receive,
    Deposit,
    Withdrawal,
    Trade,
    Renew,
}

/// Refinement of [`EventType`] attached by the decoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventSubtype {
    None,
    Fee,
    Spend,
    Receive,
    Airdrop,
    Reward,
}

/// 32-byte transaction hash, displayed as 0x-prefixed hex
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    /// Parse from a hex string, with or without the `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        let hash: [u8; 32] = bytes
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(TxHash(hash))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({self})")
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TxHash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Where a history event came from.
///
/// Chain events carry the transaction hash and optionally the counterparty
/// protocol the decoder recognised (e.g. the gas fee tag). Only chain events
/// participate in counterparty-based rule lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EventSource {
    Manual,
    Chain {
        tx_hash: TxHash,
        #[serde(default)]
        counterparty: Option<String>,
    },
}

/// Source family used for companion-event compatibility checks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceCategory {
    Manual,
    Chain,
}

impl SourceCategory {
    pub fn display(&self) -> &'static str {
        match self {
            SourceCategory::Manual => "manual",
            SourceCategory::Chain => "chain",
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// A classified accounting event, produced upstream by the transaction
/// decoding pipeline and read-only for the accounting core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub event_type: EventType,
    pub event_subtype: EventSubtype,
    pub source: EventSource,
    pub asset: String,
    pub amount: Decimal,
    /// Account/venue where this happened (e.g. "ethereum", "kraken")
    pub location: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub notes: String,
    /// Groups the legs of one logical transaction together
    pub group_identifier: String,
    /// Position of this event within its group
    pub sequence_index: u32,
}

impl HistoryEvent {
    pub fn source_category(&self) -> SourceCategory {
        match self.source {
            EventSource::Manual => SourceCategory::Manual,
            EventSource::Chain { .. } => SourceCategory::Chain,
        }
    }

    pub fn counterparty(&self) -> Option<&str> {
        match &self.source {
            EventSource::Manual => None,
            EventSource::Chain { counterparty, .. } => counterparty.as_deref(),
        }
    }

    pub fn tx_hash(&self) -> Option<&TxHash> {
        match &self.source {
            EventSource::Manual => None,
            EventSource::Chain { tx_hash, .. } => Some(tx_hash),
        }
    }
}
