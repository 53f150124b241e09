//! Shared swap data model

use crate::error::{BridgeError, BridgeResult};

use chrono::{DateTime, Utc};
use ethers::types::{H256, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 32-byte transaction or block hash, rendered as lowercase hex without prefix
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash(pub [u8; 32]);

impl Hash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Hex with a `0x` prefix, as Ethereum and Neo RPCs expect
    pub fn to_prefixed(&self) -> String {
        format!("0x{}", self)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self)
    }
}

impl FromStr for Hash {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|_| BridgeError::InvalidHash(s.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| BridgeError::InvalidHash(s.to_string()))?;
        Ok(Hash(arr))
    }
}

impl From<H256> for Hash {
    fn from(h: H256) -> Self {
        Hash(h.0)
    }
}

impl From<Hash> for H256 {
    fn from(h: Hash) -> Self {
        H256(h.0)
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Token quantity in its source precision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub symbol: String,
    pub value: U256,
    pub decimals: u8,
}

impl TokenAmount {
    pub fn new(symbol: impl Into<String>, value: U256, decimals: u8) -> Self {
        Self {
            symbol: symbol.into(),
            value,
            decimals,
        }
    }

    /// Re-express the value in `target_decimals` precision, truncating extra digits
    pub fn to_precision(&self, target_decimals: u8) -> BridgeResult<U256> {
        convert_decimals(self.value, self.decimals, target_decimals)
    }
}

/// Fails instead of wrapping when the scaled value leaves the 256-bit range
pub fn convert_decimals(value: U256, from: u8, to: u8) -> BridgeResult<U256> {
    let overflow = || BridgeError::AmountOverflow {
        value: value.to_string(),
        decimals: to,
    };
    let scale = |gap: u8| U256::from(10u64).checked_pow(U256::from(gap));
    match from.cmp(&to) {
        std::cmp::Ordering::Equal => Ok(value),
        std::cmp::Ordering::Less => scale(to - from)
            .and_then(|factor| value.checked_mul(factor))
            .ok_or_else(overflow),
        std::cmp::Ordering::Greater => Ok(scale(from - to)
            .map(|factor| value / factor)
            .unwrap_or_default()),
    }
}

/// A detected, unresolved incoming transfer on a foreign chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSwap {
    pub platform: String,
    pub source_hash: Hash,
    pub source_address: String,
    pub destination_address: String,
    pub amount: TokenAmount,
}

/// Fee-settlement leg status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeStatus {
    Settle,
    Confirm,
    Finished,
}

impl FeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeStatus::Settle => "settle",
            FeeStatus::Confirm => "confirm",
            FeeStatus::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "settle" => Some(FeeStatus::Settle),
            "confirm" => Some(FeeStatus::Confirm),
            "finished" => Some(FeeStatus::Finished),
            _ => None,
        }
    }

    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_become(&self, next: FeeStatus) -> bool {
        matches!(
            (self, next),
            (FeeStatus::Settle, FeeStatus::Confirm)
                | (FeeStatus::Confirm, FeeStatus::Finished)
                | (FeeStatus::Confirm, FeeStatus::Settle)
        )
    }
}

/// Deferred native fee reimbursement following an outbound delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFee {
    pub source_hash: Hash,
    pub destination_hash: Hash,
    pub settle_hash: Option<Hash>,
    pub time: DateTime<Utc>,
    pub status: FeeStatus,
}

impl PendingFee {
    pub fn new(source_hash: Hash, destination_hash: Hash, time: DateTime<Utc>) -> Self {
        Self {
            source_hash,
            destination_hash,
            settle_hash: None,
            time,
            status: FeeStatus::Settle,
        }
    }
}

/// Swap view returned to API callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSwap {
    pub source_platform: String,
    pub source_hash: Hash,
    pub source_address: String,
    pub destination_platform: String,
    pub destination_address: String,
    pub destination_hash: Option<Hash>,
    pub amount: TokenAmount,
}

/// Block as seen through the oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteropBlock {
    pub platform: String,
    pub height: u64,
    pub hash: Hash,
    pub transactions: Vec<Hash>,
}

/// Transaction as seen through the oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteropTransaction {
    pub platform: String,
    pub hash: Hash,
    pub transfers: Vec<InteropTransfer>,
}

/// A value movement inside a foreign transaction.
///
/// `destination_address` is the foreign address that received the funds;
/// `interop_address` is the recipient on the counterpart chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteropTransfer {
    pub source_address: String,
    pub destination_address: String,
    pub interop_address: String,
    pub amount: TokenAmount,
}

/// Outcome of an outbound payment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Included on the destination chain
    Confirmed(Hash),
    /// Broadcast, not yet included
    Pending,
    /// The recorded transaction is absent from both chain and mempool; a fresh attempt is allowed
    Dropped(Hash),
    /// Included but reverted by the destination chain
    Rejected,
    /// Nothing was broadcast
    NotBroadcast,
}

impl DeliveryStatus {
    pub fn hash(&self) -> Option<Hash> {
        match self {
            DeliveryStatus::Confirmed(h) => Some(*h),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeliveryStatus::Confirmed(_) => "confirmed",
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Dropped(_) => "dropped",
            DeliveryStatus::Rejected => "rejected",
            DeliveryStatus::NotBroadcast => "not_broadcast",
        }
    }
}

#[cfg(test)]
pub(crate) fn test_hash(n: u8) -> Hash {
    Hash([n; 32])
}
