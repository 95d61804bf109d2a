//! Domain primitives: AccountId, EpochId, EpochContext, AssetIndex, Tick bounds.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Position of an asset in the current epoch's asset list.
pub type AssetIndex = u16;

/// Settlement window counter (one bundle per epoch).
pub type EpochId = u64;

/// Lowest tick a 24-bit tick index may take.
pub const MIN_TICK: i32 = -887_272;
/// Highest tick a 24-bit tick index may take.
pub const MAX_TICK: i32 = 887_272;

/// Returns true if `tick` fits the 24-bit tick domain.
pub fn tick_in_range(tick: i32) -> bool {
    (MIN_TICK..=MAX_TICK).contains(&tick)
}

/// 20-byte account or asset identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(pub [u8; 20]);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AccountIdParseError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("expected 20 bytes, got {0}")]
    InvalidLength(usize),
}

impl AccountId {
    pub const ZERO: AccountId = AccountId([0u8; 20]);

    pub fn new(bytes: [u8; 20]) -> Self {
        AccountId(bytes)
    }

    /// Identifier whose last byte is `n`, handy for fixtures.
    pub fn from_low_u64(n: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&n.to_be_bytes());
        AccountId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for AccountId {
    type Err = AccountIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let stripped = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes =
            hex::decode(stripped).map_err(|e| AccountIdParseError::InvalidHex(e.to_string()))?;
        let array: [u8; 20] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AccountIdParseError::InvalidLength(bytes.len()))?;
        Ok(AccountId(array))
    }
}

impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        AccountId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// The host environment's view of the epoch a bundle executes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochContext {
    pub epoch: EpochId,
    /// Seconds since Unix epoch, used for standing-order deadlines.
    pub timestamp: u64,
}

impl EpochContext {
    pub fn new(epoch: EpochId, timestamp: u64) -> Self {
        Self { epoch, timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_display_roundtrip() {
        let id = AccountId::from_low_u64(0xabcdef);
        let text = id.to_string();
        assert_eq!(text, "0x0000000000000000000000000000000000abcdef");
        assert_eq!(AccountId::from_str(&text).unwrap(), id);
    }

    #[test]
    fn test_account_id_rejects_wrong_length() {
        let err = AccountId::from_str("0x1234").unwrap_err();
        assert_eq!(err, AccountIdParseError::InvalidLength(2));
    }

    #[test]
    fn test_account_id_ordering_is_bytewise() {
        assert!(AccountId::from_low_u64(1) < AccountId::from_low_u64(2));
        assert!(AccountId::from_low_u64(255) < AccountId::from_low_u64(256));
    }

    #[test]
    fn test_account_id_json_is_hex_string() {
        let id = AccountId::from_low_u64(7);
        let json = serde_json::to_value(id).unwrap();
        assert!(json.is_string());
        let back: AccountId = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_tick_range() {
        assert!(tick_in_range(0));
        assert!(tick_in_range(MIN_TICK));
        assert!(tick_in_range(MAX_TICK));
        assert!(!tick_in_range(MAX_TICK + 1));
    }
}
