//! Copy-on-write pool configuration registry.
//!
//! Every change produces a new store value; old handles keep pointing at
//! their own entry list and never change underneath a reader. Whether a
//! handle is still the active configuration is a pointer comparison.

use crate::domain::AccountId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

use super::error::{Result, SettlementError};

/// Highest fee a pool may be configured with, in millionths.
pub const MAX_FEE: u32 = 200_000;

/// Largest tick spacing that still fits a signed 16-bit value.
pub const MAX_TICK_SPACING: i32 = i16::MAX as i32;

/// Entries are addressed by a `u16` store index.
pub const MAX_ENTRIES: usize = u16::MAX as usize + 1;

const STORE_KEY_LEN: usize = 27;

/// Truncated hash of a sorted asset pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StoreKey(pub [u8; STORE_KEY_LEN]);

impl StoreKey {
    pub fn from_pair(asset0: &AccountId, asset1: &AccountId) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(asset0.as_bytes());
        hasher.update(asset1.as_bytes());
        let digest = hasher.finalize();
        let mut key = [0u8; STORE_KEY_LEN];
        key.copy_from_slice(&digest[..STORE_KEY_LEN]);
        StoreKey(key)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl Serialize for StoreKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for StoreKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(&s))
            .map_err(serde::de::Error::custom)?;
        let key: [u8; STORE_KEY_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| serde::de::Error::custom("store key must be 27 bytes"))?;
        Ok(StoreKey(key))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfigEntry {
    pub key: StoreKey,
    pub asset0: AccountId,
    pub asset1: AccountId,
    pub tick_spacing: i32,
    pub fee: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreSnapshot {
    version: u64,
    entries: Vec<PoolConfigEntry>,
}

/// Immutable handle to one version of the pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "StoreSnapshot", into = "StoreSnapshot")]
pub struct PoolConfigStore {
    entries: Arc<Vec<PoolConfigEntry>>,
    version: u64,
}

impl Default for PoolConfigStore {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for PoolConfigStore {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.entries == other.entries
    }
}

impl From<StoreSnapshot> for PoolConfigStore {
    fn from(snapshot: StoreSnapshot) -> Self {
        Self {
            entries: Arc::new(snapshot.entries),
            version: snapshot.version,
        }
    }
}

impl From<PoolConfigStore> for StoreSnapshot {
    fn from(store: PoolConfigStore) -> Self {
        Self {
            version: store.version,
            entries: store.entries.as_ref().clone(),
        }
    }
}

impl PoolConfigStore {
    pub fn empty() -> Self {
        Self {
            entries: Arc::new(Vec::new()),
            version: 0,
        }
    }

    /// New store with the pair's entry replaced, or appended if absent.
    pub fn set_into_new(
        &self,
        asset0: AccountId,
        asset1: AccountId,
        tick_spacing: i32,
        fee: u32,
    ) -> Result<Self> {
        if asset0 >= asset1 {
            return Err(SettlementError::AssetsUnsorted { asset0, asset1 });
        }
        if !(1..=MAX_TICK_SPACING).contains(&tick_spacing) {
            return Err(SettlementError::InvalidTickSpacing { tick_spacing });
        }
        if fee > MAX_FEE {
            return Err(SettlementError::FeeAboveMax { fee, max: MAX_FEE });
        }

        let key = StoreKey::from_pair(&asset0, &asset1);
        let entry = PoolConfigEntry {
            key,
            asset0,
            asset1,
            tick_spacing,
            fee,
        };
        let mut entries = self.entries.as_ref().clone();
        let len = entries.len();
        match entries.iter_mut().find(|e| e.key == key) {
            Some(existing) => *existing = entry,
            None if len >= MAX_ENTRIES => {
                return Err(SettlementError::ConfigStoreFull { max: MAX_ENTRIES });
            }
            None => entries.push(entry),
        }
        Ok(Self {
            entries: Arc::new(entries),
            version: self.version + 1,
        })
    }

    /// Positional lookup validated against the expected key.
    pub fn get(&self, key: &StoreKey, index: u16) -> Result<&PoolConfigEntry> {
        self.entries
            .get(usize::from(index))
            .filter(|e| e.key == *key)
            .ok_or(SettlementError::NoEntry { index })
    }

    pub fn find(&self, key: &StoreKey) -> Option<(u16, &PoolConfigEntry)> {
        self.entries
            .iter()
            .enumerate()
            .find(|(_, e)| e.key == *key)
            .and_then(|(i, e)| u16::try_from(i).ok().map(|i| (i, e)))
    }

    pub fn total_entries(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[PoolConfigEntry] {
        &self.entries
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// True if both handles share the same entry list.
    pub fn same_handle(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}
