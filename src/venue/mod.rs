//! Seam to the external liquidity engine.
//!
//! The controller only ever talks to pools through [`LiquidityVenue`]. Value
//! moved with `take`/`settle` and swap deltas accumulate in a per-session
//! delta that must net to zero before the session is committed, so a bundle
//! either leaves the venue balanced or is reverted to its checkpoint.

pub mod simulated;

pub use simulated::{SimulatedVenue, VenueState};

use crate::domain::AccountId;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Pool identity: sorted asset pair plus its configured parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolKey {
    pub asset0: AccountId,
    pub asset1: AccountId,
    pub tick_spacing: i32,
    pub fee: u32,
}

impl PoolKey {
    pub fn new(asset0: AccountId, asset1: AccountId, tick_spacing: i32, fee: u32) -> Self {
        Self {
            asset0,
            asset1,
            tick_spacing,
            fee,
        }
    }

    pub fn id(&self) -> PoolId {
        let mut hasher = Sha256::new();
        hasher.update(self.asset0.as_bytes());
        hasher.update(self.asset1.as_bytes());
        hasher.update(self.tick_spacing.to_be_bytes());
        hasher.update(self.fee.to_be_bytes());
        PoolId(hasher.finalize().into())
    }
}

/// 32-byte pool identifier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PoolId(pub [u8; 32]);

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for PoolId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|e| e.to_string())?;
        let array: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| format!("expected 32 bytes, got {}", bytes.len()))?;
        Ok(PoolId(array))
    }
}

impl Serialize for PoolId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PoolId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PoolId::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Liquidity position identity within a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionKey {
    pub owner: AccountId,
    pub lower_tick: i32,
    pub upper_tick: i32,
    pub salt: [u8; 32],
}

impl PositionKey {
    pub fn new(owner: AccountId, lower_tick: i32, upper_tick: i32, salt: [u8; 32]) -> Self {
        Self {
            owner,
            lower_tick,
            upper_tick,
            salt,
        }
    }
}

/// Result of a swap: amount paid in and received out, and the tick the pool
/// ended on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapDelta {
    pub amount_in: u128,
    pub amount_out: u128,
    pub tick_before: i32,
    pub tick_after: i32,
}

/// Opaque marker returned by [`LiquidityVenue::checkpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VenueCheckpoint(pub(crate) usize);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VenueError {
    #[error("pool {0} not initialized")]
    UnknownPool(PoolId),
    #[error("pool {0} already initialized")]
    PoolExists(PoolId),
    #[error("not enough liquidity in pool {0}")]
    InsufficientLiquidity(PoolId),
    #[error("tick {tick} invalid for spacing {tick_spacing}")]
    InvalidTick { tick: i32, tick_spacing: i32 },
    #[error("position liquidity underflow")]
    LiquidityUnderflow,
    #[error("session delta for {asset} left at {delta}")]
    UnsettledDelta { asset: AccountId, delta: i128 },
    #[error("unknown or stale checkpoint")]
    InvalidCheckpoint,
    #[error("venue arithmetic overflow")]
    Overflow,
}

/// Narrow interface to the pool engine.
///
/// Deltas are from the caller's point of view: `take` and swap outputs are
/// credits the caller owes back, `settle` and swap inputs pay them off.
pub trait LiquidityVenue: Send {
    fn initialize_pool(&mut self, key: &PoolKey, tick: i32) -> Result<(), VenueError>;

    fn current_tick(&self, pool: &PoolId) -> Result<i32, VenueError>;

    /// Liquidity in range at the current tick.
    fn current_liquidity(&self, pool: &PoolId) -> Result<u128, VenueError>;

    /// Net liquidity added when the price crosses `tick` upward.
    fn liquidity_net(&self, pool: &PoolId, tick: i32) -> Result<i128, VenueError>;

    /// Initialized ticks in `(above, up_to]`, ascending.
    fn initialized_ticks(
        &self,
        pool: &PoolId,
        above: i32,
        up_to: i32,
    ) -> Result<Vec<i32>, VenueError>;

    fn execute_swap(
        &mut self,
        pool: &PoolKey,
        zero_for_one: bool,
        amount_in: u128,
    ) -> Result<SwapDelta, VenueError>;

    fn settle(&mut self, asset: AccountId, amount: u128) -> Result<(), VenueError>;

    fn take(&mut self, asset: AccountId, amount: u128) -> Result<(), VenueError>;

    fn position_liquidity(&self, pool: &PoolId, key: &PositionKey) -> Result<u128, VenueError>;

    /// Apply a liquidity change to a position. Returns the new liquidity.
    fn modify_position(
        &mut self,
        pool: &PoolKey,
        key: &PositionKey,
        liquidity_delta: i128,
    ) -> Result<u128, VenueError>;

    fn checkpoint(&mut self) -> VenueCheckpoint;

    /// Drop everything done since `checkpoint`.
    fn revert_to(&mut self, checkpoint: VenueCheckpoint) -> Result<(), VenueError>;

    /// Keep everything done since `checkpoint`; fails if any session delta
    /// is still open.
    fn commit(&mut self, checkpoint: VenueCheckpoint) -> Result<(), VenueError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_id_depends_on_params() {
        let a = AccountId::from_low_u64(1);
        let b = AccountId::from_low_u64(2);
        let k1 = PoolKey::new(a, b, 60, 3000);
        let k2 = PoolKey::new(a, b, 60, 500);
        assert_eq!(k1.id(), PoolKey::new(a, b, 60, 3000).id());
        assert_ne!(k1.id(), k2.id());
    }

    #[test]
    fn test_pool_id_text_roundtrip() {
        let id = PoolKey::new(AccountId::from_low_u64(1), AccountId::from_low_u64(2), 1, 0).id();
        let parsed: PoolId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
