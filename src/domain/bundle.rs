//! Decoded bundle contents: asset declarations, prices, swaps, orders, rewards.

use crate::domain::{AccountId, AssetIndex, GenericOrder, Ray, TopOfBlockOrder};
use serde::{Deserialize, Serialize};

/// One asset declared for the epoch, with its tri-balance amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: AccountId,
    /// Pulled from the venue at epoch start.
    pub borrow: u128,
    /// Credited to the node fee reserve at epoch end.
    pub save: u128,
    /// Paid back to the venue at epoch end.
    pub settle: u128,
}

impl Asset {
    pub fn new(id: AccountId, borrow: u128, save: u128, settle: u128) -> Self {
        Self {
            id,
            borrow,
            save,
            settle,
        }
    }
}

/// Directed price for `(out, in)`: input units per output unit, ray-scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceEntry {
    pub out_index: AssetIndex,
    pub in_index: AssetIndex,
    pub price: Ray,
}

/// A swap against the venue pool configured for `(asset0, asset1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Swap {
    pub asset0_index: AssetIndex,
    pub asset1_index: AssetIndex,
    /// Position of the pair's entry in the pool config store.
    pub store_index: u16,
    pub zero_for_one: bool,
    pub amount_in: u128,
}

/// How reward quantities are spread over the pool's tick ranges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum RewardDistribution {
    /// Entire amount goes to liquidity in range at the current tick.
    CurrentOnly { amount: u128 },
    /// `quantities[0]` goes to the range containing `start_tick`, each next
    /// quantity to the next range toward the current tick; the last one is
    /// the current range.
    MultiTick {
        start_tick: i32,
        start_liquidity: u128,
        quantities: Vec<u128>,
    },
}

impl RewardDistribution {
    pub fn total(&self) -> Option<u128> {
        match self {
            RewardDistribution::CurrentOnly { amount } => Some(*amount),
            RewardDistribution::MultiTick { quantities, .. } => quantities
                .iter()
                .try_fold(0u128, |acc, q| acc.checked_add(*q)),
        }
    }
}

/// Explicit reward donation to a pool, paid in the pool's asset0.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardsUpdate {
    pub asset0_index: AssetIndex,
    pub asset1_index: AssetIndex,
    pub store_index: u16,
    pub distribution: RewardDistribution,
}

/// Fully decoded bundle, phases in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub assets: Vec<Asset>,
    pub initial_prices: Vec<PriceEntry>,
    pub top_of_block_orders: Vec<TopOfBlockOrder>,
    pub swaps: Vec<Swap>,
    pub generic_orders: Vec<GenericOrder>,
    pub reward_updates: Vec<RewardsUpdate>,
}
