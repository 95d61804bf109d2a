//! In-process concentrated-liquidity venue.
//!
//! Prices follow the usual `1.0001^tick` curve with floating-point square
//! root prices. Swaps walk initialized ticks exactly like the on-chain
//! engine would, so tick crossings (and with them reward bookkeeping) are
//! realistic. Token amounts backing positions are not modeled; only the
//! session deltas produced by `take`, `settle` and swaps are.

use super::{
    LiquidityVenue, PoolId, PoolKey, PositionKey, SwapDelta, VenueCheckpoint, VenueError,
};
use crate::domain::{map_entries, tick_in_range, AccountId, MAX_TICK, MIN_TICK};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

const FEE_DENOMINATOR: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct TickInfo {
    liquidity_gross: u128,
    liquidity_net: i128,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SimPool {
    key: PoolKey,
    tick: i32,
    sqrt_price: f64,
    liquidity: u128,
    ticks: BTreeMap<i32, TickInfo>,
    #[serde(with = "map_entries")]
    positions: BTreeMap<PositionKey, u128>,
}

/// Everything a venue holds between sessions; persisted alongside the
/// settlement state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VenueState {
    pools: HashMap<PoolId, SimPool>,
    deltas: BTreeMap<AccountId, i128>,
}

#[derive(Debug, Default)]
pub struct SimulatedVenue {
    state: VenueState,
    checkpoints: Vec<VenueState>,
}

fn sqrt_price_at_tick(tick: i32) -> f64 {
    1.0001f64.powf(tick as f64 / 2.0)
}

fn tick_at_sqrt_price(sqrt_price: f64) -> i32 {
    let tick = (2.0 * sqrt_price.ln() / 1.0001f64.ln()).floor();
    (tick as i32).clamp(MIN_TICK, MAX_TICK)
}

impl SimulatedVenue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a venue from persisted state. Open checkpoints are not kept.
    pub fn from_state(state: VenueState) -> Self {
        Self {
            state,
            checkpoints: Vec::new(),
        }
    }

    pub fn state(&self) -> &VenueState {
        &self.state
    }

    /// Open session delta for `asset`; negative means the caller owes the venue.
    pub fn session_delta(&self, asset: &AccountId) -> i128 {
        self.state.deltas.get(asset).copied().unwrap_or(0)
    }

    pub fn pool_ids(&self) -> Vec<PoolId> {
        self.state.pools.keys().copied().collect()
    }

    fn pool(&self, id: &PoolId) -> Result<&SimPool, VenueError> {
        self.state.pools.get(id).ok_or(VenueError::UnknownPool(*id))
    }

    fn pool_mut(&mut self, id: &PoolId) -> Result<&mut SimPool, VenueError> {
        self.state.pools.get_mut(id).ok_or(VenueError::UnknownPool(*id))
    }

    fn add_delta(&mut self, asset: AccountId, amount: i128) -> Result<(), VenueError> {
        let entry = self.state.deltas.entry(asset).or_insert(0);
        *entry = entry.checked_add(amount).ok_or(VenueError::Overflow)?;
        if *entry == 0 {
            self.state.deltas.remove(&asset);
        }
        Ok(())
    }

    fn check_checkpoint(&self, checkpoint: VenueCheckpoint) -> Result<(), VenueError> {
        if checkpoint.0 >= self.checkpoints.len() {
            return Err(VenueError::InvalidCheckpoint);
        }
        Ok(())
    }
}

impl SimPool {
    fn update_tick(&mut self, tick: i32, delta: i128, upper: bool) -> Result<(), VenueError> {
        let info = self.ticks.entry(tick).or_default();
        let gross = if delta >= 0 {
            info.liquidity_gross.checked_add(delta.unsigned_abs())
        } else {
            info.liquidity_gross.checked_sub(delta.unsigned_abs())
        };
        info.liquidity_gross = gross.ok_or(VenueError::LiquidityUnderflow)?;
        let signed = if upper { delta.checked_neg() } else { Some(delta) };
        info.liquidity_net = signed
            .and_then(|d| info.liquidity_net.checked_add(d))
            .ok_or(VenueError::Overflow)?;
        if info.liquidity_gross == 0 {
            self.ticks.remove(&tick);
        }
        Ok(())
    }

    fn apply_net(&mut self, net: i128) -> Result<(), VenueError> {
        let next = (self.liquidity as i128)
            .checked_add(net)
            .ok_or(VenueError::Overflow)?;
        self.liquidity = u128::try_from(next).map_err(|_| VenueError::LiquidityUnderflow)?;
        Ok(())
    }

    /// Walk the curve downward, paying in asset0.
    fn swap_zero_for_one(&mut self, pool: PoolId, mut remaining: f64) -> Result<f64, VenueError> {
        let mut out = 0.0;
        while remaining > 0.0 {
            let next = self.ticks.range(..=self.tick).next_back().map(|(t, _)| *t);
            let Some(next_tick) = next else {
                return Err(VenueError::InsufficientLiquidity(pool));
            };
            let target = sqrt_price_at_tick(next_tick);
            let liquidity = self.liquidity as f64;
            let max_in = if liquidity > 0.0 {
                liquidity * (1.0 / target - 1.0 / self.sqrt_price)
            } else {
                0.0
            };
            if liquidity > 0.0 && remaining < max_in {
                let new_sqrt = 1.0 / (1.0 / self.sqrt_price + remaining / liquidity);
                out += liquidity * (self.sqrt_price - new_sqrt);
                self.sqrt_price = new_sqrt;
                self.tick = tick_at_sqrt_price(new_sqrt).clamp(next_tick, self.tick);
                remaining = 0.0;
            } else {
                out += liquidity * (self.sqrt_price - target);
                remaining -= max_in.max(0.0);
                self.sqrt_price = target;
                let net = self.ticks.get(&next_tick).map_or(0, |t| t.liquidity_net);
                self.apply_net(net.checked_neg().ok_or(VenueError::Overflow)?)?;
                self.tick = next_tick - 1;
            }
        }
        Ok(out)
    }

    /// Walk the curve upward, paying in asset1.
    fn swap_one_for_zero(&mut self, pool: PoolId, mut remaining: f64) -> Result<f64, VenueError> {
        let mut out = 0.0;
        while remaining > 0.0 {
            let next = self
                .ticks
                .range(self.tick.saturating_add(1)..)
                .next()
                .map(|(t, _)| *t);
            let Some(next_tick) = next else {
                return Err(VenueError::InsufficientLiquidity(pool));
            };
            let target = sqrt_price_at_tick(next_tick);
            let liquidity = self.liquidity as f64;
            let max_in = liquidity * (target - self.sqrt_price);
            if liquidity > 0.0 && remaining < max_in {
                let new_sqrt = self.sqrt_price + remaining / liquidity;
                out += liquidity * (1.0 / self.sqrt_price - 1.0 / new_sqrt);
                self.sqrt_price = new_sqrt;
                self.tick = tick_at_sqrt_price(new_sqrt).clamp(self.tick, next_tick - 1);
                remaining = 0.0;
            } else {
                out += liquidity * (1.0 / self.sqrt_price - 1.0 / target);
                remaining -= max_in.max(0.0);
                self.sqrt_price = target;
                let net = self.ticks.get(&next_tick).map_or(0, |t| t.liquidity_net);
                self.apply_net(net)?;
                self.tick = next_tick;
            }
        }
        Ok(out)
    }
}

impl LiquidityVenue for SimulatedVenue {
    fn initialize_pool(&mut self, key: &PoolKey, tick: i32) -> Result<(), VenueError> {
        if !tick_in_range(tick) {
            return Err(VenueError::InvalidTick {
                tick,
                tick_spacing: key.tick_spacing,
            });
        }
        let id = key.id();
        if self.state.pools.contains_key(&id) {
            return Err(VenueError::PoolExists(id));
        }
        debug!(pool = %id, tick, "initializing simulated pool");
        self.state.pools.insert(
            id,
            SimPool {
                key: *key,
                tick,
                sqrt_price: sqrt_price_at_tick(tick),
                liquidity: 0,
                ticks: BTreeMap::new(),
                positions: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn current_tick(&self, pool: &PoolId) -> Result<i32, VenueError> {
        Ok(self.pool(pool)?.tick)
    }

    fn current_liquidity(&self, pool: &PoolId) -> Result<u128, VenueError> {
        Ok(self.pool(pool)?.liquidity)
    }

    fn liquidity_net(&self, pool: &PoolId, tick: i32) -> Result<i128, VenueError> {
        Ok(self
            .pool(pool)?
            .ticks
            .get(&tick)
            .map_or(0, |t| t.liquidity_net))
    }

    fn initialized_ticks(
        &self,
        pool: &PoolId,
        above: i32,
        up_to: i32,
    ) -> Result<Vec<i32>, VenueError> {
        if up_to <= above {
            return Ok(Vec::new());
        }
        Ok(self
            .pool(pool)?
            .ticks
            .range(above.saturating_add(1)..=up_to)
            .map(|(t, _)| *t)
            .collect())
    }

    fn execute_swap(
        &mut self,
        key: &PoolKey,
        zero_for_one: bool,
        amount_in: u128,
    ) -> Result<SwapDelta, VenueError> {
        let id = key.id();
        let pool = self.pool_mut(&id)?;
        let tick_before = pool.tick;
        let after_fee = amount_in as f64 * (1.0 - pool.key.fee as f64 / FEE_DENOMINATOR);
        let out = if zero_for_one {
            pool.swap_zero_for_one(id, after_fee)?
        } else {
            pool.swap_one_for_zero(id, after_fee)?
        };
        let tick_after = pool.tick;
        let amount_out = out.max(0.0).floor() as u128;

        let (asset_in, asset_out) = if zero_for_one {
            (key.asset0, key.asset1)
        } else {
            (key.asset1, key.asset0)
        };
        let owed = i128::try_from(amount_in).map_err(|_| VenueError::Overflow)?;
        let credit = i128::try_from(amount_out).map_err(|_| VenueError::Overflow)?;
        self.add_delta(asset_in, -owed)?;
        self.add_delta(asset_out, credit)?;

        debug!(pool = %id, zero_for_one, amount_in, amount_out, tick_before, tick_after, "swap");
        Ok(SwapDelta {
            amount_in,
            amount_out,
            tick_before,
            tick_after,
        })
    }

    fn settle(&mut self, asset: AccountId, amount: u128) -> Result<(), VenueError> {
        let amount = i128::try_from(amount).map_err(|_| VenueError::Overflow)?;
        self.add_delta(asset, amount)
    }

    fn take(&mut self, asset: AccountId, amount: u128) -> Result<(), VenueError> {
        let amount = i128::try_from(amount).map_err(|_| VenueError::Overflow)?;
        self.add_delta(asset, -amount)
    }

    fn position_liquidity(&self, pool: &PoolId, key: &PositionKey) -> Result<u128, VenueError> {
        Ok(self
            .pool(pool)?
            .positions
            .get(key)
            .copied()
            .unwrap_or(0))
    }

    fn modify_position(
        &mut self,
        key: &PoolKey,
        position: &PositionKey,
        liquidity_delta: i128,
    ) -> Result<u128, VenueError> {
        let spacing = key.tick_spacing;
        let (lower, upper) = (position.lower_tick, position.upper_tick);
        for tick in [lower, upper] {
            if !tick_in_range(tick) || spacing <= 0 || tick % spacing != 0 {
                return Err(VenueError::InvalidTick {
                    tick,
                    tick_spacing: spacing,
                });
            }
        }
        if lower >= upper {
            return Err(VenueError::InvalidTick {
                tick: upper,
                tick_spacing: spacing,
            });
        }

        let pool = self.pool_mut(&key.id())?;
        let before = pool.positions.get(position).copied().unwrap_or(0);
        let after = (before as i128)
            .checked_add(liquidity_delta)
            .and_then(|v| u128::try_from(v).ok())
            .ok_or(VenueError::LiquidityUnderflow)?;

        pool.update_tick(lower, liquidity_delta, false)?;
        pool.update_tick(upper, liquidity_delta, true)?;
        if lower <= pool.tick && pool.tick < upper {
            pool.apply_net(liquidity_delta)?;
        }
        if after == 0 {
            pool.positions.remove(position);
        } else {
            pool.positions.insert(*position, after);
        }
        Ok(after)
    }

    fn checkpoint(&mut self) -> VenueCheckpoint {
        self.checkpoints.push(self.state.clone());
        VenueCheckpoint(self.checkpoints.len() - 1)
    }

    fn revert_to(&mut self, checkpoint: VenueCheckpoint) -> Result<(), VenueError> {
        self.check_checkpoint(checkpoint)?;
        self.checkpoints.truncate(checkpoint.0 + 1);
        if let Some(saved) = self.checkpoints.pop() {
            self.state = saved;
        }
        Ok(())
    }

    fn commit(&mut self, checkpoint: VenueCheckpoint) -> Result<(), VenueError> {
        self.check_checkpoint(checkpoint)?;
        if let Some((asset, delta)) = self.state.deltas.iter().next() {
            return Err(VenueError::UnsettledDelta {
                asset: *asset,
                delta: *delta,
            });
        }
        self.checkpoints.truncate(checkpoint.0);
        Ok(())
    }
}
