//! Liquidity-provider reward accounting.
//!
//! Growth is per unit of liquidity in X128 fixed point. Each pool keeps a
//! global growth counter and, per initialized tick, the growth accrued on
//! the far side of that tick ("outside"). Crossing a tick flips its outside
//! value, so the growth inside any range is an O(1) query. All growth
//! arithmetic wraps on 256 bits; only differences are meaningful.

use crate::domain::{map_entries, tick_in_range};
use crate::venue::{LiquidityVenue, PoolId, PositionKey};
use ethnum::{I256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use super::error::{Result, SettlementError};

/// `growth * liquidity >> 128` on the two's-complement reading of `growth`,
/// truncated to 256 bits.
///
/// Reading growth as signed keeps reward debt consistent when a range's
/// growth-inside starts slightly below zero.
pub fn mul_x128(growth: U256, liquidity: u128) -> U256 {
    let hi: I256 = growth.as_i256() >> 128;
    let lo = growth & U256::from(u128::MAX);
    let hi_part = hi.wrapping_mul(I256::from(liquidity)).as_u256();
    let lo_part = (lo * U256::from(liquidity)) >> 128;
    hi_part.wrapping_add(lo_part)
}

/// Growth added by donating `amount` across `liquidity`.
fn growth_of(amount: u128, liquidity: u128) -> Result<U256> {
    if liquidity == 0 {
        return Err(SettlementError::ZeroLiquidity);
    }
    Ok((U256::from(amount) << 128) / U256::from(liquidity))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolRewards {
    pub global_growth: U256,
    #[serde(with = "map_entries")]
    pub growth_outside: BTreeMap<i32, U256>,
}

impl PoolRewards {
    fn outside(&self, tick: i32) -> U256 {
        self.growth_outside.get(&tick).copied().unwrap_or(U256::ZERO)
    }

    fn flip(&mut self, tick: i32) {
        let global = self.global_growth;
        let outside = self.growth_outside.entry(tick).or_insert(U256::ZERO);
        *outside = global.wrapping_sub(*outside);
    }

    fn add_outside(&mut self, tick: i32, growth: U256) {
        let outside = self.growth_outside.entry(tick).or_insert(U256::ZERO);
        *outside = outside.wrapping_add(growth);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardAccumulator {
    #[serde(with = "map_entries")]
    pools: BTreeMap<PoolId, PoolRewards>,
    /// Reward debt per position.
    #[serde(with = "map_entries")]
    past_rewards: BTreeMap<(PoolId, PositionKey), U256>,
}

impl RewardAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pool(&self, pool: &PoolId) -> Option<&PoolRewards> {
        self.pools.get(pool)
    }

    pub fn global_growth(&self, pool: &PoolId) -> U256 {
        self.pools
            .get(pool)
            .map_or(U256::ZERO, |p| p.global_growth)
    }

    pub fn growth_outside(&self, pool: &PoolId, tick: i32) -> U256 {
        self.pools.get(pool).map_or(U256::ZERO, |p| p.outside(tick))
    }

    pub fn past_rewards(&self, pool: &PoolId, position: &PositionKey) -> U256 {
        self.past_rewards
            .get(&(*pool, *position))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Flip every initialized tick crossed by moving from `tick_before` to
    /// `tick_after`. Returns the number of ticks crossed.
    pub fn update_after_tick_move(
        &mut self,
        pool: &PoolId,
        venue: &dyn LiquidityVenue,
        tick_before: i32,
        tick_after: i32,
    ) -> Result<usize> {
        let crossed = if tick_after > tick_before {
            venue.initialized_ticks(pool, tick_before, tick_after)?
        } else if tick_after < tick_before {
            venue.initialized_ticks(pool, tick_after, tick_before)?
        } else {
            return Ok(0);
        };
        let rewards = self.pools.entry(*pool).or_default();
        for tick in &crossed {
            rewards.flip(*tick);
        }
        if !crossed.is_empty() {
            debug!(
                pool = %pool,
                tick_before,
                tick_after,
                crossed = crossed.len(),
                "flipped growth outside"
            );
        }
        Ok(crossed.len())
    }

    /// Growth inside `[lower, upper)` as seen from `current_tick`.
    ///
    /// A never-touched boundary on the wrong side of an existing one is first
    /// snapped to the existing value, so one-sided growth never starts out
    /// negative.
    pub fn get_growth_inside(
        &mut self,
        pool: &PoolId,
        current_tick: i32,
        lower: i32,
        upper: i32,
    ) -> U256 {
        let rewards = self.pools.entry(*pool).or_default();
        let lower_new = !rewards.growth_outside.contains_key(&lower);
        let upper_new = !rewards.growth_outside.contains_key(&upper);
        let mut lower_growth = rewards.outside(lower);
        let mut upper_growth = rewards.outside(upper);

        if current_tick < lower {
            if lower_new && upper_growth.as_i256() > lower_growth.as_i256() {
                lower_growth = upper_growth;
            }
        } else if upper <= current_tick
            && upper_new
            && lower_growth.as_i256() > upper_growth.as_i256()
        {
            upper_growth = lower_growth;
        }
        rewards.growth_outside.insert(lower, lower_growth);
        rewards.growth_outside.insert(upper, upper_growth);

        if current_tick < lower {
            lower_growth.wrapping_sub(upper_growth)
        } else if upper <= current_tick {
            upper_growth.wrapping_sub(lower_growth)
        } else {
            rewards
                .global_growth
                .wrapping_sub(lower_growth)
                .wrapping_sub(upper_growth)
        }
    }

    /// Checkpoint reward debt before `liquidity_delta` is added to a position.
    pub fn on_add_liquidity(
        &mut self,
        pool: &PoolId,
        current_tick: i32,
        position: &PositionKey,
        liquidity_delta: u128,
    ) {
        let growth =
            self.get_growth_inside(pool, current_tick, position.lower_tick, position.upper_tick);
        let past = self.past_rewards.entry((*pool, *position)).or_insert(U256::ZERO);
        *past = past.wrapping_add(mul_x128(growth, liquidity_delta));
    }

    /// Settle rewards before `removed` liquidity leaves a position holding
    /// `liquidity_before`. Returns the payout owed to the owner.
    pub fn on_remove_liquidity(
        &mut self,
        pool: &PoolId,
        current_tick: i32,
        position: &PositionKey,
        liquidity_before: u128,
        removed: u128,
    ) -> Result<u128> {
        let remaining = liquidity_before
            .checked_sub(removed)
            .ok_or(SettlementError::AmountOverflow)?;
        let growth =
            self.get_growth_inside(pool, current_tick, position.lower_tick, position.upper_tick);
        let key = (*pool, *position);
        let past = self.past_rewards.get(&key).copied().unwrap_or(U256::ZERO);
        let owed = mul_x128(growth, liquidity_before).wrapping_sub(past);
        if owed > U256::from(u128::MAX) {
            return Err(SettlementError::AmountOverflow);
        }
        let payout = owed.as_u128();

        if remaining == 0 {
            self.past_rewards.remove(&key);
        } else {
            self.past_rewards.insert(key, mul_x128(growth, remaining));
        }
        Ok(payout)
    }

    /// Donate `amount` to the liquidity in range at the current tick.
    pub fn distribute_current(
        &mut self,
        pool: &PoolId,
        current_liquidity: u128,
        amount: u128,
    ) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let growth = growth_of(amount, current_liquidity)?;
        let rewards = self.pools.entry(*pool).or_default();
        rewards.global_growth = rewards.global_growth.wrapping_add(growth);
        Ok(())
    }

    /// Donate `quantities` range by range, starting with the range that
    /// contains `start_tick` and walking toward the current tick.
    pub fn distribute_multi_tick(
        &mut self,
        pool: &PoolId,
        venue: &dyn LiquidityVenue,
        start_tick: i32,
        start_liquidity: u128,
        quantities: &[u128],
    ) -> Result<()> {
        if !tick_in_range(start_tick) {
            return Err(SettlementError::InvalidTick { tick: start_tick });
        }
        let current_tick = venue.current_tick(pool)?;
        let below = start_tick <= current_tick;
        let mut ticks = if below {
            venue.initialized_ticks(pool, start_tick, current_tick)?
        } else {
            venue.initialized_ticks(pool, current_tick, start_tick)?
        };
        if !below {
            ticks.reverse();
        }
        let Some((&last_quantity, range_quantities)) = quantities.split_last() else {
            return Err(SettlementError::RewardQuantitiesMismatch);
        };
        if range_quantities.len() != ticks.len() {
            return Err(SettlementError::RewardQuantitiesMismatch);
        }

        let rewards = self.pools.entry(*pool).or_default();
        let mut liquidity = start_liquidity;
        let mut cumulative = U256::ZERO;
        for (&tick, &quantity) in ticks.iter().zip(range_quantities) {
            if quantity > 0 {
                cumulative = cumulative.wrapping_add(growth_of(quantity, liquidity)?);
            }
            rewards.add_outside(tick, cumulative);
            let net = venue.liquidity_net(pool, tick)?;
            let signed = if below { Some(net) } else { net.checked_neg() };
            liquidity = signed
                .and_then(|n| (liquidity as i128).checked_add(n))
                .and_then(|l| u128::try_from(l).ok())
                .ok_or(SettlementError::AmountOverflow)?;
        }

        let expected = venue.current_liquidity(pool)?;
        if liquidity != expected {
            return Err(SettlementError::WrongEndLiquidity {
                expected,
                actual: liquidity,
            });
        }
        if last_quantity > 0 {
            cumulative = cumulative.wrapping_add(growth_of(last_quantity, liquidity)?);
        }
        rewards.global_growth = rewards.global_growth.wrapping_add(cumulative);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AccountId;
    use crate::venue::{PoolKey, SimulatedVenue};

    fn key() -> PoolKey {
        PoolKey::new(AccountId::from_low_u64(1), AccountId::from_low_u64(2), 10, 0)
    }

    fn position(lower: i32, upper: i32) -> PositionKey {
        PositionKey::new(AccountId::from_low_u64(7), lower, upper, [0u8; 32])
    }

    fn one_x128() -> U256 {
        U256::ONE << 128
    }

    #[test]
    fn test_mul_x128_handles_negative_growth() {
        let minus_one = U256::ZERO.wrapping_sub(one_x128());
        let plus_two = U256::from(2u8) << 128;
        let liquidity = 5u128;
        let delta = mul_x128(plus_two, liquidity).wrapping_sub(mul_x128(minus_one, liquidity));
        assert_eq!(delta, U256::from(15u8));
        assert_eq!(mul_x128(one_x128(), 3), U256::from(3u8));
    }

    #[test]
    fn test_current_only_distribution() {
        let pool = key().id();
        let mut acc = RewardAccumulator::new();
        acc.distribute_current(&pool, 4, 10).unwrap();
        assert_eq!(mul_x128(acc.global_growth(&pool), 4), U256::from(10u8));
        assert!(matches!(
            acc.distribute_current(&pool, 0, 1),
            Err(SettlementError::ZeroLiquidity)
        ));
    }

    #[test]
    fn test_growth_inside_by_side() {
        let pool = key().id();
        let mut acc = RewardAccumulator::new();
        acc.distribute_current(&pool, 1, 100).unwrap();
        let global = acc.global_growth(&pool);
        // untouched ticks: everything so far counts as inside when in range
        assert_eq!(acc.get_growth_inside(&pool, 0, -10, 10), global);
        assert_eq!(acc.get_growth_inside(&pool, 0, 20, 30), U256::ZERO);
        assert_eq!(acc.get_growth_inside(&pool, 0, -30, -20), U256::ZERO);
    }

    #[test]
    fn test_snapping_new_lower_below_price() {
        let pool = key().id();
        let mut acc = RewardAccumulator::new();
        acc.distribute_current(&pool, 1, 50).unwrap();
        acc.pools
            .get_mut(&pool)
            .unwrap()
            .growth_outside
            .insert(30, U256::from(40u8));
        // price below a new lower (20) with an existing upper (30) that is ahead
        let inside = acc.get_growth_inside(&pool, 0, 20, 30);
        assert_eq!(inside, U256::ZERO);
        assert_eq!(acc.growth_outside(&pool, 20), U256::from(40u8));
    }

    #[test]
    fn test_snapping_leaves_existing_ticks_alone() {
        let pool = key().id();
        let mut acc = RewardAccumulator::new();
        {
            let rewards = acc.pools.entry(pool).or_default();
            rewards.growth_outside.insert(20, U256::from(5u8));
            rewards.growth_outside.insert(30, U256::from(9u8));
        }
        let inside = acc.get_growth_inside(&pool, 0, 20, 30);
        assert_eq!(inside, U256::from(5u8).wrapping_sub(U256::from(9u8)));
        assert_eq!(acc.growth_outside(&pool, 20), U256::from(5u8));
    }

    #[test]
    fn test_add_then_remove_pays_accrued() {
        let pool = key().id();
        let pos = position(-10, 10);
        let mut acc = RewardAccumulator::new();
        acc.distribute_current(&pool, 1_000, 7).unwrap();
        acc.on_add_liquidity(&pool, 0, &pos, 1_000);
        acc.distribute_current(&pool, 1_000, 500).unwrap();
        let paid = acc.on_remove_liquidity(&pool, 0, &pos, 1_000, 400).unwrap();
        assert_eq!(paid, 500);
        // the rest of the position has nothing further to claim
        let again = acc.on_remove_liquidity(&pool, 0, &pos, 600, 600).unwrap();
        assert_eq!(again, 0);
        assert_eq!(acc.past_rewards(&pool, &pos), U256::ZERO);
    }

    #[test]
    fn test_tick_crossing_flips_outside() {
        let mut venue = SimulatedVenue::new();
        venue.initialize_pool(&key(), 0).unwrap();
        venue
            .modify_position(&key(), &position(-20, 20), 1_000_000)
            .unwrap();
        let pool = key().id();
        let mut acc = RewardAccumulator::new();
        acc.distribute_current(&pool, 1_000_000, 1_000).unwrap();
        let crossed = acc.update_after_tick_move(&pool, &venue, 0, -25).unwrap();
        assert_eq!(crossed, 1);
        assert_eq!(acc.growth_outside(&pool, -20), acc.global_growth(&pool));
        assert_eq!(acc.update_after_tick_move(&pool, &venue, 5, 5).unwrap(), 0);
    }

    #[test]
    fn test_multi_tick_walk_from_below() {
        let mut venue = SimulatedVenue::new();
        venue.initialize_pool(&key(), 0).unwrap();
        // [-40, 40) with 100 and [-20, 20) with 300
        venue.modify_position(&key(), &position(-40, 40), 100).unwrap();
        venue.modify_position(&key(), &position(-20, 20), 300).unwrap();
        let pool = key().id();
        let mut acc = RewardAccumulator::new();

        // range below -20 has 100, current range has 400
        acc.distribute_multi_tick(&pool, &venue, -30, 100, &[100, 400])
            .unwrap();
        let g = acc.global_growth(&pool);
        assert_eq!(mul_x128(g, 1), U256::from(2u8));
        // the wide position's share of the lower range is recorded outside -20
        assert_eq!(mul_x128(acc.growth_outside(&pool, -20), 100), U256::from(100u8));
    }

    #[test]
    fn test_multi_tick_requires_matching_quantities() {
        let mut venue = SimulatedVenue::new();
        venue.initialize_pool(&key(), 0).unwrap();
        venue.modify_position(&key(), &position(-20, 20), 300).unwrap();
        let pool = key().id();
        let mut acc = RewardAccumulator::new();
        assert!(matches!(
            acc.distribute_multi_tick(&pool, &venue, -30, 0, &[1]),
            Err(SettlementError::RewardQuantitiesMismatch)
        ));
        assert!(matches!(
            acc.distribute_multi_tick(&pool, &venue, -30, 0, &[0, 5]),
            Ok(())
        ));
        assert!(matches!(
            acc.distribute_multi_tick(&pool, &venue, -30, 7, &[0, 5]),
            Err(SettlementError::WrongEndLiquidity {
                expected: 300,
                actual: 307
            })
        ));
    }

    #[test]
    fn test_multi_tick_walk_from_above() {
        let mut venue = SimulatedVenue::new();
        venue.initialize_pool(&key(), 0).unwrap();
        venue.modify_position(&key(), &position(-20, 20), 300).unwrap();
        venue.modify_position(&key(), &position(10, 50), 200).unwrap();
        let pool = key().id();
        let mut acc = RewardAccumulator::new();
        // ranges: [20,50) has 200, [10,20) has 500, current [.., 10) has 300
        acc.distribute_multi_tick(&pool, &venue, 30, 200, &[200, 500, 300])
            .unwrap();
        assert_eq!(mul_x128(acc.global_growth(&pool), 1), U256::from(3u8));
        assert_eq!(mul_x128(acc.growth_outside(&pool, 20), 1), U256::from(1u8));
        assert_eq!(mul_x128(acc.growth_outside(&pool, 10), 1), U256::from(2u8));
    }
}
