//! Seeded random walk through the bundle controller: swaps and donations
//! settle as signed bundles, liquidity moves through the controller's
//! liquidity hook, and every payout, partial or full, must match a
//! first-principles per-position model of the donations it was in range for.

use bundle_settlement::auth::{address_of, sign_digest, EcdsaVerifier};
use bundle_settlement::codec::encode_bundle;
use bundle_settlement::domain::{
    AccountId, Asset, Bundle, EpochContext, Ray, RewardDistribution, RewardsUpdate, Swap,
    TopOfBlockOrder,
};
use bundle_settlement::engine::{BundleController, ControllerConfig, SettlementError};
use bundle_settlement::venue::{
    LiquidityVenue, PoolId, PoolKey, PositionKey, SimulatedVenue, VenueError,
};
use k256::ecdsa::SigningKey;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

const STEPS: usize = 400;
const BASE_LIQUIDITY: u128 = 1_000_000_000_000_000;

fn id(n: u64) -> AccountId {
    AccountId::from_low_u64(n)
}

fn asset0() -> AccountId {
    id(1)
}

fn asset1() -> AccountId {
    id(2)
}

fn node() -> AccountId {
    id(50)
}

fn admin() -> AccountId {
    id(51)
}

fn lp() -> AccountId {
    id(100)
}

fn trader_key() -> SigningKey {
    SigningKey::from_slice(&[0x7a; 32]).unwrap()
}

fn trader() -> AccountId {
    address_of(trader_key().verifying_key())
}

struct TrackedPosition {
    key: PositionKey,
    liquidity: u128,
    /// Rewards accrued since the last payout.
    expected: f64,
}

impl TrackedPosition {
    fn active_at(&self, tick: i32) -> bool {
        self.key.lower_tick <= tick && tick < self.key.upper_tick
    }
}

struct Walk {
    pool: PoolKey,
    controller: BundleController,
    venue: SimulatedVenue,
    positions: Vec<TrackedPosition>,
    epoch: u64,
    donations: usize,
    donated: u128,
    paid: u128,
    payouts_checked: usize,
}

impl Walk {
    fn new() -> Self {
        let config = ControllerConfig {
            half_spread: Ray::ZERO,
            nodes: [node()].into_iter().collect(),
            controller: admin(),
            fee_recipient: admin(),
        };
        let mut controller = BundleController::new(config, Arc::new(EcdsaVerifier));
        let mut venue = SimulatedVenue::new();
        controller
            .configure_pool(&admin(), asset0(), asset1(), 10, 0)
            .unwrap();
        let pool = controller
            .initialize_pool(&mut venue, asset0(), asset1(), 0, 0)
            .unwrap();
        controller.deposit(trader(), asset0(), u128::MAX / 4).unwrap();
        controller.deposit(trader(), asset1(), u128::MAX / 4).unwrap();
        Self {
            pool,
            controller,
            venue,
            positions: Vec::new(),
            epoch: 0,
            donations: 0,
            donated: 0,
            paid: 0,
            payouts_checked: 0,
        }
    }

    fn id(&self) -> PoolId {
        self.pool.id()
    }

    fn tick(&self) -> i32 {
        self.venue.current_tick(&self.id()).unwrap()
    }

    fn model_liquidity(&self, tick: i32) -> u128 {
        self.positions
            .iter()
            .filter(|p| p.active_at(tick))
            .map(|p| p.liquidity)
            .sum()
    }

    fn assert_liquidity_in_sync(&self) {
        let liquidity = self.venue.current_liquidity(&self.id()).unwrap();
        assert_eq!(liquidity, self.model_liquidity(self.tick()), "venue liquidity drifted");
    }

    fn settle(&mut self, bundle: Bundle) {
        self.epoch += 1;
        let raw = encode_bundle(&bundle).unwrap();
        self.controller
            .execute_bundle(
                &node(),
                &raw,
                EpochContext::new(self.epoch, self.epoch),
                &mut self.venue,
            )
            .unwrap();
    }

    /// Trader order for the next epoch.
    fn order(&self, zero_for_one: bool, amount_in: u128, amount_out: u128) -> TopOfBlockOrder {
        let (asset_in, asset_out) = if zero_for_one { (0, 1) } else { (1, 0) };
        let ids = [asset0(), asset1()];
        let mut order = TopOfBlockOrder {
            from: trader(),
            asset_in,
            asset_out,
            amount_in,
            amount_out,
            valid_for_epoch: self.epoch + 1,
            recipient: None,
            hook: None,
            hook_payload: vec![],
            signature: vec![],
        };
        let digest = order.digest(&ids[asset_in as usize], &ids[asset_out as usize]);
        order.signature = sign_digest(&trader_key(), &digest.0).unwrap();
        order
    }

    fn empty_assets() -> Vec<Asset> {
        vec![Asset::new(asset0(), 0, 0, 0), Asset::new(asset1(), 0, 0, 0)]
    }

    fn modify(&mut self, index: usize, delta: i128) -> Result<u128, SettlementError> {
        let key = self.positions[index].key;
        let balance_before = self.controller.state().ledger.balance_of(&lp(), &asset0());
        let change = self
            .controller
            .modify_liquidity(&mut self.venue, &self.pool, &key, delta)?;
        let balance_after = self.controller.state().ledger.balance_of(&lp(), &asset0());
        assert_eq!(balance_after - balance_before, change.rewards_paid);
        Ok(change.rewards_paid)
    }

    fn add_position(&mut self, lower: i32, upper: i32, liquidity: u128) -> usize {
        let mut salt = [0u8; 32];
        salt[24..].copy_from_slice(&(self.positions.len() as u64).to_be_bytes());
        self.positions.push(TrackedPosition {
            key: PositionKey::new(lp(), lower, upper, salt),
            liquidity: 0,
            expected: 0.0,
        });
        let index = self.positions.len() - 1;
        self.add_to(index, liquidity);
        index
    }

    fn add_to(&mut self, index: usize, amount: u128) {
        assert_eq!(self.modify(index, amount as i128).unwrap(), 0);
        self.positions[index].liquidity += amount;
        self.assert_liquidity_in_sync();
    }

    /// Remove `amount`; every removal pays out everything accrued so far.
    fn remove(&mut self, index: usize, amount: u128) -> u128 {
        let payout = self.modify(index, -(amount as i128)).unwrap();
        let tracked = &mut self.positions[index];
        let slack = tracked.expected * 1e-6 + self.donations as f64 + 2.0;
        assert!(
            (payout as f64 - tracked.expected).abs() <= slack,
            "payout {} vs expected {}",
            payout,
            tracked.expected
        );
        tracked.expected = 0.0;
        tracked.liquidity -= amount;
        self.paid += payout;
        self.payouts_checked += 1;
        self.assert_liquidity_in_sync();
        payout
    }

    /// Withdraw everything, then show a second withdrawal is refused
    /// without touching any state.
    fn withdraw_twice(&mut self, index: usize) {
        let liquidity = self.positions[index].liquidity;
        self.remove(index, liquidity);

        let before = self.controller.state().clone();
        let err = self.modify(index, -(liquidity as i128)).unwrap_err();
        assert!(matches!(
            err,
            SettlementError::Venue(VenueError::LiquidityUnderflow)
        ));
        assert_eq!(self.controller.state(), &before);
        self.assert_liquidity_in_sync();
    }

    fn credit(&mut self, representative_tick: i32, amount: u128) {
        let liquidity = self.model_liquidity(representative_tick);
        for p in self
            .positions
            .iter_mut()
            .filter(|p| p.active_at(representative_tick))
        {
            p.expected += amount as f64 * p.liquidity as f64 / liquidity as f64;
        }
        self.donated += amount;
    }

    fn swap(&mut self, zero_for_one: bool, amount: u128) {
        // quote on a copy; a swap that would run out of liquidity is skipped
        let mut quote = SimulatedVenue::from_state(self.venue.state().clone());
        let Ok(delta) = quote.execute_swap(&self.pool, zero_for_one, amount) else {
            return;
        };
        let (input, output) = if zero_for_one { (0, 1) } else { (1, 0) };
        let mut assets = Self::empty_assets();
        assets[input].settle = delta.amount_in;
        assets[output].borrow = delta.amount_out;
        let bundle = Bundle {
            assets,
            top_of_block_orders: vec![self.order(zero_for_one, delta.amount_in, delta.amount_out)],
            swaps: vec![Swap {
                asset0_index: 0,
                asset1_index: 1,
                store_index: 0,
                zero_for_one,
                amount_in: amount,
            }],
            ..Default::default()
        };
        self.settle(bundle);
        assert_eq!(self.tick(), quote.current_tick(&self.id()).unwrap());
    }

    /// Donation funded by a trader paying asset0 for nothing.
    fn donate(&mut self, distribution: RewardDistribution) {
        let total = distribution.total().unwrap();
        let bundle = Bundle {
            assets: Self::empty_assets(),
            top_of_block_orders: vec![self.order(true, total, 0)],
            reward_updates: vec![RewardsUpdate {
                asset0_index: 0,
                asset1_index: 1,
                store_index: 0,
                distribution,
            }],
            ..Default::default()
        };
        self.settle(bundle);
        self.donations += 1;
    }

    fn donate_current(&mut self, amount: u128) {
        self.assert_liquidity_in_sync();
        let tick = self.tick();
        self.donate(RewardDistribution::CurrentOnly { amount });
        self.credit(tick, amount);
    }

    fn donate_multi_tick(&mut self, start_tick: i32, rng: &mut StdRng) {
        let id = self.id();
        let current = self.tick();
        let below = start_tick <= current;
        let mut ticks = if below {
            self.venue.initialized_ticks(&id, start_tick, current).unwrap()
        } else {
            self.venue.initialized_ticks(&id, current, start_tick).unwrap()
        };
        if !below {
            ticks.reverse();
        }

        // one range per crossed tick plus the current range
        let mut representatives = vec![start_tick];
        representatives.extend(ticks.iter().map(|t| if below { *t } else { t - 1 }));
        let quantities: Vec<u128> = representatives
            .iter()
            .map(|_| rng.gen_range(0..5_000_000_000u128))
            .collect();

        self.donate(RewardDistribution::MultiTick {
            start_tick,
            start_liquidity: self.model_liquidity(start_tick),
            quantities: quantities.clone(),
        });
        for (rep, quantity) in representatives.into_iter().zip(quantities) {
            if quantity > 0 {
                self.credit(rep, quantity);
            }
        }
    }

    /// A random non-base position holding at least `min` liquidity.
    fn pick(&self, rng: &mut StdRng, min: u128) -> Option<usize> {
        let candidates: Vec<usize> = (1..self.positions.len())
            .filter(|&i| self.positions[i].liquidity >= min)
            .collect();
        if candidates.is_empty() {
            return None;
        }
        Some(candidates[rng.gen_range(0..candidates.len())])
    }

    /// Remove every remaining position.
    fn close_all(&mut self) {
        for index in 0..self.positions.len() {
            let liquidity = self.positions[index].liquidity;
            if liquidity > 0 {
                self.remove(index, liquidity);
            }
        }
    }
}

fn random_range(rng: &mut StdRng) -> (i32, i32) {
    let lower = rng.gen_range(-150..150) * 10;
    let upper = lower + rng.gen_range(1..60) * 10;
    (lower, upper)
}

fn random_liquidity(rng: &mut StdRng) -> u128 {
    rng.gen_range(1_000_000_000_000..1_000_000_000_000_000)
}

#[test]
fn test_rewards_match_per_position_model() {
    let mut rng = StdRng::seed_from_u64(0x5eed_2024);
    let mut walk = Walk::new();

    // wide base keeps the walk liquid; it is only removed at the end
    walk.add_position(-3000, 3000, BASE_LIQUIDITY);
    for _ in 0..8 {
        let (lower, upper) = random_range(&mut rng);
        walk.add_position(lower, upper, random_liquidity(&mut rng));
    }

    let mut partial_removals = 0;
    let mut re_adds = 0;
    let mut double_withdrawals = 0;
    for _ in 0..STEPS {
        match rng.gen_range(0..16) {
            0..=5 => {
                let zero_for_one = rng.gen_bool(0.5);
                walk.swap(zero_for_one, rng.gen_range(1_000_000_000..2_000_000_000_000));
            }
            6..=8 => walk.donate_current(rng.gen_range(1_000_000..1_000_000_000_000)),
            9..=10 => {
                let start = (walk.tick() + rng.gen_range(-400..=400)).clamp(-2990, 2990);
                walk.donate_multi_tick(start, &mut rng);
            }
            11 => {
                let (lower, upper) = random_range(&mut rng);
                walk.add_position(lower, upper, random_liquidity(&mut rng));
            }
            // re-adding to a drained position counts too
            12 => {
                if let Some(index) = walk.pick(&mut rng, 0) {
                    walk.add_to(index, random_liquidity(&mut rng));
                    re_adds += 1;
                }
            }
            13 => {
                if let Some(index) = walk.pick(&mut rng, 2) {
                    let amount = rng.gen_range(1..walk.positions[index].liquidity);
                    walk.remove(index, amount);
                    partial_removals += 1;
                }
            }
            14 => {
                if let Some(index) = walk.pick(&mut rng, 1) {
                    walk.withdraw_twice(index);
                    double_withdrawals += 1;
                }
            }
            _ => walk.donate_current(rng.gen_range(1_000_000..1_000_000_000_000)),
        }
    }
    assert!(partial_removals > 0 && re_adds > 0 && double_withdrawals > 0);
    let interim = walk.payouts_checked;
    assert!(interim >= partial_removals + double_withdrawals);

    walk.close_all();
    assert!(walk.payouts_checked > interim);

    let positions = walk.positions.len() as u128;
    assert!(walk.paid <= walk.donated + positions);
    assert!(
        walk.paid as f64
            >= walk.donated as f64 * (1.0 - 1e-6)
                - (walk.donations * walk.payouts_checked) as f64
    );
    assert_eq!(
        walk.controller.state().ledger.reward_reserve(&asset0()),
        walk.donated - walk.paid
    );
}

#[test]
fn test_untouched_range_earns_nothing() {
    let mut walk = Walk::new();
    let near = walk.add_position(-1000, 1000, 1_000_000_000_000);
    // far above the price for the whole walk
    let far = walk.add_position(2000, 2500, 5_000_000_000_000);

    for _ in 0..20 {
        walk.donate_current(1_000_000_000);
        walk.swap(true, 10_000_000);
        walk.swap(false, 10_000_000);
    }

    assert_eq!(walk.remove(far, 2_500_000_000_000), 0);
    assert_eq!(walk.remove(far, 2_500_000_000_000), 0);

    let paid = walk.remove(near, 1_000_000_000_000);
    assert!(paid <= walk.donated && paid + 20 >= walk.donated);
}

#[test]
fn test_partial_removal_pays_accrued_once() {
    let mut walk = Walk::new();
    let position = walk.add_position(-100, 100, 1_000_000);

    walk.donate_current(1_000);
    // first partial removal takes everything accrued so far
    let first = walk.remove(position, 400_000);
    assert!((999..=1_000).contains(&first));
    assert_eq!(walk.remove(position, 100_000), 0);

    walk.add_to(position, 500_000);
    walk.donate_current(2_000);
    walk.withdraw_twice(position);
    assert!(walk.paid <= 3_000 && walk.paid >= 2_998);
    assert_eq!(
        walk.controller.state().ledger.balance_of(&lp(), &asset0()),
        walk.paid
    );
    assert_eq!(
        walk.controller.state().ledger.reward_reserve(&asset0()),
        3_000 - walk.paid
    );
}
