//! Bundle controller: epoch lock, phase orchestration and admin operations.
//!
//! A bundle runs against a staged copy of the durable state and inside a
//! venue checkpoint. Only when every phase and the final solvency check pass
//! are the staged state and venue effects committed; any failure discards
//! both, so no partial settlement is ever observable.

use crate::auth::{HookRegistry, SignatureVerifier};
use crate::codec::{decode_assets, decode_bundle};
use crate::domain::{
    AccountId, Action, Asset, AssetIndex, Bundle, EpochContext, EpochId, Ray, RequestAuth,
    RewardDistribution,
};
use crate::venue::{LiquidityVenue, PoolKey, PositionKey, VenueError};
use ethnum::U256;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::config_store::{PoolConfigStore, StoreKey};
use super::error::{Result, SettlementError};
use super::globals::{check_asset_order, Globals};
use super::ledger::{AssetLedger, EpochLedger};
use super::nonces::NonceBitmap;
use super::orders::{OrderEffects, OrderExecutor};
use super::rewards::RewardAccumulator;

/// Roles and pricing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub half_spread: Ray,
    pub nodes: BTreeSet<AccountId>,
    pub controller: AccountId,
    pub fee_recipient: AccountId,
}

/// Everything that survives an epoch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementState {
    pub last_epoch_updated: Option<EpochId>,
    pub ledger: AssetLedger,
    pub rewards: RewardAccumulator,
    pub nonces: NonceBitmap,
    /// Nonces of signed out-of-bundle requests.
    #[serde(default)]
    pub request_nonces: NonceBitmap,
    pub pool_configs: PoolConfigStore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetAmount {
    pub asset: AccountId,
    pub amount: u128,
}

/// Summary of a settled bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementReceipt {
    pub epoch: EpochId,
    /// Hex sha256 of the raw bundle.
    pub bundle_digest: String,
    pub assets: usize,
    pub top_of_block_orders: usize,
    pub swaps: usize,
    pub generic_orders: usize,
    pub reward_updates: usize,
    pub ticks_crossed: usize,
    pub fees_saved: Vec<AssetAmount>,
    pub rewards_distributed: Vec<AssetAmount>,
}

/// Outcome of a liquidity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiquidityChange {
    pub liquidity: u128,
    pub rewards_paid: u128,
}

pub fn bundle_digest(raw: &[u8]) -> String {
    hex::encode(Sha256::digest(raw))
}

pub struct BundleController {
    config: ControllerConfig,
    state: SettlementState,
    verifier: Arc<dyn SignatureVerifier>,
    hooks: HookRegistry,
}

impl BundleController {
    pub fn new(config: ControllerConfig, verifier: Arc<dyn SignatureVerifier>) -> Self {
        Self {
            config,
            state: SettlementState::default(),
            verifier,
            hooks: HookRegistry::new(),
        }
    }

    pub fn with_state(mut self, state: SettlementState) -> Self {
        self.state = state;
        self
    }

    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn state(&self) -> &SettlementState {
        &self.state
    }

    pub fn pool_configs(&self) -> &PoolConfigStore {
        &self.state.pool_configs
    }

    /// Put back a state captured with `state().clone()`.
    pub fn restore(&mut self, state: SettlementState) {
        self.state = state;
    }

    /// Check that `auth` signs `action` and burn its request nonce.
    pub fn authorize(&mut self, auth: &RequestAuth, action: &Action) -> Result<()> {
        let digest = action.digest(&auth.caller, auth.nonce);
        if !self
            .verifier
            .verify(&auth.caller, &digest.0, &auth.signature)
        {
            warn!(caller = %auth.caller, action = action.name(), "request signature rejected");
            return Err(SettlementError::InvalidSignature {
                signer: auth.caller,
            });
        }
        self.state
            .request_nonces
            .use_nonce(auth.caller, auth.nonce)?;
        debug!(
            caller = %auth.caller,
            nonce = auth.nonce,
            action = action.name(),
            "request authorized"
        );
        Ok(())
    }

    /// Settle one bundle for `epoch`. At most one bundle succeeds per epoch.
    pub fn execute_bundle(
        &mut self,
        caller: &AccountId,
        raw: &[u8],
        epoch: EpochContext,
        venue: &mut dyn LiquidityVenue,
    ) -> Result<SettlementReceipt> {
        if !self.config.nodes.contains(caller) {
            return Err(SettlementError::NotNode { caller: *caller });
        }
        if self.state.last_epoch_updated == Some(epoch.epoch) {
            return Err(SettlementError::AlreadySettledThisEpoch { epoch: epoch.epoch });
        }
        check_asset_order(&decode_assets(raw)?)?;
        let bundle = decode_bundle(raw)?;

        let mut staged = self.state.clone();
        let checkpoint = venue.checkpoint();
        let outcome = self
            .run_phases(&mut staged, &bundle, epoch, venue)
            .and_then(|receipt| {
                venue.commit(checkpoint)?;
                Ok(receipt)
            });

        match outcome {
            Ok(mut receipt) => {
                staged.last_epoch_updated = Some(epoch.epoch);
                self.state = staged;
                receipt.bundle_digest = bundle_digest(raw);
                info!(
                    epoch = epoch.epoch,
                    digest = %receipt.bundle_digest,
                    top_of_block = receipt.top_of_block_orders,
                    swaps = receipt.swaps,
                    generic = receipt.generic_orders,
                    "bundle settled"
                );
                Ok(receipt)
            }
            Err(err) => {
                if let Err(revert_err) = venue.revert_to(checkpoint) {
                    warn!(error = %revert_err, "venue revert failed");
                }
                warn!(
                    epoch = epoch.epoch,
                    class = ?err.class(),
                    error = %err,
                    "bundle rejected"
                );
                Err(err)
            }
        }
    }

    fn run_phases(
        &self,
        state: &mut SettlementState,
        bundle: &Bundle,
        epoch: EpochContext,
        venue: &mut dyn LiquidityVenue,
    ) -> Result<SettlementReceipt> {
        let globals = Globals::new(bundle.assets.clone(), &bundle.initial_prices)?;
        let assets = globals.assets();
        let mut deltas = EpochLedger::new(assets.len());
        let mut executed = HashSet::new();

        // borrow
        for asset in assets.iter().filter(|a| a.borrow > 0) {
            venue.take(asset.id, asset.borrow)?;
        }
        deltas.borrow(assets)?;

        // swaps
        let mut ticks_crossed = 0;
        for swap in &bundle.swaps {
            let key = pool_key(
                &globals,
                &state.pool_configs,
                swap.asset0_index,
                swap.asset1_index,
                swap.store_index,
            )?;
            let delta = venue.execute_swap(&key, swap.zero_for_one, swap.amount_in)?;
            ticks_crossed += state.rewards.update_after_tick_move(
                &key.id(),
                &*venue,
                delta.tick_before,
                delta.tick_after,
            )?;
        }

        let executor = OrderExecutor {
            globals: &globals,
            epoch,
            half_spread: self.config.half_spread,
            verifier: self.verifier.as_ref(),
            hooks: &self.hooks,
        };

        // top of block
        for order in &bundle.top_of_block_orders {
            let mut fx = OrderEffects {
                ledger: &mut state.ledger,
                deltas: &mut deltas,
                nonces: &mut state.nonces,
                executed: &mut executed,
            };
            executor.execute_top_of_block(order, &mut fx)?;
        }

        // rewards
        let mut rewards_distributed: Vec<AssetAmount> = Vec::new();
        for update in &bundle.reward_updates {
            let key = pool_key(
                &globals,
                &state.pool_configs,
                update.asset0_index,
                update.asset1_index,
                update.store_index,
            )?;
            let pool = key.id();
            let total = update
                .distribution
                .total()
                .ok_or(SettlementError::AmountOverflow)?;
            match &update.distribution {
                RewardDistribution::CurrentOnly { amount } => {
                    let liquidity = venue.current_liquidity(&pool)?;
                    state.rewards.distribute_current(&pool, liquidity, *amount)?;
                }
                RewardDistribution::MultiTick {
                    start_tick,
                    start_liquidity,
                    quantities,
                } => state.rewards.distribute_multi_tick(
                    &pool,
                    &*venue,
                    *start_tick,
                    *start_liquidity,
                    quantities,
                )?,
            }
            deltas.sub(update.asset0_index, total)?;
            state.ledger.add_reward_reserve(key.asset0, total)?;
            add_amount(&mut rewards_distributed, key.asset0, total)?;
            debug!(pool = %pool, total, "distributed rewards");
        }

        // generic orders
        for order in &bundle.generic_orders {
            let mut fx = OrderEffects {
                ledger: &mut state.ledger,
                deltas: &mut deltas,
                nonces: &mut state.nonces,
                executed: &mut executed,
            };
            executor.execute_generic(order, &mut fx)?;
        }

        // save and settle
        for asset in assets.iter().filter(|a| a.settle > 0) {
            venue.settle(asset.id, asset.settle)?;
        }
        deltas.save_and_settle(&mut state.ledger, assets)?;
        deltas.assert_resolved(assets)?;

        Ok(SettlementReceipt {
            epoch: epoch.epoch,
            bundle_digest: String::new(),
            assets: assets.len(),
            top_of_block_orders: bundle.top_of_block_orders.len(),
            swaps: bundle.swaps.len(),
            generic_orders: bundle.generic_orders.len(),
            reward_updates: bundle.reward_updates.len(),
            ticks_crossed,
            fees_saved: fees_saved(assets),
            rewards_distributed,
        })
    }

    /// Set a pool's tick spacing and fee. Restricted to the controller role.
    pub fn configure_pool(
        &mut self,
        caller: &AccountId,
        asset0: AccountId,
        asset1: AccountId,
        tick_spacing: i32,
        fee: u32,
    ) -> Result<&PoolConfigStore> {
        if *caller != self.config.controller {
            return Err(SettlementError::NotController { caller: *caller });
        }
        let next = self
            .state
            .pool_configs
            .set_into_new(asset0, asset1, tick_spacing, fee)?;
        info!(
            %asset0,
            %asset1,
            tick_spacing,
            fee,
            version = next.version(),
            entries = next.total_entries(),
            "pool configured"
        );
        self.state.pool_configs = next;
        Ok(&self.state.pool_configs)
    }

    /// Create the venue pool for a configured pair at `tick`.
    pub fn initialize_pool(
        &mut self,
        venue: &mut dyn LiquidityVenue,
        asset0: AccountId,
        asset1: AccountId,
        store_index: u16,
        tick: i32,
    ) -> Result<PoolKey> {
        let entry = self
            .state
            .pool_configs
            .get(&StoreKey::from_pair(&asset0, &asset1), store_index)?;
        let key = PoolKey::new(asset0, asset1, entry.tick_spacing, entry.fee);
        venue.initialize_pool(&key, tick)?;
        info!(pool = %key.id(), tick, "pool initialized");
        Ok(key)
    }

    /// Withdraw saved fees. Restricted to the fee recipient.
    pub fn pull_fee(&mut self, caller: &AccountId, asset: AccountId, amount: u128) -> Result<()> {
        if *caller != self.config.fee_recipient {
            return Err(SettlementError::NotFeeRecipient { caller: *caller });
        }
        self.state.ledger.pull_fee(*caller, asset, amount)?;
        info!(%asset, amount, "fee pulled");
        Ok(())
    }

    pub fn deposit(&mut self, owner: AccountId, asset: AccountId, amount: u128) -> Result<()> {
        self.state.ledger.deposit(owner, asset, amount)
    }

    pub fn withdraw(&mut self, owner: AccountId, asset: AccountId, amount: u128) -> Result<()> {
        self.state.ledger.withdraw(owner, asset, amount)
    }

    pub fn invalidate_nonces(&mut self, owner: AccountId, word: u64, mask: U256) {
        self.state.nonces.invalidate(owner, word, mask);
    }

    /// Liquidity hook: checkpoint or pay out rewards, then apply the change
    /// on the venue.
    pub fn modify_liquidity(
        &mut self,
        venue: &mut dyn LiquidityVenue,
        key: &PoolKey,
        position: &PositionKey,
        liquidity_delta: i128,
    ) -> Result<LiquidityChange> {
        let pool = key.id();
        let current_tick = venue.current_tick(&pool)?;
        let before = venue.position_liquidity(&pool, position)?;
        if liquidity_delta < 0 && liquidity_delta.unsigned_abs() > before {
            return Err(VenueError::LiquidityUnderflow.into());
        }

        let mut staged = self.state.clone();
        let mut rewards_paid = 0;
        if liquidity_delta > 0 {
            staged.rewards.on_add_liquidity(
                &pool,
                current_tick,
                position,
                liquidity_delta.unsigned_abs(),
            );
        } else if liquidity_delta < 0 {
            rewards_paid = staged.rewards.on_remove_liquidity(
                &pool,
                current_tick,
                position,
                before,
                liquidity_delta.unsigned_abs(),
            )?;
            staged
                .ledger
                .pay_reward(position.owner, key.asset0, rewards_paid)?;
        }
        let liquidity = venue.modify_position(key, position, liquidity_delta)?;
        self.state = staged;

        debug!(
            pool = %pool,
            owner = %position.owner,
            liquidity_delta,
            liquidity,
            rewards_paid,
            "liquidity modified"
        );
        Ok(LiquidityChange {
            liquidity,
            rewards_paid,
        })
    }
}

fn pool_key(
    globals: &Globals,
    configs: &PoolConfigStore,
    asset0: AssetIndex,
    asset1: AssetIndex,
    store_index: u16,
) -> Result<PoolKey> {
    let (a0, a1) = globals.pair(asset0, asset1)?;
    let entry = configs.get(&StoreKey::from_pair(&a0, &a1), store_index)?;
    Ok(PoolKey::new(a0, a1, entry.tick_spacing, entry.fee))
}

fn fees_saved(assets: &[Asset]) -> Vec<AssetAmount> {
    assets
        .iter()
        .filter(|a| a.save > 0)
        .map(|a| AssetAmount {
            asset: a.id,
            amount: a.save,
        })
        .collect()
}

fn add_amount(amounts: &mut Vec<AssetAmount>, asset: AccountId, amount: u128) -> Result<()> {
    match amounts.iter_mut().find(|a| a.asset == asset) {
        Some(existing) => {
            existing.amount = existing
                .amount
                .checked_add(amount)
                .ok_or(SettlementError::AmountOverflow)?;
        }
        None => amounts.push(AssetAmount { asset, amount }),
    }
    Ok(())
}
