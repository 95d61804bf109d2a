//! Node-side settlement service.
//!
//! Owns the controller and the venue behind one lock so bundles and admin
//! actions are serialized, asks the block source for the current epoch, and
//! commits a snapshot after every successful mutation. Every mutation except
//! pool initialization is a signed request from the account it acts for.

use crate::auth::{HookRegistry, SignatureVerifier};
use crate::chain::{BlockSource, ChainError};
use crate::config::{load_pool_configs, Config, ConfigError, PoolConfigRow};
use crate::db::{Checkpoint, NewSettlement, RepoError, Repository, SettlementRow};
use crate::domain::{AccountId, Action, EpochId, RequestAuth};
use crate::engine::{
    AssetAmount, BundleController, ControllerConfig, LiquidityChange, PoolConfigEntry,
    PoolConfigStore, SettlementError, SettlementReceipt, SettlementState, StoreKey,
};
use crate::venue::{LiquidityVenue, PoolKey, PositionKey, SimulatedVenue, VenueState};
use chrono::Utc;
use ethnum::U256;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Settlement(#[from] SettlementError),
    #[error("block source failed: {0}")]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

struct Engine {
    controller: BundleController,
    venue: SimulatedVenue,
}

impl Engine {
    fn save(&self) -> (SettlementState, VenueState) {
        (self.controller.state().clone(), self.venue.state().clone())
    }

    fn restore(&mut self, (state, venue): (SettlementState, VenueState)) {
        self.controller.restore(state);
        self.venue = SimulatedVenue::from_state(venue);
    }
}

/// A configured pool and, once initialized, its venue state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolView {
    pub store_index: u16,
    #[serde(flatten)]
    pub entry: PoolConfigEntry,
    pub pool_id: String,
    pub initialized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liquidity: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancesView {
    pub owner: AccountId,
    pub balances: Vec<AssetAmount>,
    pub fee_reserves: Vec<AssetAmount>,
}

pub struct SettlementService {
    engine: Mutex<Engine>,
    repo: Arc<Repository>,
    blocks: Arc<dyn BlockSource>,
}

impl SettlementService {
    pub fn new(
        controller: BundleController,
        venue: SimulatedVenue,
        repo: Arc<Repository>,
        blocks: Arc<dyn BlockSource>,
    ) -> Self {
        Self {
            engine: Mutex::new(Engine { controller, venue }),
            repo,
            blocks,
        }
    }

    /// Build the service from configuration: restore the latest snapshot,
    /// then apply the boot-time pool config file.
    pub async fn bootstrap(
        config: &Config,
        verifier: Arc<dyn SignatureVerifier>,
        hooks: HookRegistry,
        repo: Arc<Repository>,
        blocks: Arc<dyn BlockSource>,
    ) -> Result<Self, ServiceError> {
        let controller_config = ControllerConfig {
            half_spread: config.half_spread,
            nodes: config.node_addresses.iter().copied().collect(),
            controller: config.controller_address,
            fee_recipient: config.fee_recipient,
        };

        let (state, venue) = match repo.latest_snapshot().await? {
            Some(snapshot) => {
                info!(
                    snapshot = snapshot.id,
                    epoch = ?snapshot.epoch,
                    reason = %snapshot.reason,
                    "restored settlement state"
                );
                (snapshot.state, SimulatedVenue::from_state(snapshot.venue))
            }
            None => (SettlementState::default(), SimulatedVenue::new()),
        };

        let controller = BundleController::new(controller_config, verifier)
            .with_state(state)
            .with_hooks(hooks);
        let service = Self::new(controller, venue, repo, blocks);

        if let Some(path) = &config.pool_config_file {
            let rows = load_pool_configs(path)?;
            let applied = service.apply_pool_configs(&rows).await?;
            info!(path = %path, rows = rows.len(), applied, "pool config file loaded");
        }
        Ok(service)
    }

    async fn apply_pool_configs(&self, rows: &[PoolConfigRow]) -> Result<usize, ServiceError> {
        self.mutate(None, "pool_config_file", true, |engine| {
            let controller = engine.controller.config().controller;
            let mut applied = 0;
            for row in rows {
                let unchanged = engine
                    .controller
                    .pool_configs()
                    .find(&StoreKey::from_pair(&row.asset0, &row.asset1))
                    .is_some_and(|(_, e)| e.tick_spacing == row.tick_spacing && e.fee == row.fee);
                if unchanged {
                    continue;
                }
                engine.controller.configure_pool(
                    &controller,
                    row.asset0,
                    row.asset1,
                    row.tick_spacing,
                    row.fee,
                )?;
                applied += 1;
            }
            Ok(applied)
        })
        .await
    }

    /// Authorize, apply and commit one mutation. Any failure, including a
    /// failed commit, puts the engine back where it was.
    async fn mutate<T>(
        &self,
        request: Option<(&RequestAuth, &Action)>,
        reason: &str,
        publish_pool_config: bool,
        apply: impl FnOnce(&mut Engine) -> Result<T, SettlementError>,
    ) -> Result<T, ServiceError> {
        let mut engine = self.engine.lock().await;
        let saved = engine.save();

        let applied = match request {
            Some((auth, action)) => engine.controller.authorize(auth, action),
            None => Ok(()),
        }
        .and_then(|()| apply(&mut *engine));
        let value = match applied {
            Ok(value) => value,
            Err(e) => {
                engine.restore(saved);
                return Err(e.into());
            }
        };

        let checkpoint = Checkpoint {
            publish_pool_config,
            ..Checkpoint::snapshot(reason, engine.controller.state(), engine.venue.state())
        };
        let committed = self.repo.commit(&checkpoint).await;
        if let Err(e) = committed {
            warn!(reason, error = %e, "mutation not persisted, rolled back");
            engine.restore(saved);
            return Err(e.into());
        }
        Ok(value)
    }

    /// Settle `raw` at the block source's current epoch. The settlement row
    /// and the snapshot are committed together or not at all.
    pub async fn submit_bundle(
        &self,
        auth: RequestAuth,
        raw: &[u8],
    ) -> Result<SettlementReceipt, ServiceError> {
        let block = self.blocks.latest_block().await?;
        let action = Action::submit_bundle(raw);

        let mut engine = self.engine.lock().await;
        let saved = engine.save();
        let executed = engine
            .controller
            .authorize(&auth, &action)
            .and_then(|()| {
                let Engine { controller, venue } = &mut *engine;
                controller.execute_bundle(&auth.caller, raw, block, venue)
            });
        let receipt = match executed {
            Ok(receipt) => receipt,
            Err(e) => {
                engine.restore(saved);
                return Err(e.into());
            }
        };

        let checkpoint = Checkpoint {
            epoch: Some(receipt.epoch),
            settlement: Some(NewSettlement {
                receipt: &receipt,
                caller: &auth.caller,
                raw_bundle: raw,
                executed_at: Utc::now(),
            }),
            ..Checkpoint::snapshot("bundle", engine.controller.state(), engine.venue.state())
        };
        let committed = self.repo.commit(&checkpoint).await;
        if let Err(e) = committed {
            warn!(epoch = receipt.epoch, error = %e, "settled bundle not recorded, rolled back");
            engine.restore(saved);
            return Err(e.into());
        }
        Ok(receipt)
    }

    pub async fn configure_pool(
        &self,
        auth: RequestAuth,
        asset0: AccountId,
        asset1: AccountId,
        tick_spacing: i32,
        fee: u32,
    ) -> Result<PoolConfigStore, ServiceError> {
        let action = Action::ConfigurePool {
            asset0,
            asset1,
            tick_spacing,
            fee,
        };
        self.mutate(Some((&auth, &action)), "configure_pool", true, |engine| {
            Ok(engine
                .controller
                .configure_pool(&auth.caller, asset0, asset1, tick_spacing, fee)?
                .clone())
        })
        .await
    }

    /// Permissionless: the pair must already be configured.
    pub async fn initialize_pool(
        &self,
        asset0: AccountId,
        asset1: AccountId,
        store_index: u16,
        tick: i32,
    ) -> Result<PoolKey, ServiceError> {
        self.mutate(None, "initialize_pool", false, |engine| {
            let Engine { controller, venue } = engine;
            controller.initialize_pool(venue, asset0, asset1, store_index, tick)
        })
        .await
    }

    pub async fn pull_fee(
        &self,
        auth: RequestAuth,
        asset: AccountId,
        amount: u128,
    ) -> Result<(), ServiceError> {
        let action = Action::PullFee { asset, amount };
        self.mutate(Some((&auth, &action)), "pull_fee", false, |engine| {
            engine.controller.pull_fee(&auth.caller, asset, amount)
        })
        .await
    }

    /// Credit the caller's balance; returns the new balance.
    pub async fn deposit(
        &self,
        auth: RequestAuth,
        asset: AccountId,
        amount: u128,
    ) -> Result<u128, ServiceError> {
        let owner = auth.caller;
        let action = Action::Deposit { asset, amount };
        self.mutate(Some((&auth, &action)), "deposit", false, |engine| {
            engine.controller.deposit(owner, asset, amount)?;
            Ok(engine.controller.state().ledger.balance_of(&owner, &asset))
        })
        .await
    }

    /// Debit the caller's balance; returns the new balance.
    pub async fn withdraw(
        &self,
        auth: RequestAuth,
        asset: AccountId,
        amount: u128,
    ) -> Result<u128, ServiceError> {
        let owner = auth.caller;
        let action = Action::Withdraw { asset, amount };
        self.mutate(Some((&auth, &action)), "withdraw", false, |engine| {
            engine.controller.withdraw(owner, asset, amount)?;
            Ok(engine.controller.state().ledger.balance_of(&owner, &asset))
        })
        .await
    }

    /// Burn the caller's standing-order nonces selected by `mask`.
    pub async fn invalidate_nonces(
        &self,
        auth: RequestAuth,
        word: u64,
        mask: U256,
    ) -> Result<(), ServiceError> {
        let owner = auth.caller;
        let action = Action::InvalidateNonces { word, mask };
        self.mutate(Some((&auth, &action)), "invalidate_nonces", false, |engine| {
            engine.controller.invalidate_nonces(owner, word, mask);
            Ok(())
        })
        .await
    }

    /// Add or remove liquidity on a position owned by the caller.
    pub async fn modify_liquidity(
        &self,
        auth: RequestAuth,
        key: PoolKey,
        lower_tick: i32,
        upper_tick: i32,
        salt: [u8; 32],
        liquidity_delta: i128,
    ) -> Result<LiquidityChange, ServiceError> {
        let position = PositionKey::new(auth.caller, lower_tick, upper_tick, salt);
        let action = Action::ModifyLiquidity {
            asset0: key.asset0,
            asset1: key.asset1,
            tick_spacing: key.tick_spacing,
            fee: key.fee,
            lower_tick,
            upper_tick,
            salt,
            liquidity_delta,
        };
        self.mutate(Some((&auth, &action)), "modify_liquidity", false, |engine| {
            let Engine { controller, venue } = engine;
            controller.modify_liquidity(venue, &key, &position, liquidity_delta)
        })
        .await
    }

    /// Copy of the durable settlement state.
    pub async fn state(&self) -> SettlementState {
        self.engine.lock().await.controller.state().clone()
    }

    pub async fn balances(&self, owner: AccountId) -> BalancesView {
        let engine = self.engine.lock().await;
        let ledger = &engine.controller.state().ledger;
        BalancesView {
            owner,
            balances: ledger
                .balances_of(&owner)
                .into_iter()
                .map(|(asset, amount)| AssetAmount { asset, amount })
                .collect(),
            fee_reserves: ledger
                .fee_reserves()
                .iter()
                .map(|(asset, amount)| AssetAmount {
                    asset: *asset,
                    amount: *amount,
                })
                .collect(),
        }
    }

    /// Current config version and every configured pool.
    pub async fn pools(&self) -> (u64, Vec<PoolView>) {
        let engine = self.engine.lock().await;
        let store = engine.controller.pool_configs();
        let pools = store
            .entries()
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let id = PoolKey::new(entry.asset0, entry.asset1, entry.tick_spacing, entry.fee)
                    .id();
                let tick = engine.venue.current_tick(&id).ok();
                let liquidity = engine
                    .venue
                    .current_liquidity(&id)
                    .ok()
                    .map(|l| l.to_string());
                PoolView {
                    store_index: index as u16,
                    entry: *entry,
                    pool_id: id.to_string(),
                    initialized: tick.is_some(),
                    tick,
                    liquidity,
                }
            })
            .collect();
        (store.version(), pools)
    }

    pub async fn last_settled_epoch(&self) -> Option<EpochId> {
        self.engine.lock().await.controller.state().last_epoch_updated
    }

    pub async fn list_settlements(&self, limit: i64) -> Result<Vec<SettlementRow>, ServiceError> {
        Ok(self.repo.list_settlements(limit).await?)
    }
}
