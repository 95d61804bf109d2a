//! Pure, synchronous settlement core.
//!
//! Nothing in here performs I/O: the venue and the signature oracle are
//! passed in, and durable state is a plain value the caller persists.

pub mod config_store;
pub mod controller;
pub mod error;
pub mod globals;
pub mod ledger;
pub mod nonces;
pub mod orders;
pub mod price_graph;
pub mod rewards;

pub use config_store::{
    PoolConfigEntry, PoolConfigStore, StoreKey, MAX_ENTRIES, MAX_FEE, MAX_TICK_SPACING,
};
pub use controller::{
    bundle_digest, AssetAmount, BundleController, ControllerConfig, LiquidityChange,
    SettlementReceipt, SettlementState,
};
pub use error::{ErrorClass, SettlementError};
pub use globals::Globals;
pub use ledger::{AssetLedger, EpochLedger};
pub use nonces::NonceBitmap;
pub use orders::{quote, GenericFill, OrderEffects, OrderExecutor};
pub use price_graph::PriceGraph;
pub use rewards::{mul_x128, PoolRewards, RewardAccumulator};
