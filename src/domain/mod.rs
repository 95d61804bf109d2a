//! Domain types for bundle settlement.
//!
//! This module provides:
//! - Identifiers: AccountId, AssetIndex, EpochId, EpochContext
//! - Ray fixed-point numbers for prices and fees
//! - Order variants with their typed digests
//! - Signed out-of-bundle requests
//! - Decoded bundle contents
//! - A serde helper for persisting keyed maps as entry lists

pub mod bundle;
pub mod map_entries;
pub mod order;
pub mod primitives;
pub mod ray;
pub mod request;

pub use bundle::{Asset, Bundle, PriceEntry, RewardDistribution, RewardsUpdate, Swap};
pub use order::{
    GenericOrder, OrderDigest, OrderMode, OrderRef, OrderType, OrderValidation, TopOfBlockOrder,
};
pub use primitives::{
    tick_in_range, AccountId, AccountIdParseError, AssetIndex, EpochContext, EpochId, MAX_TICK,
    MIN_TICK,
};
pub use ray::{Ray, RayError, RAY_UNIT};
pub use request::{Action, RequestAuth};
