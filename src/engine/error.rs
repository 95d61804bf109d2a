//! Settlement failures and their taxonomy.

use crate::codec::DecodeError;
use crate::domain::{AccountId, AssetIndex, EpochId, OrderDigest, Ray};
use crate::venue::VenueError;
use serde::Serialize;
use thiserror::Error;

/// Failure classes surfaced to callers. Every failure is epoch-fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    StateConflict,
    MalformedInput,
    LimitViolated,
    Expired,
    ReplayDetected,
    AuthFailure,
    ComposabilityFailure,
    SolvencyFailure,
    /// The external liquidity venue refused an operation.
    VenueFailure,
}

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("epoch {epoch} already settled")]
    AlreadySettledThisEpoch { epoch: EpochId },

    #[error("assets out of order at index {index}")]
    AssetsOutOfOrder { index: usize },
    #[error("asset index {index} out of bounds for {len} assets")]
    AssetIndexOutOfBounds { index: AssetIndex, len: usize },
    #[error("price not set for pair (out {out_index}, in {in_index})")]
    PriceNotSet {
        out_index: AssetIndex,
        in_index: AssetIndex,
    },
    #[error("order trades asset {index} against itself")]
    SameAsset { index: AssetIndex },
    #[error("no pool config entry at index {index}")]
    NoEntry { index: u16 },
    #[error("pool config store holds the maximum of {max} entries")]
    ConfigStoreFull { max: usize },
    #[error("pool assets not sorted: {asset0} >= {asset1}")]
    AssetsUnsorted { asset0: AccountId, asset1: AccountId },
    #[error("invalid tick spacing {tick_spacing}")]
    InvalidTickSpacing { tick_spacing: i32 },
    #[error("fee {fee} above maximum {max}")]
    FeeAboveMax { fee: u32, max: u32 },
    #[error("tick {tick} outside the 24-bit tick range")]
    InvalidTick { tick: i32 },
    #[error("amount overflow")]
    AmountOverflow,
    #[error("no liquidity to receive rewards")]
    ZeroLiquidity,
    #[error("reward quantities do not match the ticks walked")]
    RewardQuantitiesMismatch,
    #[error("reward walk ended at liquidity {actual}, pool has {expected}")]
    WrongEndLiquidity { expected: u128, actual: u128 },
    #[error("malformed bundle: {0}")]
    Decode(#[from] DecodeError),

    #[error("price {price} below order minimum {min_price}")]
    LimitViolated { price: Ray, min_price: Ray },
    #[error("filled {filled} below minimum {min}")]
    FillingTooLittle { filled: u128, min: u128 },
    #[error("filled {filled} above maximum {max}")]
    FillingTooMuch { filled: u128, max: u128 },
    #[error("insufficient balance of {asset} for {owner}: need {needed}, have {available}")]
    InsufficientBalance {
        owner: AccountId,
        asset: AccountId,
        needed: u128,
        available: u128,
    },

    #[error("order expired: deadline {deadline}, now {now}")]
    DeadlinePassed { deadline: u64, now: u64 },
    #[error("order bound to epoch {valid_for}, current epoch {current}")]
    WrongEpoch { valid_for: EpochId, current: EpochId },

    #[error("order {digest} already executed this epoch")]
    OrderAlreadyExecuted { digest: OrderDigest },
    #[error("nonce {nonce} already used by {owner}")]
    NonceReuse { owner: AccountId, nonce: u64 },

    #[error("invalid signature from {signer}")]
    InvalidSignature { signer: AccountId },
    #[error("{caller} is not a node")]
    NotNode { caller: AccountId },
    #[error("{caller} is not the config controller")]
    NotController { caller: AccountId },
    #[error("{caller} is not the fee recipient")]
    NotFeeRecipient { caller: AccountId },

    #[error("hook {hook} returned {returned:#010x}")]
    InvalidHookReturn { hook: AccountId, returned: u32 },

    #[error("bundle delta unresolved for asset {asset}: {delta}")]
    BundleDeltaUnresolved { asset: AccountId, delta: String },
    #[error("reward reserve of {asset} short by {shortfall}")]
    RewardReserveShort { asset: AccountId, shortfall: u128 },

    #[error(transparent)]
    Venue(#[from] VenueError),
}

impl SettlementError {
    pub fn class(&self) -> ErrorClass {
        use SettlementError::*;
        match self {
            AlreadySettledThisEpoch { .. } => ErrorClass::StateConflict,
            AssetsOutOfOrder { .. }
            | AssetIndexOutOfBounds { .. }
            | PriceNotSet { .. }
            | SameAsset { .. }
            | NoEntry { .. }
            | ConfigStoreFull { .. }
            | AssetsUnsorted { .. }
            | InvalidTickSpacing { .. }
            | FeeAboveMax { .. }
            | InvalidTick { .. }
            | AmountOverflow
            | ZeroLiquidity
            | RewardQuantitiesMismatch
            | WrongEndLiquidity { .. }
            | Decode(_) => ErrorClass::MalformedInput,
            LimitViolated { .. }
            | FillingTooLittle { .. }
            | FillingTooMuch { .. }
            | InsufficientBalance { .. } => ErrorClass::LimitViolated,
            DeadlinePassed { .. } | WrongEpoch { .. } => ErrorClass::Expired,
            OrderAlreadyExecuted { .. } | NonceReuse { .. } => ErrorClass::ReplayDetected,
            InvalidSignature { .. }
            | NotNode { .. }
            | NotController { .. }
            | NotFeeRecipient { .. } => ErrorClass::AuthFailure,
            InvalidHookReturn { .. } => ErrorClass::ComposabilityFailure,
            BundleDeltaUnresolved { .. } | RewardReserveShort { .. } => {
                ErrorClass::SolvencyFailure
            }
            Venue(_) => ErrorClass::VenueFailure,
        }
    }
}

pub type Result<T, E = SettlementError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_mapping() {
        assert_eq!(
            SettlementError::AlreadySettledThisEpoch { epoch: 1 }.class(),
            ErrorClass::StateConflict
        );
        assert_eq!(
            SettlementError::AssetsOutOfOrder { index: 2 }.class(),
            ErrorClass::MalformedInput
        );
        assert_eq!(
            SettlementError::FillingTooMuch { filled: 2, max: 1 }.class(),
            ErrorClass::LimitViolated
        );
        assert_eq!(
            SettlementError::NonceReuse {
                owner: AccountId::ZERO,
                nonce: 3
            }
            .class(),
            ErrorClass::ReplayDetected
        );
        assert_eq!(
            SettlementError::BundleDeltaUnresolved {
                asset: AccountId::ZERO,
                delta: "-1".into()
            }
            .class(),
            ErrorClass::SolvencyFailure
        );
    }

    #[test]
    fn test_error_display() {
        let err = SettlementError::InvalidHookReturn {
            hook: AccountId::from_low_u64(1),
            returned: 0xdead,
        };
        assert_eq!(
            err.to_string(),
            "hook 0x0000000000000000000000000000000000000001 returned 0x0000dead"
        );
    }
}
