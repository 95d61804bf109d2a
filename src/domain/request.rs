//! Signed requests for state changes made outside a bundle.
//!
//! A request acts for the account that signs it. The signature covers the
//! action's fields, the caller and a request nonce, so a request cannot be
//! replayed or rebound to another account.

use crate::domain::order::FieldHasher;
use crate::domain::{AccountId, OrderDigest};
use ethnum::U256;
use sha2::{Digest, Sha256};

/// Caller, request nonce and signature carried by every signed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestAuth {
    pub caller: AccountId,
    pub nonce: u64,
    pub signature: Vec<u8>,
}

/// A state change the caller asks for. Owner-scoped actions always act on
/// the caller's own balances, nonces and positions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SubmitBundle {
        /// sha256 of the raw bundle.
        bundle_digest: [u8; 32],
    },
    ConfigurePool {
        asset0: AccountId,
        asset1: AccountId,
        tick_spacing: i32,
        fee: u32,
    },
    PullFee {
        asset: AccountId,
        amount: u128,
    },
    Deposit {
        asset: AccountId,
        amount: u128,
    },
    Withdraw {
        asset: AccountId,
        amount: u128,
    },
    InvalidateNonces {
        word: u64,
        mask: U256,
    },
    ModifyLiquidity {
        asset0: AccountId,
        asset1: AccountId,
        tick_spacing: i32,
        fee: u32,
        lower_tick: i32,
        upper_tick: i32,
        salt: [u8; 32],
        liquidity_delta: i128,
    },
}

impl Action {
    pub fn submit_bundle(raw: &[u8]) -> Self {
        Action::SubmitBundle {
            bundle_digest: Sha256::digest(raw).into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::SubmitBundle { .. } => "submit_bundle",
            Action::ConfigurePool { .. } => "configure_pool",
            Action::PullFee { .. } => "pull_fee",
            Action::Deposit { .. } => "deposit",
            Action::Withdraw { .. } => "withdraw",
            Action::InvalidateNonces { .. } => "invalidate_nonces",
            Action::ModifyLiquidity { .. } => "modify_liquidity",
        }
    }

    fn type_string(&self) -> &'static str {
        match self {
            Action::SubmitBundle { .. } => {
                "SubmitBundle(address caller,uint64 nonce,bytes32 bundleDigest)"
            }
            Action::ConfigurePool { .. } => {
                "ConfigurePool(address caller,uint64 nonce,address asset0,address asset1,\
int24 tickSpacing,uint24 fee)"
            }
            Action::PullFee { .. } => {
                "PullFee(address caller,uint64 nonce,address asset,uint128 amount)"
            }
            Action::Deposit { .. } => {
                "Deposit(address caller,uint64 nonce,address asset,uint128 amount)"
            }
            Action::Withdraw { .. } => {
                "Withdraw(address caller,uint64 nonce,address asset,uint128 amount)"
            }
            Action::InvalidateNonces { .. } => {
                "InvalidateNonces(address caller,uint64 nonce,uint64 word,uint256 mask)"
            }
            Action::ModifyLiquidity { .. } => {
                "ModifyLiquidity(address caller,uint64 nonce,address asset0,address asset1,\
int24 tickSpacing,uint24 fee,int24 lowerTick,int24 upperTick,bytes32 salt,int128 liquidityDelta)"
            }
        }
    }

    /// Digest `caller` signs to authorize this action under `nonce`.
    pub fn digest(&self, caller: &AccountId, nonce: u64) -> OrderDigest {
        let mut fields = FieldHasher::new(self.type_string());
        fields.account(caller).u64(nonce);
        match self {
            Action::SubmitBundle { bundle_digest } => {
                fields.raw(bundle_digest);
            }
            Action::ConfigurePool {
                asset0,
                asset1,
                tick_spacing,
                fee,
            } => {
                fields
                    .account(asset0)
                    .account(asset1)
                    .raw(&tick_spacing.to_be_bytes())
                    .raw(&fee.to_be_bytes());
            }
            Action::PullFee { asset, amount }
            | Action::Deposit { asset, amount }
            | Action::Withdraw { asset, amount } => {
                fields.account(asset).u128(*amount);
            }
            Action::InvalidateNonces { word, mask } => {
                fields.u64(*word).raw(&mask.to_be_bytes());
            }
            Action::ModifyLiquidity {
                asset0,
                asset1,
                tick_spacing,
                fee,
                lower_tick,
                upper_tick,
                salt,
                liquidity_delta,
            } => {
                fields
                    .account(asset0)
                    .account(asset1)
                    .raw(&tick_spacing.to_be_bytes())
                    .raw(&fee.to_be_bytes())
                    .raw(&lower_tick.to_be_bytes())
                    .raw(&upper_tick.to_be_bytes())
                    .raw(salt)
                    .raw(&liquidity_delta.to_be_bytes());
            }
        }
        fields.finish()
    }
}
