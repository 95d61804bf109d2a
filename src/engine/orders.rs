//! Order validation and execution.
//!
//! Each order runs signature, replay and hook checks before any balance
//! moves, and all of an order's effects are applied together at the end.

use crate::auth::{HookRegistry, SignatureVerifier, HOOK_RETURN_MAGIC};
use crate::domain::{
    AccountId, AssetIndex, EpochContext, GenericOrder, OrderDigest, OrderMode, OrderRef,
    OrderValidation, Ray, TopOfBlockOrder,
};
use ethnum::U256;
use std::collections::HashSet;
use tracing::debug;

use super::error::{Result, SettlementError};
use super::globals::Globals;
use super::ledger::{AssetLedger, EpochLedger};
use super::nonces::NonceBitmap;

/// State an order may touch.
pub struct OrderEffects<'s> {
    pub ledger: &'s mut AssetLedger,
    pub deltas: &'s mut EpochLedger,
    pub nonces: &'s mut NonceBitmap,
    /// Digests of single-use orders executed this epoch.
    pub executed: &'s mut HashSet<OrderDigest>,
}

/// Amounts a generic order settled at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenericFill {
    pub digest: OrderDigest,
    pub amount_in: u128,
    pub amount_out: u128,
}

/// Input and output amounts for a generic order at `price` (input units per
/// output unit). The half spread is charged on the output for exact-in and
/// partial orders, and on the input for exact-out orders, always rounded
/// against the trader.
pub fn quote(order: &GenericOrder, price: Ray, half_spread: Ray) -> Result<(u128, u128)> {
    let exact_in = |amount_in: u128| -> Result<(u128, u128)> {
        let gross = price
            .div_down(U256::from(amount_in))
            .ok_or(SettlementError::AmountOverflow)?;
        let fee = half_spread
            .mul_up(gross)
            .ok_or(SettlementError::AmountOverflow)?;
        Ok((amount_in, to_u128(gross.saturating_sub(fee))?))
    };

    match order.mode {
        OrderMode::ExactIn => exact_in(order.amount_specified),
        OrderMode::Partial => {
            if order.amount_filled < order.min_amount_in {
                return Err(SettlementError::FillingTooLittle {
                    filled: order.amount_filled,
                    min: order.min_amount_in,
                });
            }
            if order.amount_filled > order.amount_specified {
                return Err(SettlementError::FillingTooMuch {
                    filled: order.amount_filled,
                    max: order.amount_specified,
                });
            }
            exact_in(order.amount_filled)
        }
        OrderMode::ExactOut => {
            let amount_out = order.amount_specified;
            let gross = price
                .mul_up(U256::from(amount_out))
                .ok_or(SettlementError::AmountOverflow)?;
            let fee = half_spread
                .mul_up(gross)
                .ok_or(SettlementError::AmountOverflow)?;
            let amount_in = gross
                .checked_add(fee)
                .ok_or(SettlementError::AmountOverflow)?;
            Ok((to_u128(amount_in)?, amount_out))
        }
    }
}

fn to_u128(value: U256) -> Result<u128> {
    if value > U256::from(u128::MAX) {
        return Err(SettlementError::AmountOverflow);
    }
    Ok(value.as_u128())
}

/// Validates and executes orders for one epoch.
pub struct OrderExecutor<'a> {
    pub globals: &'a Globals,
    pub epoch: EpochContext,
    pub half_spread: Ray,
    pub verifier: &'a dyn SignatureVerifier,
    pub hooks: &'a HookRegistry,
}

impl<'a> OrderExecutor<'a> {
    fn resolve_pair(
        &self,
        asset_in: AssetIndex,
        asset_out: AssetIndex,
    ) -> Result<(AccountId, AccountId)> {
        let in_id = self.globals.asset_id(asset_in)?;
        let out_id = self.globals.asset_id(asset_out)?;
        if asset_in == asset_out {
            return Err(SettlementError::SameAsset { index: asset_in });
        }
        Ok((in_id, out_id))
    }

    fn check_signature(&self, order: OrderRef<'_>, digest: &OrderDigest) -> Result<()> {
        let signer = order.signer();
        if !self.verifier.verify(&signer, &digest.0, order.signature()) {
            return Err(SettlementError::InvalidSignature { signer });
        }
        Ok(())
    }

    fn check_epoch(&self, valid_for: u64) -> Result<()> {
        if valid_for != self.epoch.epoch {
            return Err(SettlementError::WrongEpoch {
                valid_for,
                current: self.epoch.epoch,
            });
        }
        Ok(())
    }

    fn run_hook(&self, hook: Option<&AccountId>, from: &AccountId, payload: &[u8]) -> Result<()> {
        let Some(hook) = hook else {
            return Ok(());
        };
        let returned = self.hooks.call(hook, from, payload);
        if returned != HOOK_RETURN_MAGIC {
            return Err(SettlementError::InvalidHookReturn {
                hook: *hook,
                returned,
            });
        }
        Ok(())
    }

    pub fn execute_top_of_block(
        &self,
        order: &TopOfBlockOrder,
        fx: &mut OrderEffects<'_>,
    ) -> Result<OrderDigest> {
        let (in_id, out_id) = self.resolve_pair(order.asset_in, order.asset_out)?;
        self.check_epoch(order.valid_for_epoch)?;

        let digest = order.digest(&in_id, &out_id);
        self.check_signature(OrderRef::TopOfBlock(order), &digest)?;
        if fx.executed.contains(&digest) {
            return Err(SettlementError::OrderAlreadyExecuted { digest });
        }
        self.run_hook(order.hook.as_ref(), &order.from, &order.hook_payload)?;

        fx.deltas
            .account_in(fx.ledger, order.from, in_id, order.asset_in, order.amount_in)?;
        fx.deltas.account_out(
            fx.ledger,
            order.recipient_or_signer(),
            out_id,
            order.asset_out,
            order.amount_out,
        )?;
        fx.executed.insert(digest);

        debug!(
            %digest,
            from = %order.from,
            amount_in = order.amount_in,
            amount_out = order.amount_out,
            "executed top-of-block order"
        );
        Ok(digest)
    }

    pub fn execute_generic(
        &self,
        order: &GenericOrder,
        fx: &mut OrderEffects<'_>,
    ) -> Result<GenericFill> {
        let (in_id, out_id) = self.resolve_pair(order.asset_in, order.asset_out)?;
        match order.validation {
            OrderValidation::Standing { deadline, .. } => {
                if deadline < self.epoch.timestamp {
                    return Err(SettlementError::DeadlinePassed {
                        deadline,
                        now: self.epoch.timestamp,
                    });
                }
            }
            OrderValidation::Flash { valid_for_epoch } => self.check_epoch(valid_for_epoch)?,
        }

        let digest = order.digest(&in_id, &out_id);
        self.check_signature(OrderRef::Generic(order), &digest)?;
        match order.validation {
            OrderValidation::Standing { nonce, .. } => {
                if fx.nonces.is_used(&order.from, nonce) {
                    return Err(SettlementError::NonceReuse {
                        owner: order.from,
                        nonce,
                    });
                }
            }
            OrderValidation::Flash { .. } => {
                if fx.executed.contains(&digest) {
                    return Err(SettlementError::OrderAlreadyExecuted { digest });
                }
            }
        }
        self.run_hook(order.hook.as_ref(), &order.from, &order.hook_payload)?;

        let price = self.globals.prices().get(order.asset_out, order.asset_in)?;
        if price < order.min_price {
            return Err(SettlementError::LimitViolated {
                price,
                min_price: order.min_price,
            });
        }
        let (amount_in, amount_out) = quote(order, price, self.half_spread)?;

        fx.deltas
            .account_in(fx.ledger, order.from, in_id, order.asset_in, amount_in)?;
        fx.deltas.account_out(
            fx.ledger,
            order.recipient_or_signer(),
            out_id,
            order.asset_out,
            amount_out,
        )?;
        match order.validation {
            OrderValidation::Standing { nonce, .. } => fx.nonces.use_nonce(order.from, nonce)?,
            OrderValidation::Flash { .. } => {
                fx.executed.insert(digest);
            }
        }

        debug!(
            %digest,
            from = %order.from,
            mode = ?order.mode,
            amount_in,
            amount_out,
            "executed generic order"
        );
        Ok(GenericFill {
            digest,
            amount_in,
            amount_out,
        })
    }
}
