//! Bundle wire format.
//!
//! Sections, in order: assets, prices, top-of-block orders, swaps, generic
//! orders, reward updates. Integers are big-endian, lists carry a 3-byte
//! count and byte strings a 3-byte length. Options are a 0/1 flag followed
//! by the value.

mod reader;
mod writer;

pub use reader::Reader;
pub use writer::Writer;

use crate::domain::{
    Asset, Bundle, GenericOrder, OrderMode, OrderValidation, PriceEntry, Ray, RewardDistribution,
    RewardsUpdate, Swap, TopOfBlockOrder,
};
use thiserror::Error;

const ASSET_LEN: usize = 68;
const PRICE_LEN: usize = 36;
const SWAP_LEN: usize = 23;
const MIN_TOB_LEN: usize = 20 + 2 + 2 + 16 + 16 + 8 + 1 + 1 + 3 + 3;
const MIN_GENERIC_LEN: usize = 1 + 1 + 20 + 2 + 2 + 32 + 16 + 8 + 1 + 1 + 3 + 3;
const MIN_REWARD_LEN: usize = 2 + 2 + 2 + 1 + 16;

const ORDER_TYPE_STANDING: u8 = 0;
const ORDER_TYPE_FLASH: u8 = 1;
const REWARD_CURRENT_ONLY: u8 = 0;
const REWARD_MULTI_TICK: u8 = 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input reading {field} at offset {offset} (needed {needed} bytes)")]
    UnexpectedEnd {
        field: &'static str,
        offset: usize,
        needed: usize,
    },
    #[error("invalid tag {tag} for {field}")]
    InvalidTag { field: &'static str, tag: u8 },
    #[error("{field} count {count} cannot fit in {remaining} remaining bytes")]
    CountTooLarge {
        field: &'static str,
        count: usize,
        remaining: usize,
    },
    #[error("{0} trailing bytes after bundle")]
    TrailingBytes(usize),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{field} too long: {len}")]
    TooLong { field: &'static str, len: usize },
    #[error("{field} out of range")]
    OutOfRange { field: &'static str },
}

/// Decode a full bundle; the payload must be consumed exactly.
pub fn decode_bundle(raw: &[u8]) -> Result<Bundle, DecodeError> {
    let mut r = Reader::new(raw);
    let assets = r.list("assets", ASSET_LEN, decode_asset)?;
    let initial_prices = r.list("prices", PRICE_LEN, decode_price)?;
    let top_of_block_orders = r.list("top_of_block_orders", MIN_TOB_LEN, decode_top_of_block)?;
    let swaps = r.list("swaps", SWAP_LEN, decode_swap)?;
    let generic_orders = r.list("generic_orders", MIN_GENERIC_LEN, decode_generic)?;
    let reward_updates = r.list("reward_updates", MIN_REWARD_LEN, decode_rewards_update)?;
    if r.remaining() != 0 {
        return Err(DecodeError::TrailingBytes(r.remaining()));
    }
    Ok(Bundle {
        assets,
        initial_prices,
        top_of_block_orders,
        swaps,
        generic_orders,
        reward_updates,
    })
}

/// Decode only the asset section, for early ordering checks.
pub fn decode_assets(raw: &[u8]) -> Result<Vec<Asset>, DecodeError> {
    Reader::new(raw).list("assets", ASSET_LEN, decode_asset)
}

pub fn encode_bundle(bundle: &Bundle) -> Result<Vec<u8>, EncodeError> {
    let mut w = Writer::new();
    w.list(&bundle.assets, "assets", |w, a| {
        encode_asset(w, a);
        Ok(())
    })?;
    w.list(&bundle.initial_prices, "prices", |w, p| {
        encode_price(w, p);
        Ok(())
    })?;
    w.list(
        &bundle.top_of_block_orders,
        "top_of_block_orders",
        encode_top_of_block,
    )?;
    w.list(&bundle.swaps, "swaps", |w, s| {
        encode_swap(w, s);
        Ok(())
    })?;
    w.list(&bundle.generic_orders, "generic_orders", encode_generic)?;
    w.list(
        &bundle.reward_updates,
        "reward_updates",
        encode_rewards_update,
    )?;
    Ok(w.into_bytes())
}

fn decode_asset(r: &mut Reader<'_>) -> Result<Asset, DecodeError> {
    Ok(Asset {
        id: r.account("asset.id")?,
        borrow: r.u128("asset.borrow")?,
        save: r.u128("asset.save")?,
        settle: r.u128("asset.settle")?,
    })
}

fn encode_asset(w: &mut Writer, a: &Asset) {
    w.account(&a.id);
    w.u128(a.borrow);
    w.u128(a.save);
    w.u128(a.settle);
}

fn decode_price(r: &mut Reader<'_>) -> Result<PriceEntry, DecodeError> {
    Ok(PriceEntry {
        out_index: r.u16("price.out_index")?,
        in_index: r.u16("price.in_index")?,
        price: Ray(r.u256("price.price")?),
    })
}

fn encode_price(w: &mut Writer, p: &PriceEntry) {
    w.u16(p.out_index);
    w.u16(p.in_index);
    w.u256(p.price.raw());
}

fn decode_top_of_block(r: &mut Reader<'_>) -> Result<TopOfBlockOrder, DecodeError> {
    Ok(TopOfBlockOrder {
        from: r.account("tob.from")?,
        asset_in: r.u16("tob.asset_in")?,
        asset_out: r.u16("tob.asset_out")?,
        amount_in: r.u128("tob.amount_in")?,
        amount_out: r.u128("tob.amount_out")?,
        valid_for_epoch: r.u64("tob.valid_for_epoch")?,
        recipient: r.optional_account("tob.recipient")?,
        hook: r.optional_account("tob.hook")?,
        hook_payload: r.bytes("tob.hook_payload")?,
        signature: r.bytes("tob.signature")?,
    })
}

fn encode_top_of_block(w: &mut Writer, o: &TopOfBlockOrder) -> Result<(), EncodeError> {
    w.account(&o.from);
    w.u16(o.asset_in);
    w.u16(o.asset_out);
    w.u128(o.amount_in);
    w.u128(o.amount_out);
    w.u64(o.valid_for_epoch);
    w.optional_account(o.recipient.as_ref());
    w.optional_account(o.hook.as_ref());
    w.bytes(&o.hook_payload, "tob.hook_payload")?;
    w.bytes(&o.signature, "tob.signature")
}

fn decode_swap(r: &mut Reader<'_>) -> Result<Swap, DecodeError> {
    Ok(Swap {
        asset0_index: r.u16("swap.asset0_index")?,
        asset1_index: r.u16("swap.asset1_index")?,
        store_index: r.u16("swap.store_index")?,
        zero_for_one: r.bool("swap.zero_for_one")?,
        amount_in: r.u128("swap.amount_in")?,
    })
}

fn encode_swap(w: &mut Writer, s: &Swap) {
    w.u16(s.asset0_index);
    w.u16(s.asset1_index);
    w.u16(s.store_index);
    w.bool(s.zero_for_one);
    w.u128(s.amount_in);
}

fn decode_generic(r: &mut Reader<'_>) -> Result<GenericOrder, DecodeError> {
    let otype = r.u8("generic.otype")?;
    let mode_tag = r.u8("generic.mode")?;
    let mode = OrderMode::from_u8(mode_tag).ok_or(DecodeError::InvalidTag {
        field: "generic.mode",
        tag: mode_tag,
    })?;
    let from = r.account("generic.from")?;
    let asset_in = r.u16("generic.asset_in")?;
    let asset_out = r.u16("generic.asset_out")?;
    let min_price = Ray(r.u256("generic.min_price")?);
    let amount_specified = r.u128("generic.amount_specified")?;
    let (min_amount_in, amount_filled) = if mode == OrderMode::Partial {
        (
            r.u128("generic.min_amount_in")?,
            r.u128("generic.amount_filled")?,
        )
    } else {
        (0, 0)
    };
    let validation = match otype {
        ORDER_TYPE_STANDING => OrderValidation::Standing {
            nonce: r.u64("generic.nonce")?,
            deadline: r.u40("generic.deadline")?,
        },
        ORDER_TYPE_FLASH => OrderValidation::Flash {
            valid_for_epoch: r.u64("generic.valid_for_epoch")?,
        },
        tag => {
            return Err(DecodeError::InvalidTag {
                field: "generic.otype",
                tag,
            })
        }
    };
    Ok(GenericOrder {
        from,
        asset_in,
        asset_out,
        min_price,
        mode,
        amount_specified,
        min_amount_in,
        amount_filled,
        validation,
        recipient: r.optional_account("generic.recipient")?,
        hook: r.optional_account("generic.hook")?,
        hook_payload: r.bytes("generic.hook_payload")?,
        signature: r.bytes("generic.signature")?,
    })
}

fn encode_generic(w: &mut Writer, o: &GenericOrder) -> Result<(), EncodeError> {
    w.u8(match o.validation {
        OrderValidation::Standing { .. } => ORDER_TYPE_STANDING,
        OrderValidation::Flash { .. } => ORDER_TYPE_FLASH,
    });
    w.u8(o.mode.as_u8());
    w.account(&o.from);
    w.u16(o.asset_in);
    w.u16(o.asset_out);
    w.u256(o.min_price.raw());
    w.u128(o.amount_specified);
    if o.mode == OrderMode::Partial {
        w.u128(o.min_amount_in);
        w.u128(o.amount_filled);
    }
    match o.validation {
        OrderValidation::Standing { nonce, deadline } => {
            w.u64(nonce);
            w.u40(deadline, "generic.deadline")?;
        }
        OrderValidation::Flash { valid_for_epoch } => w.u64(valid_for_epoch),
    }
    w.optional_account(o.recipient.as_ref());
    w.optional_account(o.hook.as_ref());
    w.bytes(&o.hook_payload, "generic.hook_payload")?;
    w.bytes(&o.signature, "generic.signature")
}

fn decode_rewards_update(r: &mut Reader<'_>) -> Result<RewardsUpdate, DecodeError> {
    let asset0_index = r.u16("rewards.asset0_index")?;
    let asset1_index = r.u16("rewards.asset1_index")?;
    let store_index = r.u16("rewards.store_index")?;
    let distribution = match r.u8("rewards.kind")? {
        REWARD_CURRENT_ONLY => RewardDistribution::CurrentOnly {
            amount: r.u128("rewards.amount")?,
        },
        REWARD_MULTI_TICK => RewardDistribution::MultiTick {
            start_tick: r.i24("rewards.start_tick")?,
            start_liquidity: r.u128("rewards.start_liquidity")?,
            quantities: r.list("rewards.quantities", 16, |r| r.u128("rewards.quantity"))?,
        },
        tag => {
            return Err(DecodeError::InvalidTag {
                field: "rewards.kind",
                tag,
            })
        }
    };
    Ok(RewardsUpdate {
        asset0_index,
        asset1_index,
        store_index,
        distribution,
    })
}

fn encode_rewards_update(w: &mut Writer, u: &RewardsUpdate) -> Result<(), EncodeError> {
    w.u16(u.asset0_index);
    w.u16(u.asset1_index);
    w.u16(u.store_index);
    match &u.distribution {
        RewardDistribution::CurrentOnly { amount } => {
            w.u8(REWARD_CURRENT_ONLY);
            w.u128(*amount);
        }
        RewardDistribution::MultiTick {
            start_tick,
            start_liquidity,
            quantities,
        } => {
            w.u8(REWARD_MULTI_TICK);
            w.i24(*start_tick, "rewards.start_tick")?;
            w.u128(*start_liquidity);
            w.list(quantities, "rewards.quantities", |w, q| {
                w.u128(*q);
                Ok(())
            })?;
        }
    }
    Ok(())
}
