//! Signed order variants and their typed digests.

use crate::domain::{AccountId, AssetIndex, EpochId, Ray};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Domain separator mixed into every order digest.
pub const DIGEST_DOMAIN_TAG: &[u8] = b"bundle-settlement:v1";

const TOP_OF_BLOCK_TYPE: &str = "TopOfBlockOrder(address from,address assetIn,address assetOut,\
uint128 amountIn,uint128 amountOut,uint64 validForEpoch,address recipient,address hook,bytes hookPayload)";

const STANDING_TYPE: &str = "StandingOrder(uint8 mode,address from,address assetIn,address assetOut,\
uint256 minPrice,uint128 amountSpecified,uint128 minAmountIn,uint64 nonce,uint40 deadline,\
address recipient,address hook,bytes hookPayload)";

const FLASH_TYPE: &str = "FlashOrder(uint8 mode,address from,address assetIn,address assetOut,\
uint256 minPrice,uint128 amountSpecified,uint128 minAmountIn,uint64 validForEpoch,\
address recipient,address hook,bytes hookPayload)";

/// 32-byte typed digest of an order, also its replay key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderDigest(pub [u8; 32]);

impl fmt::Display for OrderDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// How a generic order's quantities are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderMode {
    ExactIn,
    ExactOut,
    Partial,
}

impl OrderMode {
    pub fn as_u8(&self) -> u8 {
        match self {
            OrderMode::ExactIn => 0,
            OrderMode::ExactOut => 1,
            OrderMode::Partial => 2,
        }
    }

    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(OrderMode::ExactIn),
            1 => Some(OrderMode::ExactOut),
            2 => Some(OrderMode::Partial),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrderType {
    Standing,
    Flash,
}

/// Replay protection carried by a generic order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum OrderValidation {
    /// Nonce-protected, valid until `deadline` (seconds, 40-bit on the wire).
    Standing { nonce: u64, deadline: u64 },
    /// Hash-protected, valid only in `valid_for_epoch`.
    Flash { valid_for_epoch: EpochId },
}

impl OrderValidation {
    pub fn order_type(&self) -> OrderType {
        match self {
            OrderValidation::Standing { .. } => OrderType::Standing,
            OrderValidation::Flash { .. } => OrderType::Flash,
        }
    }
}

/// A privileged, single-use order executed at the caller-specified rate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopOfBlockOrder {
    pub from: AccountId,
    pub asset_in: AssetIndex,
    pub asset_out: AssetIndex,
    pub amount_in: u128,
    pub amount_out: u128,
    pub valid_for_epoch: EpochId,
    pub recipient: Option<AccountId>,
    pub hook: Option<AccountId>,
    pub hook_payload: Vec<u8>,
    pub signature: Vec<u8>,
}

impl TopOfBlockOrder {
    /// Typed digest over the resolved asset ids, amounts, signer and payload.
    pub fn digest(&self, asset_in: &AccountId, asset_out: &AccountId) -> OrderDigest {
        let mut fields = FieldHasher::new(TOP_OF_BLOCK_TYPE);
        fields
            .account(&self.from)
            .account(asset_in)
            .account(asset_out)
            .u128(self.amount_in)
            .u128(self.amount_out)
            .u64(self.valid_for_epoch)
            .optional_account(self.recipient.as_ref())
            .optional_account(self.hook.as_ref())
            .bytes(&self.hook_payload);
        fields.finish()
    }

    pub fn recipient_or_signer(&self) -> AccountId {
        self.recipient.unwrap_or(self.from)
    }
}

/// A signed limit order executed against the epoch's price graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericOrder {
    pub from: AccountId,
    pub asset_in: AssetIndex,
    pub asset_out: AssetIndex,
    pub min_price: Ray,
    pub mode: OrderMode,
    /// Exact input, exact output, or the maximum input of a partial order.
    pub amount_specified: u128,
    /// Only meaningful for partial orders.
    pub min_amount_in: u128,
    /// Only meaningful for partial orders.
    pub amount_filled: u128,
    pub validation: OrderValidation,
    pub recipient: Option<AccountId>,
    pub hook: Option<AccountId>,
    pub hook_payload: Vec<u8>,
    pub signature: Vec<u8>,
}

impl GenericOrder {
    pub fn order_type(&self) -> OrderType {
        self.validation.order_type()
    }

    pub fn recipient_or_signer(&self) -> AccountId {
        self.recipient.unwrap_or(self.from)
    }

    /// Typed digest. The filled amount is chosen by the bundle builder and
    /// is deliberately not signed.
    pub fn digest(&self, asset_in: &AccountId, asset_out: &AccountId) -> OrderDigest {
        let type_string = match self.validation {
            OrderValidation::Standing { .. } => STANDING_TYPE,
            OrderValidation::Flash { .. } => FLASH_TYPE,
        };
        let mut fields = FieldHasher::new(type_string);
        fields
            .u8(self.mode.as_u8())
            .account(&self.from)
            .account(asset_in)
            .account(asset_out)
            .raw(&self.min_price.raw().to_be_bytes())
            .u128(self.amount_specified)
            .u128(self.min_amount_in);
        match self.validation {
            OrderValidation::Standing { nonce, deadline } => {
                fields.u64(nonce).u64(deadline);
            }
            OrderValidation::Flash { valid_for_epoch } => {
                fields.u64(valid_for_epoch);
            }
        }
        fields
            .optional_account(self.recipient.as_ref())
            .optional_account(self.hook.as_ref())
            .bytes(&self.hook_payload);
        fields.finish()
    }
}

/// Either order variant, as handed to the signature oracle.
#[derive(Debug, Clone, Copy)]
pub enum OrderRef<'a> {
    TopOfBlock(&'a TopOfBlockOrder),
    Generic(&'a GenericOrder),
}

impl OrderRef<'_> {
    pub fn signer(&self) -> AccountId {
        match self {
            OrderRef::TopOfBlock(o) => o.from,
            OrderRef::Generic(o) => o.from,
        }
    }

    pub fn signature(&self) -> &[u8] {
        match self {
            OrderRef::TopOfBlock(o) => &o.signature,
            OrderRef::Generic(o) => &o.signature,
        }
    }
}

pub(crate) struct FieldHasher {
    hasher: Sha256,
}

impl FieldHasher {
    pub(crate) fn new(type_string: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(DIGEST_DOMAIN_TAG);
        hasher.update(Sha256::digest(type_string.as_bytes()));
        Self { hasher }
    }

    pub(crate) fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.hasher.update(bytes);
        self
    }

    pub(crate) fn u8(&mut self, v: u8) -> &mut Self {
        self.raw(&[v])
    }

    pub(crate) fn u64(&mut self, v: u64) -> &mut Self {
        self.raw(&v.to_be_bytes())
    }

    pub(crate) fn u128(&mut self, v: u128) -> &mut Self {
        self.raw(&v.to_be_bytes())
    }

    pub(crate) fn account(&mut self, id: &AccountId) -> &mut Self {
        self.raw(id.as_bytes())
    }

    pub(crate) fn optional_account(&mut self, id: Option<&AccountId>) -> &mut Self {
        match id {
            Some(id) => self.u8(1).account(id),
            None => self.u8(0),
        }
    }

    pub(crate) fn bytes(&mut self, payload: &[u8]) -> &mut Self {
        let inner = Sha256::digest(payload);
        self.raw(&inner)
    }

    pub(crate) fn finish(&mut self) -> OrderDigest {
        let hasher = std::mem::take(&mut self.hasher);
        OrderDigest(hasher.finalize().into())
    }
}
