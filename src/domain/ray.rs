//! Ray fixed-point numbers (1e27 scale) backed by ethnum's U256.
//!
//! Prices and the half-spread fee are rays. Human-readable rates are parsed
//! through rust_decimal so configuration stays lossless.

use ethnum::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 1e27 as a U256.
pub const RAY_UNIT: U256 = U256::new(1_000_000_000_000_000_000_000_000_000);

const RAY_DECIMALS: u32 = 27;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RayError {
    #[error("negative value {0} cannot be a ray")]
    Negative(String),
    #[error("value {0} overflows 256 bits")]
    Overflow(String),
    #[error("invalid ray string: {0}")]
    Parse(String),
}

/// Unsigned fixed-point number with 27 decimals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ray(pub U256);

impl Ray {
    pub const ZERO: Ray = Ray(U256::ZERO);
    pub const ONE: Ray = Ray(RAY_UNIT);

    pub fn new(raw: U256) -> Self {
        Ray(raw)
    }

    /// Raw scaled integer.
    pub fn raw(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == U256::ZERO
    }

    /// Ray equal to `num / den`, rounded down.
    pub fn from_ratio(num: u128, den: u128) -> Option<Self> {
        if den == 0 {
            return None;
        }
        Some(Ray(U256::from(num) * RAY_UNIT / U256::from(den)))
    }

    /// Convert a non-negative decimal (e.g. `0.0015`) into a ray, truncating
    /// digits beyond the 27th.
    pub fn from_decimal(value: Decimal) -> Result<Self, RayError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(RayError::Negative(value.to_string()));
        }
        let mantissa = U256::from(value.mantissa().unsigned_abs());
        let scale = value.scale();
        let raw = if scale <= RAY_DECIMALS {
            mantissa
                .checked_mul(pow10(RAY_DECIMALS - scale))
                .ok_or_else(|| RayError::Overflow(value.to_string()))?
        } else {
            mantissa / pow10(scale - RAY_DECIMALS)
        };
        Ok(Ray(raw))
    }

    /// Lossy conversion for display; None when the ray exceeds what a
    /// 96-bit decimal mantissa can hold.
    pub fn to_decimal(&self) -> Option<Decimal> {
        if self.0 > U256::from(i128::MAX as u128) {
            return None;
        }
        Decimal::try_from_i128_with_scale(self.0.as_i128(), RAY_DECIMALS)
            .ok()
            .map(|d| d.normalize())
    }

    /// `amount * self / 1e27`, rounded down.
    pub fn mul_down(&self, amount: U256) -> Option<U256> {
        amount.checked_mul(self.0).map(|p| p / RAY_UNIT)
    }

    /// `amount * self / 1e27`, rounded up.
    pub fn mul_up(&self, amount: U256) -> Option<U256> {
        amount.checked_mul(self.0).map(|p| div_ceil(p, RAY_UNIT))
    }

    /// `amount * 1e27 / self`, rounded down. None on a zero ray.
    pub fn div_down(&self, amount: U256) -> Option<U256> {
        if self.is_zero() {
            return None;
        }
        amount.checked_mul(RAY_UNIT).map(|p| p / self.0)
    }
}

/// Ceiling division; `den` must be non-zero.
pub fn div_ceil(num: U256, den: U256) -> U256 {
    let q = num / den;
    if q * den == num {
        q
    } else {
        q + U256::ONE
    }
}

fn pow10(exp: u32) -> U256 {
    U256::from(10u8).pow(exp)
}

impl fmt::Display for Ray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_decimal() {
            Some(d) => write!(f, "{}", d),
            None => write!(f, "{}e-27", self.0),
        }
    }
}

impl FromStr for Ray {
    type Err = RayError;

    /// Parses the raw scaled integer (what the wire format carries).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        U256::from_str_radix(s.trim(), 10)
            .map(Ray)
            .map_err(|e| RayError::Parse(e.to_string()))
    }
}

impl Serialize for Ray {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Ray {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ray::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl From<U256> for Ray {
    fn from(value: U256) -> Self {
        Ray(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_from_decimal_scales_to_ray() {
        let r = Ray::from_decimal(dec("0.0015")).unwrap();
        assert_eq!(r.raw(), U256::new(1_500_000_000_000_000_000_000_000));
        assert_eq!(Ray::from_decimal(dec("1")).unwrap(), Ray::ONE);
    }

    #[test]
    fn test_from_decimal_rejects_negative() {
        assert!(matches!(
            Ray::from_decimal(dec("-0.1")),
            Err(RayError::Negative(_))
        ));
    }

    #[test]
    fn test_to_decimal_roundtrip() {
        let r = Ray::from_decimal(dec("2.5")).unwrap();
        assert_eq!(r.to_decimal(), Some(dec("2.5")));
        assert_eq!(r.to_string(), "2.5");
    }

    #[test]
    fn test_mul_and_div_rounding() {
        let third = Ray::from_ratio(1, 3).unwrap();
        let amount = U256::from(10u8);
        assert_eq!(third.mul_down(amount), Some(U256::from(3u8)));
        assert_eq!(third.mul_up(amount), Some(U256::from(4u8)));

        let two = Ray::from_ratio(2, 1).unwrap();
        assert_eq!(two.div_down(U256::from(101u8)), Some(U256::from(50u8)));
        assert_eq!(Ray::ZERO.div_down(amount), None);
    }

    #[test]
    fn test_ray_json_is_raw_string() {
        let r = Ray::ONE;
        let json = serde_json::to_value(r).unwrap();
        assert_eq!(json, serde_json::json!("1000000000000000000000000000"));
        let back: Ray = serde_json::from_value(json).unwrap();
        assert_eq!(back, r);
    }
}
