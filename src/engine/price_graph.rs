use crate::domain::{AssetIndex, PriceEntry, Ray};
use std::collections::HashMap;

use super::error::{Result, SettlementError};

/// Directed per-epoch prices between asset indices.
///
/// `price(out, in)` is how many units of `in` buy one unit of `out`. There is
/// no inversion or transitive lookup: a pair is usable only once the bundle
/// sets it explicitly. A zero price means unset.
#[derive(Debug, Clone, Default)]
pub struct PriceGraph {
    asset_count: usize,
    prices: HashMap<(AssetIndex, AssetIndex), Ray>,
}

impl PriceGraph {
    pub fn init(asset_count: usize) -> Self {
        Self {
            asset_count,
            prices: HashMap::new(),
        }
    }

    pub fn from_entries(asset_count: usize, entries: &[PriceEntry]) -> Result<Self> {
        let mut graph = Self::init(asset_count);
        for entry in entries {
            graph.set(entry.out_index, entry.in_index, entry.price)?;
        }
        Ok(graph)
    }

    pub fn asset_count(&self) -> usize {
        self.asset_count
    }

    pub fn set(&mut self, out_index: AssetIndex, in_index: AssetIndex, price: Ray) -> Result<()> {
        self.check_index(out_index)?;
        self.check_index(in_index)?;
        if out_index == in_index {
            return Err(SettlementError::SameAsset { index: out_index });
        }
        if price.is_zero() {
            self.prices.remove(&(out_index, in_index));
        } else {
            self.prices.insert((out_index, in_index), price);
        }
        Ok(())
    }

    pub fn get(&self, out_index: AssetIndex, in_index: AssetIndex) -> Result<Ray> {
        self.prices
            .get(&(out_index, in_index))
            .copied()
            .ok_or(SettlementError::PriceNotSet {
                out_index,
                in_index,
            })
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    fn check_index(&self, index: AssetIndex) -> Result<()> {
        if usize::from(index) >= self.asset_count {
            return Err(SettlementError::AssetIndexOutOfBounds {
                index,
                len: self.asset_count,
            });
        }
        Ok(())
    }
}
