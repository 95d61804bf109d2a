use crate::domain::{AccountId, Asset, AssetIndex, PriceEntry};

use super::error::{Result, SettlementError};
use super::price_graph::PriceGraph;

/// Reject asset lists that are not strictly ascending by id.
pub fn check_asset_order(assets: &[Asset]) -> Result<()> {
    for (i, pair) in assets.windows(2).enumerate() {
        if pair[0].id >= pair[1].id {
            return Err(SettlementError::AssetsOutOfOrder { index: i + 1 });
        }
    }
    Ok(())
}

/// Per-epoch view of the bundle's assets and prices. Built once at epoch
/// start and dropped when the bundle finishes.
#[derive(Debug, Clone)]
pub struct Globals {
    assets: Vec<Asset>,
    prices: PriceGraph,
}

impl Globals {
    pub fn new(assets: Vec<Asset>, initial_prices: &[PriceEntry]) -> Result<Self> {
        check_asset_order(&assets)?;
        let prices = PriceGraph::from_entries(assets.len(), initial_prices)?;
        Ok(Self { assets, prices })
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn prices(&self) -> &PriceGraph {
        &self.prices
    }

    pub fn asset(&self, index: AssetIndex) -> Result<&Asset> {
        self.assets
            .get(usize::from(index))
            .ok_or(SettlementError::AssetIndexOutOfBounds {
                index,
                len: self.assets.len(),
            })
    }

    pub fn asset_id(&self, index: AssetIndex) -> Result<AccountId> {
        Ok(self.asset(index)?.id)
    }

    /// Resolve a pool's asset pair; the pair must be listed in ascending order.
    pub fn pair(&self, asset0: AssetIndex, asset1: AssetIndex) -> Result<(AccountId, AccountId)> {
        let a0 = self.asset_id(asset0)?;
        let a1 = self.asset_id(asset1)?;
        if asset0 >= asset1 {
            return Err(SettlementError::AssetsUnsorted {
                asset0: a0,
                asset1: a1,
            });
        }
        Ok((a0, a1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn asset(n: u64) -> Asset {
        Asset::new(AccountId::from_low_u64(n), 0, 0, 0)
    }

    #[test]
    fn test_unsorted_assets_rejected() {
        let err = check_asset_order(&[asset(1), asset(3), asset(2)]).unwrap_err();
        assert!(matches!(err, SettlementError::AssetsOutOfOrder { index: 2 }));
    }

    #[test]
    fn test_duplicate_assets_rejected() {
        assert!(check_asset_order(&[asset(1), asset(1)]).is_err());
        assert!(check_asset_order(&[asset(1), asset(2)]).is_ok());
        assert!(check_asset_order(&[]).is_ok());
    }

    #[test]
    fn test_pair_requires_ascending_indices() {
        let globals = Globals::new(vec![asset(1), asset(2)], &[]).unwrap();
        assert!(globals.pair(0, 1).is_ok());
        assert!(matches!(
            globals.pair(1, 0),
            Err(SettlementError::AssetsUnsorted { .. })
        ));
        assert!(globals.asset(2).is_err());
    }
}
