//! Asset accounting.
//!
//! [`AssetLedger`] is durable: internal owner balances plus the node fee
//! reserve and the reward reserve. [`EpochLedger`] tracks one signed delta
//! per bundle asset while a bundle runs; every delta must net to exactly zero
//! before the bundle is accepted, which is the single solvency check per
//! epoch.

use crate::domain::{map_entries, AccountId, Asset, AssetIndex};
use ethnum::I256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::{Result, SettlementError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetLedger {
    /// (owner, asset) -> balance
    #[serde(with = "map_entries")]
    balances: BTreeMap<(AccountId, AccountId), u128>,
    #[serde(with = "map_entries")]
    fee_reserve: BTreeMap<AccountId, u128>,
    #[serde(with = "map_entries")]
    reward_reserve: BTreeMap<AccountId, u128>,
}

impl AssetLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance_of(&self, owner: &AccountId, asset: &AccountId) -> u128 {
        self.balances.get(&(*owner, *asset)).copied().unwrap_or(0)
    }

    /// All non-zero balances held by `owner`.
    pub fn balances_of(&self, owner: &AccountId) -> Vec<(AccountId, u128)> {
        self.balances
            .range((*owner, AccountId::ZERO)..)
            .take_while(|((o, _), _)| o == owner)
            .map(|((_, asset), amount)| (*asset, *amount))
            .collect()
    }

    pub fn deposit(&mut self, owner: AccountId, asset: AccountId, amount: u128) -> Result<()> {
        self.credit(owner, asset, amount)
    }

    pub fn withdraw(&mut self, owner: AccountId, asset: AccountId, amount: u128) -> Result<()> {
        self.debit(owner, asset, amount)
    }

    pub fn credit(&mut self, owner: AccountId, asset: AccountId, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let balance = self.balances.entry((owner, asset)).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(SettlementError::AmountOverflow)?;
        Ok(())
    }

    pub fn debit(&mut self, owner: AccountId, asset: AccountId, amount: u128) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let available = self.balance_of(&owner, &asset);
        if available < amount {
            return Err(SettlementError::InsufficientBalance {
                owner,
                asset,
                needed: amount,
                available,
            });
        }
        let remaining = available - amount;
        if remaining == 0 {
            self.balances.remove(&(owner, asset));
        } else {
            self.balances.insert((owner, asset), remaining);
        }
        Ok(())
    }

    pub fn fee_reserve(&self, asset: &AccountId) -> u128 {
        self.fee_reserve.get(asset).copied().unwrap_or(0)
    }

    pub fn fee_reserves(&self) -> &BTreeMap<AccountId, u128> {
        &self.fee_reserve
    }

    pub fn add_fee(&mut self, asset: AccountId, amount: u128) -> Result<()> {
        add_to(&mut self.fee_reserve, asset, amount)
    }

    /// Remove `amount` from the fee reserve. Short reserves fail with
    /// `InsufficientBalance` naming `recipient`.
    pub fn pull_fee(&mut self, recipient: AccountId, asset: AccountId, amount: u128) -> Result<()> {
        let available = self.fee_reserve(&asset);
        if available < amount {
            return Err(SettlementError::InsufficientBalance {
                owner: recipient,
                asset,
                needed: amount,
                available,
            });
        }
        self.fee_reserve.insert(asset, available - amount);
        Ok(())
    }

    pub fn reward_reserve(&self, asset: &AccountId) -> u128 {
        self.reward_reserve.get(asset).copied().unwrap_or(0)
    }

    pub fn add_reward_reserve(&mut self, asset: AccountId, amount: u128) -> Result<()> {
        add_to(&mut self.reward_reserve, asset, amount)
    }

    /// Move accrued rewards from the reserve into `owner`'s balance.
    pub fn pay_reward(&mut self, owner: AccountId, asset: AccountId, amount: u128) -> Result<()> {
        let available = self.reward_reserve(&asset);
        if available < amount {
            return Err(SettlementError::RewardReserveShort {
                asset,
                shortfall: amount - available,
            });
        }
        self.reward_reserve.insert(asset, available - amount);
        self.credit(owner, asset, amount)
    }
}

fn add_to(map: &mut BTreeMap<AccountId, u128>, asset: AccountId, amount: u128) -> Result<()> {
    let entry = map.entry(asset).or_insert(0);
    *entry = entry
        .checked_add(amount)
        .ok_or(SettlementError::AmountOverflow)?;
    Ok(())
}

/// Signed per-asset deltas for one bundle, indexed like the bundle's asset
/// list. Positive means the controller holds more of the asset than it owes.
#[derive(Debug, Clone)]
pub struct EpochLedger {
    deltas: Vec<I256>,
}

impl EpochLedger {
    pub fn new(asset_count: usize) -> Self {
        Self {
            deltas: vec![I256::ZERO; asset_count],
        }
    }

    pub fn delta(&self, index: AssetIndex) -> I256 {
        self.deltas
            .get(usize::from(index))
            .copied()
            .unwrap_or(I256::ZERO)
    }

    pub fn add(&mut self, index: AssetIndex, amount: u128) -> Result<()> {
        let slot = self.slot(index)?;
        *slot = slot
            .checked_add(I256::from(amount))
            .ok_or(SettlementError::AmountOverflow)?;
        Ok(())
    }

    pub fn sub(&mut self, index: AssetIndex, amount: u128) -> Result<()> {
        let slot = self.slot(index)?;
        *slot = slot
            .checked_sub(I256::from(amount))
            .ok_or(SettlementError::AmountOverflow)?;
        Ok(())
    }

    /// Credit every asset's borrow amount.
    pub fn borrow(&mut self, assets: &[Asset]) -> Result<()> {
        for (i, asset) in assets.iter().enumerate() {
            self.add(index_of(i)?, asset.borrow)?;
        }
        Ok(())
    }

    /// Pull `amount` of the asset at `index` out of `owner`'s balance into
    /// the bundle.
    pub fn account_in(
        &mut self,
        ledger: &mut AssetLedger,
        owner: AccountId,
        asset: AccountId,
        index: AssetIndex,
        amount: u128,
    ) -> Result<()> {
        ledger.debit(owner, asset, amount)?;
        self.add(index, amount)
    }

    /// Pay `amount` of the asset at `index` from the bundle to `recipient`.
    pub fn account_out(
        &mut self,
        ledger: &mut AssetLedger,
        recipient: AccountId,
        asset: AccountId,
        index: AssetIndex,
        amount: u128,
    ) -> Result<()> {
        ledger.credit(recipient, asset, amount)?;
        self.sub(index, amount)
    }

    /// Debit every asset's save and settle amounts; saves go to the fee
    /// reserve.
    pub fn save_and_settle(&mut self, ledger: &mut AssetLedger, assets: &[Asset]) -> Result<()> {
        for (i, asset) in assets.iter().enumerate() {
            let index = index_of(i)?;
            self.sub(index, asset.save)?;
            self.sub(index, asset.settle)?;
            ledger.add_fee(asset.id, asset.save)?;
        }
        Ok(())
    }

    /// Every delta must be exactly zero.
    pub fn assert_resolved(&self, assets: &[Asset]) -> Result<()> {
        for (asset, delta) in assets.iter().zip(&self.deltas) {
            if *delta != I256::ZERO {
                return Err(SettlementError::BundleDeltaUnresolved {
                    asset: asset.id,
                    delta: delta.to_string(),
                });
            }
        }
        Ok(())
    }

    fn slot(&mut self, index: AssetIndex) -> Result<&mut I256> {
        let len = self.deltas.len();
        self.deltas
            .get_mut(usize::from(index))
            .ok_or(SettlementError::AssetIndexOutOfBounds { index, len })
    }
}

fn index_of(i: usize) -> Result<AssetIndex> {
    AssetIndex::try_from(i).map_err(|_| SettlementError::AmountOverflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> AccountId {
        AccountId::from_low_u64(n)
    }

    #[test]
    fn test_withdraw_more_than_balance_fails() {
        let mut ledger = AssetLedger::new();
        ledger.deposit(id(1), id(100), 50).unwrap();
        let err = ledger.withdraw(id(1), id(100), 51).unwrap_err();
        assert!(matches!(
            err,
            SettlementError::InsufficientBalance {
                needed: 51,
                available: 50,
                ..
            }
        ));
        ledger.withdraw(id(1), id(100), 50).unwrap();
        assert_eq!(ledger.balance_of(&id(1), &id(100)), 0);
        assert!(ledger.balances_of(&id(1)).is_empty());
    }

    #[test]
    fn test_balances_of_lists_only_owner() {
        let mut ledger = AssetLedger::new();
        ledger.deposit(id(1), id(100), 5).unwrap();
        ledger.deposit(id(1), id(101), 6).unwrap();
        ledger.deposit(id(2), id(100), 7).unwrap();
        assert_eq!(ledger.balances_of(&id(1)), vec![(id(100), 5), (id(101), 6)]);
    }

    #[test]
    fn test_bundle_resolves_when_flows_net_out() {
        let assets = vec![
            Asset::new(id(100), 100, 10, 90),
            Asset::new(id(101), 0, 0, 0),
        ];
        let mut ledger = AssetLedger::new();
        let mut epoch = EpochLedger::new(2);
        epoch.borrow(&assets).unwrap();
        assert!(epoch.assert_resolved(&assets).is_err());
        epoch.save_and_settle(&mut ledger, &assets).unwrap();
        epoch.assert_resolved(&assets).unwrap();
        assert_eq!(ledger.fee_reserve(&id(100)), 10);
    }

    #[test]
    fn test_account_in_and_out_move_balances() {
        let mut ledger = AssetLedger::new();
        ledger.deposit(id(1), id(100), 40).unwrap();
        let mut epoch = EpochLedger::new(2);
        epoch.account_in(&mut ledger, id(1), id(100), 0, 40).unwrap();
        epoch.account_out(&mut ledger, id(2), id(101), 1, 30).unwrap();
        assert_eq!(epoch.delta(0), I256::from(40u128));
        assert_eq!(epoch.delta(1), I256::from(-30i128));
        assert_eq!(ledger.balance_of(&id(2), &id(101)), 30);
    }

    #[test]
    fn test_unresolved_delta_reports_asset() {
        let assets = vec![Asset::new(id(100), 0, 0, 1)];
        let mut ledger = AssetLedger::new();
        let mut epoch = EpochLedger::new(1);
        epoch.save_and_settle(&mut ledger, &assets).unwrap();
        match epoch.assert_resolved(&assets) {
            Err(SettlementError::BundleDeltaUnresolved { asset, delta }) => {
                assert_eq!(asset, id(100));
                assert_eq!(delta, "-1");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_pay_reward_requires_reserve() {
        let mut ledger = AssetLedger::new();
        ledger.add_reward_reserve(id(100), 5).unwrap();
        assert!(matches!(
            ledger.pay_reward(id(1), id(100), 6),
            Err(SettlementError::RewardReserveShort { shortfall: 1, .. })
        ));
        ledger.pay_reward(id(1), id(100), 5).unwrap();
        assert_eq!(ledger.balance_of(&id(1), &id(100)), 5);
        assert_eq!(ledger.reward_reserve(&id(100)), 0);
    }

    #[test]
    fn test_ledger_json_roundtrip() {
        let mut ledger = AssetLedger::new();
        ledger.deposit(id(1), id(100), u128::MAX).unwrap();
        ledger.add_fee(id(100), 3).unwrap();
        let json = serde_json::to_string(&ledger).unwrap();
        let back: AssetLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ledger);
    }
}
