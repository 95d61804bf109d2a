use crate::domain::{map_entries, AccountId};
use ethnum::U256;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::error::{Result, SettlementError};

/// Unordered standing-order nonces: 256 per word, set once, never cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceBitmap {
    /// (owner, nonce >> 8) -> used bits
    #[serde(with = "map_entries")]
    words: BTreeMap<(AccountId, u64), U256>,
}

fn locate(nonce: u64) -> (u64, U256) {
    (nonce >> 8, U256::ONE << (nonce & 0xff) as u32)
}

impl NonceBitmap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_used(&self, owner: &AccountId, nonce: u64) -> bool {
        let (word, bit) = locate(nonce);
        self.words
            .get(&(*owner, word))
            .is_some_and(|w| *w & bit != U256::ZERO)
    }

    /// Mark `nonce` used; fails if it already was.
    pub fn use_nonce(&mut self, owner: AccountId, nonce: u64) -> Result<()> {
        let (word, bit) = locate(nonce);
        let slot = self.words.entry((owner, word)).or_insert(U256::ZERO);
        if *slot & bit != U256::ZERO {
            return Err(SettlementError::NonceReuse { owner, nonce });
        }
        *slot |= bit;
        Ok(())
    }

    /// Burn every nonce in `word` whose bit is set in `mask`.
    pub fn invalidate(&mut self, owner: AccountId, word: u64, mask: U256) {
        if mask == U256::ZERO {
            return;
        }
        *self.words.entry((owner, word)).or_insert(U256::ZERO) |= mask;
    }

    pub fn word(&self, owner: &AccountId, word: u64) -> U256 {
        self.words
            .get(&(*owner, word))
            .copied()
            .unwrap_or(U256::ZERO)
    }
}
