//! Hooks: third-party callbacks run between signature validation and
//! settlement. A hook sees the signer and its payload but never touches
//! balances; it can only approve (by returning the magic value) or veto.

use crate::domain::AccountId;
use std::collections::HashMap;
use std::sync::Arc;

/// Value a hook must return to approve an order.
pub const HOOK_RETURN_MAGIC: u32 = 0x24a2_e44b;

pub trait OrderHook: Send + Sync {
    fn compose(&self, from: &AccountId, payload: &[u8]) -> u32;
}

impl<F> OrderHook for F
where
    F: Fn(&AccountId, &[u8]) -> u32 + Send + Sync,
{
    fn compose(&self, from: &AccountId, payload: &[u8]) -> u32 {
        self(from, payload)
    }
}

/// Hooks by address. Unknown addresses return 0, which always fails.
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<AccountId, Arc<dyn OrderHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook(mut self, address: AccountId, hook: impl OrderHook + 'static) -> Self {
        self.register(address, hook);
        self
    }

    pub fn register(&mut self, address: AccountId, hook: impl OrderHook + 'static) {
        self.hooks.insert(address, Arc::new(hook));
    }

    pub fn call(&self, hook: &AccountId, from: &AccountId, payload: &[u8]) -> u32 {
        self.hooks
            .get(hook)
            .map_or(0, |h| h.compose(from, payload))
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}
