//! In-memory `AbiProvider`: a registry of ABI JSON per account.

use crate::domain::errors::SchemaError;
use crate::ports::outbound::AbiProvider;
use parking_lot::RwLock;
use shared_types::AccountId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct InMemoryAbiProvider {
    abis: RwLock<HashMap<AccountId, String>>,
    lookups: AtomicU64,
}

impl InMemoryAbiProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish (or replace) the ABI JSON of an account.
    pub fn set_abi(&self, account: AccountId, abi_json: impl Into<String>) {
        self.abis.write().insert(account, abi_json.into());
    }

    pub fn clear_abi(&self, account: AccountId) -> bool {
        self.abis.write().remove(&account).is_some()
    }

    /// Number of `account_abi` calls served so far.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

impl AbiProvider for InMemoryAbiProvider {
    fn account_abi(&self, account: AccountId) -> Result<Option<String>, SchemaError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        Ok(self.abis.read().get(&account).cloned())
    }
}
