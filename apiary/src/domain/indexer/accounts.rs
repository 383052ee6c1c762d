//! Account registration.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::account::NewAccount;
use crate::domain::ports::{AccountStore, StoreError};

/// Registers accounts on their first on-chain appearance.
pub struct AccountIndexer<S> {
    store: Arc<S>,
}

impl<S: AccountStore> AccountIndexer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Insert every name not yet present, with the block time as creation
    /// time. Returns the names actually created, preserving sorted order so
    /// replays assign ids deterministically.
    pub async fn register(
        &self,
        tx: &mut S::Tx,
        names: &BTreeSet<String>,
        block_date: DateTime<Utc>,
    ) -> Result<Vec<String>, StoreError> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let name_list: Vec<String> = names.iter().cloned().collect();
        let existing: BTreeSet<String> = self
            .store
            .accounts_by_names(tx, &name_list)
            .await?
            .into_iter()
            .map(|account| account.name)
            .collect();

        let mut created = Vec::new();
        for name in names {
            if existing.contains(name) {
                continue;
            }
            self.store
                .create_account(tx, NewAccount::registered(name.clone(), block_date))
                .await?;
            debug!(name = %name, "registered account");
            created.push(name.clone());
        }
        Ok(created)
    }
}
