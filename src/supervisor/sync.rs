//! Store reconciliation
//!
//! Brings a running Supervisor in line with the account store. New records
//! are added, edited records have their worker stopped so the respawn loads
//! the new record, and deleted records are removed. Edits are detected by
//! `updated_at`; cookie write-back from the workers does not touch it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{info, warn};

use super::manager::Supervisor;
use super::worker::Worker;
use crate::domain::Account;
use crate::error::Result;
use crate::storage::AccountStore;

/// What one reconciliation pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: Vec<String>,
    pub restarted: Vec<String>,
    pub removed: Vec<String>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.restarted.is_empty() && self.removed.is_empty()
    }
}

/// Remembers the `updated_at` of every account as of the last pass.
#[derive(Debug, Default)]
pub struct StoreSync {
    seen: HashMap<String, Option<DateTime<Utc>>>,
}

impl StoreSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the accounts the Supervisor was started with.
    pub fn seeded<'a>(accounts: impl IntoIterator<Item = &'a Account>) -> Self {
        Self {
            seen: accounts
                .into_iter()
                .map(|account| (account.id.clone(), account.updated_at))
                .collect(),
        }
    }

    /// Number of accounts known after the last pass
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// List the store once and apply the differences to `supervisor`.
    pub async fn apply<W, S>(&mut self, supervisor: &Supervisor<W>, store: &S) -> Result<SyncReport>
    where
        W: Worker,
        S: AccountStore,
    {
        let accounts = store.list_accounts().await?;
        let mut report = SyncReport::default();
        let mut current = HashMap::with_capacity(accounts.len());

        for account in accounts {
            match self.seen.get(&account.id) {
                None => {
                    info!("[{}] New account in store, starting worker", account.id);
                    supervisor.add(account.id.clone()).await;
                    report.added.push(account.id.clone());
                }
                Some(seen) if *seen != account.updated_at => {
                    info!("[{}] Account edited, restarting worker", account.id);
                    match supervisor.stop(&account.id).await {
                        Ok(()) => report.restarted.push(account.id.clone()),
                        Err(e) => warn!("[{}] Failed to restart worker: {}", account.id, e),
                    }
                }
                Some(_) => {}
            }
            current.insert(account.id, account.updated_at);
        }

        let mut gone: Vec<&String> = self.seen.keys().filter(|id| !current.contains_key(*id)).collect();
        gone.sort();
        for id in gone {
            info!("[{}] Account deleted from store, removing worker", id);
            match supervisor.remove(id).await {
                Ok(()) => report.removed.push(id.clone()),
                Err(e) => warn!("[{}] Failed to remove worker: {}", id, e),
            }
        }

        self.seen = current;
        Ok(report)
    }
}
