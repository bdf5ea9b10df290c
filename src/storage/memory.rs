//! In-memory account store.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use super::traits::AccountStore;
use crate::domain::{Account, AccountUpdate};
use crate::error::{FarmError, Result};
use crate::session::CookieJar;

/// Account store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<Vec<Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `accounts`
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        Self {
            accounts: RwLock::new(accounts.into_iter().map(Account::normalize).collect()),
        }
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get_account(&self, id: &str) -> Result<Option<Account>> {
        let accounts = self.accounts.read().map_err(|e| FarmError::Storage(e.to_string()))?;
        Ok(accounts.iter().find(|a| a.id == id).cloned())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let accounts = self.accounts.read().map_err(|e| FarmError::Storage(e.to_string()))?;
        Ok(accounts.clone())
    }

    async fn persist_cookies(&self, id: &str, cookies: &CookieJar) -> Result<()> {
        let mut accounts = self.accounts.write().map_err(|e| FarmError::Storage(e.to_string()))?;
        let account = accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| FarmError::Storage(format!("Cannot persist cookies, no account {}", id)))?;
        account.cookies.merge(cookies);
        Ok(())
    }

    async fn create_account(&self, account: &Account) -> Result<()> {
        let mut accounts = self.accounts.write().map_err(|e| FarmError::Storage(e.to_string()))?;
        if accounts.iter().any(|a| a.id == account.id) {
            return Err(FarmError::Storage(format!("Account already exists: {}", account.id)));
        }
        accounts.push(account.clone().normalize());
        Ok(())
    }

    async fn update_account(&self, id: &str, update: &AccountUpdate) -> Result<Account> {
        let mut accounts = self.accounts.write().map_err(|e| FarmError::Storage(e.to_string()))?;
        let account = accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| FarmError::AccountNotFound(id.to_string()))?;
        account.apply_update(update, Utc::now());
        Ok(account.clone())
    }

    async fn delete_account(&self, id: &str) -> Result<()> {
        let mut accounts = self.accounts.write().map_err(|e| FarmError::Storage(e.to_string()))?;
        let original_len = accounts.len();
        accounts.retain(|a| a.id != id);
        if accounts.len() == original_len {
            return Err(FarmError::AccountNotFound(id.to_string()));
        }
        Ok(())
    }
}
