//! Account store trait definition.

use async_trait::async_trait;

use crate::domain::{Account, AccountUpdate};
use crate::error::Result;
use crate::session::CookieJar;

/// Persistence seam for account records.
///
/// Each earn loop reads its own record at startup and writes back its own
/// cookies after a refresh, so implementations need no cross-account locking
/// beyond keeping individual writes consistent.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Get an account by ID.
    async fn get_account(&self, id: &str) -> Result<Option<Account>>;

    /// List all accounts in insertion order.
    async fn list_accounts(&self) -> Result<Vec<Account>>;

    /// Merge `cookies` into the stored jar (union, last write wins).
    async fn persist_cookies(&self, id: &str, cookies: &CookieJar) -> Result<()>;

    /// Create a new account. Fails if the ID is taken.
    async fn create_account(&self, account: &Account) -> Result<()>;

    /// Replace the fields set in `update` and return the stored record.
    async fn update_account(&self, id: &str, update: &AccountUpdate) -> Result<Account>;

    /// Delete an account by ID.
    async fn delete_account(&self, id: &str) -> Result<()>;
}
