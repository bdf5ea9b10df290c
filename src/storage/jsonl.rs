//! JSONL-based account store with in-memory caching.
//!
//! The cache is reloaded whenever the file's modification time or length no
//! longer matches what was last read or written, so edits made by another
//! process (e.g. `creditfarm accounts update` while `run` is active) are seen
//! on the next read.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::Utc;
use log::debug;

use super::traits::AccountStore;
use crate::domain::{Account, AccountUpdate};
use crate::error::{FarmError, Result};
use crate::session::CookieJar;

/// File name of the account collection
const ACCOUNTS_FILE: &str = "accounts.jsonl";

/// Modification time and length of the accounts file
type FileStamp = (SystemTime, u64);

struct Cached {
    accounts: Vec<Account>,
    stamp: Option<FileStamp>,
}

/// JSONL-backed account store. One account per line.
pub struct JsonlAccountStore {
    path: PathBuf,
    cache: RwLock<Option<Cached>>,
}

impl JsonlAccountStore {
    /// Open the store in `base_path`, creating the directory if needed.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref();
        fs::create_dir_all(base_path)?;
        Ok(Self {
            path: base_path.join(ACCOUNTS_FILE),
            cache: RwLock::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("jsonl.tmp")
    }

    fn file_stamp(&self) -> Option<FileStamp> {
        let metadata = fs::metadata(&self.path).ok()?;
        Some((metadata.modified().ok()?, metadata.len()))
    }

    fn read_file(&self) -> Result<Vec<Account>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let mut accounts = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                let account: Account = serde_json::from_str(&line)?;
                accounts.push(account.normalize());
            }
        }
        debug!("Loaded {} account(s) from {}", accounts.len(), self.path.display());
        Ok(accounts)
    }

    /// Load the collection into cache unless the cached copy is current.
    fn ensure_loaded(&self) -> Result<()> {
        let stamp = self.file_stamp();
        {
            let cache = self.cache.read().map_err(|e| FarmError::Storage(e.to_string()))?;
            if cache.as_ref().is_some_and(|cached| cached.stamp == stamp) {
                return Ok(());
            }
        }

        let accounts = self.read_file()?;
        let mut cache = self.cache.write().map_err(|e| FarmError::Storage(e.to_string()))?;
        *cache = Some(Cached { accounts, stamp });
        Ok(())
    }

    /// Write the whole collection to a temp file and rename it into place.
    fn rewrite_file(&self, accounts: &[Account]) -> Result<()> {
        let tmp_path = self.tmp_path();
        let mut file = File::create(&tmp_path)?;
        for account in accounts {
            writeln!(file, "{}", serde_json::to_string(account)?)?;
        }
        file.sync_all()?;
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Apply `f` to a copy of the collection, persist it, then commit it to cache.
    fn mutate<R>(&self, f: impl FnOnce(&mut Vec<Account>) -> Result<R>) -> Result<R> {
        self.ensure_loaded()?;

        let mut cache = self.cache.write().map_err(|e| FarmError::Storage(e.to_string()))?;
        let cached = cache
            .as_mut()
            .ok_or_else(|| FarmError::Storage("Accounts not loaded".to_string()))?;

        let mut accounts = cached.accounts.clone();
        let result = f(&mut accounts)?;
        self.rewrite_file(&accounts)?;

        cached.accounts = accounts;
        cached.stamp = self.file_stamp();
        Ok(result)
    }

    fn snapshot(&self) -> Result<Vec<Account>> {
        self.ensure_loaded()?;

        let cache = self.cache.read().map_err(|e| FarmError::Storage(e.to_string()))?;
        cache
            .as_ref()
            .map(|cached| cached.accounts.clone())
            .ok_or_else(|| FarmError::Storage("Accounts not loaded".to_string()))
    }
}

#[async_trait]
impl AccountStore for JsonlAccountStore {
    async fn get_account(&self, id: &str) -> Result<Option<Account>> {
        Ok(self.snapshot()?.into_iter().find(|a| a.id == id))
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.snapshot()
    }

    async fn persist_cookies(&self, id: &str, cookies: &CookieJar) -> Result<()> {
        self.mutate(|accounts| {
            let account = accounts
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or_else(|| FarmError::Storage(format!("Cannot persist cookies, no account {}", id)))?;
            account.cookies.merge(cookies);
            Ok(())
        })
    }

    async fn create_account(&self, account: &Account) -> Result<()> {
        self.mutate(|accounts| {
            if accounts.iter().any(|a| a.id == account.id) {
                return Err(FarmError::Storage(format!("Account already exists: {}", account.id)));
            }
            accounts.push(account.clone().normalize());
            Ok(())
        })
    }

    async fn update_account(&self, id: &str, update: &AccountUpdate) -> Result<Account> {
        self.mutate(|accounts| {
            let account = accounts
                .iter_mut()
                .find(|a| a.id == id)
                .ok_or_else(|| FarmError::AccountNotFound(id.to_string()))?;
            account.apply_update(update, Utc::now());
            Ok(account.clone())
        })
    }

    async fn delete_account(&self, id: &str) -> Result<()> {
        self.mutate(|accounts| {
            let original_len = accounts.len();
            accounts.retain(|a| a.id != id);
            if accounts.len() == original_len {
                return Err(FarmError::AccountNotFound(id.to_string()));
            }
            Ok(())
        })
    }
}
