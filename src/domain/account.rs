//! Account record
//!
//! An Account is a stored identity with captured session cookies. The account
//! store owns it; an earn loop works on a snapshot taken at start.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::CookieJar;

/// A configured account the farm earns credits for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique identifier
    pub id: String,

    /// Display name
    #[serde(default)]
    pub name: String,

    /// Session cookies, name -> value
    #[serde(default)]
    pub cookies: CookieJar,

    /// Per-account notification webhook, empty when unset
    #[serde(default)]
    pub webhook: String,

    #[serde(default, alias = "isAdmin")]
    pub is_admin: bool,

    /// Set by explicit edits only, not by cookie write-back
    #[serde(default, alias = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Replacement values for an account edit. `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccountUpdate {
    pub name: Option<String>,
    /// Replaces the whole jar, unlike cookie write-back which merges
    pub cookies: Option<CookieJar>,
    pub webhook: Option<String>,
}

impl AccountUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.cookies.is_none() && self.webhook.is_none()
    }
}

impl Account {
    /// Create an account with the default display name
    pub fn new(id: impl Into<String>, cookies: CookieJar) -> Self {
        let id = id.into();
        Self {
            name: default_name(&id),
            id,
            cookies,
            webhook: String::new(),
            is_admin: false,
            updated_at: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_webhook(mut self, webhook: impl Into<String>) -> Self {
        self.webhook = webhook.into();
        self
    }

    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    /// Webhook URL if one is configured
    pub fn webhook_url(&self) -> Option<&str> {
        let url = self.webhook.trim();
        (!url.is_empty()).then_some(url)
    }

    /// Apply an edit and stamp `updated_at`.
    pub fn apply_update(&mut self, update: &AccountUpdate, now: DateTime<Utc>) {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(cookies) = &update.cookies {
            self.cookies = cookies.clone();
        }
        if let Some(webhook) = &update.webhook {
            self.webhook = webhook.clone();
        }
        self.updated_at = Some(now);
        if self.name.trim().is_empty() {
            self.name = default_name(&self.id);
        }
    }

    /// Fill fields that older records may lack.
    pub fn normalize(mut self) -> Self {
        if self.name.trim().is_empty() {
            self.name = default_name(&self.id);
        }
        self
    }
}

fn default_name(id: &str) -> String {
    format!("Account {}", id)
}
