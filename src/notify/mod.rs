//! Balance notifications
//!
//! The earn loop calls [`Notifier::notify`] and moves on; delivery happens
//! off the loop and never reports back.

mod webhook;

use chrono::{DateTime, Utc};

pub use webhook::{DEFAULT_TIMEOUT, DEFAULT_URL_PATTERN, Delivery, NotifierConfig, WebhookNotifier};

/// Fire-and-forget balance notification sink
pub trait Notifier: Send + Sync {
    /// Schedule a notification. Must not block and must not fail.
    fn notify(&self, balance: f64, ts: DateTime<Utc>, account_id: &str, webhook: Option<&str>);
}
