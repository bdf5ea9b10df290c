//! Discord webhook notifier
//!
//! Posts a balance embed to the account's webhook, or the configured default.
//! Delivery is best-effort: one attempt, bounded timeout, failures logged.

use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use regex::Regex;
use reqwest::Client;
use serde::Serialize;

use super::Notifier;
use crate::error::{FarmError, Result};

/// Default webhook request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Accepted webhook URL shape
pub const DEFAULT_URL_PATTERN: &str = r"^https://discord\.com/api/webhooks/\d+/[\w-]+$";

const EMBED_COLOR: u32 = 0x00ff00;
const FOOTER_TEXT: &str = "creditfarm";

/// Configuration for [`WebhookNotifier`]
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Used when an account has no webhook of its own
    pub default_webhook: Option<String>,
    pub timeout: Duration,
    pub url_pattern: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            default_webhook: None,
            timeout: DEFAULT_TIMEOUT,
            url_pattern: DEFAULT_URL_PATTERN.to_string(),
        }
    }
}

/// Result of one delivery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Webhook answered 2xx
    Sent(u16),
    /// Webhook answered non-2xx
    Rejected(u16),
    /// No usable webhook URL
    Skipped(String),
    /// Transport failure
    Failed(String),
}

#[derive(Debug, Serialize)]
struct WebhookPayload {
    embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
struct Embed {
    title: String,
    description: String,
    color: u32,
    fields: Vec<EmbedField>,
    footer: EmbedFooter,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct EmbedField {
    name: String,
    value: String,
    inline: bool,
}

#[derive(Debug, Serialize)]
struct EmbedFooter {
    text: String,
}

fn build_payload(balance: f64, ts: DateTime<Utc>, account_id: &str) -> WebhookPayload {
    WebhookPayload {
        embeds: vec![Embed {
            title: format!("Credit Balance ({})", account_id),
            description: format!("**Account:** `{}`", account_id),
            color: EMBED_COLOR,
            fields: vec![
                EmbedField {
                    name: "Credits".to_string(),
                    value: balance.to_string(),
                    inline: true,
                },
                EmbedField {
                    name: "Updated".to_string(),
                    value: format!("<t:{}:R>", ts.timestamp()),
                    inline: true,
                },
            ],
            footer: EmbedFooter {
                text: FOOTER_TEXT.to_string(),
            },
            timestamp: ts.to_rfc3339(),
        }],
    }
}

fn status_hint(status: u16) -> Option<&'static str> {
    match status {
        401 => Some("webhook URL might be invalid or expired"),
        404 => Some("webhook channel might be deleted"),
        429 => Some("rate limited by webhook host"),
        _ => None,
    }
}

/// reqwest-backed [`Notifier`]
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    default_webhook: Option<String>,
    pattern: Regex,
}

impl WebhookNotifier {
    pub fn new(config: NotifierConfig) -> Result<Self> {
        let pattern = Regex::new(&config.url_pattern)
            .map_err(|e| FarmError::InvalidConfig(format!("notifier.url_pattern: {}", e)))?;
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            default_webhook: config.default_webhook.filter(|url| !url.trim().is_empty()),
            pattern,
        })
    }

    /// Pick the webhook to use: the account's own, else the default.
    pub fn resolve_url<'a>(&'a self, webhook: Option<&'a str>) -> Option<&'a str> {
        webhook
            .filter(|url| !url.trim().is_empty())
            .or(self.default_webhook.as_deref())
    }

    pub fn is_valid_url(&self, url: &str) -> bool {
        self.pattern.is_match(url)
    }

    /// Send one embed and wait for the outcome.
    pub async fn deliver(
        &self,
        balance: f64,
        ts: DateTime<Utc>,
        account_id: &str,
        webhook: Option<&str>,
    ) -> Delivery {
        let Some(url) = self.resolve_url(webhook) else {
            warn!("[{}] No webhook URL configured, skipping balance notification", account_id);
            return Delivery::Skipped("no webhook configured".to_string());
        };
        if !self.is_valid_url(url) {
            warn!("[{}] Invalid webhook URL format, skipping balance notification", account_id);
            return Delivery::Skipped("invalid webhook url".to_string());
        }

        debug!("[{}] Sending balance update: {} credits", account_id, balance);
        let payload = build_payload(balance, ts, account_id);
        match self.client.post(url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                let status = response.status().as_u16();
                info!("[{}] Balance notification sent ({})", account_id, status);
                Delivery::Sent(status)
            }
            Ok(response) => {
                let status = response.status().as_u16();
                warn!("[{}] Balance notification rejected ({})", account_id, status);
                if let Some(hint) = status_hint(status) {
                    warn!("[{}] {}", account_id, hint);
                }
                Delivery::Rejected(status)
            }
            Err(e) => {
                warn!("[{}] Balance notification failed: {}", account_id, e);
                Delivery::Failed(e.to_string())
            }
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, balance: f64, ts: DateTime<Utc>, account_id: &str, webhook: Option<&str>) {
        let notifier = self.clone();
        let account_id = account_id.to_string();
        let webhook = webhook.map(str::to_string);
        tokio::spawn(async move {
            notifier.deliver(balance, ts, &account_id, webhook.as_deref()).await;
        });
    }
}
