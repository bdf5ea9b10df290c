//! Supervisor-owned runtime state per account, plus the status snapshots.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;

use crate::domain::{StatusEvent, messages};

/// Session status as inferred from status events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Unknown,
    Valid,
    Expired,
    Refreshed,
}

/// Liveness handle of one worker execution
#[derive(Debug)]
pub(crate) struct WorkerHandle {
    pub generation: u64,
    pub abort: AbortHandle,
}

impl WorkerHandle {
    pub fn is_live(&self) -> bool {
        !self.abort.is_finished()
    }
}

/// Everything the supervisor knows about one account
#[derive(Debug, Default)]
pub struct AccountRuntimeState {
    pub last_info: Option<StatusEvent>,
    pub last_earn: Option<StatusEvent>,
    pub last_error: Option<StatusEvent>,
    pub balance: Option<f64>,
    pub restarts: u64,
    pub session_status: SessionStatus,
    pub last_session_refresh: Option<DateTime<Utc>>,
    pub(crate) worker: Option<WorkerHandle>,
}

impl AccountRuntimeState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a worker execution is currently alive
    pub fn is_active(&self) -> bool {
        self.worker.as_ref().is_some_and(WorkerHandle::is_live)
    }

    /// Fold a status event into the state.
    pub fn apply(&mut self, event: StatusEvent) {
        match &event {
            StatusEvent::Info { ts, status, message } => {
                if message == messages::SESSION_REFRESHED {
                    self.session_status = SessionStatus::Refreshed;
                    self.last_session_refresh = Some(*ts);
                } else if (200..300).contains(status) {
                    self.session_status = SessionStatus::Valid;
                }
                if let Some(balance) = parse_balance_message(message) {
                    self.balance = Some(balance);
                }
                self.last_info = Some(event);
            }
            StatusEvent::Earn { status, message, .. } => {
                if *status == 204 {
                    self.session_status = SessionStatus::Valid;
                } else if message == messages::SESSION_EXPIRED {
                    self.session_status = SessionStatus::Expired;
                }
                self.last_earn = Some(event);
            }
            StatusEvent::Error { .. } => {
                self.last_error = Some(event);
            }
        }
    }

    pub fn snapshot(&self, id: &str) -> AccountSnapshot {
        AccountSnapshot {
            id: id.to_string(),
            balance: self.balance,
            session_status: self.session_status,
            last_info: self.last_info.clone(),
            last_earn: self.last_earn.clone(),
            last_error: self.last_error.clone(),
            last_session_refresh: self.last_session_refresh,
            restarts: self.restarts,
            active: self.is_active(),
        }
    }
}

fn balance_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"balance=(-?\d+(?:\.\d+)?)").ok())
        .as_ref()
}

/// Parse `balance=<number>` out of an Info message.
pub fn parse_balance_message(message: &str) -> Option<f64> {
    balance_regex()?
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Per-account status view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSnapshot {
    pub id: String,
    pub balance: Option<f64>,
    pub session_status: SessionStatus,
    pub last_info: Option<StatusEvent>,
    pub last_earn: Option<StatusEvent>,
    pub last_error: Option<StatusEvent>,
    pub last_session_refresh: Option<DateTime<Utc>>,
    pub restarts: u64,
    pub active: bool,
}

/// Aggregate status view
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SupervisorSummary {
    /// Seconds since the supervisor was created
    pub uptime: u64,
    pub started_at: DateTime<Utc>,
    pub total_accounts: usize,
    pub total_balance: f64,
    pub total_restarts: u64,
    pub active_workers: usize,
}
