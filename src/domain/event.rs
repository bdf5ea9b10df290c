//! Status events flowing from earn loops to the supervisor.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message texts shared by producer and consumer
pub mod messages {
    pub const OK: &str = "ok";
    pub const SESSION_EXPIRED: &str = "session expired";
    pub const SESSION_REFRESHED: &str = "session refreshed";
}

/// One-way status report from an earn loop.
///
/// Serializes as `{"type": "info", "ts": ..., "status": ..., "message": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StatusEvent {
    /// Balance fetch outcome (and session refreshes)
    Info {
        ts: DateTime<Utc>,
        status: u16,
        message: String,
    },
    /// Earn post outcome
    Earn {
        ts: DateTime<Utc>,
        status: u16,
        message: String,
    },
    /// A cycle aborted with an error
    Error { ts: DateTime<Utc>, message: String },
}

impl StatusEvent {
    pub fn info(ts: DateTime<Utc>, status: u16, message: impl Into<String>) -> Self {
        Self::Info {
            ts,
            status,
            message: message.into(),
        }
    }

    pub fn earn(ts: DateTime<Utc>, status: u16, message: impl Into<String>) -> Self {
        Self::Earn {
            ts,
            status,
            message: message.into(),
        }
    }

    pub fn error(ts: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self::Error {
            ts,
            message: message.into(),
        }
    }

    pub fn ts(&self) -> DateTime<Utc> {
        match self {
            Self::Info { ts, .. } | Self::Earn { ts, .. } | Self::Error { ts, .. } => *ts,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Info { message, .. } | Self::Earn { message, .. } | Self::Error { message, .. } => message,
        }
    }

    /// HTTP status, absent for errors
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Info { status, .. } | Self::Earn { status, .. } => Some(*status),
            Self::Error { .. } => None,
        }
    }
}

/// Why a worker execution ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Returned without error
    Completed,
    /// Returned an error (e.g. account missing at startup)
    Failed(String),
    /// Panicked
    Panicked(String),
    /// Aborted by the supervisor
    Aborted,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed(e) => write!(f, "failed: {}", e),
            Self::Panicked(e) => write!(f, "panicked: {}", e),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Inbound signal for the supervisor
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerMessage {
    /// Status event from a running worker
    Status { account_id: String, event: StatusEvent },
    /// A worker execution terminated
    Exited {
        account_id: String,
        generation: u64,
        reason: ExitReason,
    },
}
