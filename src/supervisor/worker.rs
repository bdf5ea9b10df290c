//! Worker seam between the supervisor and per-account executions.

use async_trait::async_trait;
use log::debug;
use tokio::sync::mpsc;

use crate::domain::{StatusEvent, WorkerMessage};
use crate::error::Result;

/// One-way status channel from a worker to its supervisor.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    account_id: String,
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl StatusReporter {
    pub fn new(account_id: impl Into<String>, tx: mpsc::UnboundedSender<WorkerMessage>) -> Self {
        Self {
            account_id: account_id.into(),
            tx,
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Send an event. A closed channel is ignored.
    pub fn report(&self, event: StatusEvent) {
        let message = WorkerMessage::Status {
            account_id: self.account_id.clone(),
            event,
        };
        if self.tx.send(message).is_err() {
            debug!("[{}] Supervisor channel closed, dropping status event", self.account_id);
        }
    }
}

/// Runs one account's work until it ends.
///
/// The supervisor treats any return (Ok or Err) or panic as an exit and
/// schedules a restart.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    async fn run(&self, account_id: String, reporter: StatusReporter) -> Result<()>;
}
