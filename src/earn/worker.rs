//! Supervisor-facing entry point for earn loops.

use std::sync::Arc;

use async_trait::async_trait;

use super::earn_loop::{EarnLoop, EarnLoopConfig};
use crate::error::Result;
use crate::notify::Notifier;
use crate::session::SessionClient;
use crate::storage::AccountStore;
use crate::supervisor::{StatusReporter, Worker};

/// Spawns an [`EarnLoop`] per account with shared dependencies.
pub struct EarnWorker<C, S, N>
where
    C: SessionClient,
    S: AccountStore,
    N: Notifier,
{
    client: Arc<C>,
    store: Arc<S>,
    notifier: Arc<N>,
    config: EarnLoopConfig,
}

impl<C, S, N> EarnWorker<C, S, N>
where
    C: SessionClient,
    S: AccountStore,
    N: Notifier,
{
    pub fn new(client: Arc<C>, store: Arc<S>, notifier: Arc<N>, config: EarnLoopConfig) -> Self {
        Self {
            client,
            store,
            notifier,
            config,
        }
    }
}

#[async_trait]
impl<C, S, N> Worker for EarnWorker<C, S, N>
where
    C: SessionClient + 'static,
    S: AccountStore + 'static,
    N: Notifier + 'static,
{
    /// Load the account and run its loop. Returns only if the account is missing.
    async fn run(&self, account_id: String, reporter: StatusReporter) -> Result<()> {
        let earn_loop = EarnLoop::load(
            &account_id,
            self.client.clone(),
            self.store.clone(),
            self.notifier.clone(),
            reporter,
            self.config.clone(),
        )
        .await?;
        earn_loop.run().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Account, WorkerMessage};
    use crate::error::FarmError;
    use crate::notify::{NotifierConfig, WebhookNotifier};
    use crate::session::{CookieJar, PanelClient, PanelConfig};
    use crate::storage::MemoryAccountStore;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn worker(store: MemoryAccountStore) -> EarnWorker<PanelClient, MemoryAccountStore, WebhookNotifier> {
        EarnWorker::new(
            Arc::new(PanelClient::new(PanelConfig::with_base_url("http://127.0.0.1:9")).unwrap()),
            Arc::new(store),
            Arc::new(WebhookNotifier::new(NotifierConfig::default()).unwrap()),
            EarnLoopConfig::with_interval(Duration::from_secs(3600)),
        )
    }

    #[tokio::test]
    async fn test_missing_account_returns_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = worker(MemoryAccountStore::new())
            .run("nope".to_string(), StatusReporter::new("nope", tx))
            .await;

        assert!(matches!(result, Err(FarmError::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn test_known_account_reports_cycle_error() {
        let store = MemoryAccountStore::with_accounts([Account::new("acc1", CookieJar::parse("a=1"))]);
        let worker = Arc::new(worker(store));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn({
            let worker = worker.clone();
            async move { worker.run("acc1".to_string(), StatusReporter::new("acc1", tx)).await }
        });

        let message = tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .unwrap()
            .unwrap();
        handle.abort();

        match message {
            WorkerMessage::Status { account_id, event } => {
                assert_eq!(account_id, "acc1");
                assert_eq!(event.status(), None);
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
