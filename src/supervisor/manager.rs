//! Supervisor implementation
//!
//! The Supervisor spawns one worker task per account, folds their status
//! events into per-account runtime state, and respawns any worker that exits
//! after a fixed delay. There is no backoff and no retry ceiling.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;

use super::state::{AccountRuntimeState, AccountSnapshot, SupervisorSummary, WorkerHandle};
use super::worker::{StatusReporter, Worker};
use crate::domain::{ExitReason, WorkerMessage};
use crate::error::{FarmError, Result};

/// Default delay before a worker is respawned
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(2);

/// Configuration for the Supervisor
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Delay between a worker exit and its replacement
    pub restart_delay: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            restart_delay: DEFAULT_RESTART_DELAY,
        }
    }
}

struct Inner<W: Worker> {
    worker: Arc<W>,
    config: SupervisorConfig,
    states: RwLock<HashMap<String, AccountRuntimeState>>,
    total_restarts: AtomicU64,
    next_generation: AtomicU64,
    shutting_down: AtomicBool,
    started_at: DateTime<Utc>,
    started: Instant,
    event_tx: mpsc::UnboundedSender<WorkerMessage>,
    event_rx: Mutex<Option<mpsc::UnboundedReceiver<WorkerMessage>>>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

/// Spawns, monitors and restarts per-account workers.
///
/// Cheap to clone; clones share the same state.
pub struct Supervisor<W: Worker> {
    inner: Arc<Inner<W>>,
}

impl<W: Worker> Clone for Supervisor<W> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<W: Worker> Supervisor<W> {
    /// Create a supervisor. Nothing runs until [`Supervisor::start`].
    pub fn new(worker: Arc<W>, config: SupervisorConfig) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                worker,
                config,
                states: RwLock::new(HashMap::new()),
                total_restarts: AtomicU64::new(0),
                next_generation: AtomicU64::new(1),
                shutting_down: AtomicBool::new(false),
                started_at: Utc::now(),
                started: Instant::now(),
                event_tx,
                event_rx: Mutex::new(Some(event_rx)),
                pump: Mutex::new(None),
            }),
        }
    }

    /// Start the event pump and one worker per account.
    pub async fn start<I, S>(&self, account_ids: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.start_pump()?;
        for account_id in account_ids {
            self.add(account_id).await;
        }
        Ok(())
    }

    fn start_pump(&self) -> Result<()> {
        let rx = self
            .inner
            .event_rx
            .lock()
            .map_err(|e| FarmError::Storage(e.to_string()))?
            .take();
        let Some(mut rx) = rx else {
            return Ok(());
        };

        let supervisor = self.clone();
        let handle = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                supervisor.handle_message(message).await;
            }
        });
        *self
            .inner
            .pump
            .lock()
            .map_err(|e| FarmError::Storage(e.to_string()))? = Some(handle);
        Ok(())
    }

    /// Register an account and spawn its worker.
    pub async fn add(&self, account_id: impl Into<String>) {
        let account_id = account_id.into();
        self.inner
            .states
            .write()
            .await
            .entry(account_id.clone())
            .or_default();
        self.spawn(&account_id).await;
    }

    /// Terminate an account's worker. The restart policy respawns it.
    pub async fn stop(&self, account_id: &str) -> Result<()> {
        let states = self.inner.states.read().await;
        let state = states
            .get(account_id)
            .ok_or_else(|| FarmError::AccountNotFound(account_id.to_string()))?;
        if let Some(worker) = &state.worker {
            info!("[{}] Stopping worker", account_id);
            worker.abort.abort();
        }
        Ok(())
    }

    /// Terminate an account's worker and forget the account.
    pub async fn remove(&self, account_id: &str) -> Result<()> {
        let state = self
            .inner
            .states
            .write()
            .await
            .remove(account_id)
            .ok_or_else(|| FarmError::AccountNotFound(account_id.to_string()))?;
        if let Some(worker) = state.worker {
            worker.abort.abort();
        }
        info!("[{}] Removed from supervisor", account_id);
        Ok(())
    }

    /// Abort every worker and the event pump. Nothing is restarted.
    pub async fn shutdown(&self) {
        self.inner.shutting_down.store(true, Ordering::SeqCst);

        let states = self.inner.states.read().await;
        for (account_id, state) in states.iter() {
            if let Some(worker) = &state.worker {
                debug!("[{}] Aborting worker", account_id);
                worker.abort.abort();
            }
        }
        drop(states);

        if let Some(handle) = self.inner.pump.lock().ok().and_then(|mut pump| pump.take()) {
            handle.abort();
        }
        info!("Supervisor shut down");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::SeqCst)
    }

    /// Status snapshot for one account
    pub async fn snapshot(&self, account_id: &str) -> Option<AccountSnapshot> {
        let states = self.inner.states.read().await;
        states.get(account_id).map(|state| state.snapshot(account_id))
    }

    /// Status snapshots for every account, ordered by ID
    pub async fn snapshots(&self) -> Vec<AccountSnapshot> {
        let states = self.inner.states.read().await;
        let mut snapshots: Vec<_> = states.iter().map(|(id, state)| state.snapshot(id)).collect();
        snapshots.sort_by(|a, b| a.id.cmp(&b.id));
        snapshots
    }

    /// Aggregate status across accounts
    pub async fn summary(&self) -> SupervisorSummary {
        let states = self.inner.states.read().await;
        SupervisorSummary {
            uptime: self.inner.started.elapsed().as_secs(),
            started_at: self.inner.started_at,
            total_accounts: states.len(),
            total_balance: states.values().filter_map(|s| s.balance).sum(),
            total_restarts: self.inner.total_restarts.load(Ordering::SeqCst),
            active_workers: states.values().filter(|s| s.is_active()).count(),
        }
    }

    /// Spawn a worker unless the account is gone or already has a live one.
    async fn spawn(&self, account_id: &str) {
        if self.is_shutting_down() {
            return;
        }

        let mut states = self.inner.states.write().await;
        let Some(state) = states.get_mut(account_id) else {
            debug!("[{}] Not spawning, account was removed", account_id);
            return;
        };
        if state.is_active() {
            debug!("[{}] Not spawning, worker already running", account_id);
            return;
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let reporter = StatusReporter::new(account_id, self.inner.event_tx.clone());
        let worker = self.inner.worker.clone();
        let id = account_id.to_string();
        let handle = tokio::spawn(async move { worker.run(id, reporter).await });

        state.worker = Some(WorkerHandle {
            generation,
            abort: handle.abort_handle(),
        });
        info!("[{}] Worker spawned (generation {})", account_id, generation);

        let tx = self.inner.event_tx.clone();
        let id = account_id.to_string();
        tokio::spawn(async move {
            let reason = match handle.await {
                Ok(Ok(())) => ExitReason::Completed,
                Ok(Err(e)) => ExitReason::Failed(e.to_string()),
                Err(e) if e.is_panic() => ExitReason::Panicked(panic_message(e.into_panic())),
                Err(_) => ExitReason::Aborted,
            };
            let _ = tx.send(WorkerMessage::Exited {
                account_id: id,
                generation,
                reason,
            });
        });
    }

    async fn handle_message(&self, message: WorkerMessage) {
        match message {
            WorkerMessage::Status { account_id, event } => {
                let mut states = self.inner.states.write().await;
                match states.get_mut(&account_id) {
                    Some(state) => state.apply(event),
                    None => debug!("[{}] Dropping status event for unknown account", account_id),
                }
            }
            WorkerMessage::Exited {
                account_id,
                generation,
                reason,
            } => self.on_exit(account_id, generation, reason).await,
        }
    }

    async fn on_exit(&self, account_id: String, generation: u64, reason: ExitReason) {
        {
            let mut states = self.inner.states.write().await;
            if self.is_shutting_down() {
                debug!("[{}] Worker exited during shutdown ({})", account_id, reason);
                return;
            }
            let Some(state) = states.get_mut(&account_id) else {
                info!("[{}] Worker exited ({}), account removed", account_id, reason);
                return;
            };
            if !state.worker.as_ref().is_some_and(|w| w.generation == generation) {
                debug!(
                    "[{}] Ignoring exit of stale worker generation {} ({})",
                    account_id, generation, reason
                );
                return;
            }
            state.worker = None;
            state.restarts += 1;
        }
        let total = self.inner.total_restarts.fetch_add(1, Ordering::SeqCst) + 1;

        match &reason {
            ExitReason::Failed(_) | ExitReason::Panicked(_) => error!(
                "[{}] Worker exited ({}), restarting in {:?} (total restarts {})",
                account_id, reason, self.inner.config.restart_delay, total
            ),
            _ => warn!(
                "[{}] Worker exited ({}), restarting in {:?} (total restarts {})",
                account_id, reason, self.inner.config.restart_delay, total
            ),
        }

        let supervisor = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(supervisor.inner.config.restart_delay).await;
            supervisor.spawn(&account_id).await;
        });
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StatusEvent;
    use crate::supervisor::SessionStatus;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// How a scripted worker behaves on each run
    #[derive(Clone, Copy)]
    enum Script {
        /// Report a balance and earn, then run until aborted
        ReportAndPark,
        /// Return an error immediately
        Fail,
        /// Panic immediately
        Panic,
    }

    struct ScriptedWorker {
        script: Script,
        runs: AtomicUsize,
    }

    impl ScriptedWorker {
        fn new(script: Script) -> Arc<Self> {
            Arc::new(Self {
                script,
                runs: AtomicUsize::new(0),
            })
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Worker for ScriptedWorker {
        async fn run(&self, account_id: String, reporter: StatusReporter) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            match self.script {
                Script::ReportAndPark => {
                    reporter.report(StatusEvent::info(Utc::now(), 200, "balance=500"));
                    reporter.report(StatusEvent::earn(Utc::now(), 204, "ok"));
                    std::future::pending::<()>().await;
                    Ok(())
                }
                Script::Fail => Err(FarmError::AccountNotFound(account_id)),
                Script::Panic => panic!("worker blew up"),
            }
        }
    }

    fn supervisor(worker: Arc<ScriptedWorker>, delay_ms: u64) -> Supervisor<ScriptedWorker> {
        Supervisor::new(
            worker,
            SupervisorConfig {
                restart_delay: Duration::from_millis(delay_ms),
            },
        )
    }

    async fn sleep_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[test]
    fn test_default_config() {
        assert_eq!(SupervisorConfig::default().restart_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("boom".to_string())), "boom");
        assert_eq!(panic_message(Box::new(42)), "unknown panic");
    }

    #[tokio::test]
    async fn test_status_events_update_snapshot() {
        let worker = ScriptedWorker::new(Script::ReportAndPark);
        let sup = supervisor(worker.clone(), 100);
        sup.start(["acc1"]).await.unwrap();
        sleep_ms(100).await;

        let snapshot = sup.snapshot("acc1").await.unwrap();
        assert_eq!(snapshot.balance, Some(500.0));
        assert_eq!(snapshot.session_status, SessionStatus::Valid);
        assert!(snapshot.active);
        assert_eq!(snapshot.restarts, 0);
        assert_eq!(snapshot.last_earn.as_ref().and_then(StatusEvent::status), Some(204));

        let summary = sup.summary().await;
        assert_eq!(summary.total_accounts, 1);
        assert_eq!(summary.active_workers, 1);
        assert_eq!(summary.total_balance, 500.0);

        sup.shutdown().await;
    }

    #[tokio::test]
    async fn test_exit_restarts_after_delay() {
        let worker = ScriptedWorker::new(Script::Fail);
        let sup = supervisor(worker.clone(), 300);
        sup.start(["acc1"]).await.unwrap();

        sleep_ms(100).await;
        assert_eq!(worker.runs(), 1);
        let snapshot = sup.snapshot("acc1").await.unwrap();
        assert_eq!(snapshot.restarts, 1);
        assert!(!snapshot.active);
        assert_eq!(sup.summary().await.total_restarts, 1);

        sleep_ms(350).await;
        assert_eq!(worker.runs(), 2);
        assert_eq!(sup.snapshot("acc1").await.unwrap().restarts, 2);
        assert_eq!(sup.summary().await.total_restarts, 2);

        sup.shutdown().await;
    }

    #[tokio::test]
    async fn test_panicking_worker_is_restarted() {
        let worker = ScriptedWorker::new(Script::Panic);
        let sup = supervisor(worker.clone(), 50);
        sup.start(["acc1"]).await.unwrap();

        sleep_ms(200).await;
        assert!(worker.runs() >= 2);
        assert!(sup.snapshot("acc1").await.unwrap().restarts >= 1);

        sup.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_respawns() {
        let worker = ScriptedWorker::new(Script::ReportAndPark);
        let sup = supervisor(worker.clone(), 100);
        sup.start(["acc1"]).await.unwrap();
        sleep_ms(50).await;

        sup.stop("acc1").await.unwrap();
        sleep_ms(50).await;
        let snapshot = sup.snapshot("acc1").await.unwrap();
        assert!(!snapshot.active);
        assert_eq!(snapshot.restarts, 1);

        sleep_ms(150).await;
        assert_eq!(worker.runs(), 2);
        assert!(sup.snapshot("acc1").await.unwrap().active);

        sup.shutdown().await;
    }

    #[tokio::test]
    async fn test_remove_skips_pending_restart() {
        let worker = ScriptedWorker::new(Script::Fail);
        let sup = supervisor(worker.clone(), 200);
        sup.start(["acc1"]).await.unwrap();
        sleep_ms(50).await;

        sup.remove("acc1").await.unwrap();
        sleep_ms(350).await;

        assert_eq!(worker.runs(), 1);
        assert!(sup.snapshot("acc1").await.is_none());
        assert_eq!(sup.summary().await.total_accounts, 0);
        assert!(matches!(
            sup.remove("acc1").await,
            Err(FarmError::AccountNotFound(_))
        ));

        sup.shutdown().await;
    }

    #[tokio::test]
    async fn test_stale_exit_is_not_counted() {
        let worker = ScriptedWorker::new(Script::ReportAndPark);
        let sup = supervisor(worker.clone(), 50);
        sup.start(["acc1"]).await.unwrap();
        sleep_ms(20).await;

        // Generations start at 1, so 0 never belongs to the live worker
        sup.handle_message(WorkerMessage::Exited {
            account_id: "acc1".to_string(),
            generation: 0,
            reason: ExitReason::Aborted,
        })
        .await;
        sleep_ms(100).await;

        let snapshot = sup.snapshot("acc1").await.unwrap();
        assert!(snapshot.active);
        assert_eq!(snapshot.restarts, 0);
        assert_eq!(sup.summary().await.total_restarts, 0);
        assert_eq!(worker.runs(), 1);

        sup.shutdown().await;
    }

    #[tokio::test]
    async fn test_readd_after_remove_starts_clean() {
        let worker = ScriptedWorker::new(Script::ReportAndPark);
        let sup = supervisor(worker.clone(), 50);
        sup.start(["acc1"]).await.unwrap();
        sleep_ms(20).await;

        sup.remove("acc1").await.unwrap();
        sup.add("acc1").await;
        sleep_ms(150).await;

        let snapshot = sup.snapshot("acc1").await.unwrap();
        assert!(snapshot.active);
        assert_eq!(snapshot.restarts, 0);
        assert_eq!(sup.summary().await.total_restarts, 0);
        assert_eq!(worker.runs(), 2);

        sup.shutdown().await;
    }

    #[tokio::test]
    async fn test_add_skips_live_worker() {
        let worker = ScriptedWorker::new(Script::ReportAndPark);
        let sup = supervisor(worker.clone(), 100);
        sup.start(["acc1"]).await.unwrap();
        sleep_ms(20).await;

        sup.add("acc1").await;
        sleep_ms(20).await;

        assert_eq!(worker.runs(), 1);
        sup.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_stops_restarts() {
        let worker = ScriptedWorker::new(Script::ReportAndPark);
        let sup = supervisor(worker.clone(), 50);
        sup.start(["acc1", "acc2"]).await.unwrap();
        sleep_ms(50).await;
        assert_eq!(worker.runs(), 2);

        sup.shutdown().await;
        sleep_ms(200).await;

        assert_eq!(worker.runs(), 2);
        assert_eq!(sup.summary().await.active_workers, 0);
        assert_eq!(sup.summary().await.total_restarts, 0);
    }

    #[tokio::test]
    async fn test_stop_unknown_account() {
        let sup = supervisor(ScriptedWorker::new(Script::Fail), 100);
        assert!(matches!(sup.stop("nope").await, Err(FarmError::AccountNotFound(_))));
    }

    #[tokio::test]
    async fn test_snapshots_sorted() {
        let sup = supervisor(ScriptedWorker::new(Script::ReportAndPark), 100);
        sup.start(["b", "a", "c"]).await.unwrap();

        let ids: Vec<String> = sup.snapshots().await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        sup.shutdown().await;
    }
}
