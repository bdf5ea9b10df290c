//! Earn loop implementation - one account's refresh / balance / earn cycle.
//!
//! The EarnLoop owns the account's cookie jar and session state. Each cycle:
//! 1. Refreshes the session when it is not valid or the refresh period elapsed
//! 2. Fetches the balance and classifies the response
//! 3. Reports an Info event
//! 4. Posts the earn action and reports an Earn event
//! 5. Notifies the balance on the coarse schedule
//!
//! then sleeps for the configured interval. A failing cycle is reported as an
//! Error event and never ends the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use super::outcome::{classify_balance, classify_earn};
use super::tracker::{RefreshReason, SessionState, SessionTracker};
use crate::domain::{Account, StatusEvent, messages};
use crate::error::{FarmError, Result};
use crate::notify::Notifier;
use crate::session::{CookieJar, SessionClient};
use crate::storage::AccountStore;
use crate::supervisor::StatusReporter;

/// Default polling interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for an EarnLoop.
#[derive(Debug, Clone)]
pub struct EarnLoopConfig {
    /// Sleep between cycles
    pub interval: Duration,
}

impl Default for EarnLoopConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
        }
    }
}

impl EarnLoopConfig {
    pub fn with_interval(interval: Duration) -> Self {
        Self { interval }
    }
}

/// Per-account earn loop.
pub struct EarnLoop<C, S, N>
where
    C: SessionClient,
    S: AccountStore,
    N: Notifier,
{
    /// Account snapshot taken at start
    account: Account,
    /// Live cookie jar, owned exclusively by this loop
    cookies: CookieJar,
    /// Last login page body, for the meta-tag token fallback
    html: String,
    tracker: SessionTracker,
    client: Arc<C>,
    store: Arc<S>,
    notifier: Arc<N>,
    reporter: StatusReporter,
    config: EarnLoopConfig,
}

impl<C, S, N> EarnLoop<C, S, N>
where
    C: SessionClient,
    S: AccountStore,
    N: Notifier,
{
    /// Create a loop for an account snapshot.
    pub fn new(
        account: Account,
        client: Arc<C>,
        store: Arc<S>,
        notifier: Arc<N>,
        reporter: StatusReporter,
        config: EarnLoopConfig,
    ) -> Self {
        Self {
            cookies: account.cookies.clone(),
            html: String::new(),
            tracker: SessionTracker::new(config.interval),
            account,
            client,
            store,
            notifier,
            reporter,
            config,
        }
    }

    /// Load the account from the store and create its loop.
    ///
    /// A missing account is the only fatal condition.
    pub async fn load(
        account_id: &str,
        client: Arc<C>,
        store: Arc<S>,
        notifier: Arc<N>,
        reporter: StatusReporter,
        config: EarnLoopConfig,
    ) -> Result<Self> {
        let account = store
            .get_account(account_id)
            .await?
            .ok_or_else(|| FarmError::AccountNotFound(account_id.to_string()))?;
        Ok(Self::new(account, client, store, notifier, reporter, config))
    }

    pub fn account_id(&self) -> &str {
        &self.account.id
    }

    pub fn state(&self) -> SessionState {
        self.tracker.state()
    }

    pub fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    /// Run cycles forever.
    pub async fn run(mut self) {
        info!(
            "[{}] Earn loop started, interval={}s",
            self.account.id,
            self.config.interval.as_secs_f64()
        );
        loop {
            self.tick().await;
            tokio::time::sleep(self.config.interval).await;
        }
    }

    /// Run one cycle, reporting a failure as an Error event.
    pub async fn tick(&mut self) {
        let started_at = Utc::now();
        if let Err(e) = self.run_cycle(started_at).await {
            error!("[{}] Cycle failed: {}", self.account.id, e);
            self.reporter.report(StatusEvent::error(started_at, e.to_string()));
        }
    }

    /// Run one cycle, propagating the first failure.
    pub async fn run_cycle(&mut self, started_at: DateTime<Utc>) -> Result<()> {
        // 1. Refresh the session when needed
        if let Some(reason) = self.tracker.refresh_reason() {
            self.refresh(reason, started_at).await?;
        }
        self.tracker.advance_refresh_counter();

        // 2. Fetch and classify the balance
        let response = self.client.fetch_balance(&self.html, &self.cookies).await?;
        let balance = classify_balance(&response);
        self.tracker.set_state(balance.state);
        match balance.state {
            SessionState::Valid => info!("[{}] {}", self.account.id, balance.message),
            _ => warn!(
                "[{}] Balance fetch returned {} ({}), will refresh next cycle",
                self.account.id, response.status, balance.message
            ),
        }

        // 3. Report it
        self.reporter
            .report(StatusEvent::info(started_at, response.status, &balance.message));

        // The coarse counter moves even if the earn call fails below
        let notify_due = self.tracker.advance_notify_counter(balance.balance.is_some());

        // 4. Post the earn action
        let response = self.client.post_earn(&self.html, &self.cookies).await?;
        let earn = classify_earn(&response);
        if let Some(state) = earn.state {
            self.tracker.set_state(state);
        }
        match (response.status, earn.state) {
            (204, _) => info!("[{}] Earn ok ({})", self.account.id, response.status),
            (_, Some(SessionState::Expired)) => warn!("[{}] Earn: {}", self.account.id, earn.message),
            _ => error!("[{}] Earn: {}", self.account.id, earn.message),
        }
        self.reporter
            .report(StatusEvent::earn(started_at, response.status, &earn.message));

        // 5. Notify on the coarse schedule
        if let (true, Some(value)) = (notify_due, balance.balance) {
            debug!("[{}] Notification threshold reached", self.account.id);
            self.notifier
                .notify(value, started_at, &self.account.id, self.account.webhook_url());
        }

        Ok(())
    }

    async fn refresh(&mut self, reason: RefreshReason, started_at: DateTime<Utc>) -> Result<()> {
        info!("[{}] Refreshing session ({})", self.account.id, reason);

        let refreshed = self.client.refresh(&self.cookies).await?;
        self.cookies = refreshed.cookies;
        self.html = refreshed.html;

        if let Err(e) = self.store.persist_cookies(&self.account.id, &self.cookies).await {
            warn!("[{}] Failed to persist refreshed cookies: {}", self.account.id, e);
        }

        self.tracker.mark_refreshed();
        info!(
            "[{}] Session refreshed ({} cookies, login page {})",
            self.account.id,
            self.cookies.len(),
            refreshed.status
        );
        self.reporter.report(StatusEvent::info(
            started_at,
            refreshed.status,
            messages::SESSION_REFRESHED,
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::WorkerMessage;
    use crate::session::{PanelResponse, RefreshedSession};
    use crate::storage::MemoryAccountStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Scripted panel: pops one queued reply per call, records call order.
    #[derive(Default)]
    struct ScriptedClient {
        refreshes: Mutex<VecDeque<Result<RefreshedSession>>>,
        balances: Mutex<VecDeque<Result<PanelResponse>>>,
        earns: Mutex<VecDeque<Result<PanelResponse>>>,
        calls: Mutex<Vec<&'static str>>,
        seen_jars: Mutex<Vec<CookieJar>>,
    }

    impl ScriptedClient {
        fn refresh_ok(self, status: u16, set_cookie: &str) -> Self {
            let directive = set_cookie.to_string();
            self.refreshes.lock().unwrap().push_back(Ok(RefreshedSession {
                status,
                html: String::new(),
                cookies: CookieJar::parse(&directive),
            }));
            self
        }

        fn refresh_err(self) -> Self {
            self.refreshes
                .lock()
                .unwrap()
                .push_back(Err(FarmError::Storage("login page timed out".into())));
            self
        }

        fn balance(self, status: u16, body: &str) -> Self {
            self.balances
                .lock()
                .unwrap()
                .push_back(Ok(PanelResponse::new(status, body)));
            self
        }

        fn earn(self, status: u16) -> Self {
            self.earns.lock().unwrap().push_back(Ok(PanelResponse::new(status, "")));
            self
        }

        fn earn_err(self) -> Self {
            self.earns
                .lock()
                .unwrap()
                .push_back(Err(FarmError::Storage("connection reset".into())));
            self
        }

        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SessionClient for ScriptedClient {
        async fn refresh(&self, jar: &CookieJar) -> Result<RefreshedSession> {
            self.calls.lock().unwrap().push("refresh");
            let next = self
                .refreshes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(RefreshedSession {
                    status: 200,
                    html: String::new(),
                    cookies: CookieJar::new(),
                }))?;
            let mut merged = jar.clone();
            merged.merge(&next.cookies);
            Ok(RefreshedSession {
                cookies: merged,
                ..next
            })
        }

        async fn fetch_balance(&self, _html: &str, jar: &CookieJar) -> Result<PanelResponse> {
            self.calls.lock().unwrap().push("balance");
            self.seen_jars.lock().unwrap().push(jar.clone());
            self.balances
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(PanelResponse::new(200, r#"{"balance": 1}"#)))
        }

        async fn post_earn(&self, _html: &str, _jar: &CookieJar) -> Result<PanelResponse> {
            self.calls.lock().unwrap().push("earn");
            self.earns
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(PanelResponse::new(204, "")))
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(f64, String, Option<String>)>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, balance: f64, _ts: DateTime<Utc>, account_id: &str, webhook: Option<&str>) {
            self.sent
                .lock()
                .unwrap()
                .push((balance, account_id.to_string(), webhook.map(str::to_string)));
        }
    }

    struct Harness {
        earn_loop: EarnLoop<ScriptedClient, MemoryAccountStore, RecordingNotifier>,
        client: Arc<ScriptedClient>,
        store: Arc<MemoryAccountStore>,
        notifier: Arc<RecordingNotifier>,
        rx: mpsc::UnboundedReceiver<WorkerMessage>,
    }

    fn harness(client: ScriptedClient) -> Harness {
        let account = Account::new("acc1", CookieJar::parse("session=old"))
            .with_webhook("https://discord.com/api/webhooks/1/tok");
        let store = Arc::new(MemoryAccountStore::with_accounts([account.clone()]));
        let client = Arc::new(client);
        let notifier = Arc::new(RecordingNotifier::default());
        let (tx, rx) = mpsc::unbounded_channel();
        let earn_loop = EarnLoop::new(
            account,
            client.clone(),
            store.clone(),
            notifier.clone(),
            StatusReporter::new("acc1", tx),
            EarnLoopConfig::default(),
        );
        Harness {
            earn_loop,
            client,
            store,
            notifier,
            rx,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<WorkerMessage>) -> Vec<StatusEvent> {
        let mut events = Vec::new();
        while let Ok(WorkerMessage::Status { event, .. }) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_first_cycle_refreshes_then_earns() {
        let mut h = harness(
            ScriptedClient::default()
                .refresh_ok(200, "XSRF-TOKEN=abc")
                .balance(200, r#"{"data": {"balance": 500}}"#)
                .earn(204),
        );

        h.earn_loop.tick().await;

        assert_eq!(h.client.calls(), vec!["refresh", "balance", "earn"]);
        assert_eq!(h.earn_loop.state(), SessionState::Valid);

        let events = drain(&mut h.rx);
        let messages: Vec<&str> = events.iter().map(StatusEvent::message).collect();
        assert_eq!(messages, vec!["session refreshed", "balance=500", "ok"]);
        assert!(matches!(events[1], StatusEvent::Info { status: 200, .. }));
        assert!(matches!(events[2], StatusEvent::Earn { status: 204, .. }));
    }

    #[tokio::test]
    async fn test_refresh_persists_merged_cookies() {
        let mut h = harness(ScriptedClient::default().refresh_ok(200, "XSRF-TOKEN=abc; session=new"));

        h.earn_loop.tick().await;

        let stored = h.store.get_account("acc1").await.unwrap().unwrap();
        assert_eq!(stored.cookies.get("session"), Some("new"));
        assert_eq!(stored.cookies.get("XSRF-TOKEN"), Some("abc"));
        assert_eq!(h.earn_loop.cookies(), &stored.cookies);

        let jars = h.client.seen_jars.lock().unwrap().clone();
        assert_eq!(jars[0].get("session"), Some("new"));
    }

    #[tokio::test]
    async fn test_second_cycle_skips_refresh() {
        let mut h = harness(ScriptedClient::default());

        h.earn_loop.tick().await;
        h.earn_loop.tick().await;

        assert_eq!(
            h.client.calls(),
            vec!["refresh", "balance", "earn", "balance", "earn"]
        );
        assert_eq!(h.earn_loop.tracker().cycles_since_refresh(), 2);
    }

    #[tokio::test]
    async fn test_auth_failure_forces_refresh_next_cycle() {
        let mut h = harness(
            ScriptedClient::default()
                .balance(200, "{}")
                .earn(204)
                .balance(401, "")
                .earn(403),
        );

        h.earn_loop.tick().await;
        h.earn_loop.tick().await;
        assert_eq!(h.earn_loop.state(), SessionState::Expired);
        assert_eq!(h.earn_loop.tracker().refresh_reason(), Some(RefreshReason::Expired));

        h.earn_loop.tick().await;
        let refreshes = h.client.calls().iter().filter(|c| **c == "refresh").count();
        assert_eq!(refreshes, 2);
    }

    #[tokio::test]
    async fn test_other_balance_status_expires_session() {
        let mut h = harness(ScriptedClient::default().balance(502, "bad gateway").earn(500));

        h.earn_loop.tick().await;

        assert_eq!(h.earn_loop.state(), SessionState::Expired);
        let events = drain(&mut h.rx);
        assert_eq!(events[1].message(), "http 502");
        assert_eq!(events[2].message(), "http 500");
    }

    #[tokio::test]
    async fn test_earn_auth_failure_expires_session() {
        let mut h = harness(ScriptedClient::default().earn(403));

        h.earn_loop.tick().await;

        assert_eq!(h.earn_loop.state(), SessionState::Expired);
        let events = drain(&mut h.rx);
        assert_eq!(events.last().unwrap().message(), "session expired");
        assert_eq!(events.last().unwrap().status(), Some(403));
    }

    #[tokio::test]
    async fn test_failure_reports_error_and_loop_continues() {
        let mut h = harness(ScriptedClient::default().refresh_err());

        h.earn_loop.tick().await;
        let events = drain(&mut h.rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], StatusEvent::Error { message, .. } if message.contains("timed out")));
        assert_eq!(h.earn_loop.state(), SessionState::NeedsRefresh);

        h.earn_loop.tick().await;
        assert_eq!(
            h.client.calls(),
            vec!["refresh", "refresh", "balance", "earn"]
        );
        assert_eq!(h.earn_loop.state(), SessionState::Valid);
    }

    #[tokio::test]
    async fn test_persist_failure_is_not_fatal() {
        let account = Account::new("ghost", CookieJar::new());
        let client = Arc::new(ScriptedClient::default());
        let store = Arc::new(MemoryAccountStore::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut earn_loop = EarnLoop::new(
            account,
            client.clone(),
            store,
            Arc::new(RecordingNotifier::default()),
            StatusReporter::new("ghost", tx),
            EarnLoopConfig::default(),
        );

        earn_loop.tick().await;

        assert_eq!(client.calls(), vec!["refresh", "balance", "earn"]);
        assert!(drain(&mut rx).iter().all(|e| !matches!(e, StatusEvent::Error { .. })));
    }

    #[tokio::test]
    async fn test_notifies_once_after_thirty_cycles() {
        let mut client = ScriptedClient::default();
        for n in 1..=30 {
            client = client.balance(200, &format!(r#"{{"balance": {}}}"#, n * 10));
        }
        let mut h = harness(client);

        for _ in 0..29 {
            h.earn_loop.tick().await;
        }
        assert!(h.notifier.sent.lock().unwrap().is_empty());

        h.earn_loop.tick().await;
        let sent = h.notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 300.0);
        assert_eq!(sent[0].1, "acc1");
        assert_eq!(sent[0].2.as_deref(), Some("https://discord.com/api/webhooks/1/tok"));
        assert_eq!(h.earn_loop.tracker().cycles_since_notify(), 0);
    }

    #[tokio::test]
    async fn test_failed_earn_still_advances_notify_counter() {
        let mut h = harness(
            ScriptedClient::default()
                .balance(200, r#"{"balance": 50}"#)
                .earn_err(),
        );

        h.earn_loop.tick().await;

        let events = drain(&mut h.rx);
        assert!(matches!(events.last(), Some(StatusEvent::Error { message, .. }) if message.contains("connection reset")));
        assert_eq!(h.earn_loop.tracker().cycles_since_notify(), 1);
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_preventive_refresh_after_threshold() {
        let mut h = harness(ScriptedClient::default());

        for _ in 0..26 {
            h.earn_loop.tick().await;
        }

        let refreshes = h.client.calls().iter().filter(|c| **c == "refresh").count();
        assert_eq!(refreshes, 2);
        assert_eq!(h.earn_loop.tracker().cycles_since_refresh(), 1);
    }

    #[tokio::test]
    async fn test_load_missing_account_is_fatal() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let result = EarnLoop::load(
            "missing",
            Arc::new(ScriptedClient::default()),
            Arc::new(MemoryAccountStore::new()),
            Arc::new(RecordingNotifier::default()),
            StatusReporter::new("missing", tx),
            EarnLoopConfig::default(),
        )
        .await;

        assert!(matches!(result, Err(FarmError::AccountNotFound(id)) if id == "missing"));
    }
}
