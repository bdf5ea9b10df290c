//! Session state machine and cycle counters.

use std::fmt;
use std::time::Duration;

/// How often a valid session is refreshed anyway
pub const REFRESH_PERIOD: Duration = Duration::from_secs(25 * 60);

/// How often a balance notification is sent
pub const NOTIFY_PERIOD: Duration = Duration::from_secs(30 * 60);

/// The earn loop's belief about its cookie jar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NeedsRefresh,
    Valid,
    Expired,
}

/// Why a refresh happens this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshReason {
    /// First cycle of the loop
    Initial,
    /// Last classification marked the session as not valid
    Expired,
    /// Refresh period elapsed on a valid session
    Preventive,
}

impl fmt::Display for RefreshReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initial => write!(f, "initial setup"),
            Self::Expired => write!(f, "session expired"),
            Self::Preventive => write!(f, "preventive refresh"),
        }
    }
}

/// Number of cycles spanning `period`, rounded up, at least one.
pub fn cycles_for(period: Duration, interval: Duration) -> u32 {
    let interval_ms = interval.as_millis().max(1);
    let cycles = period.as_millis().div_ceil(interval_ms);
    cycles.clamp(1, u32::MAX as u128) as u32
}

/// Tracks session state plus the refresh and notification counters.
///
/// Both counters advance once per cycle. The refresh counter resets on every
/// refresh no matter what triggered it.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    state: SessionState,
    refresh_threshold: u32,
    notify_threshold: u32,
    cycles_since_refresh: u32,
    cycles_since_notify: u32,
}

impl SessionTracker {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: SessionState::NeedsRefresh,
            refresh_threshold: cycles_for(REFRESH_PERIOD, interval),
            notify_threshold: cycles_for(NOTIFY_PERIOD, interval),
            cycles_since_refresh: 0,
            cycles_since_notify: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    pub fn refresh_threshold(&self) -> u32 {
        self.refresh_threshold
    }

    pub fn notify_threshold(&self) -> u32 {
        self.notify_threshold
    }

    pub fn cycles_since_refresh(&self) -> u32 {
        self.cycles_since_refresh
    }

    pub fn cycles_since_notify(&self) -> u32 {
        self.cycles_since_notify
    }

    /// Decide whether this cycle must refresh, and why.
    pub fn refresh_reason(&self) -> Option<RefreshReason> {
        match self.state {
            SessionState::NeedsRefresh => Some(RefreshReason::Initial),
            SessionState::Expired => Some(RefreshReason::Expired),
            SessionState::Valid if self.cycles_since_refresh >= self.refresh_threshold => {
                Some(RefreshReason::Preventive)
            }
            SessionState::Valid => None,
        }
    }

    /// Record a completed refresh.
    pub fn mark_refreshed(&mut self) {
        self.cycles_since_refresh = 0;
        self.state = SessionState::Valid;
    }

    /// Advance the refresh counter. Called once per cycle after the refresh step.
    pub fn advance_refresh_counter(&mut self) {
        self.cycles_since_refresh = self.cycles_since_refresh.saturating_add(1);
    }

    /// Advance the notification counter and report whether to notify now.
    ///
    /// Fires only when a balance is known; firing resets the counter.
    pub fn advance_notify_counter(&mut self, has_balance: bool) -> bool {
        self.cycles_since_notify = self.cycles_since_notify.saturating_add(1);
        if has_balance && self.cycles_since_notify >= self.notify_threshold {
            self.cycles_since_notify = 0;
            return true;
        }
        false
    }
}
