//! Earn loop
//!
//! - tracker: session state machine plus refresh/notify counters
//! - outcome: balance extraction and response classification
//! - earn_loop: the per-account cycle driver
//! - worker: adapter the supervisor spawns

mod earn_loop;
mod outcome;
mod tracker;
mod worker;

pub use earn_loop::{DEFAULT_INTERVAL, EarnLoop, EarnLoopConfig};
pub use outcome::{
    BALANCE_KEYS, BalanceOutcome, EarnOutcome, balance_message, classify_balance, classify_earn, extract_balance,
    parse_balance,
};
pub use tracker::{NOTIFY_PERIOD, REFRESH_PERIOD, RefreshReason, SessionState, SessionTracker, cycles_for};
pub use worker::EarnWorker;
