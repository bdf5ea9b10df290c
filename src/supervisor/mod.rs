//! Supervisor
//!
//! - Supervisor: spawns one worker per account and restarts it on exit
//! - AccountRuntimeState: what the supervisor knows about each account
//! - Worker / StatusReporter: the seam workers are run through
//! - StoreSync: follows account store edits while running

mod manager;
mod state;
mod sync;
mod worker;

pub use manager::{DEFAULT_RESTART_DELAY, Supervisor, SupervisorConfig};
pub use state::{AccountRuntimeState, AccountSnapshot, SessionStatus, SupervisorSummary, parse_balance_message};
pub use sync::{StoreSync, SyncReport};
pub use worker::{StatusReporter, Worker};
