//! Domain types for creditfarm
//!
//! - Account: a stored identity with session cookies
//! - StatusEvent: Info / Earn / Error reports from an earn loop
//! - WorkerMessage: everything the supervisor receives from its workers

pub mod account;
pub mod event;

pub use account::{Account, AccountUpdate};
pub use event::{ExitReason, StatusEvent, WorkerMessage, messages};
