//! creditfarm - supervised per-account credit earn loops
//!
//! Each stored account gets an earn loop that keeps its panel session fresh,
//! reads the balance, claims credits on a fixed interval and reports status
//! to a supervisor that restarts it whenever it exits.

pub mod config;
pub mod domain;
pub mod earn;
pub mod error;
pub mod notify;
pub mod session;
pub mod storage;
pub mod supervisor;

pub use error::{FarmError, Result};
