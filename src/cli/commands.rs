//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - run: supervise an earn loop for every stored account
//! - accounts: list, add, update or remove stored accounts

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// creditfarm - supervised credit earn loops for stored panel sessions
#[derive(Parser, Debug)]
#[command(name = "creditfarm")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute, defaults to `run`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the supervisor until Ctrl-C
    Run,

    /// Manage stored accounts
    Accounts {
        #[command(subcommand)]
        command: AccountCommands,
    },
}

/// Account management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum AccountCommands {
    /// List stored accounts
    List,

    /// Add an account from a browser cookie header
    Add {
        /// Unique account ID
        #[arg(short, long)]
        id: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,

        /// Cookie header, e.g. "session=abc; XSRF-TOKEN=def"
        #[arg(long)]
        cookies: String,

        /// Per-account notification webhook
        #[arg(short, long)]
        webhook: Option<String>,

        /// Mark the account as admin
        #[arg(short, long)]
        admin: bool,
    },

    /// Replace an account's cookies, e.g. after logging in again
    Update {
        /// Account ID to update
        #[arg(short, long)]
        id: String,

        /// New cookie header, replaces the stored jar
        #[arg(long)]
        cookies: String,

        /// New display name
        #[arg(short, long)]
        name: Option<String>,

        /// New notification webhook, empty to clear
        #[arg(short, long)]
        webhook: Option<String>,
    },

    /// Remove an account
    Remove {
        /// Account ID to remove
        id: String,
    },
}
