//! CLI module for creditfarm - command-line interface and subcommands.

pub mod commands;

pub use commands::Cli;
