// src/cli/mod.rs
//! Command-line interface
//!
//! clap definitions for the `mine`, `benchmark` and `config` subcommands.

/// Argument structs for every subcommand
pub mod commands;

pub use commands::{Action, BenchmarkOptions, Commands, ConfigOptions, MineOptions};
