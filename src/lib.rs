//! RX Miner - multi-threaded RandomX proof-of-work search engine
//!
//! This crate provides the search core of a RandomX (Monero) CPU miner:
//! - Dataset and VM lifecycle with large-page fallback and parallel init
//! - A pipelined hash-until-match loop sharing one nonce sequence across threads
//! - Job scheduling with reseeding, statistics and hardware monitoring
//! - A pluggable hashing backend (`rust-randomx` or an in-memory mock)

#![warn(missing_docs)]
#![deny(unsafe_code)]

/// Miner core implementation including backends, engine and scheduling
pub mod miner;

/// Statistics collection and reporting functionality
pub mod stats;

/// Utility functions and error handling
pub mod utils;

/// Command-line interface definitions
pub mod cli;

/// Configuration management
pub mod config;

/// Shared type definitions
pub mod types;

// Core exports
pub use cli::Commands;
pub use config::Config;
pub use miner::{InitStatus, RandomXBackend, RxEngine, Scheduler, SearchOutcome, StopFlag, Worker};
pub use stats::{HardwareStats, MiningStats, StatsReporter};
pub use types::{BackendKind, Job, Share};
pub use utils::{MinerError, init_logging};
