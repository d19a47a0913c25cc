// src/miner/mod.rs
//! Core mining functionality
//!
//! This module contains all components related to the search:
//! - Hashing backends and the interface they implement
//! - Dataset and VM pool lifecycle
//! - The pipelined search loop and its supporting pieces (nonces, difficulty,
//!   stop flag, FP environment)
//! - Job scheduling and worker threads

/// Hashing VM backends
///
/// Contains the [`RandomXBackend`] trait and its implementations:
/// - a deterministic mock for tests and benchmarks of the engine itself
/// - RandomX via `rust-randomx` (feature `rust-randomx`)
pub mod algorithm;

/// Dataset allocation and (re)seeding
pub mod dataset;

/// Fixed-size pool of VMs bound to the dataset
pub mod pool;

/// Process-wide nonce sequencer
pub mod nonce;

/// Hash-against-difficulty check and stratum target conversion
pub mod difficulty;

/// Cancellation flag polled by the search loop
pub mod stop;

/// Floating-point environment capture and restore
pub mod fpenv;

/// Pipelined search loop
pub mod search;

/// The engine tying dataset, pool and sequencer together
pub mod engine;

/// Mining job scheduler
///
/// Runs jobs as epochs of scoped worker threads, reseeding the dataset
/// between epochs when the seed changes.
pub mod scheduler;

/// Worker thread implementation
///
/// Contains the per-slot loop that runs searches and submits shares.
pub mod worker;

// Re-export main components for cleaner imports
pub use self::algorithm::{Hash, RandomXBackend, RxFlags};
pub use self::dataset::InitStatus;
pub use self::engine::{RxEngine, SearchSlot};
pub use self::nonce::NonceSequencer;
pub use self::scheduler::Scheduler;
pub use self::search::SearchOutcome;
pub use self::stop::StopFlag;
pub use self::worker::Worker;
