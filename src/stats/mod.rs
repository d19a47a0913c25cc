//! Statistics collection and reporting module
//!
//! This module provides functionality for tracking and reporting mining statistics,
//! including:
//! - Hash counts and hashrate over a resettable window
//! - Found shares and their accumulated difficulty
//! - Hardware monitoring (CPU, memory, temperature)
//!
//! The main component is [`StatsReporter`] which collects data from the workers
//! and periodically logs it.

/// Submodule containing the statistics reporter implementation
///
/// The reporter handles:
/// - Atomic collection of mining statistics
/// - Hardware monitoring
/// - Periodic reporting of stats
pub mod reporter;

// Re-export main components
pub use reporter::{HardwareMonitor, HardwareStats, MiningStats, StatsReporter, fmt_hashrate};
