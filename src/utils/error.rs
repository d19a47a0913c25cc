// src/utils/error.rs
use crate::types::Share;
use std::io;
use thiserror::Error;

/// Main error type for the mining application
///
/// Covers the engine's own failures (allocation, pool underflow, misuse before
/// initialisation) as well as configuration, I/O and job-parsing errors.
/// A search that ends without a match is not an error.
#[derive(Error, Debug)]
pub enum MinerError {
    /// Cache, dataset or VM allocation failed even without large pages
    #[error("Allocation failed: {0}")]
    AllocationError(String),

    /// Attempted to shrink the VM pool below one VM
    #[error("VM pool cannot shrink below one VM")]
    PoolUnderflow,

    /// Operation issued before the engine was initialised or seeded
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// Worker slot outside the VM pool
    #[error("Invalid worker slot {slot} (pool size {pool_size})")]
    InvalidSlot {
        /// Requested slot
        slot: usize,
        /// Current pool size
        pool_size: usize,
    },

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Configuration file or parameter errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Thread communication channel errors
    #[error("Thread communication error: {0}")]
    ChannelError(String),

    /// Invalid user input or parameter errors
    #[error("Invalid input: {0}")]
    InputError(String),

    /// Worker thread execution errors
    #[error("Task execution error: {0}")]
    TaskError(String),
}

/// Converts crossbeam channel send errors for Shares into MinerError
///
/// Used when the share consumer has gone away.
impl From<crossbeam_channel::SendError<Share>> for MinerError {
    fn from(e: crossbeam_channel::SendError<Share>) -> Self {
        MinerError::ChannelError(format!("Share send failed: {}", e))
    }
}

/// Converts hex decoding errors into MinerError
///
/// Used when a job carries a malformed blob, target or seed hash.
impl From<hex::FromHexError> for MinerError {
    fn from(e: hex::FromHexError) -> Self {
        MinerError::InputError(format!("Hex conversion failed: {}", e))
    }
}
