// src/miner/stop.rs
//! Stop signal for search loops
//!
//! One flag is shared by every worker of an epoch; raising it makes each
//! running search return after its current hash.

use std::sync::atomic::{AtomicU32, Ordering};

/// Cooperative cancellation signal shared by every search loop
///
/// Owned by the caller (usually behind an `Arc` or a plain borrow inside a
/// thread scope). Search loops only poll it, once per completed hash, so the
/// cancellation latency is one pipelined hash computation.
#[derive(Debug, Default)]
pub struct StopFlag(AtomicU32);

impl StopFlag {
    /// Creates a lowered flag
    pub fn new() -> Self {
        StopFlag(AtomicU32::new(0))
    }

    /// Asks every loop polling this flag to stop
    pub fn raise(&self) {
        self.0.store(1, Ordering::SeqCst);
    }

    /// Lowers the flag so a new round of searches can run
    pub fn clear(&self) {
        self.0.store(0, Ordering::SeqCst);
    }

    /// Whether a stop has been requested
    #[inline]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed) != 0
    }
}
