// src/miner/nonce.rs
//! Nonce sequencer
//!
//! One atomic counter hands out nonces to every search loop. Uniqueness comes
//! from `fetch_add` alone; which thread gets which value is unspecified.

use std::sync::atomic::{AtomicU32, Ordering};

/// Byte offset of the 4-byte little-endian nonce inside a candidate blob
///
/// Part of the wire contract with upstream job producers.
pub const NONCE_OFFSET: usize = 39;

/// Width of the nonce field
pub const NONCE_SIZE: usize = 4;

/// Shared source of unique nonces
///
/// Starts at 1 and wraps silently at `u32::MAX`.
#[derive(Debug)]
pub struct NonceSequencer {
    next: AtomicU32,
}

impl NonceSequencer {
    /// Creates a sequencer whose first nonce is 1
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Creates a sequencer whose first nonce is `first`
    pub fn starting_at(first: u32) -> Self {
        NonceSequencer {
            next: AtomicU32::new(first),
        }
    }

    /// Claims the next nonce
    #[inline]
    pub fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Value the next call to [`next`](Self::next) would return
    pub fn peek(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for NonceSequencer {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes `nonce` into the nonce field of `blob`
///
/// The caller guarantees `blob.len() >= NONCE_OFFSET + NONCE_SIZE`.
#[inline]
pub fn write_nonce(blob: &mut [u8], nonce: u32) {
    blob[NONCE_OFFSET..NONCE_OFFSET + NONCE_SIZE].copy_from_slice(&nonce.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn starts_at_one() {
        let seq = NonceSequencer::new();
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
        assert_eq!(seq.peek(), 3);
    }

    #[test]
    fn wraps_on_overflow() {
        let seq = NonceSequencer::starting_at(u32::MAX);
        assert_eq!(seq.next(), u32::MAX);
        assert_eq!(seq.next(), 0, "counter must wrap silently");
    }

    #[test]
    fn concurrent_nonces_are_unique() {
        let seq = Arc::new(NonceSequencer::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let seq = Arc::clone(&seq);
                std::thread::spawn(move || (0..10_000).map(|_| seq.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for nonce in handle.join().expect("worker panicked") {
                assert!(seen.insert(nonce), "nonce {} issued twice", nonce);
            }
        }
        assert_eq!(seen.len(), 80_000);
    }

    #[test]
    fn write_nonce_is_little_endian_at_offset() {
        let mut blob = vec![0u8; 76];
        write_nonce(&mut blob, 0x0403_0201);
        assert_eq!(&blob[39..43], &[1, 2, 3, 4]);
        assert!(blob[..39].iter().all(|&b| b == 0));
        assert!(blob[43..].iter().all(|&b| b == 0));
    }
}
