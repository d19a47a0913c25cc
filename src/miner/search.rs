// src/miner/search.rs
//! Pipelined nonce search
//!
//! The VM overlaps hash `i` with the setup of input `i + 1` through three calls:
//! `first` primes it, `next` returns the previous result while priming the new
//! input, `last` drains it. [`HashPipeline`] tracks which nonce the in-flight
//! input carries so every result is paired with the right nonce.

use crate::miner::algorithm::{Hash, RandomXBackend};
use crate::miner::difficulty::check_hash;
use crate::miner::fpenv::FpEnvGuard;
use crate::miner::nonce::{NONCE_OFFSET, NONCE_SIZE, NonceSequencer, write_nonce};
use crate::miner::stop::StopFlag;
use crate::utils::error::MinerError;

/// Result of one search call
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SearchOutcome {
    /// A hash passed the difficulty check
    Found {
        /// Hashes evaluated, including the winning one
        hashes: u64,
        /// Nonce that produced `hash`
        nonce: u32,
        /// The passing hash
        hash: Hash,
    },
    /// The stop flag was raised before a match
    Stopped {
        /// Hashes evaluated
        hashes: u64,
    },
}

impl SearchOutcome {
    /// Number of hashes evaluated
    pub fn hashes(&self) -> u64 {
        match *self {
            SearchOutcome::Found { hashes, .. } | SearchOutcome::Stopped { hashes } => hashes,
        }
    }

    /// Hash count signed by outcome: positive when found, negative when stopped
    pub fn signed_count(&self) -> i64 {
        match *self {
            SearchOutcome::Found { hashes, .. } => hashes as i64,
            SearchOutcome::Stopped { hashes } => -(hashes as i64),
        }
    }

    /// Whether a passing hash was found
    pub fn is_found(&self) -> bool {
        matches!(self, SearchOutcome::Found { .. })
    }
}

/// Primed pipeline over the VM's first/next/last calls
///
/// The states are `Idle -> Primed -> Primed -> Idle`. An idle VM is just a
/// `&mut B::Vm`; [`begin`](Self::begin) moves it into the primed state, which
/// always has exactly one submission in flight, and [`finish`](Self::finish)
/// hands it back.
pub struct HashPipeline<'a, B: RandomXBackend> {
    backend: &'a B,
    vm: &'a mut B::Vm,
    in_flight: u32,
}

impl<'a, B: RandomXBackend> HashPipeline<'a, B> {
    /// Submits `input` (carrying `nonce`) into an idle VM
    pub fn begin(backend: &'a B, vm: &'a mut B::Vm, input: &[u8], nonce: u32) -> Self {
        backend.calculate_hash_first(vm, input);
        HashPipeline {
            backend,
            vm,
            in_flight: nonce,
        }
    }

    /// Submits `input` (carrying `nonce`) and returns the previous submission's nonce and hash
    pub fn advance(&mut self, input: &[u8], nonce: u32) -> (u32, Hash) {
        let hash = self.backend.calculate_hash_next(self.vm, input);
        let previous = std::mem::replace(&mut self.in_flight, nonce);
        (previous, hash)
    }

    /// Drains the in-flight submission, returning its nonce and hash
    pub fn finish(self) -> (u32, Hash) {
        (self.in_flight, self.backend.calculate_hash_last(self.vm))
    }
}

/// Checks that a blob can carry a nonce at the protocol offset
pub fn validate_blob(blob: &[u8]) -> Result<(), MinerError> {
    if blob.len() < NONCE_OFFSET + NONCE_SIZE {
        return Err(MinerError::InputError(format!(
            "Blob is {} bytes, needs at least {} for the nonce field",
            blob.len(),
            NONCE_OFFSET + NONCE_SIZE
        )));
    }
    Ok(())
}

/// Hashes fresh nonces on `vm` until one passes `difficulty` or `stop` is raised
///
/// Works on a private copy of `blob`. The stop flag is polled once per
/// completed hash, before submitting the next nonce. The calling thread's FP
/// environment is restored on every return path.
///
/// # Errors
/// `MinerError::InputError` for blobs too short to hold the nonce and for a
/// zero difficulty. Running out of time is not an error: see
/// [`SearchOutcome::Stopped`].
pub fn hash_until<B: RandomXBackend>(
    backend: &B,
    vm: &mut B::Vm,
    blob: &[u8],
    difficulty: u64,
    nonces: &NonceSequencer,
    stop: &StopFlag,
) -> Result<SearchOutcome, MinerError> {
    validate_blob(blob)?;
    if difficulty == 0 {
        return Err(MinerError::InputError("Difficulty must be non-zero".into()));
    }

    let _fp = FpEnvGuard::capture();
    let mut work = blob.to_vec();
    let mut hashes: u64 = 0;

    let nonce = nonces.next();
    write_nonce(&mut work, nonce);
    let mut pipeline = HashPipeline::begin(backend, vm, &work, nonce);

    while !stop.is_raised() {
        let nonce = nonces.next();
        write_nonce(&mut work, nonce);
        let (previous, hash) = pipeline.advance(&work, nonce);

        hashes += 1;
        if check_hash(&hash, difficulty) {
            // The in-flight nonce is abandoned; the next call starts a new pipeline.
            return Ok(SearchOutcome::Found {
                hashes,
                nonce: previous,
                hash,
            });
        }
    }

    let (nonce, hash) = pipeline.finish();
    hashes += 1;
    if check_hash(&hash, difficulty) {
        return Ok(SearchOutcome::Found { hashes, nonce, hash });
    }
    Ok(SearchOutcome::Stopped { hashes })
}

/// Hashes `blob` with `nonce` written into it, outside any pipeline
pub fn hash_one<B: RandomXBackend>(backend: &B, vm: &mut B::Vm, blob: &[u8], nonce: u32) -> Result<Hash, MinerError> {
    validate_blob(blob)?;
    let _fp = FpEnvGuard::capture();
    let mut work = blob.to_vec();
    write_nonce(&mut work, nonce);
    Ok(backend.calculate_hash(vm, &work))
}
