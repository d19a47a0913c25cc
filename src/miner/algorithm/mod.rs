// src/miner/algorithm/mod.rs
//! Hashing VM backends
//!
//! The memory-hard hash itself lives outside this crate. This module defines the
//! surface the engine needs from it and ships the backends that implement it:
//! - `mock`: deterministic in-memory backend with a small dataset
//! - `randomx`: real RandomX through the `rust-randomx` bindings (feature `rust-randomx`)

/// Deterministic in-memory backend
///
/// Cheap enough to seed in milliseconds; used by the test-suite and by
/// `--backend mock` for exercising the engine without a 2 GiB dataset.
pub mod mock;

/// RandomX backend built on the `rust-randomx` crate
#[cfg(feature = "rust-randomx")]
pub mod randomx;

use std::sync::Arc;

/// Size in bytes of every hash produced by a backend
pub const HASH_SIZE: usize = 32;

/// Raw hash output
pub type Hash = [u8; HASH_SIZE];

/// Allocation and execution flags passed to the backend
///
/// Mirrors the capability bits of the underlying VM. Backends report what the
/// host supports through [`RandomXBackend::detect_flags`]; the engine only ever
/// toggles `large_pages` on top of that.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RxFlags {
    /// Back allocations with huge pages
    pub large_pages: bool,
    /// Use AES-NI instead of the software AES rounds
    pub hard_aes: bool,
    /// JIT-compile VM programs
    pub jit: bool,
    /// Full dataset (fast mode) instead of light cache-only hashing
    pub full_mem: bool,
    /// W^X pages for JIT code (required on some platforms)
    pub secure: bool,
}

impl RxFlags {
    /// Same flags with large pages requested
    pub fn with_large_pages(self) -> Self {
        Self {
            large_pages: true,
            ..self
        }
    }

    /// Same flags with large pages cleared
    pub fn without_large_pages(self) -> Self {
        Self {
            large_pages: false,
            ..self
        }
    }
}

/// Interface the engine consumes from the external hashing library
///
/// Allocation calls return `None` when the backend cannot satisfy them; the
/// engine decides whether to retry with different flags. Hash calls are
/// infallible compute.
///
/// `init_dataset` is called concurrently from several threads on disjoint item
/// ranges of the same dataset, so datasets need interior mutability. Caches are
/// read concurrently during that phase.
pub trait RandomXBackend: Send + Sync {
    /// Seed-derived cache used to build the dataset
    type Cache: Sync;
    /// Large read-only dataset shared by every VM
    type Dataset: Send + Sync;
    /// Per-thread execution context
    type Vm: Send;

    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Flags supported by the host (AES, JIT, ...), without large pages
    fn detect_flags(&self) -> RxFlags;

    /// Allocates an uninitialised cache
    fn alloc_cache(&self, flags: RxFlags) -> Option<Self::Cache>;

    /// Fills the cache from the seed bytes
    fn init_cache(&self, cache: &mut Self::Cache, seed: &[u8]);

    /// Allocates an uninitialised dataset
    fn alloc_dataset(&self, flags: RxFlags) -> Option<Self::Dataset>;

    /// Number of items in a dataset
    fn dataset_item_count(&self) -> u32;

    /// Initialises items `start_item..start_item + item_count` from the cache
    fn init_dataset(
        &self,
        dataset: &Self::Dataset,
        cache: &Self::Cache,
        start_item: u32,
        item_count: u32,
    );

    /// Creates a VM bound to `dataset`; the VM keeps the dataset alive
    fn create_vm(&self, flags: RxFlags, dataset: &Arc<Self::Dataset>) -> Option<Self::Vm>;

    /// Single-shot hash
    fn calculate_hash(&self, vm: &mut Self::Vm, input: &[u8]) -> Hash;

    /// Starts a pipelined sequence by submitting `input`
    fn calculate_hash_first(&self, vm: &mut Self::Vm, input: &[u8]);

    /// Submits `next_input` and returns the hash of the previous submission
    fn calculate_hash_next(&self, vm: &mut Self::Vm, next_input: &[u8]) -> Hash;

    /// Returns the hash of the last submission and ends the sequence
    fn calculate_hash_last(&self, vm: &mut Self::Vm) -> Hash;
}
