// src/miner/algorithm/mock.rs
//! Deterministic in-memory backend
//!
//! Stands in for the external VM wherever the real 2 GiB dataset is too heavy:
//! the test-suite and `--backend mock` benchmarks. It keeps every property the
//! engine relies on:
//! - the dataset is a seed-derived item array, initialisable by ranges
//! - hashes depend on the input and on the dataset contents
//! - the pipelined calls return the hash of the *previous* submission
//! - hashing clobbers the FPU rounding mode, like JIT-compiled programs
//!
//! Allocation failures can be injected to drive the fallback paths.

use crate::miner::algorithm::{Hash, RandomXBackend, RxFlags};
use crate::miner::fpenv;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

const DEFAULT_ITEMS: u32 = 4096;
const MIX_ROUNDS: usize = 4;

/// Mock hashing backend
#[derive(Debug)]
pub struct MockBackend {
    items: u32,
    large_pages: bool,
    fail_cache: bool,
    fail_dataset: bool,
    clobber_fpu: bool,
    vm_limit: Option<usize>,
    vms_created: AtomicUsize,
    cache_inits: AtomicUsize,
}

/// Seed-derived key
#[derive(Debug)]
pub struct MockCache {
    key: [u8; 32],
}

/// Item array shared by all mock VMs
#[derive(Debug)]
pub struct MockDataset {
    items: Vec<AtomicU64>,
    large_pages: bool,
}

impl MockDataset {
    /// Copies the current item values
    pub fn snapshot(&self) -> Vec<u64> {
        self.items.iter().map(|i| i.load(Ordering::Relaxed)).collect()
    }

    /// Whether the allocation was large-page backed
    pub fn large_pages(&self) -> bool {
        self.large_pages
    }
}

/// Mock VM: the dataset it is bound to plus the in-flight input
#[derive(Debug)]
pub struct MockVm {
    dataset: Arc<MockDataset>,
    pending: Vec<u8>,
    large_pages: bool,
}

impl MockVm {
    /// Whether the VM was created with large pages
    pub fn large_pages(&self) -> bool {
        self.large_pages
    }
}

impl MockBackend {
    /// Backend with a 4096-item dataset where every allocation succeeds
    pub fn new() -> Self {
        MockBackend {
            items: DEFAULT_ITEMS,
            large_pages: true,
            fail_cache: false,
            fail_dataset: false,
            clobber_fpu: true,
            vm_limit: None,
            vms_created: AtomicUsize::new(0),
            cache_inits: AtomicUsize::new(0),
        }
    }

    /// Sets the dataset size (at least one item)
    pub fn with_items(mut self, items: u32) -> Self {
        self.items = items.max(1);
        self
    }

    /// Makes every large-page allocation fail
    pub fn without_large_pages(mut self) -> Self {
        self.large_pages = false;
        self
    }

    /// Makes cache allocation fail
    pub fn failing_cache(mut self) -> Self {
        self.fail_cache = true;
        self
    }

    /// Makes dataset allocation fail with and without large pages
    pub fn failing_dataset(mut self) -> Self {
        self.fail_dataset = true;
        self
    }

    /// Allows at most `limit` successful VM creations
    pub fn with_vm_limit(mut self, limit: usize) -> Self {
        self.vm_limit = Some(limit);
        self
    }

    /// Leaves the FPU alone while hashing
    pub fn without_fpu_clobbering(mut self) -> Self {
        self.clobber_fpu = false;
        self
    }

    /// Number of VMs created so far
    pub fn vms_created(&self) -> usize {
        self.vms_created.load(Ordering::SeqCst)
    }

    /// Number of times a cache was keyed from a seed
    pub fn cache_inits(&self) -> usize {
        self.cache_inits.load(Ordering::SeqCst)
    }

    fn compute(&self, dataset: &MockDataset, input: &[u8]) -> Hash {
        if self.clobber_fpu {
            fpenv::clobber_rounding_mode();
        }

        let mut hash: Hash = Sha256::digest(input).into();
        let len = dataset.items.len() as u64;
        for _ in 0..MIX_ROUNDS {
            let mut index = [0u8; 8];
            index.copy_from_slice(&hash[..8]);
            let item = dataset.items[(u64::from_le_bytes(index) % len) as usize].load(Ordering::Relaxed);

            let mut hasher = Sha256::new();
            hasher.update(hash);
            hasher.update(item.to_le_bytes());
            hash = hasher.finalize().into();
        }
        hash
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomXBackend for MockBackend {
    type Cache = MockCache;
    type Dataset = MockDataset;
    type Vm = MockVm;

    fn name(&self) -> &'static str {
        "mock"
    }

    fn detect_flags(&self) -> RxFlags {
        RxFlags {
            large_pages: false,
            hard_aes: true,
            jit: true,
            full_mem: true,
            secure: false,
        }
    }

    fn alloc_cache(&self, _flags: RxFlags) -> Option<MockCache> {
        if self.fail_cache {
            return None;
        }
        Some(MockCache { key: [0; 32] })
    }

    fn init_cache(&self, cache: &mut MockCache, seed: &[u8]) {
        self.cache_inits.fetch_add(1, Ordering::SeqCst);
        cache.key = Sha256::digest(seed).into();
    }

    fn alloc_dataset(&self, flags: RxFlags) -> Option<MockDataset> {
        if self.fail_dataset || (flags.large_pages && !self.large_pages) {
            return None;
        }
        Some(MockDataset {
            items: (0..self.items).map(|_| AtomicU64::new(0)).collect(),
            large_pages: flags.large_pages,
        })
    }

    fn dataset_item_count(&self) -> u32 {
        self.items
    }

    fn init_dataset(&self, dataset: &MockDataset, cache: &MockCache, start_item: u32, item_count: u32) {
        for index in start_item..start_item + item_count {
            let mut hasher = Sha256::new();
            hasher.update(cache.key);
            hasher.update(index.to_le_bytes());
            let digest = hasher.finalize();

            let mut value = [0u8; 8];
            value.copy_from_slice(&digest[..8]);
            dataset.items[index as usize].store(u64::from_le_bytes(value), Ordering::Relaxed);
        }
    }

    fn create_vm(&self, flags: RxFlags, dataset: &Arc<MockDataset>) -> Option<MockVm> {
        if flags.large_pages && !self.large_pages {
            return None;
        }
        if let Some(limit) = self.vm_limit {
            let claimed = self
                .vms_created
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < limit).then_some(n + 1));
            if claimed.is_err() {
                return None;
            }
        } else {
            self.vms_created.fetch_add(1, Ordering::SeqCst);
        }

        Some(MockVm {
            dataset: Arc::clone(dataset),
            pending: Vec::new(),
            large_pages: flags.large_pages,
        })
    }

    fn calculate_hash(&self, vm: &mut MockVm, input: &[u8]) -> Hash {
        self.compute(&vm.dataset, input)
    }

    fn calculate_hash_first(&self, vm: &mut MockVm, input: &[u8]) {
        vm.pending.clear();
        vm.pending.extend_from_slice(input);
    }

    fn calculate_hash_next(&self, vm: &mut MockVm, next_input: &[u8]) -> Hash {
        let hash = self.compute(&vm.dataset, &vm.pending);
        vm.pending.clear();
        vm.pending.extend_from_slice(next_input);
        hash
    }

    fn calculate_hash_last(&self, vm: &mut MockVm) -> Hash {
        let hash = self.compute(&vm.dataset, &vm.pending);
        vm.pending.clear();
        hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(backend: &MockBackend, seed: &[u8]) -> Arc<MockDataset> {
        let flags = backend.detect_flags();
        let mut cache = backend.alloc_cache(flags).unwrap();
        backend.init_cache(&mut cache, seed);
        let dataset = backend.alloc_dataset(flags).unwrap();
        backend.init_dataset(&dataset, &cache, 0, backend.dataset_item_count());
        Arc::new(dataset)
    }

    #[test]
    fn pipeline_returns_previous_submission() {
        let backend = MockBackend::new().with_items(64);
        let dataset = seeded(&backend, b"seed");
        let mut vm = backend.create_vm(backend.detect_flags(), &dataset).unwrap();

        let one = backend.calculate_hash(&mut vm, b"one");
        let two = backend.calculate_hash(&mut vm, b"two");

        backend.calculate_hash_first(&mut vm, b"one");
        assert_eq!(backend.calculate_hash_next(&mut vm, b"two"), one);
        assert_eq!(backend.calculate_hash_last(&mut vm), two);
    }

    #[test]
    fn hash_depends_on_dataset() {
        let backend = MockBackend::new().with_items(64);
        let a = seeded(&backend, b"seed a");
        let b = seeded(&backend, b"seed b");
        let mut vm_a = backend.create_vm(backend.detect_flags(), &a).unwrap();
        let mut vm_b = backend.create_vm(backend.detect_flags(), &b).unwrap();

        assert_ne!(
            backend.calculate_hash(&mut vm_a, b"blob"),
            backend.calculate_hash(&mut vm_b, b"blob")
        );
    }

    #[test]
    fn large_pages_can_be_refused() {
        let backend = MockBackend::new().without_large_pages();
        let flags = backend.detect_flags();
        assert!(backend.alloc_dataset(flags.with_large_pages()).is_none());
        assert!(backend.alloc_dataset(flags).is_some());
    }

    #[test]
    fn vm_limit_is_enforced() {
        let backend = MockBackend::new().with_items(8).with_vm_limit(1);
        let dataset = seeded(&backend, b"seed");
        let flags = backend.detect_flags();
        assert!(backend.create_vm(flags, &dataset).is_some());
        assert!(backend.create_vm(flags, &dataset).is_none());
        assert_eq!(backend.vms_created(), 1);
    }
}
