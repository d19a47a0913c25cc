// src/miner/engine.rs
//! Search engine
//!
//! [`RxEngine`] owns everything the search loops share: the backend, the
//! dataset, the VM pool and the nonce sequencer. Operations that must not run
//! alongside active searches (reseeding, resizing) take `&mut self`; searches
//! borrow one VM each through [`RxEngine::search_slots`], so the borrow checker
//! turns the "quiesce all workers first" rule into a compile-time requirement.

use crate::miner::algorithm::{Hash, RandomXBackend, RxFlags};
use crate::miner::dataset::{DatasetManager, InitStatus};
use crate::miner::nonce::NonceSequencer;
use crate::miner::pool::VmPool;
use crate::miner::search::{self, SearchOutcome};
use crate::miner::stop::StopFlag;
use crate::utils::error::MinerError;

/// Dataset, VM pool and nonce sequencer for one backend
pub struct RxEngine<B: RandomXBackend> {
    backend: B,
    flags: RxFlags,
    dataset: DatasetManager<B>,
    pool: VmPool<B>,
    nonces: NonceSequencer,
}

impl<B: RandomXBackend> RxEngine<B> {
    /// Creates an engine with nothing allocated
    pub fn new(backend: B) -> Self {
        let flags = backend.detect_flags();
        log::debug!("{} backend flags: {:?}", backend.name(), flags);
        RxEngine {
            backend,
            flags,
            dataset: DatasetManager::new(),
            pool: VmPool::new(),
            nonces: NonceSequencer::new(),
        }
    }

    /// The backend
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Number of VMs in the pool
    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }

    /// Whether a seed has been applied
    pub fn is_seeded(&self) -> bool {
        self.dataset.is_seeded()
    }

    /// Seed the dataset was last built from
    pub fn seed_bytes(&self) -> Option<&[u8]> {
        self.dataset.seed_bytes()
    }

    /// The shared nonce sequencer
    pub fn nonces(&self) -> &NonceSequencer {
        &self.nonces
    }

    /// Allocates the dataset if needed and creates `threads` VMs if the pool is empty
    ///
    /// # Returns
    /// * `Ok(InitStatus::Full)` - dataset backed by large pages
    /// * `Ok(InitStatus::NoLargePages)` - working with standard pages
    ///
    /// # Errors
    /// `MinerError::AllocationError` if the dataset or a VM cannot be allocated
    /// even without large pages.
    pub fn initialize(&mut self, threads: usize) -> Result<InitStatus, MinerError> {
        if threads == 0 {
            return Err(MinerError::InputError("Thread count must be at least 1".into()));
        }
        let status = self.dataset.ensure_allocated(&self.backend, self.flags)?;
        let dataset = self.dataset_handle()?;
        self.pool.populate(&self.backend, self.flags, &dataset, threads)?;

        log::info!(
            "{} engine ready: {} VMs, large pages {}",
            self.backend.name(),
            self.pool.len(),
            if status == InitStatus::Full { "on" } else { "off" }
        );
        Ok(status)
    }

    /// Rebuilds the dataset from `seed` with `init_threads` threads
    ///
    /// # Errors
    /// `MinerError::AllocationError` if the cache cannot be allocated; the
    /// previous dataset contents are kept.
    pub fn seed(&mut self, seed: &[u8], init_threads: usize) -> Result<(), MinerError> {
        log::info!("New seed: {}", hex::encode(seed));
        self.dataset.seed(&self.backend, self.flags, seed, init_threads)
    }

    /// Adds one VM and returns the new pool size
    ///
    /// # Errors
    /// `MinerError::NotInitialized` before [`initialize`](Self::initialize),
    /// `MinerError::AllocationError` if the VM cannot be created.
    pub fn grow_pool(&mut self) -> Result<usize, MinerError> {
        let dataset = self.dataset_handle()?;
        let size = self.pool.grow(&self.backend, self.flags, &dataset)?;
        log::info!("VM pool grown to {}", size);
        Ok(size)
    }

    /// Removes the last VM and returns the new pool size
    ///
    /// # Errors
    /// `MinerError::PoolUnderflow` when a single VM is left.
    pub fn shrink_pool(&mut self) -> Result<usize, MinerError> {
        let size = self.pool.shrink()?;
        log::info!("VM pool shrunk to {}", size);
        Ok(size)
    }

    /// Runs the search loop on the VM of `slot`
    ///
    /// # Errors
    /// `MinerError::InvalidSlot`, `MinerError::NotInitialized` before the first
    /// seed, and the input errors of [`search::hash_until`].
    pub fn hash_until(
        &mut self,
        slot: usize,
        blob: &[u8],
        difficulty: u64,
        stop: &StopFlag,
    ) -> Result<SearchOutcome, MinerError> {
        self.ensure_seeded()?;
        let pool_size = self.pool.len();
        let vm = self
            .pool
            .get_mut(slot)
            .ok_or(MinerError::InvalidSlot { slot, pool_size })?;
        search::hash_until(&self.backend, vm, blob, difficulty, &self.nonces, stop)
    }

    /// Hashes `blob` with `nonce` on the VM of `slot`, outside the search loop
    pub fn hash_one(&mut self, slot: usize, blob: &[u8], nonce: u32) -> Result<Hash, MinerError> {
        self.ensure_seeded()?;
        let pool_size = self.pool.len();
        let vm = self
            .pool
            .get_mut(slot)
            .ok_or(MinerError::InvalidSlot { slot, pool_size })?;
        search::hash_one(&self.backend, vm, blob, nonce)
    }

    /// Lends every VM out as an independent search handle, in slot order
    ///
    /// The handles can be moved to separate threads; they share the backend,
    /// the dataset and the nonce sequencer.
    ///
    /// # Errors
    /// `MinerError::NotInitialized` before the first seed.
    pub fn search_slots(&mut self) -> Result<Vec<SearchSlot<'_, B>>, MinerError> {
        self.ensure_seeded()?;
        let backend = &self.backend;
        let nonces = &self.nonces;
        Ok(self
            .pool
            .iter_mut()
            .enumerate()
            .map(|(slot, vm)| SearchSlot {
                slot,
                backend,
                vm,
                nonces,
            })
            .collect())
    }

    fn ensure_seeded(&self) -> Result<(), MinerError> {
        if !self.dataset.is_seeded() {
            return Err(MinerError::NotInitialized("Dataset has not been seeded".into()));
        }
        Ok(())
    }

    fn dataset_handle(&self) -> Result<std::sync::Arc<B::Dataset>, MinerError> {
        self.dataset
            .dataset()
            .cloned()
            .ok_or_else(|| MinerError::NotInitialized("Dataset has not been allocated".into()))
    }
}

/// One VM lent out of the pool for searching
pub struct SearchSlot<'a, B: RandomXBackend> {
    slot: usize,
    backend: &'a B,
    vm: &'a mut B::Vm,
    nonces: &'a NonceSequencer,
}

impl<B: RandomXBackend> SearchSlot<'_, B> {
    /// Pool index of this VM
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Runs the search loop on this VM
    pub fn hash_until(&mut self, blob: &[u8], difficulty: u64, stop: &StopFlag) -> Result<SearchOutcome, MinerError> {
        search::hash_until(self.backend, self.vm, blob, difficulty, self.nonces, stop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::mock::MockBackend;

    fn engine() -> RxEngine<MockBackend> {
        RxEngine::new(MockBackend::new().with_items(512))
    }

    #[test]
    fn initialize_creates_pool_once() {
        let mut engine = engine();
        assert_eq!(engine.initialize(3).unwrap(), InitStatus::Full);
        assert_eq!(engine.pool_size(), 3);
        engine.initialize(8).unwrap();
        assert_eq!(engine.pool_size(), 3);
    }

    #[test]
    fn initialize_reports_missing_large_pages() {
        let mut engine = RxEngine::new(MockBackend::new().with_items(64).without_large_pages());
        assert_eq!(engine.initialize(1).unwrap(), InitStatus::NoLargePages);
    }

    #[test]
    fn initialize_fails_without_dataset() {
        let mut engine = RxEngine::new(MockBackend::new().failing_dataset());
        assert!(matches!(engine.initialize(1), Err(MinerError::AllocationError(_))));
    }

    #[test]
    fn initialize_fails_without_vms() {
        let mut engine = RxEngine::new(MockBackend::new().with_items(64).with_vm_limit(1));
        assert!(matches!(engine.initialize(2), Err(MinerError::AllocationError(_))));
        assert_eq!(engine.pool_size(), 0);
    }

    #[test]
    fn failed_initialize_is_not_reported_as_success_later() {
        let mut engine = RxEngine::new(MockBackend::new().with_items(64).with_vm_limit(1));
        assert!(engine.initialize(2).is_err());
        assert!(matches!(engine.initialize(2), Err(MinerError::AllocationError(_))));
        assert_eq!(engine.pool_size(), 0);
        assert!(matches!(engine.grow_pool(), Err(MinerError::AllocationError(_))));
    }

    #[test]
    fn search_requires_seed() {
        let mut engine = engine();
        engine.initialize(1).unwrap();
        let err = engine.hash_until(0, &[0u8; 76], 1, &StopFlag::new());
        assert!(matches!(err, Err(MinerError::NotInitialized(_))));
    }

    #[test]
    fn invalid_slot_is_rejected() {
        let mut engine = engine();
        engine.initialize(2).unwrap();
        engine.seed(b"seed", 2).unwrap();
        let err = engine.hash_until(2, &[0u8; 76], 1, &StopFlag::new());
        assert!(matches!(err, Err(MinerError::InvalidSlot { slot: 2, pool_size: 2 })));
    }

    #[test]
    fn grow_requires_initialize() {
        let mut engine = engine();
        assert!(matches!(engine.grow_pool(), Err(MinerError::NotInitialized(_))));
    }

    #[test]
    fn resize_pool() {
        let mut engine = engine();
        engine.initialize(1).unwrap();
        assert_eq!(engine.grow_pool().unwrap(), 2);
        assert_eq!(engine.shrink_pool().unwrap(), 1);
        assert!(matches!(engine.shrink_pool(), Err(MinerError::PoolUnderflow)));
        assert_eq!(engine.pool_size(), 1);
    }

    #[test]
    fn seeding_before_initialize_allocates_lazily() {
        let mut engine = engine();
        engine.seed(b"early", 2).unwrap();
        assert!(engine.is_seeded());
        engine.initialize(1).unwrap();
        assert!(engine.hash_until(0, &[0u8; 76], 1, &StopFlag::new()).unwrap().is_found());
    }

    #[test]
    fn slots_share_the_sequencer() {
        let mut engine = engine();
        engine.initialize(2).unwrap();
        engine.seed(b"seed", 1).unwrap();

        let mut slots = engine.search_slots().unwrap();
        assert_eq!(slots.len(), 2);
        let stop = StopFlag::new();
        let a = slots[0].hash_until(&[0u8; 76], 1, &stop).unwrap();
        let b = slots[1].hash_until(&[0u8; 76], 1, &stop).unwrap();
        match (a, b) {
            (SearchOutcome::Found { nonce: na, .. }, SearchOutcome::Found { nonce: nb, .. }) => {
                assert_ne!(na, nb)
            }
            other => panic!("unexpected outcomes {:?}", other),
        }
    }
}
