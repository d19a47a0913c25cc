// src/miner/pool.rs
//! VM pool
//!
//! One VM per worker slot, indexed `0..len`. Resizing needs `&mut self`, so it
//! cannot happen while any slot is lent out to a search.

use crate::miner::algorithm::{RandomXBackend, RxFlags};
use crate::utils::error::MinerError;
use std::sync::Arc;

/// Ordered collection of VMs bound to the shared dataset
pub struct VmPool<B: RandomXBackend> {
    vms: Vec<B::Vm>,
}

impl<B: RandomXBackend> VmPool<B> {
    /// Empty pool
    pub fn new() -> Self {
        VmPool { vms: Vec::new() }
    }

    /// Number of VMs
    pub fn len(&self) -> usize {
        self.vms.len()
    }

    /// Whether the pool has no VM yet
    pub fn is_empty(&self) -> bool {
        self.vms.is_empty()
    }

    /// VM for `slot`
    pub fn get_mut(&mut self, slot: usize) -> Option<&mut B::Vm> {
        self.vms.get_mut(slot)
    }

    /// All VMs, in slot order
    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, B::Vm> {
        self.vms.iter_mut()
    }

    /// Creates `count` VMs, but only when the pool is still empty
    ///
    /// # Errors
    /// `MinerError::AllocationError` if a VM cannot be created. The pool is
    /// left empty, so a later call starts over with the full count.
    pub fn populate(
        &mut self,
        backend: &B,
        flags: RxFlags,
        dataset: &Arc<B::Dataset>,
        count: usize,
    ) -> Result<(), MinerError> {
        if !self.vms.is_empty() {
            return Ok(());
        }
        self.vms.reserve(count);
        for _ in 0..count {
            match create_vm(backend, flags, dataset) {
                Ok(vm) => self.vms.push(vm),
                Err(e) => {
                    self.vms.clear();
                    return Err(e);
                }
            }
        }
        log::debug!("Created {} {} VMs", count, backend.name());
        Ok(())
    }

    /// Appends one VM and returns the new pool size
    ///
    /// # Errors
    /// `MinerError::AllocationError` if the VM cannot be created.
    pub fn grow(&mut self, backend: &B, flags: RxFlags, dataset: &Arc<B::Dataset>) -> Result<usize, MinerError> {
        self.vms.push(create_vm(backend, flags, dataset)?);
        Ok(self.vms.len())
    }

    /// Drops the last VM and returns the new pool size
    ///
    /// # Errors
    /// `MinerError::PoolUnderflow` if only one VM (or none) is left.
    pub fn shrink(&mut self) -> Result<usize, MinerError> {
        if self.vms.len() <= 1 {
            return Err(MinerError::PoolUnderflow);
        }
        self.vms.pop();
        Ok(self.vms.len())
    }
}

impl<B: RandomXBackend> Default for VmPool<B> {
    fn default() -> Self {
        Self::new()
    }
}

/// Creates a VM with large pages, falling back to standard pages once
fn create_vm<B: RandomXBackend>(backend: &B, flags: RxFlags, dataset: &Arc<B::Dataset>) -> Result<B::Vm, MinerError> {
    if let Some(vm) = backend.create_vm(flags.with_large_pages(), dataset) {
        return Ok(vm);
    }
    log::debug!("Failed to create VM with large pages, falling back");
    backend
        .create_vm(flags.without_large_pages(), dataset)
        .ok_or_else(|| MinerError::AllocationError("Failed to create VM".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::mock::MockBackend;

    fn dataset(backend: &MockBackend) -> Arc<<MockBackend as RandomXBackend>::Dataset> {
        Arc::new(backend.alloc_dataset(backend.detect_flags()).unwrap())
    }

    #[test]
    fn populate_only_when_empty() {
        let backend = MockBackend::new().with_items(16);
        let ds = dataset(&backend);
        let mut pool = VmPool::<MockBackend>::new();

        pool.populate(&backend, backend.detect_flags(), &ds, 3).unwrap();
        assert_eq!(pool.len(), 3);
        pool.populate(&backend, backend.detect_flags(), &ds, 5).unwrap();
        assert_eq!(pool.len(), 3, "populated pool must not change");
        assert_eq!(backend.vms_created(), 3);
    }

    #[test]
    fn vms_prefer_large_pages() {
        let backend = MockBackend::new().with_items(16);
        let ds = dataset(&backend);
        let mut pool = VmPool::<MockBackend>::new();
        pool.populate(&backend, backend.detect_flags(), &ds, 1).unwrap();
        assert!(pool.get_mut(0).unwrap().large_pages());
    }

    #[test]
    fn vm_creation_falls_back() {
        let backend = MockBackend::new().with_items(16).without_large_pages();
        let ds = dataset(&backend);
        let mut pool = VmPool::<MockBackend>::new();
        pool.populate(&backend, backend.detect_flags(), &ds, 2).unwrap();
        assert_eq!(pool.len(), 2);
        assert!(!pool.get_mut(1).unwrap().large_pages());
    }

    #[test]
    fn grow_and_shrink() {
        let backend = MockBackend::new().with_items(16);
        let ds = dataset(&backend);
        let mut pool = VmPool::<MockBackend>::new();
        pool.populate(&backend, backend.detect_flags(), &ds, 1).unwrap();

        assert_eq!(pool.grow(&backend, backend.detect_flags(), &ds).unwrap(), 2);
        assert_eq!(pool.shrink().unwrap(), 1);
    }

    #[test]
    fn shrink_refuses_last_vm() {
        let backend = MockBackend::new().with_items(16);
        let ds = dataset(&backend);
        let mut pool = VmPool::<MockBackend>::new();
        pool.populate(&backend, backend.detect_flags(), &ds, 1).unwrap();

        assert!(matches!(pool.shrink(), Err(MinerError::PoolUnderflow)));
        assert_eq!(pool.len(), 1, "failed shrink must leave the pool intact");
    }

    #[test]
    fn grow_fails_when_backend_is_exhausted() {
        let backend = MockBackend::new().with_items(16).with_vm_limit(1);
        let ds = dataset(&backend);
        let mut pool = VmPool::<MockBackend>::new();
        pool.populate(&backend, backend.detect_flags(), &ds, 1).unwrap();

        let err = pool.grow(&backend, backend.detect_flags(), &ds);
        assert!(matches!(err, Err(MinerError::AllocationError(_))));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn failed_populate_leaves_pool_empty() {
        let backend = MockBackend::new().with_items(16).with_vm_limit(2);
        let ds = dataset(&backend);
        let mut pool = VmPool::<MockBackend>::new();

        let err = pool.populate(&backend, backend.detect_flags(), &ds, 3);
        assert!(matches!(err, Err(MinerError::AllocationError(_))));
        assert!(pool.is_empty(), "partially built pool must be discarded");
        assert_eq!(backend.vms_created(), 2);
    }
}
