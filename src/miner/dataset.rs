// src/miner/dataset.rs
//! Shared dataset lifecycle
//!
//! The dataset is allocated once (large pages first, standard pages as the
//! fallback) and rebuilt in place on every new seed. Rebuilding is split into
//! contiguous item ranges, one OS thread per range, joined before returning.

use crate::miner::algorithm::{RandomXBackend, RxFlags};
use crate::utils::error::MinerError;
use std::sync::Arc;
use std::time::Instant;

/// Outcome of a successful dataset allocation
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum InitStatus {
    /// Everything is backed by large pages
    Full,
    /// Working, but large pages were unavailable
    NoLargePages,
}

/// Owner of the process-wide dataset
pub struct DatasetManager<B: RandomXBackend> {
    dataset: Option<Arc<B::Dataset>>,
    large_pages: bool,
    seed: Option<Vec<u8>>,
}

impl<B: RandomXBackend> DatasetManager<B> {
    /// Manager with nothing allocated yet
    pub fn new() -> Self {
        DatasetManager {
            dataset: None,
            large_pages: false,
            seed: None,
        }
    }

    /// The dataset, once allocated
    pub fn dataset(&self) -> Option<&Arc<B::Dataset>> {
        self.dataset.as_ref()
    }

    /// Seed the dataset currently holds
    pub fn seed_bytes(&self) -> Option<&[u8]> {
        self.seed.as_deref()
    }

    /// Whether the dataset has been initialised from a seed
    pub fn is_seeded(&self) -> bool {
        self.seed.is_some()
    }

    /// Allocates the dataset on first call; later calls return the recorded status
    ///
    /// # Errors
    /// `MinerError::AllocationError` when both the large-page and the standard
    /// allocation fail.
    pub fn ensure_allocated(&mut self, backend: &B, flags: RxFlags) -> Result<InitStatus, MinerError> {
        if self.dataset.is_none() {
            let (dataset, large_pages) = match backend.alloc_dataset(flags.with_large_pages()) {
                Some(dataset) => (dataset, true),
                None => {
                    log::warn!("Failed to allocate dataset with large pages, falling back");
                    let dataset = backend.alloc_dataset(flags.without_large_pages()).ok_or_else(|| {
                        MinerError::AllocationError("Failed to allocate dataset".into())
                    })?;
                    (dataset, false)
                }
            };
            self.dataset = Some(Arc::new(dataset));
            self.large_pages = large_pages;
        }

        Ok(if self.large_pages {
            InitStatus::Full
        } else {
            InitStatus::NoLargePages
        })
    }

    /// (Re)initialises the dataset from `seed` using `init_threads` threads
    ///
    /// Allocates the dataset first if needed. The caller must make sure no VM
    /// is hashing while this runs.
    ///
    /// # Errors
    /// `MinerError::AllocationError` if the cache (or a first-time dataset)
    /// cannot be allocated. The dataset is left untouched in that case.
    pub fn seed(&mut self, backend: &B, flags: RxFlags, seed: &[u8], init_threads: usize) -> Result<(), MinerError> {
        let mut cache = backend
            .alloc_cache(flags)
            .ok_or_else(|| MinerError::AllocationError("Failed to allocate cache".into()))?;
        self.ensure_allocated(backend, flags)?;
        let Some(dataset) = self.dataset.as_deref() else {
            return Err(MinerError::NotInitialized("Dataset missing after allocation".into()));
        };

        backend.init_cache(&mut cache, seed);

        let ranges = split_items(backend.dataset_item_count(), init_threads);
        log::info!(
            "Initializing {} dataset ({} threads)...",
            backend.name(),
            ranges.len()
        );
        let started = Instant::now();

        if let [(start, count)] = ranges[..] {
            backend.init_dataset(dataset, &cache, start, count);
        } else {
            let cache = &cache;
            std::thread::scope(|scope| {
                for &(start, count) in &ranges {
                    scope.spawn(move || backend.init_dataset(dataset, cache, start, count));
                }
            });
        }

        log::info!("Dataset initialized in {:.2?}", started.elapsed());
        self.seed = Some(seed.to_vec());
        Ok(())
    }
}

impl<B: RandomXBackend> Default for DatasetManager<B> {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits `items` into `threads` contiguous `(start, count)` ranges
///
/// Every range gets `items / threads` items and the last one also takes the
/// remainder. `threads` is clamped to `1..=items`.
pub fn split_items(items: u32, threads: usize) -> Vec<(u32, u32)> {
    let threads = (threads.max(1) as u64).min(items.max(1) as u64) as u32;
    let per_thread = items / threads;
    let remainder = items % threads;

    let mut start = 0;
    (0..threads)
        .map(|i| {
            let count = per_thread + if i == threads - 1 { remainder } else { 0 };
            let range = (start, count);
            start += count;
            range
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::miner::algorithm::mock::MockBackend;

    #[test]
    fn split_even() {
        assert_eq!(split_items(8, 4), vec![(0, 2), (2, 2), (4, 2), (6, 2)]);
    }

    #[test]
    fn split_last_chunk_takes_remainder() {
        assert_eq!(split_items(10, 3), vec![(0, 3), (3, 3), (6, 4)]);
    }

    #[test]
    fn split_clamps_thread_count() {
        assert_eq!(split_items(10, 0), vec![(0, 10)]);
        assert_eq!(split_items(2, 5), vec![(0, 1), (1, 1)]);
    }

    #[test]
    fn split_covers_everything() {
        let ranges = split_items(34_078_719, 7);
        let total: u64 = ranges.iter().map(|&(_, c)| c as u64).sum();
        assert_eq!(total, 34_078_719);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].0 + pair[0].1, pair[1].0, "ranges must be contiguous");
        }
    }

    #[test]
    fn allocation_prefers_large_pages() {
        let backend = MockBackend::new();
        let mut manager = DatasetManager::<MockBackend>::new();
        let status = manager.ensure_allocated(&backend, backend.detect_flags()).unwrap();
        assert_eq!(status, InitStatus::Full);
        assert!(manager.dataset().unwrap().large_pages());
    }

    #[test]
    fn allocation_falls_back_without_large_pages() {
        let backend = MockBackend::new().without_large_pages();
        let mut manager = DatasetManager::<MockBackend>::new();
        let status = manager.ensure_allocated(&backend, backend.detect_flags()).unwrap();
        assert_eq!(status, InitStatus::NoLargePages);
        assert!(!manager.dataset().unwrap().large_pages());
    }

    #[test]
    fn allocation_failure_is_fatal() {
        let backend = MockBackend::new().failing_dataset();
        let mut manager = DatasetManager::<MockBackend>::new();
        let err = manager.ensure_allocated(&backend, backend.detect_flags());
        assert!(matches!(err, Err(MinerError::AllocationError(_))));
        assert!(manager.dataset().is_none());
    }

    #[test]
    fn allocation_happens_once() {
        let backend = MockBackend::new();
        let mut manager = DatasetManager::<MockBackend>::new();
        manager.ensure_allocated(&backend, backend.detect_flags()).unwrap();
        let first = Arc::clone(manager.dataset().unwrap());
        manager.ensure_allocated(&backend, backend.detect_flags()).unwrap();
        assert!(Arc::ptr_eq(&first, manager.dataset().unwrap()));
    }

    #[test]
    fn chunked_init_matches_single_thread() {
        let backend = MockBackend::new().with_items(1000);
        let flags = backend.detect_flags();

        let mut single = DatasetManager::<MockBackend>::new();
        single.seed(&backend, flags, b"epoch seed", 1).unwrap();

        let mut chunked = DatasetManager::<MockBackend>::new();
        chunked.seed(&backend, flags, b"epoch seed", 7).unwrap();

        assert_eq!(
            single.dataset().unwrap().snapshot(),
            chunked.dataset().unwrap().snapshot(),
            "chunking must not change the dataset"
        );
    }

    #[test]
    fn reseed_rebuilds_in_place() {
        let backend = MockBackend::new().with_items(256);
        let flags = backend.detect_flags();
        let mut manager = DatasetManager::<MockBackend>::new();

        manager.seed(&backend, flags, b"first", 4).unwrap();
        let dataset = Arc::clone(manager.dataset().unwrap());
        let first = dataset.snapshot();

        manager.seed(&backend, flags, b"second", 4).unwrap();
        assert!(Arc::ptr_eq(&dataset, manager.dataset().unwrap()), "no reallocation");
        assert_ne!(first, dataset.snapshot());
        assert_eq!(manager.seed_bytes(), Some(&b"second"[..]));
    }

    #[test]
    fn cache_failure_leaves_dataset_untouched() {
        let good = MockBackend::new().with_items(64);
        let mut manager = DatasetManager::<MockBackend>::new();
        manager.seed(&good, good.detect_flags(), b"seed", 2).unwrap();
        let before = manager.dataset().unwrap().snapshot();

        let bad = MockBackend::new().with_items(64).failing_cache();
        let err = manager.seed(&bad, bad.detect_flags(), b"other", 2);
        assert!(matches!(err, Err(MinerError::AllocationError(_))));
        assert_eq!(manager.dataset().unwrap().snapshot(), before);
        assert_eq!(manager.seed_bytes(), Some(&b"seed"[..]));
    }
}
