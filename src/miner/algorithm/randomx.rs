// src/miner/algorithm/randomx.rs
//! RandomX backend over the `rust-randomx` bindings
//!
//! `rust-randomx` builds cache and dataset together inside [`Context::new`] and
//! spreads the dataset init over its own threads, so the range-based init of
//! [`RandomXBackend`] collapses here: the chunk starting at item 0 builds the
//! whole context and every other chunk is a no-op.
//!
//! The dataset is an atomically swappable context. A VM creates its hasher as
//! soon as a context exists and rebinds it with [`Hasher::update`] on the first
//! hash after a swap; the underlying VM is never recreated.
//!
//! Limitations of the bindings:
//! - a reseed builds a fresh context while VMs still hold the old one, so peak
//!   memory is two datasets until every VM has rebound
//! - the init thread count is not forwarded
//! - `Context::new` does not report allocation failure

use crate::miner::algorithm::{HASH_SIZE, Hash, RandomXBackend, RxFlags};
use arc_swap::ArcSwapOption;
use rust_randomx::{Context, Hasher};
use std::sync::Arc;

/// Items in a full RandomX dataset
pub const DATASET_ITEM_COUNT: u32 = 34_078_719;

/// RandomX through `rust-randomx`
///
/// The bindings manage huge pages and CPU feature detection themselves, so
/// large-page allocations are reported as unavailable and the engine runs
/// with standard-page flags.
#[derive(Debug, Clone, Copy)]
pub struct RustRandomX {
    /// Full dataset (fast mode) instead of light mode
    fast: bool,
}

/// Seed waiting to be turned into a context
pub struct SeedCache {
    key: Vec<u8>,
}

/// Current RandomX context, swapped on every reseed
pub struct ContextSlot {
    context: ArcSwapOption<Context>,
    fast: bool,
}

/// Per-thread hasher, rebound when the context changes
pub struct RandomXVm {
    dataset: Arc<ContextSlot>,
    hasher: Option<(Arc<Context>, Hasher)>,
}

impl RustRandomX {
    /// Creates a backend
    ///
    /// # Arguments
    /// * `fast` - Enables fast mode when true (~2080 MiB dataset instead of the 256 MiB cache)
    pub fn new(fast: bool) -> Self {
        RustRandomX { fast }
    }
}

impl Default for RustRandomX {
    fn default() -> Self {
        Self::new(true)
    }
}

impl RandomXVm {
    fn bind(dataset: &Arc<ContextSlot>) -> Self {
        let hasher = dataset
            .context
            .load_full()
            .map(|context| (Arc::clone(&context), Hasher::new(context)));
        RandomXVm {
            dataset: Arc::clone(dataset),
            hasher,
        }
    }

    /// Hasher for the current context, or `None` while unseeded
    fn hasher(&mut self) -> Option<&mut Hasher> {
        let current = self.dataset.context.load_full()?;
        match &mut self.hasher {
            Some((bound, hasher)) => {
                if !Arc::ptr_eq(bound, &current) {
                    hasher.update(Arc::clone(&current));
                    *bound = current;
                }
            }
            // VM created before the first seed.
            None => self.hasher = Some((Arc::clone(&current), Hasher::new(current))),
        }
        self.hasher.as_mut().map(|(_, hasher)| hasher)
    }

    /// Whether the VM is bound to a context
    pub fn is_bound(&self) -> bool {
        self.hasher.is_some()
    }
}

fn to_hash(output: impl AsRef<[u8]>) -> Hash {
    let mut hash = [0u8; HASH_SIZE];
    hash.copy_from_slice(output.as_ref());
    hash
}

/// Result for a VM whose dataset was never seeded; fails every difficulty above 1
const UNSEEDED: Hash = [0xFF; HASH_SIZE];

impl RandomXBackend for RustRandomX {
    type Cache = SeedCache;
    type Dataset = ContextSlot;
    type Vm = RandomXVm;

    fn name(&self) -> &'static str {
        "randomx"
    }

    fn detect_flags(&self) -> RxFlags {
        RxFlags {
            large_pages: false,
            hard_aes: cfg!(target_feature = "aes"),
            jit: cfg!(any(target_arch = "x86_64", target_arch = "aarch64")),
            full_mem: self.fast,
            secure: cfg!(target_os = "macos"),
        }
    }

    fn alloc_cache(&self, flags: RxFlags) -> Option<Self::Cache> {
        if flags.large_pages {
            return None;
        }
        Some(SeedCache { key: Vec::new() })
    }

    fn init_cache(&self, cache: &mut Self::Cache, seed: &[u8]) {
        cache.key = seed.to_vec();
    }

    fn alloc_dataset(&self, flags: RxFlags) -> Option<Self::Dataset> {
        if flags.large_pages {
            return None;
        }
        Some(ContextSlot {
            context: ArcSwapOption::empty(),
            fast: self.fast,
        })
    }

    fn dataset_item_count(&self) -> u32 {
        DATASET_ITEM_COUNT
    }

    fn init_dataset(&self, dataset: &Self::Dataset, cache: &Self::Cache, start_item: u32, _item_count: u32) {
        if start_item != 0 {
            return;
        }
        let context = Context::new(&cache.key, dataset.fast);
        dataset.context.store(Some(Arc::new(context)));
    }

    fn create_vm(&self, flags: RxFlags, dataset: &Arc<Self::Dataset>) -> Option<Self::Vm> {
        if flags.large_pages {
            return None;
        }
        Some(RandomXVm::bind(dataset))
    }

    fn calculate_hash(&self, vm: &mut Self::Vm, input: &[u8]) -> Hash {
        match vm.hasher() {
            Some(hasher) => to_hash(hasher.hash(input)),
            None => UNSEEDED,
        }
    }

    fn calculate_hash_first(&self, vm: &mut Self::Vm, input: &[u8]) {
        if let Some(hasher) = vm.hasher() {
            hasher.hash_first(input);
        }
    }

    fn calculate_hash_next(&self, vm: &mut Self::Vm, next_input: &[u8]) -> Hash {
        match vm.hasher() {
            Some(hasher) => to_hash(hasher.hash_next(next_input)),
            None => UNSEEDED,
        }
    }

    fn calculate_hash_last(&self, vm: &mut Self::Vm) -> Hash {
        match vm.hasher() {
            Some(hasher) => to_hash(hasher.hash_last()),
            None => UNSEEDED,
        }
    }
}
