//! Size-classed storage pools shared by every connection.
//!
//! A pool keeps one lock-free [`ArrayQueue`] per storage strategy and per
//! power-of-two size class. Buffers hold a handle to the pool they came from
//! and return their storage to it when dropped.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use crossbeam_queue::ArrayQueue;

use super::{
    Buffer,
    storage::{Storage, StorageKind},
};

/// Sizing for a [`BufferPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Storage strategy used by [`BufferPool::acquire`].
    pub storage: StorageKind,
    /// Smallest size class in bytes. Must be a power of two.
    pub min_class: usize,
    /// Largest pooled size class in bytes. Larger requests bypass the pool.
    pub max_class: usize,
    /// Number of idle blocks retained per class and strategy.
    pub max_per_class: usize,
    /// Capacity of each connection's read buffer.
    pub initial_capacity: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            storage: StorageKind::Heap,
            min_class: 256,
            max_class: 64 * 1024,
            max_per_class: 256,
            initial_capacity: 1024,
        }
    }
}

/// Counters describing pool traffic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers handed out.
    pub acquired: u64,
    /// Buffers returned, pooled or not.
    pub released: u64,
    /// Fresh allocations made because no idle block was available.
    pub allocated: u64,
    /// Acquisitions served from an idle block.
    pub reused: u64,
}

impl PoolStats {
    /// Number of buffers currently outstanding.
    ///
    /// `None` means more releases than acquisitions were counted, which only
    /// a double release can cause.
    #[must_use]
    pub fn outstanding(&self) -> Option<u64> { self.acquired.checked_sub(self.released) }
}

#[derive(Default)]
struct Counters {
    acquired: AtomicU64,
    released: AtomicU64,
    allocated: AtomicU64,
    reused: AtomicU64,
}

struct PoolInner {
    config: BufferPoolConfig,
    // Indexed by `StorageKind::index`, then by size class.
    classes: [Vec<ArrayQueue<Storage>>; 2],
    counters: Counters,
}

/// Cloneable handle to a shared storage pool.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl Default for BufferPool {
    fn default() -> Self { Self::new(BufferPoolConfig::default()) }
}

impl BufferPool {
    /// Build a pool. Class bounds are rounded up to powers of two.
    #[must_use]
    pub fn new(config: BufferPoolConfig) -> Self {
        let min_class = config.min_class.max(1).next_power_of_two();
        let max_class = config.max_class.max(min_class).next_power_of_two();
        let config = BufferPoolConfig {
            min_class,
            max_class,
            max_per_class: config.max_per_class.max(1),
            ..config
        };
        let class_count = (max_class.trailing_zeros() - min_class.trailing_zeros() + 1) as usize;
        let make = || {
            (0..class_count)
                .map(|_| ArrayQueue::new(config.max_per_class))
                .collect::<Vec<_>>()
        };
        Self {
            inner: Arc::new(PoolInner {
                config,
                classes: [make(), make()],
                counters: Counters::default(),
            }),
        }
    }

    /// Configuration in effect after normalisation.
    #[must_use]
    pub fn config(&self) -> &BufferPoolConfig { &self.inner.config }

    /// Acquire a buffer of at least `capacity` bytes using the pool's
    /// default storage strategy.
    #[must_use]
    pub fn acquire(&self, capacity: usize) -> Buffer {
        self.acquire_with(self.inner.config.storage, capacity)
    }

    /// Acquire a buffer of at least `capacity` bytes using `kind` storage.
    #[must_use]
    pub fn acquire_with(&self, kind: StorageKind, capacity: usize) -> Buffer {
        let storage = self.take_storage(kind, capacity);
        self.inner.counters.acquired.fetch_add(1, Ordering::Relaxed);
        Buffer::from_parts(storage, Some(self.clone()))
    }

    /// Snapshot of the traffic counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let c = &self.inner.counters;
        PoolStats {
            acquired: c.acquired.load(Ordering::Relaxed),
            released: c.released.load(Ordering::Relaxed),
            allocated: c.allocated.load(Ordering::Relaxed),
            reused: c.reused.load(Ordering::Relaxed),
        }
    }

    /// Number of idle blocks held for `kind` across all classes.
    #[must_use]
    pub fn idle(&self, kind: StorageKind) -> usize {
        self.inner.classes[kind.index()]
            .iter()
            .map(ArrayQueue::len)
            .sum()
    }

    /// Storage for a buffer that is growing; does not count as an acquire.
    pub(crate) fn take_storage(&self, kind: StorageKind, capacity: usize) -> Storage {
        let Some(class) = self.class_of(capacity) else {
            self.inner.counters.allocated.fetch_add(1, Ordering::Relaxed);
            return Storage::allocate(kind, capacity);
        };
        if let Some(storage) = self.inner.classes[kind.index()][class].pop() {
            self.inner.counters.reused.fetch_add(1, Ordering::Relaxed);
            return storage;
        }
        self.inner.counters.allocated.fetch_add(1, Ordering::Relaxed);
        Storage::allocate(kind, self.inner.config.min_class << class)
    }

    /// Return storage displaced by growth.
    pub(crate) fn recycle(&self, storage: Storage) {
        let len = storage.len();
        // Only exact class sizes go back; other blocks were allocated
        // outside the class range.
        let Some(class) = self.class_of(len) else {
            return;
        };
        if self.inner.config.min_class << class != len {
            return;
        }
        // A full queue simply drops the block.
        let _ = self.inner.classes[storage.kind().index()][class].push(storage);
    }

    /// Return the storage of a buffer being released.
    pub(crate) fn release(&self, storage: Storage) {
        self.inner.counters.released.fetch_add(1, Ordering::Relaxed);
        self.recycle(storage);
    }

    fn class_of(&self, capacity: usize) -> Option<usize> {
        let config = &self.inner.config;
        let size = capacity.max(config.min_class).checked_next_power_of_two()?;
        if size > config.max_class {
            return None;
        }
        Some((size.trailing_zeros() - config.min_class.trailing_zeros()) as usize)
    }
}
