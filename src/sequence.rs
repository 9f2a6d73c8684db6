//! Monotonic 64-bit position counters shared between threads.
//!
//! A [`Sequence`] records how many units (decoded frames or flushed
//! responses) a pipeline has completed. Each counter sits on its own cache
//! line so readers polling one counter do not contend with writers of a
//! neighbouring field.

use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

/// Cache-padded atomic cursor.
#[derive(Debug, Default)]
pub struct Sequence {
    value: CachePadded<AtomicU64>,
}

impl Sequence {
    /// Create a sequence starting at `initial`.
    #[must_use]
    pub fn new(initial: u64) -> Self {
        Self {
            value: CachePadded::new(AtomicU64::new(initial)),
        }
    }

    /// Current position.
    #[must_use]
    pub fn get(&self) -> u64 { self.value.load(Ordering::Acquire) }

    /// Publish a new position.
    pub fn set(&self, value: u64) { self.value.store(value, Ordering::Release); }

    /// Replace `expected` with `new`, returning whether the swap happened.
    pub fn compare_and_swap(&self, expected: u64, new: u64) -> bool {
        self.value
            .compare_exchange(expected, new, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Advance by `delta` and return the new position.
    pub fn advance(&self, delta: u64) -> u64 {
        self.value.fetch_add(delta, Ordering::AcqRel) + delta
    }
}
