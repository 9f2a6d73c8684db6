//! Backing storage for [`Buffer`](super::Buffer).
//!
//! Two strategies share one contract: heap-resident boxed slices and
//! page-aligned blocks suitable for direct OS I/O.

use std::{
    alloc::{Layout, alloc_zeroed, dealloc},
    fmt,
    ptr::NonNull,
    slice,
};

/// Alignment used for [`StorageKind::Direct`] blocks.
pub const DIRECT_ALIGNMENT: usize = 4096;

/// Storage strategy selected for a buffer or pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StorageKind {
    /// Ordinary heap allocation.
    #[default]
    Heap,
    /// Page-aligned allocation pinned for the lifetime of the block.
    Direct,
}

impl StorageKind {
    pub(crate) const fn index(self) -> usize {
        match self {
            Self::Heap => 0,
            Self::Direct => 1,
        }
    }
}

/// Owned byte storage of a fixed length.
pub(crate) enum Storage {
    Heap(Box<[u8]>),
    Direct(DirectBlock),
}

impl Storage {
    /// Allocate zeroed storage of `len` bytes using `kind`.
    pub(crate) fn allocate(kind: StorageKind, len: usize) -> Self {
        match kind {
            StorageKind::Heap => Self::Heap(vec![0; len].into_boxed_slice()),
            StorageKind::Direct => Self::Direct(DirectBlock::new(len)),
        }
    }

    pub(crate) fn kind(&self) -> StorageKind {
        match self {
            Self::Heap(_) => StorageKind::Heap,
            Self::Direct(_) => StorageKind::Direct,
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Heap(bytes) => bytes.len(),
            Self::Direct(block) => block.len,
        }
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        match self {
            Self::Heap(bytes) => bytes,
            Self::Direct(block) => block.as_slice(),
        }
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Self::Heap(bytes) => bytes,
            Self::Direct(block) => block.as_mut_slice(),
        }
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("kind", &self.kind())
            .field("len", &self.len())
            .finish()
    }
}

/// Page-aligned, zero-initialised allocation.
pub(crate) struct DirectBlock {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: `DirectBlock` uniquely owns its allocation; access is mediated by
// `&`/`&mut` borrows exactly as for `Box<[u8]>`.
unsafe impl Send for DirectBlock {}
// SAFETY: shared references only expose `&[u8]`.
unsafe impl Sync for DirectBlock {}

impl DirectBlock {
    fn layout(len: usize) -> Layout {
        // Zero-length layouts are not allowed by the allocator.
        Layout::from_size_align(len.max(1), DIRECT_ALIGNMENT)
            .unwrap_or_else(|_| std::alloc::handle_alloc_error(Layout::new::<u8>()))
    }

    fn new(len: usize) -> Self {
        let layout = Self::layout(len);
        // SAFETY: the layout has a non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            std::alloc::handle_alloc_error(layout);
        };
        Self { ptr, len }
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` points to `len` initialised bytes owned by `self`.
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: `ptr` points to `len` initialised bytes uniquely owned by `self`.
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for DirectBlock {
    fn drop(&mut self) {
        // SAFETY: `ptr` was allocated in `new` with the same layout.
        unsafe { dealloc(self.ptr.as_ptr(), Self::layout(self.len)) }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(StorageKind::Heap)]
    #[case(StorageKind::Direct)]
    fn allocation_is_zeroed_and_sized(#[case] kind: StorageKind) {
        let storage = Storage::allocate(kind, 128);
        assert_eq!(storage.len(), 128);
        assert_eq!(storage.kind(), kind);
        assert!(storage.as_slice().iter().all(|b| *b == 0));
    }

    #[test]
    fn direct_blocks_are_page_aligned() {
        let storage = Storage::allocate(StorageKind::Direct, 10);
        let addr = storage.as_slice().as_ptr() as usize;
        assert_eq!(addr % DIRECT_ALIGNMENT, 0);
    }

    #[test]
    fn zero_length_direct_block_is_usable() {
        let mut storage = Storage::allocate(StorageKind::Direct, 0);
        assert!(storage.as_mut_slice().is_empty());
    }
}
