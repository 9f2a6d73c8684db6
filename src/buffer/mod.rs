//! Growable byte buffer with independent read and write cursors.
//!
//! [`Buffer`] is the substrate for all connection I/O: socket reads land in
//! its writable region, frame decoders consume its readable region, and
//! responses are encoded into it before being flushed. Storage comes from a
//! [`BufferPool`] (or a private allocation) and goes back to that pool when
//! the buffer is dropped.
//!
//! The cursors always satisfy `0 <= read_cursor <= write_cursor <= capacity`.
//! Fixed-width reads and writes come from the [`bytes::Buf`] and
//! [`bytes::BufMut`] implementations; writes grow the storage on demand.

mod pool;
mod storage;
#[cfg(test)]
mod tests;
mod varint;

use std::fmt;

use bytes::{Buf, BufMut, buf::UninitSlice};
pub use pool::{BufferPool, BufferPoolConfig, PoolStats};
pub use storage::{DIRECT_ALIGNMENT, StorageKind};
use storage::Storage;
pub use varint::{MAX_VARINT_LEN, VarintError, encoded_len as varint_len};

/// Growth headroom used when a write finds no writable space at all.
const MIN_GROWTH: usize = 64;

/// Byte container with read/write cursors, marks, and pooled storage.
pub struct Buffer {
    storage: Storage,
    read: usize,
    write: usize,
    read_mark: Option<usize>,
    write_mark: Option<usize>,
    pool: Option<BufferPool>,
}

impl Buffer {
    pub(crate) fn from_parts(storage: Storage, pool: Option<BufferPool>) -> Self {
        Self {
            storage,
            read: 0,
            write: 0,
            read_mark: None,
            write_mark: None,
            pool,
        }
    }

    /// Allocate an unpooled heap buffer.
    #[must_use]
    pub fn heap(capacity: usize) -> Self {
        Self::from_parts(Storage::allocate(StorageKind::Heap, capacity), None)
    }

    /// Allocate an unpooled, page-aligned buffer for direct I/O.
    #[must_use]
    pub fn direct(capacity: usize) -> Self {
        Self::from_parts(Storage::allocate(StorageKind::Direct, capacity), None)
    }

    /// Copy `bytes` into a new unpooled heap buffer.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Self {
        let mut buf = Self::heap(bytes.len());
        buf.put_slice(bytes);
        buf
    }

    /// Total bytes of backing storage.
    #[must_use]
    pub fn capacity(&self) -> usize { self.storage.len() }

    /// Storage strategy backing this buffer.
    #[must_use]
    pub fn storage_kind(&self) -> StorageKind { self.storage.kind() }

    /// Offset of the next byte to read.
    #[must_use]
    pub fn read_cursor(&self) -> usize { self.read }

    /// Offset of the next byte to write.
    #[must_use]
    pub fn write_cursor(&self) -> usize { self.write }

    /// Bytes between the read and write cursors.
    #[must_use]
    pub fn remaining_readable(&self) -> usize { self.write - self.read }

    /// Bytes between the write cursor and the end of storage.
    #[must_use]
    pub fn remaining_writable(&self) -> usize { self.capacity() - self.write }

    /// Returns `true` when nothing is left to read.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.read == self.write }

    /// Move the read cursor to an absolute offset.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is past the write cursor.
    pub fn set_read_cursor(&mut self, offset: usize) {
        assert!(offset <= self.write, "read cursor {offset} past write cursor {}", self.write);
        self.read = offset;
    }

    /// Move the write cursor to an absolute offset.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is before the read cursor or past capacity.
    pub fn set_write_cursor(&mut self, offset: usize) {
        assert!(
            self.read <= offset && offset <= self.capacity(),
            "write cursor {offset} outside [{}, {}]",
            self.read,
            self.capacity()
        );
        self.write = offset;
    }

    /// Grow storage so that `capacity() >= needed`.
    ///
    /// Growth at least doubles the current capacity. Content and cursors are
    /// preserved; storage never shrinks.
    pub fn ensure_capacity(&mut self, needed: usize) -> &mut Self {
        if self.capacity() < needed {
            self.grow(needed.max(self.capacity().saturating_mul(2)));
        }
        self
    }

    fn grow(&mut self, target: usize) {
        let kind = self.storage.kind();
        let mut next = match &self.pool {
            Some(pool) => pool.take_storage(kind, target),
            None => Storage::allocate(kind, target),
        };
        next.as_mut_slice()[..self.write].copy_from_slice(&self.storage.as_slice()[..self.write]);
        let old = std::mem::replace(&mut self.storage, next);
        if let Some(pool) = &self.pool {
            pool.recycle(old);
        }
    }

    /// Move the unread bytes to offset zero.
    ///
    /// Afterwards `read_cursor() == 0` and `write_cursor()` equals the
    /// previous readable length. Marks are discarded.
    pub fn compact(&mut self) -> &mut Self {
        if self.read > 0 {
            self.storage.as_mut_slice().copy_within(self.read..self.write, 0);
            self.write -= self.read;
            self.read = 0;
        }
        self.read_mark = None;
        self.write_mark = None;
        self
    }

    /// Reset both cursors and marks without touching storage.
    pub fn clear(&mut self) -> &mut Self {
        self.read = 0;
        self.write = 0;
        self.read_mark = None;
        self.write_mark = None;
        self
    }

    /// Remember the current read cursor.
    pub fn mark_read(&mut self) -> &mut Self {
        self.read_mark = Some(self.read);
        self
    }

    /// Return the read cursor to the last mark, if any.
    pub fn reset_read(&mut self) -> &mut Self {
        if let Some(mark) = self.read_mark {
            self.read = mark.min(self.write);
        }
        self
    }

    /// Remember the current write cursor.
    pub fn mark_write(&mut self) -> &mut Self {
        self.write_mark = Some(self.write);
        self
    }

    /// Return the write cursor to the last mark, if any.
    pub fn reset_write(&mut self) -> &mut Self {
        if let Some(mark) = self.write_mark {
            self.write = mark.clamp(self.read, self.capacity());
        }
        self
    }

    /// Read-only view of `[read_cursor, write_cursor)`.
    #[must_use]
    pub fn view(&self) -> &[u8] { &self.storage.as_slice()[self.read..self.write] }

    /// Mutable view of the writable region `[write_cursor, capacity)`.
    ///
    /// Fill it (for example from a socket) and then call
    /// [`advance_write`](Self::advance_write).
    pub fn spare_mut(&mut self) -> &mut [u8] {
        let write = self.write;
        &mut self.storage.as_mut_slice()[write..]
    }

    /// Commit `n` bytes written through [`spare_mut`](Self::spare_mut).
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the writable region.
    pub fn advance_write(&mut self, n: usize) {
        assert!(n <= self.remaining_writable(), "advance_write past capacity");
        self.write += n;
    }

    /// Byte at absolute offset `index`, ignoring cursors.
    #[must_use]
    pub fn get_at(&self, index: usize) -> Option<u8> {
        self.storage.as_slice()[..self.write].get(index).copied()
    }

    /// Move the next `len` readable bytes into a new buffer from the same
    /// pool, advancing the read cursor.
    ///
    /// # Panics
    ///
    /// Panics if fewer than `len` bytes are readable.
    #[must_use]
    pub fn split_frame(&mut self, len: usize) -> Buffer {
        assert!(len <= self.remaining_readable(), "split_frame past write cursor");
        let mut frame = match &self.pool {
            Some(pool) => pool.acquire_with(self.storage_kind(), len),
            None => Buffer::heap(len),
        };
        frame.put_slice(&self.storage.as_slice()[self.read..self.read + len]);
        self.read += len;
        frame
    }

    /// Offset of the first occurrence of `pattern` in the readable region.
    #[must_use]
    pub fn index_of(&self, pattern: &[u8]) -> Option<usize> {
        if pattern.is_empty() {
            return Some(self.read);
        }
        self.view()
            .windows(pattern.len())
            .position(|window| window == pattern)
            .map(|pos| pos + self.read)
    }

    /// Lower-case hex rendering of the readable region.
    #[must_use]
    pub fn hex(&self) -> String {
        use std::fmt::Write as _;
        self.view().iter().fold(String::with_capacity(self.remaining_readable() * 2), |mut s, b| {
            let _ = write!(s, "{b:02x}");
            s
        })
    }

    /// Append `value` as an unsigned varint.
    pub fn put_varint_u64(&mut self, value: u64) -> &mut Self {
        let mut out = [0; MAX_VARINT_LEN];
        let len = varint::encode(value, &mut out);
        self.put_slice(&out[..len]);
        self
    }

    /// Append `value` as an unsigned varint.
    pub fn put_varint_u32(&mut self, value: u32) -> &mut Self {
        self.put_varint_u64(u64::from(value))
    }

    /// Append `value` as a zig-zag varint.
    pub fn put_varint_i64(&mut self, value: i64) -> &mut Self {
        self.put_varint_u64(varint::zigzag(value))
    }

    /// Decode a varint at the read cursor without consuming it.
    ///
    /// Returns the value and its encoded length.
    ///
    /// # Errors
    ///
    /// Returns [`VarintError::Incomplete`] when the readable bytes end
    /// mid-value and [`VarintError::Overflow`] for encodings wider than 64 bits.
    pub fn peek_varint(&self) -> Result<(u64, usize), VarintError> { varint::decode(self.view()) }

    /// Read an unsigned varint, advancing the read cursor.
    ///
    /// # Errors
    ///
    /// See [`peek_varint`](Self::peek_varint). The cursor is left untouched
    /// on error.
    pub fn get_varint_u64(&mut self) -> Result<u64, VarintError> {
        let (value, len) = self.peek_varint()?;
        self.read += len;
        Ok(value)
    }

    /// Read an unsigned varint that must fit in `u32`.
    ///
    /// # Errors
    ///
    /// Returns [`VarintError::Overflow`] when the value exceeds `u32::MAX`.
    pub fn get_varint_u32(&mut self) -> Result<u32, VarintError> {
        let (value, len) = self.peek_varint()?;
        let value = u32::try_from(value).map_err(|_| VarintError::Overflow)?;
        self.read += len;
        Ok(value)
    }

    /// Read a zig-zag varint.
    ///
    /// # Errors
    ///
    /// See [`peek_varint`](Self::peek_varint).
    pub fn get_varint_i64(&mut self) -> Result<i64, VarintError> {
        self.get_varint_u64().map(varint::unzigzag)
    }

    /// Return the buffer to its pool. Equivalent to dropping it.
    pub fn release(self) {}
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            let storage = std::mem::replace(&mut self.storage, Storage::Heap(Box::default()));
            pool.release(storage);
        }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("read_cursor", &self.read)
            .field("write_cursor", &self.write)
            .field("capacity", &self.capacity())
            .field("storage", &self.storage_kind())
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool { self.view() == other.view() }
}

impl Eq for Buffer {}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] { self.view() }
}

impl Buf for Buffer {
    fn remaining(&self) -> usize { self.remaining_readable() }

    fn chunk(&self) -> &[u8] { self.view() }

    fn advance(&mut self, cnt: usize) {
        assert!(cnt <= self.remaining_readable(), "advance past write cursor");
        self.read += cnt;
    }
}

// SAFETY: `chunk_mut` exposes only `[write, capacity)` of initialised
// storage, and `advance_mut` never moves the write cursor past capacity.
unsafe impl BufMut for Buffer {
    fn remaining_mut(&self) -> usize { isize::MAX as usize - self.write }

    unsafe fn advance_mut(&mut self, cnt: usize) { self.advance_write(cnt); }

    fn chunk_mut(&mut self) -> &mut UninitSlice {
        if self.remaining_writable() == 0 {
            self.ensure_capacity(self.capacity() + MIN_GROWTH);
        }
        UninitSlice::new(self.spare_mut())
    }

    fn put_slice(&mut self, src: &[u8]) {
        self.ensure_capacity(self.write + src.len());
        let write = self.write;
        self.storage.as_mut_slice()[write..write + src.len()].copy_from_slice(src);
        self.write += src.len();
    }
}
