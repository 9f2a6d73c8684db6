//! Read-side backpressure against the write pipeline.
//!
//! The read loop may run at most `capacity` frames ahead of the last
//! flushed response. When it reaches that bound it flips the shared state to
//! [`ReadState::OutOfRead`] and suspends; the writer, after retiring a slot,
//! flips it back with a compare-and-swap and wakes the reader. Both sides
//! re-check after publishing their half of the handshake, so no interleaving
//! loses a wakeup.

use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

use crossbeam_utils::CachePadded;
use tokio::sync::Notify;

use crate::sequence::Sequence;

const IN_READ: u8 = 1;
const OUT_OF_READ: u8 = 2;

/// Whether the read loop is running or parked on backpressure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadState {
    /// The read loop is decoding frames.
    InRead,
    /// The read loop is parked until the writer retires a slot.
    OutOfRead,
}

/// Cursors and read state shared by one connection's read and write sides.
#[derive(Debug)]
pub struct FlowControl {
    read: Sequence,
    write: Sequence,
    state: CachePadded<AtomicU8>,
    capacity: u64,
    resume: Notify,
    flushed: Notify,
}

impl FlowControl {
    /// Create flow control allowing `capacity` unflushed frames.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            read: Sequence::new(0),
            write: Sequence::new(0),
            state: CachePadded::new(AtomicU8::new(IN_READ)),
            capacity: capacity.max(1) as u64,
            resume: Notify::new(),
            flushed: Notify::new(),
        }
    }

    /// Frames decoded so far.
    #[must_use]
    pub fn read_cursor(&self) -> u64 { self.read.get() }

    /// Responses retired so far.
    #[must_use]
    pub fn write_cursor(&self) -> u64 { self.write.get() }

    /// Number of frames the reader may run ahead of the writer.
    #[must_use]
    pub fn capacity(&self) -> u64 { self.capacity }

    /// Current read state.
    #[must_use]
    pub fn state(&self) -> ReadState {
        match self.state.load(Ordering::Acquire) {
            OUT_OF_READ => ReadState::OutOfRead,
            _ => ReadState::InRead,
        }
    }

    /// Record `count` retired slots and resume a parked reader.
    ///
    /// Returns `true` if this call woke the reader.
    pub fn retire(&self, count: u64) -> bool {
        self.write.advance(count);
        self.flushed.notify_one();
        self.wake_reader()
    }

    /// Flip a parked reader back to [`ReadState::InRead`] and notify it.
    pub fn wake_reader(&self) -> bool {
        if self.state.load(Ordering::Acquire) == OUT_OF_READ && self.cas_state(OUT_OF_READ, IN_READ)
        {
            self.resume.notify_one();
            return true;
        }
        false
    }

    /// Wait until a writer resumes the reader.
    ///
    /// Only call after [`ReadAdmission::try_admit`] returned
    /// [`Admission::Suspended`].
    pub async fn resumed(&self) { self.resume.notified().await; }

    /// Wait until the write cursor moves past `cursor`.
    ///
    /// Wakeups may be spurious; a retire that lands before the wait starts
    /// leaves a permit, so none is lost.
    pub async fn flushed_past(&self, cursor: u64) {
        while self.write.get() <= cursor {
            self.flushed.notified().await;
        }
    }

    fn cas_state(&self, from: u8, to: u8) -> bool {
        self.state
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn wrap_point(&self) -> u64 { self.write.get() + self.capacity }
}

/// Outcome of asking for the next read slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// The reader may decode the frame at this cursor.
    Open(u64),
    /// The reader must wait for [`FlowControl::resumed`].
    Suspended,
}

/// Reader half of the handshake; owned by the read loop.
#[derive(Debug)]
pub struct ReadAdmission {
    flow: Arc<FlowControl>,
    wrap_point: u64,
}

impl ReadAdmission {
    /// Attach to shared flow control.
    #[must_use]
    pub fn new(flow: Arc<FlowControl>) -> Self {
        Self {
            flow,
            wrap_point: 0,
        }
    }

    /// Shared flow control.
    #[must_use]
    pub fn flow(&self) -> &Arc<FlowControl> { &self.flow }

    /// Check whether the next frame may be decoded.
    pub fn try_admit(&mut self) -> Admission {
        let cursor = self.flow.read.get();
        if cursor < self.wrap_point {
            return Admission::Open(cursor);
        }
        self.wrap_point = self.flow.wrap_point();
        if cursor < self.wrap_point {
            return Admission::Open(cursor);
        }
        // The writer may retire every slot and go idle between the check
        // above and this store, so the check must be repeated after it.
        self.flow.state.store(OUT_OF_READ, Ordering::Release);
        self.wrap_point = self.flow.wrap_point();
        if cursor < self.wrap_point && self.flow.cas_state(OUT_OF_READ, IN_READ) {
            return Admission::Open(cursor);
        }
        Admission::Suspended
    }

    /// Mark the frame at `cursor` as decoded.
    pub fn commit(&self, cursor: u64) { self.flow.read.set(cursor + 1); }
}
