//! Write pipeline: restores decode order and flushes responses.
//!
//! Completed tasks arrive over an unbounded channel in whatever order their
//! handlers finished. In ordered work modes each completion is parked in the
//! slot for `cursor % capacity` and released only once every earlier cursor
//! has been released. In unordered mode completions are written as they
//! arrive. After each socket write the number of retired completions is
//! published to the read side's backpressure cursor.

use std::{collections::VecDeque, sync::Arc};

use log::debug;
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    select,
    sync::mpsc,
};

use super::ConnectionShared;
use crate::{
    buffer::Buffer,
    codec::FrameCodec,
    error::ConnectionError,
    metrics::{self, Direction},
    server::ServerConfig,
};

/// How responses are grouped into socket writes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriteMode {
    /// One write call per response.
    Single,
    /// Coalesce up to `max_batch_writes` ready responses per write call.
    #[default]
    Batch,
}

/// A finished task, as seen by the writer.
#[derive(Debug)]
pub(crate) struct Completion {
    pub(crate) cursor: u64,
    pub(crate) version: u64,
    /// `None` when the chain discarded the frame; the slot still retires.
    pub(crate) response: Option<Buffer>,
}

/// Sending side of a connection's completion channel.
pub(crate) type WriteHandle = mpsc::UnboundedSender<Completion>;

#[derive(Clone, Copy, Debug)]
pub(crate) struct WriterSettings {
    pub(crate) mode: WriteMode,
    pub(crate) max_batch_writes: usize,
    pub(crate) ordered: bool,
    pub(crate) capacity: usize,
    pub(crate) initial_capacity: usize,
}

impl WriterSettings {
    pub(crate) fn from_config(config: &ServerConfig) -> Self {
        Self {
            mode: config.write_mode,
            max_batch_writes: config.max_batch_writes.max(1),
            ordered: config.work_mode.is_ordered(),
            capacity: config.ring_capacity.max(1),
            initial_capacity: config.buffers.initial_capacity,
        }
    }

    fn responses_per_write(&self) -> usize {
        match self.mode {
            WriteMode::Single => 1,
            WriteMode::Batch => self.max_batch_writes,
        }
    }
}

pub(crate) struct Writer<W> {
    io: W,
    rx: mpsc::UnboundedReceiver<Completion>,
    shared: Arc<ConnectionShared>,
    codec: Arc<dyn FrameCodec>,
    settings: WriterSettings,
    slots: Vec<Option<Completion>>,
    next: u64,
    ready: VecDeque<Completion>,
    out: Buffer,
}

impl<W> Writer<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub(crate) fn new(
        io: W,
        rx: mpsc::UnboundedReceiver<Completion>,
        shared: Arc<ConnectionShared>,
        codec: Arc<dyn FrameCodec>,
        settings: WriterSettings,
    ) -> Self {
        let slots = if settings.ordered {
            std::iter::repeat_with(|| None).take(settings.capacity).collect()
        } else {
            Vec::new()
        };
        let out = shared.pool().acquire(settings.initial_capacity);
        Self {
            io,
            rx,
            shared,
            codec,
            settings,
            slots,
            next: 0,
            ready: VecDeque::new(),
            out,
        }
    }

    /// Write responses until every completion sender is gone or the
    /// connection is cancelled.
    pub(crate) async fn run(mut self) {
        loop {
            let received = select! {
                biased;

                () = self.shared.cancelled() => return,
                completion = self.rx.recv() => completion,
            };
            let Some(completion) = received else { break };
            self.accept(completion);
            if self.settings.mode == WriteMode::Batch {
                while self.ready.len() < self.settings.max_batch_writes {
                    match self.rx.try_recv() {
                        Ok(completion) => self.accept(completion),
                        Err(_) => break,
                    }
                }
            }
            if let Err(error) = self.flush().await {
                self.shared.fail(error);
                return;
            }
        }
        if let Err(error) = self.io.shutdown().await {
            debug!(
                "write half shutdown failed: id={}, error={error}",
                self.shared.context().id()
            );
        }
    }

    fn accept(&mut self, completion: Completion) {
        if completion.version != self.shared.version() {
            debug!(
                "discarding stale completion: id={}, cursor={}, version={}",
                self.shared.context().id(),
                completion.cursor,
                completion.version
            );
            return;
        }
        if !self.settings.ordered {
            self.ready.push_back(completion);
            return;
        }
        let slot = self.slot_of(completion.cursor);
        debug_assert!(self.slots[slot].is_none(), "slot reused before release");
        self.slots[slot] = Some(completion);
        loop {
            let slot = self.slot_of(self.next);
            let Some(completion) = self.slots[slot].take() else {
                break;
            };
            debug_assert_eq!(completion.cursor, self.next, "slot holds a foreign cursor");
            self.next += 1;
            self.ready.push_back(completion);
        }
    }

    #[expect(clippy::cast_possible_truncation, reason = "remainder is below slots.len()")]
    fn slot_of(&self, cursor: u64) -> usize { (cursor % self.slots.len() as u64) as usize }

    async fn flush(&mut self) -> Result<(), ConnectionError> {
        let limit = self.settings.responses_per_write();
        while !self.ready.is_empty() {
            if self.shared.is_closing() {
                return Ok(());
            }
            let mut retired = 0;
            let mut responses = 0;
            while responses < limit
                && let Some(completion) = self.ready.pop_front()
            {
                retired += 1;
                if let Some(response) = completion.response {
                    self.codec.encode(response.view(), &mut self.out)?;
                    responses += 1;
                }
            }
            if !self.out.is_empty() {
                self.io.write_all(self.out.view()).await?;
                self.io.flush().await?;
                self.out.clear();
                metrics::inc_frames_by(Direction::Outbound, responses);
            }
            self.shared.flow().retire(retired);
        }
        Ok(())
    }
}
