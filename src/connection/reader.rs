//! Read pipeline: socket reads, frame decoding, and backpressure.
//!
//! The read loop alternates between decoding every complete frame already
//! buffered and reading more bytes. Before each frame it asks
//! [`ReadAdmission`] for a slot; when the writer has fallen `capacity`
//! frames behind, the loop parks until the writer retires one. In
//! [`WorkMode::SyncWithOrder`] the loop also waits for each response to be
//! written before it decodes the next frame.
//!
//! [`WorkMode::SyncWithOrder`]: crate::dispatch::WorkMode::SyncWithOrder
//!
//! Two deadlines apply to reads. While the buffer holds no partial frame a
//! read may wait up to `wait_timeout`. Once a frame has started arriving,
//! the rest of it must arrive within `read_timeout` of its first bytes.

use std::{sync::Arc, time::Duration};

use log::debug;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    select,
    time::{Instant, timeout_at},
};

use super::{ConnectionShared, WriteHandle};
use crate::{
    backpressure::{Admission, ReadAdmission},
    buffer::Buffer,
    codec::{Decoded, FrameCodec},
    dispatch::Dispatcher,
    error::{ConnectionError, TimeoutPhase},
    metrics::{self, Direction},
    server::ServerConfig,
    task::Task,
};

#[derive(Clone, Copy, Debug)]
pub(crate) struct ReaderSettings {
    pub(crate) read_timeout: Duration,
    pub(crate) wait_timeout: Duration,
    pub(crate) initial_capacity: usize,
}

impl ReaderSettings {
    pub(crate) fn from_config(config: &ServerConfig) -> Self {
        Self {
            read_timeout: config.read_timeout,
            wait_timeout: config.wait_timeout,
            initial_capacity: config.buffers.initial_capacity,
        }
    }
}

enum Step {
    Continue,
    Stop,
}

pub(crate) struct Reader<R> {
    io: R,
    buffer: Buffer,
    admission: ReadAdmission,
    shared: Arc<ConnectionShared>,
    writer: WriteHandle,
    codec: Arc<dyn FrameCodec>,
    dispatcher: Dispatcher,
    settings: ReaderSettings,
    /// Partial-frame deadline, armed by the first bytes of a frame.
    deadline: Option<Instant>,
}

impl<R> Reader<R>
where
    R: AsyncRead + Unpin + Send,
{
    pub(crate) fn new(
        io: R,
        shared: Arc<ConnectionShared>,
        writer: WriteHandle,
        codec: Arc<dyn FrameCodec>,
        dispatcher: Dispatcher,
        settings: ReaderSettings,
    ) -> Self {
        let buffer = shared.pool().acquire(settings.initial_capacity);
        let admission = ReadAdmission::new(Arc::clone(shared.flow()));
        Self {
            io,
            buffer,
            admission,
            shared,
            writer,
            codec,
            dispatcher,
            settings,
            deadline: None,
        }
    }

    /// Read and dispatch frames until EOF, cancellation, or a fatal error.
    ///
    /// Returning drops the read buffer and this side's completion sender,
    /// which lets the writer drain and finish.
    pub(crate) async fn run(mut self) {
        loop {
            let step = match self.decode_buffered().await {
                Ok(Step::Continue) => self.fill().await,
                other => other,
            };
            match step {
                Ok(Step::Continue) => {}
                Ok(Step::Stop) => return,
                Err(error) => {
                    self.shared.fail(error);
                    return;
                }
            }
        }
    }

    async fn decode_buffered(&mut self) -> Result<Step, ConnectionError> {
        while !self.buffer.is_empty() {
            if self.shared.is_closing() {
                return Ok(Step::Stop);
            }
            let cursor = match self.admission.try_admit() {
                Admission::Open(cursor) => cursor,
                Admission::Suspended => {
                    if self.park().await {
                        continue;
                    }
                    return Ok(Step::Stop);
                }
            };
            match self.codec.decode(&mut self.buffer)? {
                Decoded::Frame(frame) => {
                    self.admission.commit(cursor);
                    self.deadline = None;
                    metrics::inc_frames(Direction::Inbound);
                    let task = Task::new(frame, cursor, Arc::clone(&self.shared), self.writer.clone());
                    self.dispatcher.dispatch(task).await;
                    if self.dispatcher.writes_before_next_decode() && !self.await_flush(cursor).await {
                        return Ok(Step::Stop);
                    }
                }
                Decoded::NeedMore => break,
                Decoded::NeedCapacity(needed) => {
                    self.buffer.compact();
                    self.buffer.ensure_capacity(needed);
                    break;
                }
            }
        }
        if self.buffer.is_empty() {
            self.buffer.clear();
            self.deadline = None;
        } else if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.settings.read_timeout);
        }
        Ok(Step::Continue)
    }

    /// Wait for the writer to retire a slot. Returns `false` on cancellation.
    async fn park(&self) -> bool {
        metrics::inc_backpressure_suspensions();
        let flow = self.admission.flow();
        debug!(
            "read suspended by backpressure: id={}, read_cursor={}, write_cursor={}",
            self.shared.context().id(),
            flow.read_cursor(),
            flow.write_cursor()
        );
        select! {
            biased;

            () = self.shared.cancelled() => false,
            () = flow.resumed() => true,
        }
    }

    /// Wait for the response to `cursor` to be written. Returns `false` if
    /// the connection closes first.
    async fn await_flush(&self, cursor: u64) -> bool {
        select! {
            biased;

            () = self.shared.cancelled() => false,
            () = self.shared.flow().flushed_past(cursor) => true,
        }
    }

        async fn fill(&mut self) -> Result<Step, ConnectionError> {
        if self.buffer.remaining_writable() == 0 {
            if self.buffer.read_cursor() > 0 {
                self.buffer.compact();
            } else {
                let grown = self.buffer.capacity() + 1;
                self.buffer.ensure_capacity(grown);
            }
        }
        let (deadline, phase) = match self.deadline {
            Some(deadline) => (deadline, TimeoutPhase::PartialFrame),
            None => (Instant::now() + self.settings.wait_timeout, TimeoutPhase::Idle),
        };
        let read = select! {
            biased;

            () = self.shared.cancelled() => return Ok(Step::Stop),
            read = timeout_at(deadline, self.io.read(self.buffer.spare_mut())) => read,
        };
        match read {
            Err(_elapsed) => Err(ConnectionError::ReadTimeout { phase }),
            Ok(Ok(0)) => {
                debug!(
                    "peer closed connection: id={}, unread_bytes={}",
                    self.shared.context().id(),
                    self.buffer.remaining_readable()
                );
                Ok(Step::Stop)
            }
            Ok(Ok(n)) => {
                self.buffer.advance_write(n);
                Ok(Step::Continue)
            }
            Ok(Err(error)) => Err(error.into()),
        }
    }
}
