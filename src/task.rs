//! Per-frame unit of work.
//!
//! A [`Task`] is created by the read loop for each decoded frame. It carries
//! the frame, the frame's read cursor, the connection version it was decoded
//! under, and the handler chain position. Tasks move to whichever thread runs
//! the chain and end by sending a completion to the connection's writer.

use std::sync::Arc;

use log::debug;

use crate::{
    buffer::Buffer,
    connection::{ConnectionContext, ConnectionShared, Completion, WriteHandle},
    error::ConnectionError,
    handler::Outcome,
};

/// Context for one decoded frame.
#[derive(Debug)]
pub struct Task {
    frame: Option<Buffer>,
    cursor: u64,
    version: u64,
    index: usize,
    connection: Arc<ConnectionShared>,
    writer: WriteHandle,
}

impl Task {
    pub(crate) fn new(
        frame: Buffer,
        cursor: u64,
        connection: Arc<ConnectionShared>,
        writer: WriteHandle,
    ) -> Self {
        Self {
            frame: Some(frame),
            cursor,
            version: connection.version(),
            index: 0,
            connection,
            writer,
        }
    }

    /// Position of the frame in the connection's decode order.
    #[must_use]
    pub fn cursor(&self) -> u64 { self.cursor }

    /// Connection version the frame was decoded under.
    #[must_use]
    pub fn version(&self) -> u64 { self.version }

    /// Index of the handler to run next.
    #[must_use]
    pub fn index(&self) -> usize { self.index }

    /// Continue the chain at `index` after the current handler returns.
    pub fn set_index(&mut self, index: usize) { self.index = index; }

    /// Identity of the connection the frame arrived on.
    #[must_use]
    pub fn context(&self) -> &ConnectionContext { self.connection.context() }

    /// Acquire a response buffer from the server's pool.
    #[must_use]
    pub fn allocate(&self, capacity: usize) -> Buffer { self.connection.pool().acquire(capacity) }

    /// Whether the connection has closed or been reset since decoding.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.connection.is_closing() || self.connection.version() != self.version
    }

    pub(crate) fn connection(&self) -> &Arc<ConnectionShared> { &self.connection }

    pub(crate) fn writer(&self) -> &WriteHandle { &self.writer }

    /// Run the chain from the current index.
    ///
    /// Returns the task back when a handler hands off and `allow_handoff` is
    /// set; the caller resumes it elsewhere.
    pub(crate) fn run(mut self, allow_handoff: bool) -> Option<Task> {
        let frame = self.frame.take()?;
        if self.is_stale() {
            debug!(
                "dropping frame for closed connection: id={}, cursor={}",
                self.context().id(),
                self.cursor
            );
            return None;
        }
        let chain = Arc::clone(self.connection.chain());
        match chain.run(frame, &mut self, allow_handoff) {
            Ok(Outcome::Respond(response)) => self.complete(Some(response)),
            Ok(Outcome::Discard) => self.complete(None),
            Ok(Outcome::Handoff(rest)) => {
                self.frame = Some(rest);
                return Some(self);
            }
            Err(error) => {
                self.connection.fail(ConnectionError::Handler(error));
            }
        }
        None
    }

    fn complete(self, response: Option<Buffer>) {
        let completion = Completion {
            cursor: self.cursor,
            version: self.version,
            response,
        };
        if self.writer.send(completion).is_err() {
            debug!(
                "writer already stopped: id={}, cursor={}",
                self.context().id(),
                self.cursor
            );
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{test_support::task_on, *};
    use crate::{
        buffer::BufferPool,
        handler::{Flow, HandlerChain, HandlerError, handler_fn},
    };

    fn connection(chain: HandlerChain) -> Arc<ConnectionShared> {
        Arc::new(ConnectionShared::detached(Arc::new(chain), BufferPool::default()))
    }

    #[test]
    fn completed_task_reports_cursor_and_version() {
        let shared = connection(HandlerChain::new());
        let (task, mut rx) = task_on(&shared, 7, Buffer::from_slice(b"ping"));
        assert!(task.run(false).is_none());
        let completion = rx.try_recv().expect("completion sent");
        assert_eq!(completion.cursor, 7);
        assert_eq!(completion.version, shared.version());
        assert_eq!(
            completion.response.as_ref().map(Buffer::view),
            Some(&b"ping"[..])
        );
    }

    #[test]
    fn handoff_returns_task_with_resume_index() {
        let shared = connection(
            HandlerChain::new()
                .with(handler_fn(|input, _task| Ok(Flow::Handoff(input))))
                .with(handler_fn(|_input, _task| Ok(Flow::Discard))),
        );
        let (task, mut rx) = task_on(&shared, 0, Buffer::from_slice(b"x"));
        let resumed = task.run(true).expect("task handed off");
        assert_eq!(resumed.index(), 1);
        assert!(rx.try_recv().is_err());
        assert!(resumed.run(false).is_none());
        let completion = rx.try_recv().expect("completion sent");
        assert!(completion.response.is_none());
    }

    #[test]
    fn handler_error_closes_connection() {
        let shared = connection(
            HandlerChain::new().with(handler_fn(|_input, _task| Err(HandlerError::from("nope")))),
        );
        let (task, mut rx) = task_on(&shared, 0, Buffer::from_slice(b"x"));
        assert!(task.run(false).is_none());
        assert!(shared.is_closing());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stale_task_is_dropped() {
        let shared = connection(HandlerChain::new());
        let (task, mut rx) = task_on(&shared, 0, Buffer::from_slice(b"x"));
        shared.fail(ConnectionError::HandlerPanicked("reset".into()));
        assert!(task.is_stale());
        assert!(task.run(false).is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn allocate_draws_from_connection_pool() {
        let pool = BufferPool::default();
        let shared = Arc::new(ConnectionShared::detached(
            Arc::new(HandlerChain::new()),
            pool.clone(),
        ));
        let (task, _rx) = task_on(&shared, 0, Buffer::from_slice(b"x"));
        let response = task.allocate(32);
        assert_eq!(pool.stats().acquired, 1);
        drop(response);
        assert_eq!(pool.stats().released, 1);
    }
}
