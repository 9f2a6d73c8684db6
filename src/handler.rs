//! Handler chain run against every decoded frame.
//!
//! A [`HandlerChain`] is an immutable, ordered list of [`Handler`]s shared by
//! all frames of a connection. Each handler receives the previous handler's
//! output and the frame's [`Task`], and returns a [`Flow`] telling the chain
//! what to do next. The chain's position is stored on the task, so work
//! handed off to another thread resumes at the right handler.

use std::{error::Error as StdError, fmt, io};

use thiserror::Error;

use crate::{buffer::Buffer, connection::ConnectionContext, error::ConnectionError, task::Task};

/// Error returned by a handler. Terminates the chain and the connection.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct HandlerError(Box<dyn StdError + Send + Sync + 'static>);

impl HandlerError {
    /// Wrap any error or message.
    pub fn new(error: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self(error.into())
    }

    /// Borrow the wrapped error.
    #[must_use]
    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) { self.0.as_ref() }
}

impl From<io::Error> for HandlerError {
    fn from(error: io::Error) -> Self { Self::new(error) }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self { Self::new(message) }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self { Self::new(message) }
}

/// What a handler wants the chain to do with its output.
#[derive(Debug)]
pub enum Flow {
    /// Pass the buffer to the next handler. After the last handler it is
    /// written back to the peer.
    Next(Buffer),
    /// Skip the remaining handlers and write the buffer back.
    Write(Buffer),
    /// Continue with the remaining handlers off the reading task.
    ///
    /// Only honoured in mixed mode; elsewhere it behaves like [`Flow::Next`].
    Handoff(Buffer),
    /// Stop here and send nothing for this frame.
    Discard,
}

/// A single processing step.
///
/// Closures of the form `Fn(Buffer, &mut Task) -> Result<Flow, HandlerError>`
/// implement this trait; [`handler_fn`] helps the compiler infer their
/// signature.
///
/// ```
/// use ringframe::handler::{Flow, HandlerChain, handler_fn};
///
/// let chain = HandlerChain::new().with(handler_fn(|input, _task| Ok(Flow::Next(input))));
/// assert_eq!(chain.len(), 1);
/// ```
pub trait Handler: Send + Sync + 'static {
    /// Process `input` for the frame described by `task`.
    ///
    /// A handler may jump elsewhere in the chain with [`Task::set_index`];
    /// otherwise the chain moves to the next handler.
    ///
    /// # Errors
    ///
    /// Any error ends processing of the frame and closes the connection.
    fn handle(&self, input: Buffer, task: &mut Task) -> Result<Flow, HandlerError>;

    /// Observe a fatal connection error. Called at most once per connection.
    fn catch_error(&self, _error: &ConnectionError, _context: &ConnectionContext) {}
}

impl<F> Handler for F
where
    F: Fn(Buffer, &mut Task) -> Result<Flow, HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, input: Buffer, task: &mut Task) -> Result<Flow, HandlerError> {
        self(input, task)
    }
}

/// Pin a closure to the [`Handler`] signature.
pub fn handler_fn<F>(f: F) -> F
where
    F: Fn(Buffer, &mut Task) -> Result<Flow, HandlerError> + Send + Sync + 'static,
{
    f
}

/// Where a chain run stopped.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// Write this buffer back.
    Respond(Buffer),
    /// Nothing to write.
    Discard,
    /// Resume later from [`Task::index`] with this buffer.
    Handoff(Buffer),
}

/// Ordered, immutable list of handlers.
#[derive(Default)]
pub struct HandlerChain {
    handlers: Vec<Box<dyn Handler>>,
}

impl HandlerChain {
    /// Create an empty chain. An empty chain echoes each frame back.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Append a handler.
    #[must_use]
    pub fn with(mut self, handler: impl Handler) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Number of handlers.
    #[must_use]
    pub fn len(&self) -> usize { self.handlers.len() }

    /// Whether the chain has no handlers.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.handlers.is_empty() }

    /// Run handlers from `task.index()` until one writes, discards, hands
    /// off, or the chain ends.
    pub(crate) fn run(
        &self,
        input: Buffer,
        task: &mut Task,
        allow_handoff: bool,
    ) -> Result<Outcome, HandlerError> {
        let mut current = input;
        while let Some(handler) = self.handlers.get(task.index()) {
            let before = task.index();
            let flow = handler.handle(current, task)?;
            if task.index() == before {
                task.set_index(before + 1);
            }
            current = match flow {
                Flow::Next(output) => output,
                Flow::Write(output) => return Ok(Outcome::Respond(output)),
                Flow::Discard => return Ok(Outcome::Discard),
                Flow::Handoff(output) if allow_handoff => return Ok(Outcome::Handoff(output)),
                Flow::Handoff(output) => output,
            };
        }
        Ok(Outcome::Respond(current))
    }

    /// Give every handler a chance to observe a fatal error.
    pub fn catch_error(&self, error: &ConnectionError, context: &ConnectionContext) {
        for handler in &self.handlers {
            handler.catch_error(error, context);
        }
    }
}

impl fmt::Debug for HandlerChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerChain")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use bytes::BufMut;
    use rstest::rstest;

    use super::*;
    use crate::task::test_support::detached_task;

    fn tag(byte: u8) -> impl Handler {
        handler_fn(move |mut input, _task| {
            input.put_u8(byte);
            Ok(Flow::Next(input))
        })
    }

    fn respond(outcome: Outcome) -> Vec<u8> {
        match outcome {
            Outcome::Respond(buffer) => buffer.view().to_vec(),
            other => panic!("expected a response, got {other:?}"),
        }
    }

    #[test]
    fn handlers_run_in_order() {
        let chain = HandlerChain::new().with(tag(1)).with(tag(2)).with(tag(3));
        let (mut task, _rx) = detached_task(0);
        let outcome = chain
            .run(Buffer::from_slice(b"x"), &mut task, false)
            .expect("run chain");
        assert_eq!(respond(outcome), b"x\x01\x02\x03");
        assert_eq!(task.index(), 3);
    }

    #[test]
    fn write_skips_remaining_handlers() {
        let chain = HandlerChain::new()
            .with(handler_fn(|input, _task| Ok(Flow::Write(input))))
            .with(tag(9));
        let (mut task, _rx) = detached_task(0);
        let outcome = chain
            .run(Buffer::from_slice(b"x"), &mut task, false)
            .expect("run chain");
        assert_eq!(respond(outcome), b"x");
    }

    #[test]
    fn discard_produces_no_response() {
        let chain = HandlerChain::new()
            .with(handler_fn(|_input, _task| Ok(Flow::Discard)))
            .with(tag(9));
        let (mut task, _rx) = detached_task(0);
        let outcome = chain
            .run(Buffer::from_slice(b"x"), &mut task, false)
            .expect("run chain");
        assert!(matches!(outcome, Outcome::Discard));
    }

    #[test]
    fn index_jump_skips_handlers() {
        let chain = HandlerChain::new()
            .with(handler_fn(|input, task| {
                task.set_index(2);
                Ok(Flow::Next(input))
            }))
            .with(tag(1))
            .with(tag(2));
        let (mut task, _rx) = detached_task(0);
        let outcome = chain
            .run(Buffer::from_slice(b"x"), &mut task, false)
            .expect("run chain");
        assert_eq!(respond(outcome), b"x\x02");
    }

    #[rstest]
    #[case(true, 1)]
    #[case(false, 3)]
    fn handoff_stops_only_when_allowed(#[case] allow: bool, #[case] index_after: usize) {
        let chain = HandlerChain::new()
            .with(handler_fn(|input, _task| Ok(Flow::Handoff(input))))
            .with(tag(1))
            .with(tag(2));
        let (mut task, _rx) = detached_task(0);
        let outcome = chain
            .run(Buffer::from_slice(b"x"), &mut task, allow)
            .expect("run chain");
        assert_eq!(task.index(), index_after);
        if allow {
            let Outcome::Handoff(buffer) = outcome else {
                panic!("expected a handoff, got {outcome:?}");
            };
            let resumed = chain.run(buffer, &mut task, false).expect("resume chain");
            assert_eq!(respond(resumed), b"x\x01\x02");
        } else {
            assert_eq!(respond(outcome), b"x\x01\x02");
        }
    }

    #[test]
    fn handler_error_stops_chain() {
        let reached = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reached);
        let chain = HandlerChain::new()
            .with(handler_fn(|_input, _task| Err(HandlerError::from("rejected"))))
            .with(handler_fn(move |input, _task| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Flow::Next(input))
            }));
        let (mut task, _rx) = detached_task(0);
        let err = chain
            .run(Buffer::from_slice(b"x"), &mut task, false)
            .expect_err("chain should fail");
        assert_eq!(err.to_string(), "rejected");
        assert_eq!(reached.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn empty_chain_echoes_input() {
        let chain = HandlerChain::new();
        assert!(chain.is_empty());
        let (mut task, _rx) = detached_task(0);
        let outcome = chain
            .run(Buffer::from_slice(b"echo"), &mut task, true)
            .expect("run chain");
        assert_eq!(respond(outcome), b"echo");
    }
}
