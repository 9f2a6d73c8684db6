//! Ready-made handlers for tests.

use std::{
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use ringframe::{
    Buffer,
    ConnectionContext,
    ConnectionError,
    Flow,
    Handler,
    HandlerError,
    Task,
};

/// Writes every frame back unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct EchoHandler;

impl Handler for EchoHandler {
    fn handle(&self, input: Buffer, _task: &mut Task) -> Result<Flow, HandlerError> {
        Ok(Flow::Write(input))
    }
}

/// Upper-cases ASCII payloads and passes them on.
#[derive(Clone, Copy, Debug, Default)]
pub struct Uppercase;

impl Handler for Uppercase {
    fn handle(&self, input: Buffer, task: &mut Task) -> Result<Flow, HandlerError> {
        let mut out = task.allocate(input.remaining_readable());
        for byte in input.view() {
            bytes::BufMut::put_u8(&mut out, byte.to_ascii_uppercase());
        }
        Ok(Flow::Next(out))
    }
}

/// Fails the connection when a frame equals `trigger`.
#[derive(Clone, Debug)]
pub struct FailOn {
    trigger: Vec<u8>,
}

impl FailOn {
    /// Fail on frames equal to `trigger`.
    #[must_use]
    pub fn new(trigger: impl Into<Vec<u8>>) -> Self {
        Self {
            trigger: trigger.into(),
        }
    }
}

impl Handler for FailOn {
    fn handle(&self, input: Buffer, _task: &mut Task) -> Result<Flow, HandlerError> {
        if input.view() == self.trigger.as_slice() {
            return Err(HandlerError::from(format!(
                "rejected frame {:?}",
                String::from_utf8_lossy(&self.trigger)
            )));
        }
        Ok(Flow::Next(input))
    }
}

/// Sleeps a payload-dependent time before passing the frame on.
///
/// The delay is derived from the payload bytes so runs are repeatable while
/// neighbouring frames still finish out of order.
#[derive(Clone, Copy, Debug)]
pub struct Jitter {
    max: Duration,
}

impl Jitter {
    /// Sleep up to `max` per frame.
    #[must_use]
    pub fn up_to(max: Duration) -> Self { Self { max } }

    fn delay_for(&self, payload: &[u8]) -> Duration {
        let hash = payload
            .iter()
            .fold(0xcbf2_9ce4_8422_2325_u64, |h, b| {
                (h ^ u64::from(*b)).wrapping_mul(0x0100_0000_01b3)
            });
        let max_micros = u64::try_from(self.max.as_micros()).unwrap_or(u64::MAX).max(1);
        Duration::from_micros(hash % max_micros)
    }
}

impl Handler for Jitter {
    fn handle(&self, input: Buffer, _task: &mut Task) -> Result<Flow, HandlerError> {
        thread::sleep(self.delay_for(input.view()));
        Ok(Flow::Next(input))
    }
}

/// Records every fatal error reported to the chain.
#[derive(Clone, Debug, Default)]
pub struct Recorder {
    errors: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    /// Errors seen so far, rendered with `Display`.
    ///
    /// # Panics
    ///
    /// Panics if the record lock is poisoned.
    #[must_use]
    pub fn errors(&self) -> Vec<String> { self.errors.lock().expect("recorder lock").clone() }
}

impl Handler for Recorder {
    fn handle(&self, input: Buffer, _task: &mut Task) -> Result<Flow, HandlerError> {
        Ok(Flow::Next(input))
    }

    fn catch_error(&self, error: &ConnectionError, _context: &ConnectionContext) {
        if let Ok(mut errors) = self.errors.lock() {
            errors.push(error.to_string());
        }
    }
}
