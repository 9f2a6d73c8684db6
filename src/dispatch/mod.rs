//! Work modes: where the handler chain runs for each decoded frame.
//!
//! | Mode | Chain runs on | Response order |
//! |---|---|---|
//! | [`WorkMode::SyncWithOrder`] | the read loop | decode order |
//! | [`WorkMode::MixWithOrder`] | the read loop, then the blocking pool after [`Flow::Handoff`] | decode order |
//! | [`WorkMode::AsyncWithOrder`] | [`DispatchRing`] workers | decode order |
//! | [`WorkMode::AsyncWithoutOrder`] | the blocking pool | completion order |
//!
//! Ordering is never enforced here; the connection writer restores decode
//! order from each task's cursor.
//!
//! [`Flow::Handoff`]: crate::handler::Flow::Handoff

mod ring;

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use log::error;
pub use ring::{DispatchRing, RingConfig, WaitStrategy};

use crate::{error::ConnectionError, panic::format_panic, task::Task};

/// Concurrency and ordering policy for a server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WorkMode {
    /// Run the chain inline on the read loop.
    #[default]
    SyncWithOrder,
    /// Run inline until a handler hands off, then finish on the blocking pool.
    MixWithOrder,
    /// Run on the fixed worker pool behind the dispatch ring.
    AsyncWithOrder,
    /// Run on the blocking pool and write responses as they complete.
    AsyncWithoutOrder,
}

impl WorkMode {
    /// Whether responses are flushed in decode order.
    #[must_use]
    pub fn is_ordered(self) -> bool { !matches!(self, Self::AsyncWithoutOrder) }

    /// Whether the mode needs a [`DispatchRing`].
    #[must_use]
    pub fn uses_ring(self) -> bool { matches!(self, Self::AsyncWithOrder) }
}

/// Per-server dispatch strategy, cloned into every connection.
#[derive(Clone, Debug)]
pub(crate) enum Dispatcher {
    Inline,
    Mixed,
    Ring(Arc<DispatchRing<Task>>),
    Unordered,
}

impl Dispatcher {
    /// Whether each response must be written before the next frame is
    /// decoded.
    pub(crate) fn writes_before_next_decode(&self) -> bool { matches!(self, Self::Inline) }

    pub(crate) async fn dispatch(&self, task: Task) {
        match self {
            Self::Inline => {
                execute(task, false);
            }
            Self::Mixed => {
                if let Some(task) = execute(task, true) {
                    tokio::task::spawn_blocking(move || execute(task, false));
                }
            }
            Self::Ring(ring) => ring.publish(task).await,
            Self::Unordered => {
                tokio::task::spawn_blocking(move || execute(task, false));
            }
        }
    }
}

/// Run a task, turning a handler panic into a connection failure.
pub(crate) fn execute(task: Task, allow_handoff: bool) -> Option<Task> {
    let connection = Arc::clone(task.connection());
    // Keeps the writer alive until a panic has been reported.
    let _writer = task.writer().clone();
    match catch_unwind(AssertUnwindSafe(|| task.run(allow_handoff))) {
        Ok(next) => next,
        Err(panic) => {
            let panic_msg = format_panic(panic).to_string();
            let id = connection.context().id();
            error!("handler panicked: id={id}, panic={panic_msg}");
            tracing::error!(panic = %panic_msg, %id, "handler panicked");
            connection.fail(ConnectionError::HandlerPanicked(panic_msg));
            None
        }
    }
}
