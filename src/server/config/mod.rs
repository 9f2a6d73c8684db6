//! Server configuration and the [`Server`] builder.

use std::{thread, time::Duration};

use thiserror::Error;
use tokio::sync::oneshot;

use super::{BackoffConfig, PipelineFactory, Server, ServerState, Unbound};
pub use crate::{
    buffer::{BufferPoolConfig, StorageKind},
    connection::WriteMode,
    dispatch::{WaitStrategy, WorkMode},
};

mod binding;

fn default_parallelism() -> usize { thread::available_parallelism().map_or(1, usize::from) }

/// Options shared by every connection a server accepts.
///
/// Build one with [`ServerConfig::default`] and the `with_*` methods. The
/// configuration is validated when an [`Engine`](crate::engine::Engine) is
/// created, so a server never runs with nonsensical limits.
///
/// ```
/// use std::time::Duration;
///
/// use ringframe::server::{ServerConfig, WorkMode, WriteMode};
///
/// let config = ServerConfig::default()
///     .with_work_mode(WorkMode::AsyncWithOrder)
///     .with_write_mode(WriteMode::Single)
///     .with_read_timeout(Duration::from_millis(500));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    /// Tasks accepting connections from the shared listener.
    pub accept_workers: usize,
    /// Where handler chains run and whether responses keep decode order.
    pub work_mode: WorkMode,
    /// Whether responses are written one per call or coalesced.
    pub write_mode: WriteMode,
    /// Responses a connection may have in flight before reads pause.
    pub ring_capacity: usize,
    /// Longest time a partially received frame may stay incomplete.
    pub read_timeout: Duration,
    /// Longest time a connection may sit idle between frames.
    pub wait_timeout: Duration,
    /// Upper bound on responses coalesced into one write call.
    pub max_batch_writes: usize,
    /// Worker threads behind the dispatch ring.
    pub dispatch_workers: usize,
    /// Slots in the dispatch ring.
    pub dispatch_ring_size: usize,
    /// How idle dispatch workers wait.
    pub wait_strategy: WaitStrategy,
    /// Buffer pool sizing.
    pub buffers: BufferPoolConfig,
    /// Accept-loop retry timing.
    pub backoff: BackoffConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            accept_workers: default_parallelism(),
            work_mode: WorkMode::default(),
            write_mode: WriteMode::default(),
            ring_capacity: 32,
            read_timeout: Duration::from_secs(3),
            wait_timeout: Duration::from_secs(30),
            max_batch_writes: 10,
            dispatch_workers: default_parallelism(),
            dispatch_ring_size: 1024,
            wait_strategy: WaitStrategy::default(),
            buffers: BufferPoolConfig::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

/// Rejected configuration values.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A count was zero.
    #[error("{field} must be at least 1")]
    ZeroCount {
        /// Offending field.
        field: &'static str,
    },
    /// A timeout was zero.
    #[error("{field} must be greater than zero")]
    ZeroTimeout {
        /// Offending field.
        field: &'static str,
    },
    /// A buffer size class was not a power of two.
    #[error("{field} must be a power of two, got {value}")]
    NotPowerOfTwo {
        /// Offending field.
        field: &'static str,
        /// Supplied value.
        value: usize,
    },
    /// The smallest size class exceeds the largest.
    #[error("buffers.min_class ({min}) exceeds buffers.max_class ({max})")]
    InvertedClasses {
        /// Smallest class.
        min: usize,
        /// Largest class.
        max: usize,
    },
}

macro_rules! with_field {
    ($(#[$doc:meta])* $name:ident, $field:ident: $ty:ty) => {
        $(#[$doc])*
        #[must_use]
        pub fn $name(mut self, $field: $ty) -> Self {
            self.$field = $field;
            self
        }
    };
}

impl ServerConfig {
    with_field!(
        /// Set the number of accept tasks.
        with_accept_workers, accept_workers: usize
    );
    with_field!(
        /// Set the work mode.
        with_work_mode, work_mode: WorkMode
    );
    with_field!(
        /// Set the write mode.
        with_write_mode, write_mode: WriteMode
    );
    with_field!(
        /// Set the per-connection slot ring capacity.
        with_ring_capacity, ring_capacity: usize
    );
    with_field!(
        /// Set the partial-frame timeout.
        with_read_timeout, read_timeout: Duration
    );
    with_field!(
        /// Set the idle timeout.
        with_wait_timeout, wait_timeout: Duration
    );
    with_field!(
        /// Set the batch size for [`WriteMode::Batch`].
        with_max_batch_writes, max_batch_writes: usize
    );
    with_field!(
        /// Set the number of dispatch worker threads.
        with_dispatch_workers, dispatch_workers: usize
    );
    with_field!(
        /// Set the dispatch ring size.
        with_dispatch_ring_size, dispatch_ring_size: usize
    );
    with_field!(
        /// Set the dispatch worker wait strategy.
        with_wait_strategy, wait_strategy: WaitStrategy
    );
    with_field!(
        /// Set the buffer pool sizing.
        with_buffers, buffers: BufferPoolConfig
    );
    with_field!(
        /// Set the accept-loop back-off.
        with_backoff, backoff: BackoffConfig
    );

    /// Check every option for a usable value.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let counts = [
            ("accept_workers", self.accept_workers),
            ("ring_capacity", self.ring_capacity),
            ("max_batch_writes", self.max_batch_writes),
            ("dispatch_workers", self.dispatch_workers),
            ("dispatch_ring_size", self.dispatch_ring_size),
            ("buffers.max_per_class", self.buffers.max_per_class),
            ("buffers.initial_capacity", self.buffers.initial_capacity),
        ];
        if let Some((field, _)) = counts.into_iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::ZeroCount { field });
        }
        if self.read_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                field: "read_timeout",
            });
        }
        if self.wait_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout {
                field: "wait_timeout",
            });
        }
        for (field, value) in [
            ("buffers.min_class", self.buffers.min_class),
            ("buffers.max_class", self.buffers.max_class),
        ] {
            if !value.is_power_of_two() {
                return Err(ConfigError::NotPowerOfTwo { field, value });
            }
        }
        if self.buffers.min_class > self.buffers.max_class {
            return Err(ConfigError::InvertedClasses {
                min: self.buffers.min_class,
                max: self.buffers.max_class,
            });
        }
        Ok(())
    }
}

impl<F> Server<F, Unbound>
where
    F: PipelineFactory,
{
    /// Create a server producing one [`Pipeline`](crate::engine::Pipeline)
    /// per connection from `factory`.
    ///
    /// The server starts with [`ServerConfig::default`]; call
    /// [`bind`](Self::bind) before running it.
    #[must_use]
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            config: ServerConfig::default(),
            ready_tx: None,
            state: Unbound,
        }
    }
}

impl<F, S> Server<F, S>
where
    F: PipelineFactory,
    S: ServerState,
{
    /// Replace the whole configuration.
    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the number of accept tasks.
    #[must_use]
    pub fn workers(mut self, count: usize) -> Self {
        self.config.accept_workers = count.max(1);
        self
    }

    /// Configure a channel signalled once the server accepts connections.
    #[must_use]
    pub fn ready_signal(mut self, tx: oneshot::Sender<()>) -> Self {
        self.ready_tx = Some(tx);
        self
    }

    /// Configured number of accept tasks.
    #[inline]
    #[must_use]
    pub const fn worker_count(&self) -> usize { self.config.accept_workers }

    /// Configuration in effect.
    #[must_use]
    pub const fn config(&self) -> &ServerConfig { &self.config }
}
