//! Tokio-based TCP server driving [`Pipeline`]s.
//!
//! [`Server`] spawns accept workers over one listener. Each accepted
//! connection gets a fresh [`Pipeline`] from the factory closure and is
//! served by a shared [`Engine`](crate::engine::Engine) until it closes or
//! the server shuts down.

use std::sync::Arc;

use tokio::{net::TcpListener, sync::oneshot};

use crate::engine::Pipeline;

/// Factory producing the codec and handler chain for each connection.
pub trait PipelineFactory: Fn() -> Pipeline + Send + Sync + Clone + 'static {}

impl<F> PipelineFactory for F where F: Fn() -> Pipeline + Send + Sync + Clone + 'static {}

/// Tokio-based server for [`Pipeline`]s.
///
/// The server carries a typestate `S` indicating whether it is
/// [`Unbound`] (not yet bound to a TCP listener) or [`Bound`]. New servers
/// start `Unbound` and must call [`Server::bind`] or
/// [`Server::bind_listener`] before running.
pub struct Server<F, S = Unbound>
where
    F: PipelineFactory,
    S: ServerState,
{
    pub(crate) factory: F,
    pub(crate) config: ServerConfig,
    /// Channel used to notify when the server is ready.
    ///
    /// A `oneshot::Sender` can transmit only one readiness notification, so
    /// a new sender must be provided each time the server is started.
    pub(crate) ready_tx: Option<oneshot::Sender<()>>,
    /// Typestate tracking whether the server has been bound to a listener.
    pub(crate) state: S,
}

/// Marker indicating the server has not yet bound a listener.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbound;

/// Marker indicating the server is bound to a TCP listener.
#[derive(Debug, Clone)]
pub struct Bound {
    pub(crate) listener: Arc<TcpListener>,
}

/// Trait implemented by [`Unbound`] and [`Bound`] to model binding typestate.
pub trait ServerState: sealed::Sealed {}

mod sealed {
    //! Prevent external implementations of [`ServerState`].

    pub trait Sealed {}
    impl Sealed for super::Unbound {}
    impl Sealed for super::Bound {}
}

impl ServerState for Unbound {}
impl ServerState for Bound {}

mod config;
pub use config::{
    BufferPoolConfig,
    ConfigError,
    ServerConfig,
    StorageKind,
    WaitStrategy,
    WorkMode,
    WriteMode,
};
mod connection;
pub mod error;
pub use error::ServerError;
mod runtime;

/// Re-exported configuration types for server backoff behaviour.
pub use runtime::BackoffConfig;

#[cfg(test)]
pub(crate) mod test_util;
