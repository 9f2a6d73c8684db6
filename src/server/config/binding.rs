//! Listener binding for [`Server`].

use std::{
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
};

use log::info;
use tokio::net::TcpListener;

use crate::server::{Bound, PipelineFactory, Server, ServerError, ServerState, Unbound};

impl<F, S> Server<F, S>
where
    F: PipelineFactory,
    S: ServerState,
{
    fn bind_to_listener(self, std_listener: StdTcpListener) -> Result<Server<F, Bound>, ServerError> {
        let Server {
            factory,
            config,
            ready_tx,
            ..
        } = self;
        config.validate()?;

        std_listener
            .set_nonblocking(true)
            .map_err(ServerError::Bind)?;
        let listener = TcpListener::from_std(std_listener).map_err(ServerError::Bind)?;
        if let Ok(addr) = listener.local_addr() {
            info!("listener bound: local_addr={addr}");
        }

        Ok(Server {
            factory,
            config,
            ready_tx,
            state: Bound {
                listener: Arc::new(listener),
            },
        })
    }
}

impl<F> Server<F, Unbound>
where
    F: PipelineFactory,
{
    /// Return `None` as the server is not bound.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> { None }

    /// Bind to `addr`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// ```
    /// use std::net::{Ipv4Addr, SocketAddr};
    ///
    /// use ringframe::{
    ///     codec::LengthFieldCodec,
    ///     engine::Pipeline,
    ///     handler::HandlerChain,
    ///     server::Server,
    /// };
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), ringframe::server::ServerError> {
    /// let server = Server::new(|| Pipeline::new(LengthFieldCodec::default(), HandlerChain::new()))
    ///     .bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))?;
    /// assert!(server.local_addr().is_some());
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the configuration is invalid and
    /// [`ServerError::Bind`] if binding or configuring the listener fails.
    pub fn bind(self, addr: SocketAddr) -> Result<Server<F, Bound>, ServerError> {
        let std_listener = StdTcpListener::bind(addr).map_err(ServerError::Bind)?;
        self.bind_to_listener(std_listener)
    }

    /// Bind to an existing standard listener.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the configuration is invalid and
    /// [`ServerError::Bind`] if the listener cannot be registered.
    pub fn bind_listener(self, listener: StdTcpListener) -> Result<Server<F, Bound>, ServerError> {
        self.bind_to_listener(listener)
    }
}

impl<F> Server<F, Bound>
where
    F: PipelineFactory,
{
    /// Address the listener is bound to, or `None` if it cannot be read.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> { self.state.listener.local_addr().ok() }

    /// Rebind to a fresh address, dropping the previous listener.
    ///
    /// # Errors
    ///
    /// Returns a [`ServerError`] if binding or configuring the listener fails.
    pub fn bind(self, addr: SocketAddr) -> Result<Self, ServerError> {
        let std_listener = StdTcpListener::bind(addr).map_err(ServerError::Bind)?;
        self.bind_to_listener(std_listener)
    }

    /// Rebind to an existing standard listener.
    ///
    /// # Errors
    ///
    /// Returns a [`ServerError`] if configuring the listener fails.
    pub fn bind_listener(self, listener: StdTcpListener) -> Result<Self, ServerError> {
        self.bind_to_listener(listener)
    }
}
