//! Errors raised by [`Server`](super::Server) operations.

use std::io;

use thiserror::Error;

use super::ConfigError;

/// Errors that may occur while setting up or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or configuring the listener failed.
    #[error("bind error: {0}")]
    Bind(#[source] io::Error),
    /// The configuration was rejected.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// Dispatch worker threads could not be started.
    #[error("failed to start dispatch workers: {0}")]
    Dispatch(#[source] io::Error),
}
