#![doc(html_root_url = "https://docs.rs/ringframe/latest")]
//! Public API for the `ringframe` library.
//!
//! `ringframe` is a connection engine for length-delimited binary protocols.
//! Bytes arrive in pooled [`Buffer`]s, a [`FrameCodec`] cuts them into
//! frames, each frame runs through a [`HandlerChain`] on the thread chosen by
//! the server's [`WorkMode`], and responses are written back in decode order
//! (unless the mode opts out). A per-connection slot ring bounds the number
//! of responses in flight; when it fills, the connection stops reading until
//! the writer catches up.

pub mod backpressure;
pub mod buffer;
pub mod codec;
pub mod connection;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod handler;
pub mod metrics;
pub mod panic;
pub mod sequence;
pub mod server;
pub mod task;

pub use buffer::{Buffer, BufferPool, BufferPoolConfig, StorageKind};
pub use codec::{Decoded, FrameCodec, FramingError, LengthFieldCodec, VarintLengthCodec};
pub use connection::{ConnectionContext, ConnectionId, WriteMode, active_connection_count};
pub use dispatch::{WaitStrategy, WorkMode};
pub use engine::{Engine, Pipeline};
pub use error::{ConnectionError, Result};
pub use handler::{Flow, Handler, HandlerChain, HandlerError, handler_fn};
pub use metrics::{CONNECTIONS_ACTIVE, Direction, ERRORS_TOTAL, FRAMES_PROCESSED};
pub use server::{Server, ServerConfig, ServerError};
pub use task::Task;
