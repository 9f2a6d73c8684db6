//! Per-connection read and write pipelines.
//!
//! Each connection runs a [`reader`] loop and a [`writer`] loop as two
//! futures of one task. The reader owns the read buffer and decodes frames
//! into [`Task`]s; tasks finish by sending a completion to the writer, which
//! owns the write half of the socket and the slot ring used to restore decode
//! order. The only state the two sides share is [`ConnectionShared`]: the
//! backpressure cursors, the version stamp, and the closing flag.
//!
//! [`Task`]: crate::task::Task

mod counter;
mod reader;
mod writer;

use std::{
    fmt,
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use counter::ActiveConnection;
pub use counter::active_connection_count;
use log::{debug, info, warn};
use reader::{Reader, ReaderSettings};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::mpsc,
};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
pub(crate) use writer::{Completion, WriteHandle};
pub use writer::WriteMode;
use writer::{Writer, WriterSettings};

use crate::{
    backpressure::FlowControl,
    buffer::BufferPool,
    engine::{Engine, Pipeline},
    error::ConnectionError,
    handler::HandlerChain,
    metrics,
};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier assigned to each accepted connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self { Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "ConnectionId({})", self.0) }
}

/// Identity of a connection, handed to handlers and error hooks.
#[derive(Clone, Debug)]
pub struct ConnectionContext {
    id: ConnectionId,
    peer: Option<SocketAddr>,
}

impl ConnectionContext {
    fn new(peer: Option<SocketAddr>) -> Self {
        Self {
            id: ConnectionId::next(),
            peer,
        }
    }

    /// Connection identifier.
    #[must_use]
    pub fn id(&self) -> ConnectionId { self.id }

    /// Remote address, when known.
    #[must_use]
    pub fn peer(&self) -> Option<SocketAddr> { self.peer }
}

/// State shared by a connection's reader, writer, and in-flight tasks.
#[derive(Debug)]
pub(crate) struct ConnectionShared {
    context: ConnectionContext,
    chain: Arc<HandlerChain>,
    pool: BufferPool,
    flow: Arc<FlowControl>,
    version: AtomicU64,
    closing: AtomicBool,
    cancel: CancellationToken,
}

impl ConnectionShared {
    fn new(
        context: ConnectionContext,
        chain: Arc<HandlerChain>,
        pool: BufferPool,
        flow: FlowControl,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            context,
            chain,
            pool,
            flow: Arc::new(flow),
            version: AtomicU64::new(0),
            closing: AtomicBool::new(false),
            cancel,
        }
    }

    #[cfg(test)]
    pub(crate) fn detached(chain: Arc<HandlerChain>, pool: BufferPool) -> Self {
        Self::new(
            ConnectionContext::new(None),
            chain,
            pool,
            FlowControl::new(16),
            CancellationToken::new(),
        )
    }

    pub(crate) fn context(&self) -> &ConnectionContext { &self.context }

    pub(crate) fn chain(&self) -> &Arc<HandlerChain> { &self.chain }

    pub(crate) fn pool(&self) -> &BufferPool { &self.pool }

    pub(crate) fn flow(&self) -> &Arc<FlowControl> { &self.flow }

    pub(crate) fn version(&self) -> u64 { self.version.load(Ordering::Acquire) }

    /// Whether the connection failed, was closed, or is being shut down.
    pub(crate) fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire) || self.cancel.is_cancelled()
    }

    pub(crate) fn cancelled(&self) -> WaitForCancellationFuture<'_> { self.cancel.cancelled() }

    /// Claim the right to close. Only the first caller wins; the winner
    /// invalidates every in-flight completion by bumping the version.
    fn begin_close(&self) -> bool {
        if self
            .closing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.version.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Close the connection because of `error`.
    ///
    /// Returns `false` if another path already closed it; in that case the
    /// error is only logged at debug level.
    pub(crate) fn fail(&self, error: ConnectionError) -> bool {
        if !self.begin_close() {
            debug!(
                "connection already closing, dropping error: id={}, error={error}",
                self.context.id
            );
            return false;
        }
        warn!(
            "connection failed: id={}, peer={:?}, kind={}, error={error}",
            self.context.id,
            self.context.peer,
            error.kind_label()
        );
        metrics::inc_errors(error.kind_label());
        self.chain.catch_error(&error, &self.context);
        self.cancel.cancel();
        true
    }
}

/// Drive one connection until it closes.
///
/// `shutdown` cancels the connection when the server stops.
pub(crate) async fn serve<R, W>(
    engine: &Engine,
    io: (R, W),
    peer: Option<SocketAddr>,
    pipeline: Pipeline,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    let (read_half, write_half) = io;
    let config = engine.config();
    let Pipeline { codec, chain } = pipeline;
    let shared = Arc::new(ConnectionShared::new(
        ConnectionContext::new(peer),
        chain,
        engine.pool().clone(),
        FlowControl::new(config.ring_capacity),
        shutdown,
    ));
    let _active = ActiveConnection::new();
    info!(
        "connection opened: ringframe_active_connections={}, id={}, peer={peer:?}",
        active_connection_count(),
        shared.context().id()
    );

    let (tx, rx) = mpsc::unbounded_channel();
    let writer = Writer::new(
        write_half,
        rx,
        Arc::clone(&shared),
        Arc::clone(&codec),
        WriterSettings::from_config(config),
    );
    let reader = Reader::new(
        read_half,
        Arc::clone(&shared),
        tx,
        codec,
        engine.dispatcher(),
        ReaderSettings::from_config(config),
    );
    tokio::join!(reader.run(), writer.run());

    let outcome = if shared.is_closing() { "aborted" } else { "closed" };
    info!(
        "connection {outcome}: id={}, peer={peer:?}, frames_read={}, frames_written={}",
        shared.context().id(),
        shared.flow().read_cursor(),
        shared.flow().write_cursor()
    );
}
