//! Shared connection engine.
//!
//! An [`Engine`] bundles what every connection of a server shares: the
//! validated configuration, the buffer pool, and the dispatch strategy
//! (including the worker ring for [`WorkMode::AsyncWithOrder`]). The
//! [`Server`](crate::server::Server) builds one per run; tests and embedders
//! can build one directly and drive any byte stream through it.

use std::{fmt, net::SocketAddr, sync::Arc};

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_util::sync::CancellationToken;

use crate::{
    buffer::BufferPool,
    codec::FrameCodec,
    connection,
    dispatch::{DispatchRing, Dispatcher, RingConfig, WorkMode, execute},
    handler::HandlerChain,
    server::{ServerConfig, ServerError},
};

/// Codec and handler chain used by one connection.
///
/// Servers obtain a pipeline per accepted connection from a factory
/// closure; both parts are reference counted so a factory can hand out
/// clones of one pipeline.
#[derive(Clone)]
pub struct Pipeline {
    pub(crate) codec: Arc<dyn FrameCodec>,
    pub(crate) chain: Arc<HandlerChain>,
}

impl Pipeline {
    /// Build a pipeline from a codec and a chain.
    #[must_use]
    pub fn new(codec: impl FrameCodec, chain: HandlerChain) -> Self {
        Self {
            codec: Arc::new(codec),
            chain: Arc::new(chain),
        }
    }

    /// Build a pipeline from already shared parts.
    #[must_use]
    pub fn from_shared(codec: Arc<dyn FrameCodec>, chain: Arc<HandlerChain>) -> Self {
        Self { codec, chain }
    }

    /// Frame codec.
    #[must_use]
    pub fn codec(&self) -> &Arc<dyn FrameCodec> { &self.codec }

    /// Handler chain.
    #[must_use]
    pub fn chain(&self) -> &Arc<HandlerChain> { &self.chain }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("max_frame_length", &self.codec.max_frame_length())
            .field("chain", &self.chain)
            .finish()
    }
}

/// Configuration, buffer pool, and dispatcher shared by connections.
#[derive(Clone, Debug)]
pub struct Engine {
    config: Arc<ServerConfig>,
    pool: BufferPool,
    dispatcher: Dispatcher,
}

impl Engine {
    /// Validate `config` and start any worker threads it calls for.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] for invalid settings and
    /// [`ServerError::Dispatch`] if dispatch workers cannot be started.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let pool = BufferPool::new(config.buffers);
        let dispatcher = match config.work_mode {
            WorkMode::SyncWithOrder => Dispatcher::Inline,
            WorkMode::MixWithOrder => Dispatcher::Mixed,
            WorkMode::AsyncWithOrder => {
                let ring = DispatchRing::start(
                    RingConfig {
                        size: config.dispatch_ring_size,
                        workers: config.dispatch_workers,
                        wait_strategy: config.wait_strategy,
                    },
                    |task| {
                        execute(task, false);
                    },
                )
                .map_err(ServerError::Dispatch)?;
                Dispatcher::Ring(Arc::new(ring))
            }
            WorkMode::AsyncWithoutOrder => Dispatcher::Unordered,
        };
        Ok(Self {
            config: Arc::new(config),
            pool,
            dispatcher,
        })
    }

    /// Configuration in effect.
    #[must_use]
    pub fn config(&self) -> &ServerConfig { &self.config }

    /// Pool backing every connection buffer.
    #[must_use]
    pub fn pool(&self) -> &BufferPool { &self.pool }

    pub(crate) fn dispatcher(&self) -> Dispatcher { self.dispatcher.clone() }

    /// Serve a single connection over any byte stream until it closes.
    ///
    /// ```
    /// use ringframe::{
    ///     codec::LengthFieldCodec,
    ///     engine::{Engine, Pipeline},
    ///     handler::HandlerChain,
    ///     server::ServerConfig,
    /// };
    /// use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let engine = Engine::new(ServerConfig::default())?;
    /// let (mut client, server) = duplex(256);
    /// let pipeline = Pipeline::new(LengthFieldCodec::default(), HandlerChain::new());
    /// let serving = tokio::spawn(async move { engine.serve(server, None, pipeline).await });
    /// client.write_all(b"\x00\x00\x00\x02hi").await?;
    /// client.shutdown().await?;
    /// let mut echoed = Vec::new();
    /// client.read_to_end(&mut echoed).await?;
    /// assert_eq!(echoed, b"\x00\x00\x00\x02hi");
    /// serving.await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn serve<S>(&self, stream: S, peer: Option<SocketAddr>, pipeline: Pipeline)
    where
        S: AsyncRead + AsyncWrite + Send,
    {
        let io = tokio::io::split(stream);
        connection::serve(self, io, peer, pipeline, CancellationToken::new()).await;
    }

    pub(crate) async fn serve_tcp(
        &self,
        stream: TcpStream,
        peer: Option<SocketAddr>,
        pipeline: Pipeline,
        shutdown: CancellationToken,
    ) {
        let io = stream.into_split();
        connection::serve(self, io, peer, pipeline, shutdown).await;
    }
}
