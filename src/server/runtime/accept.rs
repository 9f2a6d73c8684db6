//! Accept loop feeding connections to the engine.

use std::{io, net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use log::warn;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    time::{Duration, sleep},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::backoff::BackoffConfig;
use crate::{
    engine::Engine,
    server::{PipelineFactory, connection::spawn_connection_task},
};

/// Source of incoming connections consumed by the accept loop.
///
/// Dropping a pending `accept()` future must not leak resources.
#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub(in crate::server) trait AcceptListener: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptListener for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> { TcpListener::local_addr(self) }
}

#[derive(Debug)]
pub(in crate::server) struct AcceptLoopOptions {
    pub engine: Engine,
    pub shutdown: CancellationToken,
    pub tracker: TaskTracker,
    pub backoff: BackoffConfig,
}

/// Accept connections from `listener` until `shutdown` is cancelled.
///
/// Each accepted stream gets a fresh pipeline from `factory` and is served
/// on a task tracked by `options.tracker`. Connection tasks observe a child
/// of `options.shutdown`, so cancelling it closes them too. Accept failures
/// back off exponentially.
pub(in crate::server) async fn accept_loop<F, L>(listener: Arc<L>, factory: F, options: AcceptLoopOptions)
where
    F: PipelineFactory,
    L: AcceptListener + 'static,
{
    let backoff = options.backoff.normalized();
    debug_assert!(
        backoff.initial_delay <= backoff.max_delay,
        "back-off initial delay exceeds its maximum"
    );
    let mut delay = backoff.initial_delay;
    let options = AcceptLoopOptions { backoff, ..options };
    while let Some(next_delay) = accept_iteration(&listener, &factory, &options, delay).await {
        delay = next_delay;
    }
}

async fn accept_iteration<F, L>(
    listener: &Arc<L>,
    factory: &F,
    options: &AcceptLoopOptions,
    delay: Duration,
) -> Option<Duration>
where
    F: PipelineFactory,
    L: AcceptListener + 'static,
{
    select! {
        biased;

        () = options.shutdown.cancelled() => None,
        res = listener.accept() => Some(match res {
            Ok((stream, peer)) => {
                spawn_connection_task(
                    stream,
                    peer,
                    factory,
                    &options.engine,
                    options.shutdown.child_token(),
                    &options.tracker,
                );
                options.backoff.initial_delay
            }
            Err(e) => {
                let local_addr = listener.local_addr().ok();
                warn!("accept error: error={e:?}, local_addr={local_addr:?}, retry_in={delay:?}");
                sleep(delay).await;
                options.backoff.next_delay(delay)
            }
        }),
    }
}
