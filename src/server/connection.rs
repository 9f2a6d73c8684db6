//! Connection task spawning for [`Server`](super::Server).

use std::{net::SocketAddr, panic::AssertUnwindSafe};

use futures::FutureExt;
use log::error;
use tokio::net::TcpStream;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::PipelineFactory;
use crate::{engine::Engine, panic::format_panic};

/// Spawn a tracked task serving one accepted stream.
///
/// A panic in the pipeline factory or anywhere in the connection task is
/// caught, counted, and logged; it never reaches the accept loop.
pub(super) fn spawn_connection_task<F>(
    stream: TcpStream,
    peer: SocketAddr,
    factory: &F,
    engine: &Engine,
    shutdown: CancellationToken,
    tracker: &TaskTracker,
) where
    F: PipelineFactory,
{
    let factory = factory.clone();
    let engine = engine.clone();
    tracker.spawn(async move {
        let serving = AssertUnwindSafe(async move {
            let pipeline = factory();
            engine
                .serve_tcp(stream, Some(peer), pipeline, shutdown)
                .await;
        })
        .catch_unwind();

        if let Err(panic) = serving.await {
            crate::metrics::inc_connection_panics();
            let panic_msg = format_panic(panic);
            error!("connection task panicked: panic={panic_msg}, peer_addr={peer}");
            tracing::error!(panic = %panic_msg, %peer, "connection task panicked");
        }
    });
}
