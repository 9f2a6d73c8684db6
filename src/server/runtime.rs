//! Runtime control for [`Server`].

mod accept;
mod backoff;

use std::sync::Arc;

#[cfg(test)]
pub(super) use accept::MockAcceptListener;
pub(super) use accept::{AcceptLoopOptions, accept_loop};
pub use backoff::BackoffConfig;
use futures::Future;
use log::{info, warn};
use tokio::{select, signal};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{Bound, PipelineFactory, Server, ServerError};
use crate::engine::Engine;

impl<F> Server<F, Bound>
where
    F: PipelineFactory,
{
    /// Run the server until Ctrl+C is received.
    ///
    /// # Errors
    ///
    /// See [`run_with_shutdown`](Self::run_with_shutdown).
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_with_shutdown(async {
            let _ = signal::ctrl_c().await;
        })
        .await
    }

    /// Run the server until `shutdown` resolves.
    ///
    /// Builds the shared [`Engine`], spawns the accept workers and signals
    /// readiness. On shutdown the accept loops stop, every open connection
    /// is cancelled, and the call returns once all connection tasks ended.
    ///
    /// ```
    /// use ringframe::{
    ///     codec::LengthFieldCodec,
    ///     engine::Pipeline,
    ///     handler::HandlerChain,
    ///     server::Server,
    /// };
    /// use tokio::sync::oneshot;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let server = Server::new(|| Pipeline::new(LengthFieldCodec::default(), HandlerChain::new()))
    ///     .bind(([127, 0, 0, 1], 0).into())?;
    /// let (tx, rx) = oneshot::channel::<()>();
    /// let handle = tokio::spawn(server.run_with_shutdown(async {
    ///     let _ = rx.await;
    /// }));
    /// let _ = tx.send(());
    /// handle.await??;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// Unbound servers cannot run:
    ///
    /// ```compile_fail
    /// use ringframe::{
    ///     codec::LengthFieldCodec,
    ///     engine::Pipeline,
    ///     handler::HandlerChain,
    ///     server::Server,
    /// };
    ///
    /// async fn try_run() {
    ///     let _ = Server::new(|| Pipeline::new(LengthFieldCodec::default(), HandlerChain::new()))
    ///         .run_with_shutdown(async {})
    ///         .await;
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Config`] if the configuration is invalid and
    /// [`ServerError::Dispatch`] if dispatch workers cannot be started.
    /// Accept failures are retried with back-off and never surface here.
    pub async fn run_with_shutdown<S>(self, shutdown: S) -> Result<(), ServerError>
    where
        S: Future<Output = ()> + Send,
    {
        let Server {
            factory,
            config,
            ready_tx,
            state: Bound { listener },
        } = self;
        let engine = Engine::new(config)?;
        let shutdown_token = CancellationToken::new();
        let tracker = TaskTracker::new();

        for _ in 0..config.accept_workers {
            tracker.spawn(accept_loop(
                Arc::clone(&listener),
                factory.clone(),
                AcceptLoopOptions {
                    engine: engine.clone(),
                    shutdown: shutdown_token.clone(),
                    tracker: tracker.clone(),
                    backoff: config.backoff,
                },
            ));
        }
        info!(
            "server running: local_addr={:?}, accept_workers={}, work_mode={:?}",
            listener.local_addr().ok(),
            config.accept_workers,
            config.work_mode
        );

        if let Some(tx) = ready_tx
            && tx.send(()).is_err()
        {
            warn!("Failed to send readiness signal: receiver dropped");
        }

        select! {
            () = shutdown => shutdown_token.cancel(),
            () = tracker.wait() => {},
        }

        tracker.close();
        tracker.wait().await;
        info!("server stopped");
        Ok(())
    }
}
