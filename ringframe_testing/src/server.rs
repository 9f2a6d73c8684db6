//! Run a real TCP server for the duration of a test.

use std::net::{Ipv4Addr, SocketAddr, TcpListener as StdTcpListener};

use ringframe::{
    ServerConfig,
    ServerError,
    server::{PipelineFactory, Server},
};
use tokio::{sync::oneshot, task::JoinHandle};

/// A server running on a background task.
///
/// Dropping the handle without calling [`stop`](Self::stop) signals
/// shutdown but does not wait for it.
#[derive(Debug)]
pub struct RunningServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<Result<(), ServerError>>>,
}

impl RunningServer {
    /// Address clients should connect to.
    #[must_use]
    pub fn addr(&self) -> SocketAddr { self.addr }

    /// Signal shutdown and wait for the server to finish.
    ///
    /// # Errors
    ///
    /// Returns the server's error, or an error if its task panicked.
    pub async fn stop(mut self) -> crate::TestResult {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.await??;
        }
        Ok(())
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Bind `factory` with `config` to a free loopback port and run it.
///
/// Returns once the server reports ready.
///
/// # Errors
///
/// Returns an error if binding fails or the server stops before it is
/// ready.
pub async fn spawn_server<F>(factory: F, config: ServerConfig) -> crate::TestResult<RunningServer>
where
    F: PipelineFactory,
{
    let listener = StdTcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))?;
    let addr = listener.local_addr()?;
    let (ready_tx, ready_rx) = oneshot::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = Server::new(factory)
        .with_config(config)
        .ready_signal(ready_tx)
        .bind_listener(listener)?;
    let handle = tokio::spawn(server.run_with_shutdown(async {
        let _ = shutdown_rx.await;
    }));
    ready_rx.await?;
    Ok(RunningServer {
        addr,
        shutdown: Some(shutdown_tx),
        handle: Some(handle),
    })
}
