//! Run one connection over an in-memory duplex stream.

use std::{io, panic::AssertUnwindSafe};

use futures::FutureExt as _;
use ringframe::{Engine, Pipeline, ServerConfig, panic::format_panic};
use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

/// Duplex buffer size used by [`drive`].
pub const DEFAULT_CAPACITY: usize = 4096;

/// Bytes written by the server and the engine that served them.
#[derive(Debug)]
pub struct DriveOutput {
    /// Everything the server wrote before closing.
    pub bytes: Vec<u8>,
    /// Engine used for the connection; inspect its pool afterwards.
    pub engine: Engine,
}

/// Serve `pipeline` with `config`, feed it `chunks`, half-close, and return
/// what the server wrote.
///
/// # Errors
///
/// Returns an error if the configuration is invalid, the client side fails,
/// or the serving task panics (message starts with `"server task failed"`).
pub async fn drive(
    config: ServerConfig,
    pipeline: Pipeline,
    chunks: Vec<Vec<u8>>,
) -> io::Result<Vec<u8>> {
    drive_with_capacity(config, pipeline, chunks, DEFAULT_CAPACITY)
        .await
        .map(|out| out.bytes)
}

/// Like [`drive`] with an explicit duplex capacity, also returning the
/// engine.
///
/// # Errors
///
/// See [`drive`].
pub async fn drive_with_capacity(
    config: ServerConfig,
    pipeline: Pipeline,
    chunks: Vec<Vec<u8>>,
    capacity: usize,
) -> io::Result<DriveOutput> {
    let engine = Engine::new(config).map_err(io::Error::other)?;
    let bytes = drive_engine(&engine, pipeline, chunks, capacity).await?;
    Ok(DriveOutput { bytes, engine })
}

/// Serve one connection on an existing engine.
///
/// # Errors
///
/// See [`drive`].
pub async fn drive_engine(
    engine: &Engine,
    pipeline: Pipeline,
    chunks: Vec<Vec<u8>>,
    capacity: usize,
) -> io::Result<Vec<u8>> {
    let (mut client, server) = duplex(capacity);

    let server_fut = async {
        AssertUnwindSafe(engine.serve(server, None, pipeline))
            .catch_unwind()
            .await
            .map_err(|panic| io::Error::other(format!("server task failed: {}", format_panic(panic))))
    };

    let client_fut = async {
        let (mut reader, mut writer) = tokio::io::split(&mut client);
        let write = async {
            for chunk in &chunks {
                if writer.write_all(chunk).await.is_err() {
                    // Server closed early; keep what it wrote.
                    break;
                }
            }
            let _ = writer.shutdown().await;
        };
        let read = async {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf).await.map(|_| buf)
        };
        let ((), buf) = tokio::join!(write, read);
        buf
    };

    let ((), buf) = tokio::try_join!(server_fut, client_fut)?;
    Ok(buf)
}
