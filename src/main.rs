//! Echo server demonstrating `ringframe`.
//!
//! Every length-prefixed frame received is written back unchanged. Flags
//! select the work mode, write mode and buffer tuning; see `--help`.

mod cli;

use std::time::Duration;

use clap::Parser;
use cli::{Cli, StorageArg, WaitStrategyArg, WorkModeArg, WriteModeArg};
use ringframe::{
    buffer::{BufferPoolConfig, StorageKind},
    codec::LengthFieldCodec,
    engine::Pipeline,
    handler::HandlerChain,
    server::{Server, ServerConfig, WaitStrategy, WorkMode, WriteMode},
};
use tracing_subscriber::EnvFilter;

fn server_config(cli: &Cli) -> ServerConfig {
    let defaults = ServerConfig::default();
    ServerConfig {
        accept_workers: cli.accept_workers.unwrap_or(defaults.accept_workers),
        work_mode: match cli.work_mode {
            WorkModeArg::Sync => WorkMode::SyncWithOrder,
            WorkModeArg::Mix => WorkMode::MixWithOrder,
            WorkModeArg::Async => WorkMode::AsyncWithOrder,
            WorkModeArg::Unordered => WorkMode::AsyncWithoutOrder,
        },
        write_mode: match cli.write_mode {
            WriteModeArg::Single => WriteMode::Single,
            WriteModeArg::Batch => WriteMode::Batch,
        },
        ring_capacity: cli.ring_capacity,
        read_timeout: Duration::from_millis(cli.read_timeout_ms),
        wait_timeout: Duration::from_millis(cli.wait_timeout_ms),
        max_batch_writes: cli.max_batch_writes,
        dispatch_workers: cli.dispatch_workers.unwrap_or(defaults.dispatch_workers),
        wait_strategy: match cli.wait_strategy {
            WaitStrategyArg::BusySpin => WaitStrategy::BusySpin,
            WaitStrategyArg::Blocking => WaitStrategy::Blocking,
        },
        buffers: BufferPoolConfig {
            storage: match cli.storage {
                StorageArg::Heap => StorageKind::Heap,
                StorageArg::Direct => StorageKind::Direct,
            },
            ..defaults.buffers
        },
        ..defaults
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    #[cfg(feature = "metrics")]
    if let Some(addr) = cli.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        tracing::info!(%addr, "prometheus exporter listening");
    }

    let max_frame_length = cli.max_frame_length;
    let server = Server::new(move || {
        Pipeline::new(LengthFieldCodec::new(max_frame_length), HandlerChain::new())
    })
    .with_config(server_config(&cli))
    .bind(cli.bind)?;

    server.run().await?;
    Ok(())
}
