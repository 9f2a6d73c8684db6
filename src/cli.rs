//! Command line interface for the `ringframe` echo server.
//!
//! Kept free of library imports so the build script can include it to
//! render the man page.

use std::net::SocketAddr;

use clap::{Parser, ValueEnum};

/// Where handler chains run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum WorkModeArg {
    /// Inline on the read loop.
    Sync,
    /// Inline, finishing on the blocking pool after a hand-off.
    Mix,
    /// On the dispatch ring, responses in order.
    Async,
    /// On the blocking pool, responses in completion order.
    Unordered,
}

/// How responses are written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum WriteModeArg {
    /// One write per response.
    Single,
    /// Coalesce ready responses into one write.
    Batch,
}

/// Buffer storage strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StorageArg {
    /// Ordinary heap blocks.
    Heap,
    /// Page-aligned blocks.
    Direct,
}

/// Idle strategy for dispatch workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum WaitStrategyArg {
    /// Spin continuously.
    BusySpin,
    /// Spin briefly, then sleep.
    Blocking,
}

/// Command line arguments for the `ringframe` binary.
#[derive(Debug, Parser)]
#[command(
    name = "ringframe",
    version,
    about = "Length-prefixed echo server built on the ringframe engine"
)]
pub struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:7878")]
    pub bind: SocketAddr,
    /// Where handler chains run.
    #[arg(long, value_enum, default_value_t = WorkModeArg::Sync)]
    pub work_mode: WorkModeArg,
    /// How responses are written.
    #[arg(long, value_enum, default_value_t = WriteModeArg::Batch)]
    pub write_mode: WriteModeArg,
    /// Responses in flight per connection before reads pause.
    #[arg(long, default_value_t = 32)]
    pub ring_capacity: usize,
    /// Accept tasks; defaults to the number of CPUs.
    #[arg(long)]
    pub accept_workers: Option<usize>,
    /// Dispatch worker threads; defaults to the number of CPUs.
    #[arg(long)]
    pub dispatch_workers: Option<usize>,
    /// Responses coalesced into one write in batch mode.
    #[arg(long, default_value_t = 10)]
    pub max_batch_writes: usize,
    /// Milliseconds a partial frame may stay incomplete.
    #[arg(long, default_value_t = 3_000)]
    pub read_timeout_ms: u64,
    /// Milliseconds a connection may stay idle.
    #[arg(long, default_value_t = 30_000)]
    pub wait_timeout_ms: u64,
    /// Buffer storage strategy.
    #[arg(long, value_enum, default_value_t = StorageArg::Heap)]
    pub storage: StorageArg,
    /// Idle strategy for dispatch workers.
    #[arg(long, value_enum, default_value_t = WaitStrategyArg::Blocking)]
    pub wait_strategy: WaitStrategyArg,
    /// Largest frame payload accepted, in bytes.
    #[arg(long, default_value_t = 64 * 1024)]
    pub max_frame_length: usize,
    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    pub metrics_addr: Option<SocketAddr>,
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_parse() {
        let cli = Cli::parse_from(["ringframe"]);
        assert_eq!(cli.bind.port(), 7878);
        assert_eq!(cli.work_mode, WorkModeArg::Sync);
        assert_eq!(cli.write_mode, WriteModeArg::Batch);
        assert!(cli.accept_workers.is_none());
        assert!(cli.metrics_addr.is_none());
    }

    #[rstest]
    #[case("sync", WorkModeArg::Sync)]
    #[case("mix", WorkModeArg::Mix)]
    #[case("async", WorkModeArg::Async)]
    #[case("unordered", WorkModeArg::Unordered)]
    fn work_modes_parse(#[case] value: &str, #[case] expected: WorkModeArg) {
        let cli = Cli::parse_from(["ringframe", "--work-mode", value]);
        assert_eq!(cli.work_mode, expected);
    }

    #[test]
    fn tuning_flags_parse() {
        let cli = Cli::parse_from([
            "ringframe",
            "--ring-capacity",
            "8",
            "--read-timeout-ms",
            "250",
            "--storage",
            "direct",
            "--wait-strategy",
            "busy-spin",
        ]);
        assert_eq!(cli.ring_capacity, 8);
        assert_eq!(cli.read_timeout_ms, 250);
        assert_eq!(cli.storage, StorageArg::Direct);
        assert_eq!(cli.wait_strategy, WaitStrategyArg::BusySpin);
    }
}
