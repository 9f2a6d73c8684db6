//! Helpers for exercising `ringframe` in tests.
//!
//! Frame encoders for building client input, an in-memory driver that runs
//! one connection over `tokio::io::duplex`, a few ready-made handlers, and a
//! wrapper that runs a bound TCP server until dropped.
//!
//! ```rust
//! use ringframe::{Pipeline, ServerConfig, codec::LengthFieldCodec, handler::HandlerChain};
//! use ringframe_testing::{decode_frames, drive, encode_frames};
//!
//! # async fn demo() -> std::io::Result<()> {
//! let pipeline = Pipeline::new(LengthFieldCodec::default(), HandlerChain::new());
//! let input = encode_frames(&[b"ping"]);
//! let output = drive(ServerConfig::default(), pipeline, vec![input]).await?;
//! assert_eq!(decode_frames(&output), vec![b"ping".to_vec()]);
//! # Ok(())
//! # }
//! ```

pub mod drive;
pub mod frames;
pub mod handlers;
pub mod logging;
pub mod server;

pub use drive::{DEFAULT_CAPACITY, DriveOutput, drive, drive_engine, drive_with_capacity};
pub use frames::{
    decode_frames,
    decode_varint_frames,
    encode_frames,
    encode_varint_frames,
    length_prefixed,
};
pub use handlers::{EchoHandler, FailOn, Jitter, Recorder, Uppercase};
pub use logging::{LoggerHandle, logger};
pub use server::{RunningServer, spawn_server};

/// Result type used by helper-based tests.
pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error + Send + Sync>>;
