//! Metric helpers for `ringframe`.
//!
//! This module defines metric names and thin helpers over the
//! [`metrics`](https://docs.rs/metrics) facade. With the `metrics` feature
//! disabled every helper compiles to a no-op.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking active connections.
pub const CONNECTIONS_ACTIVE: &str = "ringframe_connections_active";
/// Name of the counter tracking processed frames.
pub const FRAMES_PROCESSED: &str = "ringframe_frames_processed_total";
/// Name of the counter tracking connection failures, labelled by kind.
pub const ERRORS_TOTAL: &str = "ringframe_errors_total";
/// Name of the counter tracking panicking connection tasks.
pub const CONNECTION_PANICS: &str = "ringframe_connection_panics_total";
/// Name of the counter tracking reads suspended by backpressure.
pub const BACKPRESSURE_SUSPENSIONS: &str = "ringframe_backpressure_suspensions_total";

/// Direction of frame processing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Frames decoded from a peer.
    Inbound,
    /// Responses written to a peer.
    Outbound,
}

impl Direction {
    /// Label value used for the `direction` label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Increment the active connections gauge.
pub fn inc_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

/// Decrement the active connections gauge.
pub fn dec_connections() {
    #[cfg(feature = "metrics")]
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record one processed frame for the given direction.
pub fn inc_frames(direction: Direction) { inc_frames_by(direction, 1); }

/// Record `count` processed frames for the given direction.
pub fn inc_frames_by(direction: Direction, count: usize) {
    #[cfg(feature = "metrics")]
    counter!(FRAMES_PROCESSED, "direction" => direction.as_str())
        .increment(u64::try_from(count).unwrap_or(u64::MAX));
    #[cfg(not(feature = "metrics"))]
    let _ = (direction, count);
}

/// Record a connection failure of the given kind.
pub fn inc_errors(kind: &'static str) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "kind" => kind).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = kind;
}

/// Record a connection task that ended in a panic.
pub fn inc_connection_panics() {
    #[cfg(feature = "metrics")]
    counter!(CONNECTION_PANICS).increment(1);
}

/// Record a read loop suspended because too many responses were in flight.
pub fn inc_backpressure_suspensions() {
    #[cfg(feature = "metrics")]
    counter!(BACKPRESSURE_SUSPENSIONS).increment(1);
}
