//! Canonical error type for connection processing.
//!
//! Every variant of [`ConnectionError`] terminates the connection it was
//! raised on. The handler chain's error hook observes the error once, before
//! the connection is torn down.

use std::{fmt, io};

use thiserror::Error;

use crate::{codec::FramingError, handler::HandlerError};

/// Which read deadline expired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// No bytes arrived while the connection was idle.
    Idle,
    /// A frame was started but not completed in time.
    PartialFrame,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("waiting for a frame"),
            Self::PartialFrame => f.write_str("reading a partial frame"),
        }
    }
}

/// Fatal failure on a single connection.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Socket read or write failed.
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    /// The peer sent bytes that violate the framing contract.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    /// A read deadline expired.
    #[error("read timed out while {phase}")]
    ReadTimeout {
        /// Deadline that expired.
        phase: TimeoutPhase,
    },
    /// A handler returned an error.
    #[error("handler failed: {0}")]
    Handler(#[from] HandlerError),
    /// A handler panicked while processing a frame.
    #[error("handler panicked: {0}")]
    HandlerPanicked(String),
}

impl ConnectionError {
    /// Whether the error closes the connection. Always `true`: no error
    /// leaves the stream position trustworthy.
    #[must_use]
    pub fn is_fatal(&self) -> bool { true }

    /// Short label used for logs and metrics.
    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Framing(_) => "framing",
            Self::ReadTimeout { .. } => "timeout",
            Self::Handler(_) => "handler",
            Self::HandlerPanicked(_) => "panic",
        }
    }
}

/// Result alias for connection processing.
pub type Result<T> = std::result::Result<T, ConnectionError>;

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ConnectionError::Io(io::Error::other("reset")), "io")]
    #[case(ConnectionError::Framing(FramingError::InvalidLengthEncoding), "framing")]
    #[case(ConnectionError::ReadTimeout { phase: TimeoutPhase::Idle }, "timeout")]
    #[case(ConnectionError::Handler(HandlerError::new("bad input")), "handler")]
    #[case(ConnectionError::HandlerPanicked("boom".into()), "panic")]
    fn every_error_is_fatal_and_labelled(#[case] error: ConnectionError, #[case] label: &str) {
        assert!(error.is_fatal());
        assert_eq!(error.kind_label(), label);
    }

    #[test]
    fn timeout_message_names_phase() {
        let error = ConnectionError::ReadTimeout {
            phase: TimeoutPhase::PartialFrame,
        };
        assert_eq!(error.to_string(), "read timed out while reading a partial frame");
    }
}
