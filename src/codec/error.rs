//! Error types for the framing layer.

use thiserror::Error;

/// Wire-level violations of the framing contract.
///
/// Every variant is fatal for the connection that produced it: once a frame
/// boundary cannot be trusted, neither can anything after it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// Frame length prefix indicates size exceeding configured maximum.
    #[error("frame exceeds max length: {size} > {max}")]
    OversizedFrame {
        /// Payload size indicated by the length prefix.
        size: usize,
        /// Maximum allowed payload size.
        max: usize,
    },

    /// Frame length prefix is malformed or corrupt.
    #[error("invalid frame length encoding")]
    InvalidLengthEncoding,

    /// A payload is too long for the configured length field.
    #[error("payload of {size} bytes does not fit a {width}-byte length field")]
    LengthFieldOverflow {
        /// Payload size.
        size: usize,
        /// Width of the length field in bytes.
        width: usize,
    },
}
