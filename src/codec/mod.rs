//! Pluggable framing codecs for wire protocols.
//!
//! A [`FrameCodec`] splits a connection's read [`Buffer`] into frames and
//! wraps outgoing payloads for transmission. Decoding is a pure function of
//! the buffer: it yields a frame, asks for more bytes, asks for a larger
//! buffer, or fails with a [`FramingError`] that closes the connection.
//!
//! Two length-prefixed codecs are provided: [`LengthFieldCodec`] with a
//! fixed-width big-endian prefix and [`VarintLengthCodec`] with a varint
//! prefix.

use bytes::{Buf, BufMut};

use crate::buffer::{Buffer, VarintError};

pub mod error;

pub use error::FramingError;

/// Minimum frame length in bytes.
///
/// Frame lengths passed to codec constructors are clamped to at least this
/// value.
pub const MIN_FRAME_LENGTH: usize = 64;

/// Maximum frame length in bytes (16 MiB).
///
/// Frame lengths passed to codec constructors are clamped to at most this
/// value to prevent unbounded memory allocation.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

pub(crate) fn clamp_frame_length(value: usize) -> usize {
    value.clamp(MIN_FRAME_LENGTH, MAX_FRAME_LENGTH)
}

/// Result of one decode attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame payload; the source read cursor moved past it.
    Frame(Buffer),
    /// Not enough bytes yet. The source cursors are unchanged.
    NeedMore,
    /// The frame is known to need this many contiguous bytes, more than the
    /// source buffer can hold. The source cursors are unchanged.
    NeedCapacity(usize),
}

/// Framing contract between the read pipeline and the protocol.
pub trait FrameCodec: Send + Sync + 'static {
    /// Try to take one frame from the readable region of `src`.
    ///
    /// # Errors
    ///
    /// Returns a [`FramingError`] when the bytes cannot be a valid frame.
    fn decode(&self, src: &mut Buffer) -> Result<Decoded, FramingError>;

    /// Append `payload`, framed, to `dst`.
    ///
    /// # Errors
    ///
    /// Returns a [`FramingError`] when the payload cannot be framed.
    fn encode(&self, payload: &[u8], dst: &mut Buffer) -> Result<(), FramingError>;

    /// Largest payload accepted in either direction.
    fn max_frame_length(&self) -> usize;
}

/// Width of a fixed-size length prefix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LengthWidth {
    /// One byte.
    U8,
    /// Two bytes, big-endian.
    U16,
    /// Four bytes, big-endian.
    #[default]
    U32,
}

impl LengthWidth {
    /// Header size in bytes.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }

    const fn max_value(self) -> usize {
        match self {
            Self::U8 => u8::MAX as usize,
            Self::U16 => u16::MAX as usize,
            Self::U32 => u32::MAX as usize,
        }
    }

    fn read(self, mut header: &[u8]) -> usize {
        match self {
            Self::U8 => usize::from(header.get_u8()),
            Self::U16 => usize::from(header.get_u16()),
            Self::U32 => header.get_u32() as usize,
        }
    }

    #[expect(clippy::cast_possible_truncation, reason = "bounded by max_value")]
    fn write(self, len: usize, dst: &mut Buffer) {
        match self {
            Self::U8 => dst.put_u8(len as u8),
            Self::U16 => dst.put_u16(len as u16),
            Self::U32 => dst.put_u32(len as u32),
        }
    }
}

/// Codec with a fixed-width big-endian length prefix.
///
/// The default uses a 4-byte prefix and a 1 KiB maximum payload.
#[derive(Clone, Debug)]
pub struct LengthFieldCodec {
    width: LengthWidth,
    max_frame_length: usize,
}

impl LengthFieldCodec {
    /// Construct a codec with a 4-byte prefix and the given maximum payload.
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self { Self::with_width(LengthWidth::U32, max_frame_length) }

    /// Construct a codec with an explicit prefix width.
    ///
    /// The maximum payload is clamped to what the width can express.
    #[must_use]
    pub fn with_width(width: LengthWidth, max_frame_length: usize) -> Self {
        Self {
            width,
            max_frame_length: clamp_frame_length(max_frame_length).min(width.max_value()),
        }
    }

    /// Prefix width.
    #[must_use]
    pub fn width(&self) -> LengthWidth { self.width }
}

impl Default for LengthFieldCodec {
    fn default() -> Self { Self::new(1024) }
}

impl FrameCodec for LengthFieldCodec {
    fn decode(&self, src: &mut Buffer) -> Result<Decoded, FramingError> {
        let header = self.width.bytes();
        let Some(prefix) = src.view().get(..header) else {
            return Ok(Decoded::NeedMore);
        };
        let len = self.width.read(prefix);
        if len > self.max_frame_length {
            return Err(FramingError::OversizedFrame {
                size: len,
                max: self.max_frame_length,
            });
        }
        let total = header + len;
        if total > src.capacity() {
            return Ok(Decoded::NeedCapacity(total));
        }
        if src.remaining_readable() < total {
            return Ok(Decoded::NeedMore);
        }
        src.advance(header);
        Ok(Decoded::Frame(src.split_frame(len)))
    }

    fn encode(&self, payload: &[u8], dst: &mut Buffer) -> Result<(), FramingError> {
        if payload.len() > self.max_frame_length {
            return Err(FramingError::OversizedFrame {
                size: payload.len(),
                max: self.max_frame_length,
            });
        }
        if payload.len() > self.width.max_value() {
            return Err(FramingError::LengthFieldOverflow {
                size: payload.len(),
                width: self.width.bytes(),
            });
        }
        dst.ensure_capacity(dst.write_cursor() + self.width.bytes() + payload.len());
        self.width.write(payload.len(), dst);
        dst.put_slice(payload);
        Ok(())
    }

    fn max_frame_length(&self) -> usize { self.max_frame_length }
}

/// Codec whose length prefix is an unsigned varint.
#[derive(Clone, Debug)]
pub struct VarintLengthCodec {
    max_frame_length: usize,
}

impl VarintLengthCodec {
    /// Construct a codec with the given maximum payload.
    #[must_use]
    pub fn new(max_frame_length: usize) -> Self {
        Self {
            max_frame_length: clamp_frame_length(max_frame_length),
        }
    }
}

impl Default for VarintLengthCodec {
    fn default() -> Self { Self::new(1024) }
}

impl FrameCodec for VarintLengthCodec {
    fn decode(&self, src: &mut Buffer) -> Result<Decoded, FramingError> {
        let start = src.read_cursor();
        src.mark_read();
        let len = match src.get_varint_u64() {
            Ok(len) => len,
            Err(VarintError::Incomplete) => return Ok(Decoded::NeedMore),
            Err(VarintError::Overflow) => return Err(FramingError::InvalidLengthEncoding),
        };
        let header = src.read_cursor() - start;
        let len = usize::try_from(len).map_err(|_| FramingError::InvalidLengthEncoding)?;
        if len > self.max_frame_length {
            src.reset_read();
            return Err(FramingError::OversizedFrame {
                size: len,
                max: self.max_frame_length,
            });
        }
        if header + len > src.capacity() {
            src.reset_read();
            return Ok(Decoded::NeedCapacity(header + len));
        }
        if src.remaining_readable() < len {
            src.reset_read();
            return Ok(Decoded::NeedMore);
        }
        Ok(Decoded::Frame(src.split_frame(len)))
    }

    fn encode(&self, payload: &[u8], dst: &mut Buffer) -> Result<(), FramingError> {
        if payload.len() > self.max_frame_length {
            return Err(FramingError::OversizedFrame {
                size: payload.len(),
                max: self.max_frame_length,
            });
        }
        dst.put_varint_u64(payload.len() as u64);
        dst.put_slice(payload);
        Ok(())
    }

    fn max_frame_length(&self) -> usize { self.max_frame_length }
}

#[cfg(test)]
mod tests;
