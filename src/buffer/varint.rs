//! Variable-length integer encoding.
//!
//! Values are written little-endian in 7-bit groups; the high bit of each
//! byte marks a continuation. Signed values are zig-zag mapped first so small
//! magnitudes stay short.

use thiserror::Error;

/// Longest encoding of a `u64`.
pub const MAX_VARINT_LEN: usize = 10;

/// Failure to decode a varint.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum VarintError {
    /// The readable bytes end before the final group.
    #[error("varint is incomplete")]
    Incomplete,
    /// More than [`MAX_VARINT_LEN`] groups, or bits beyond 64.
    #[error("varint overflows 64 bits")]
    Overflow,
}

/// Encode `value` into `out`, returning the number of bytes used.
pub(crate) fn encode(mut value: u64, out: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut len = 0;
    loop {
        #[expect(clippy::cast_possible_truncation, reason = "masked to seven bits")]
        let group = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out[len] = group;
            return len + 1;
        }
        out[len] = group | 0x80;
        len += 1;
    }
}

/// Decode a varint from the front of `src`.
///
/// Returns the value and the number of bytes consumed.
pub(crate) fn decode(src: &[u8]) -> Result<(u64, usize), VarintError> {
    let mut value = 0_u64;
    for (i, byte) in src.iter().take(MAX_VARINT_LEN).enumerate() {
        let group = u64::from(byte & 0x7f);
        let shift = 7 * i;
        if shift == 63 && group > 1 {
            return Err(VarintError::Overflow);
        }
        value |= group << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    if src.len() >= MAX_VARINT_LEN {
        Err(VarintError::Overflow)
    } else {
        Err(VarintError::Incomplete)
    }
}

/// Number of bytes `value` occupies when encoded.
#[must_use]
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

pub(crate) fn zigzag(value: i64) -> u64 {
    #[expect(clippy::cast_sign_loss, reason = "zig-zag reinterprets the bits")]
    let mapped = ((value << 1) ^ (value >> 63)) as u64;
    mapped
}

pub(crate) fn unzigzag(value: u64) -> i64 {
    #[expect(clippy::cast_possible_wrap, reason = "zig-zag reinterprets the bits")]
    let mapped = ((value >> 1) as i64) ^ -((value & 1) as i64);
    mapped
}
