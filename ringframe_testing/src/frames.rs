//! Client-side frame encoding and decoding.
//!
//! These work on plain byte vectors so tests can build input and check
//! output without touching pooled buffers.

use bytes::{Buf, BufMut};

/// Frame `payload` with a 4-byte big-endian length prefix.
#[must_use]
pub fn length_prefixed(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.put_u32(u32::try_from(payload.len()).expect("test payload fits a u32 prefix"));
    out.put_slice(payload);
    out
}

/// Concatenate `payloads`, each with a 4-byte big-endian length prefix.
#[must_use]
pub fn encode_frames<P: AsRef<[u8]>>(payloads: &[P]) -> Vec<u8> {
    payloads
        .iter()
        .flat_map(|p| length_prefixed(p.as_ref()))
        .collect()
}

/// Split bytes framed with 4-byte big-endian prefixes into payloads.
///
/// # Panics
///
/// Panics if `bytes` ends inside a frame.
#[must_use]
pub fn decode_frames(mut bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    while bytes.has_remaining() {
        assert!(bytes.remaining() >= 4, "truncated length prefix");
        let len = bytes.get_u32() as usize;
        assert!(bytes.remaining() >= len, "truncated frame payload");
        frames.push(bytes[..len].to_vec());
        bytes.advance(len);
    }
    frames
}

/// Concatenate `payloads`, each with an unsigned LEB128 length prefix.
#[must_use]
pub fn encode_varint_frames<P: AsRef<[u8]>>(payloads: &[P]) -> Vec<u8> {
    let mut out = Vec::new();
    for payload in payloads {
        let payload = payload.as_ref();
        let mut len = payload.len();
        while len >= 0x80 {
            out.push(u8::try_from(len & 0x7f).unwrap_or_default() | 0x80);
            len >>= 7;
        }
        out.push(u8::try_from(len).unwrap_or_default());
        out.extend_from_slice(payload);
    }
    out
}

/// Split bytes framed with LEB128 prefixes into payloads.
///
/// # Panics
///
/// Panics on a truncated prefix or payload.
#[must_use]
pub fn decode_varint_frames(mut bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut frames = Vec::new();
    while !bytes.is_empty() {
        let mut len = 0_usize;
        let mut shift = 0;
        loop {
            let byte = *bytes.first().expect("truncated varint prefix");
            bytes = &bytes[1..];
            len |= usize::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        assert!(bytes.len() >= len, "truncated frame payload");
        frames.push(bytes[..len].to_vec());
        bytes = &bytes[len..];
    }
    frames
}
