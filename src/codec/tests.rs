//! Tests for the bundled length-prefixed codecs.

use bytes::BufMut;
use proptest::{
    collection::vec,
    prop_assert,
    prop_assert_eq,
    test_runner::{Config, TestCaseError, TestRunner},
};
use rstest::rstest;

use super::*;
use crate::buffer::BufferPool;

fn deterministic_runner(cases: u32) -> TestRunner {
    TestRunner::new(Config {
        cases,
        failure_persistence: None,
        ..Config::default()
    })
}

fn frame_payload(decoded: Decoded) -> Vec<u8> {
    match decoded {
        Decoded::Frame(frame) => frame.view().to_vec(),
        other => panic!("expected a frame, got {other:?}"),
    }
}

#[test]
fn two_frames_in_one_read_decode_in_order() {
    let codec = LengthFieldCodec::default();
    let mut src = Buffer::heap(64);
    src.put_slice(b"\x00\x00\x00\x05hello\x00\x00\x00\x05world");
    assert_eq!(frame_payload(codec.decode(&mut src).expect("decode hello")), b"hello");
    assert_eq!(frame_payload(codec.decode(&mut src).expect("decode world")), b"world");
    assert_eq!(codec.decode(&mut src), Ok(Decoded::NeedMore));
    assert!(src.is_empty());
}

#[rstest]
#[case(&b"\x00\x00"[..])]
#[case(&b"\x00\x00\x00\x05hel"[..])]
fn partial_input_needs_more(#[case] input: &[u8]) {
    let codec = LengthFieldCodec::default();
    let mut src = Buffer::heap(64);
    src.put_slice(input);
    assert_eq!(codec.decode(&mut src), Ok(Decoded::NeedMore));
    assert_eq!(src.read_cursor(), 0);
}

#[test]
fn frame_larger_than_buffer_requests_capacity() {
    let codec = LengthFieldCodec::new(4096);
    let mut src = Buffer::heap(16);
    src.put_u32(100);
    assert_eq!(codec.decode(&mut src), Ok(Decoded::NeedCapacity(104)));
    assert_eq!(src.read_cursor(), 0);
}

#[test]
fn oversized_length_is_malformed() {
    let codec = LengthFieldCodec::new(128);
    let mut src = Buffer::heap(16);
    src.put_u32(129);
    assert_eq!(
        codec.decode(&mut src),
        Err(FramingError::OversizedFrame { size: 129, max: 128 })
    );
}

#[rstest]
#[case(LengthWidth::U8, &[0x03][..])]
#[case(LengthWidth::U16, &[0x00, 0x03][..])]
#[case(LengthWidth::U32, &[0x00, 0x00, 0x00, 0x03][..])]
fn length_width_controls_prefix(#[case] width: LengthWidth, #[case] prefix: &[u8]) {
    let codec = LengthFieldCodec::with_width(width, 200);
    let mut dst = Buffer::heap(0);
    codec.encode(b"abc", &mut dst).expect("encode");
    assert_eq!(&dst.view()[..width.bytes()], prefix);
    assert_eq!(frame_payload(codec.decode(&mut dst).expect("decode")), b"abc");
}

#[test]
fn narrow_width_clamps_max_frame_length() {
    let codec = LengthFieldCodec::with_width(LengthWidth::U8, 4096);
    assert_eq!(codec.max_frame_length(), 255);
}

#[test]
fn encode_rejects_oversized_payload() {
    let codec = LengthFieldCodec::new(64);
    let mut dst = Buffer::heap(0);
    assert!(matches!(
        codec.encode(&[0; 65], &mut dst),
        Err(FramingError::OversizedFrame { size: 65, max: 64 })
    ));
    assert!(dst.is_empty());
}

#[test]
fn decoded_frames_come_from_the_source_pool() {
    let pool = BufferPool::default();
    let codec = LengthFieldCodec::default();
    let mut src = pool.acquire(64);
    codec.encode(b"pooled", &mut src).expect("encode");
    let frame = codec.decode(&mut src).expect("decode");
    assert_eq!(pool.stats().outstanding(), Some(2));
    drop(frame);
    drop(src);
    assert_eq!(pool.stats().outstanding(), Some(0));
}

#[test]
fn varint_codec_rolls_back_on_partial_payload() {
    let codec = VarintLengthCodec::default();
    let mut src = Buffer::heap(512);
    src.put_varint_u64(300);
    src.put_slice(&[1, 2, 3]);
    assert_eq!(codec.decode(&mut src), Ok(Decoded::NeedMore));
    assert_eq!(src.read_cursor(), 0);
}

#[test]
fn varint_codec_requests_capacity_for_long_frames() {
    let codec = VarintLengthCodec::new(1000);
    let mut src = Buffer::heap(8);
    src.put_varint_u64(300);
    assert_eq!(codec.decode(&mut src), Ok(Decoded::NeedCapacity(302)));
    assert_eq!(src.read_cursor(), 0);
}

#[test]
fn varint_codec_rejects_overlong_prefix() {
    let codec = VarintLengthCodec::default();
    let mut src = Buffer::from_slice(&[0xff; 11]);
    assert_eq!(codec.decode(&mut src), Err(FramingError::InvalidLengthEncoding));
}

fn round_trip(codec: &dyn FrameCodec, payloads: &[Vec<u8>]) -> Result<(), TestCaseError> {
    let mut wire = Buffer::heap(16);
    for payload in payloads {
        codec
            .encode(payload, &mut wire)
            .map_err(|err| TestCaseError::fail(format!("encode failed: {err}")))?;
    }
    wire.ensure_capacity(wire.remaining_readable());
    for expected in payloads {
        match codec.decode(&mut wire) {
            Ok(Decoded::Frame(frame)) => prop_assert_eq!(frame.view(), expected.as_slice()),
            other => return Err(TestCaseError::fail(format!("unexpected decode: {other:?}"))),
        }
    }
    prop_assert!(wire.is_empty());
    Ok(())
}

#[rstest]
#[case(64)]
#[case(512)]
fn generated_sequences_decode_in_order(#[case] max_frame_length: usize) {
    let strategy = vec(vec(proptest::num::u8::ANY, 0..max_frame_length), 1..16);
    let fixed = LengthFieldCodec::new(max_frame_length);
    let varint = VarintLengthCodec::new(max_frame_length);
    deterministic_runner(96)
        .run(&strategy, |payloads| {
            round_trip(&fixed, &payloads)?;
            round_trip(&varint, &payloads)
        })
        .expect("generated sequences decode in order");
}
