//! Behavioural tests for [`Buffer`].

use bytes::{Buf, BufMut};
use proptest::{
    collection::vec,
    prop_assert,
    prop_assert_eq,
    test_runner::{Config, TestRunner},
};
use rstest::rstest;

use super::*;

fn deterministic_runner(cases: u32) -> TestRunner {
    TestRunner::new(Config {
        cases,
        failure_persistence: None,
        ..Config::default()
    })
}

#[rstest]
#[case(StorageKind::Heap)]
#[case(StorageKind::Direct)]
fn growth_preserves_written_bytes(#[case] kind: StorageKind) {
    let pool = BufferPool::default();
    let mut buf = pool.acquire_with(kind, 16);
    buf.put_slice(b"0123456789");
    buf.ensure_capacity(10_000);
    assert!(buf.capacity() >= 10_000);
    assert_eq!(buf.storage_kind(), kind);
    assert_eq!(buf.view(), b"0123456789");
    assert_eq!(buf.read_cursor(), 0);
    assert_eq!(buf.write_cursor(), 10);
}

#[test]
fn ensure_capacity_at_least_doubles() {
    let mut buf = Buffer::heap(100);
    buf.ensure_capacity(101);
    assert_eq!(buf.capacity(), 200);
    buf.ensure_capacity(50);
    assert_eq!(buf.capacity(), 200, "storage never shrinks");
}

#[test]
fn compact_moves_unread_bytes_to_front() {
    let mut buf = Buffer::heap(16);
    buf.put_slice(b"abcdefgh");
    buf.advance(5);
    buf.compact();
    assert_eq!(buf.read_cursor(), 0);
    assert_eq!(buf.write_cursor(), 3);
    assert_eq!(buf.view(), b"fgh");
    assert_eq!(buf.remaining_writable(), 13);
}

#[test]
fn compact_preserves_unread_content_for_any_history() {
    let strategy = (vec(vec(proptest::num::u8::ANY, 0..64), 1..8), 0_usize..512);
    deterministic_runner(128)
        .run(&strategy, |(writes, consume)| {
            let mut buf = Buffer::heap(8);
            for chunk in &writes {
                buf.put_slice(chunk);
            }
            let consume = consume.min(buf.remaining_readable());
            buf.advance(consume);
            let before = buf.view().to_vec();
            buf.compact();
            prop_assert_eq!(buf.read_cursor(), 0);
            prop_assert_eq!(buf.write_cursor(), before.len());
            prop_assert_eq!(buf.view(), before.as_slice());
            prop_assert!(buf.write_cursor() <= buf.capacity());
            Ok(())
        })
        .expect("compact keeps unread bytes");
}

#[test]
fn fixed_width_values_round_trip() {
    let mut buf = Buffer::heap(4);
    buf.put_u8(7);
    buf.put_i16(-2);
    buf.put_u32(0xdead_beef);
    buf.put_i64(-1_234_567_890_123);
    buf.put_f32(1.5);
    buf.put_f64(-0.25);
    assert_eq!(buf.get_u8(), 7);
    assert_eq!(buf.get_i16(), -2);
    assert_eq!(buf.get_u32(), 0xdead_beef);
    assert_eq!(buf.get_i64(), -1_234_567_890_123);
    assert!((buf.get_f32() - 1.5).abs() < f32::EPSILON);
    assert!((buf.get_f64() + 0.25).abs() < f64::EPSILON);
    assert!(buf.is_empty());
}

#[test]
fn varints_share_the_buffer_with_fixed_width_fields() {
    let mut buf = Buffer::heap(2);
    buf.put_varint_u32(300);
    buf.put_u16(0xabcd);
    buf.put_varint_i64(-3);
    assert_eq!(buf.get_varint_u32(), Ok(300));
    assert_eq!(buf.get_u16(), 0xabcd);
    assert_eq!(buf.get_varint_i64(), Ok(-3));
}

#[test]
fn positive_varints_round_trip_through_buffer() {
    deterministic_runner(256)
        .run(&(1_u64..), |value| {
            let mut buf = Buffer::heap(1);
            buf.put_varint_u64(value);
            prop_assert_eq!(buf.remaining_readable(), varint_len(value));
            prop_assert_eq!(buf.get_varint_u64(), Ok(value));
            prop_assert!(buf.is_empty());
            Ok(())
        })
        .expect("varint round-trip");
}

#[test]
fn incomplete_varint_leaves_cursor_alone() {
    let mut buf = Buffer::from_slice(&[0x80, 0x80]);
    assert_eq!(buf.get_varint_u64(), Err(VarintError::Incomplete));
    assert_eq!(buf.read_cursor(), 0);
}

#[test]
fn u32_varint_rejects_wide_values() {
    let mut buf = Buffer::heap(0);
    buf.put_varint_u64(u64::from(u32::MAX) + 1);
    assert_eq!(buf.get_varint_u32(), Err(VarintError::Overflow));
}

#[test]
fn marks_support_speculative_reads() {
    let mut buf = Buffer::from_slice(b"\x00\x05hel");
    buf.mark_read();
    let len = usize::from(buf.get_u16());
    assert!(buf.remaining_readable() < len);
    buf.reset_read();
    assert_eq!(buf.read_cursor(), 0);

    buf.mark_write();
    buf.put_slice(b"lo!!");
    buf.reset_write();
    assert_eq!(buf.view(), b"\x00\x05hel");
}

#[test]
fn reset_without_mark_is_a_no_op() {
    let mut buf = Buffer::from_slice(b"abc");
    buf.advance(2);
    buf.reset_read();
    assert_eq!(buf.read_cursor(), 2);
}

#[test]
fn spare_region_accepts_external_writes() {
    let mut buf = Buffer::heap(8);
    buf.spare_mut()[..3].copy_from_slice(b"xyz");
    buf.advance_write(3);
    assert_eq!(buf.view(), b"xyz");
    assert_eq!(buf.remaining_writable(), 5);
}

#[test]
#[should_panic(expected = "advance_write past capacity")]
fn advancing_past_capacity_panics() {
    let mut buf = Buffer::heap(2);
    buf.advance_write(3);
}

#[test]
fn split_frame_copies_and_consumes() {
    let pool = BufferPool::default();
    let mut buf = pool.acquire(64);
    buf.put_slice(b"helloworld");
    let frame = buf.split_frame(5);
    assert_eq!(frame.view(), b"hello");
    assert_eq!(buf.view(), b"world");
    assert_eq!(pool.stats().acquired, 2);
}

#[test]
fn index_of_and_hex_inspect_readable_bytes() {
    let mut buf = Buffer::from_slice(b"\r\nab\r\n");
    buf.advance(2);
    assert_eq!(buf.index_of(b"\r\n"), Some(4));
    assert_eq!(buf.index_of(b"zz"), None);
    assert_eq!(buf.hex(), "61620d0a");
}

#[test]
fn dropping_pooled_buffers_counts_one_release_each() {
    let pool = BufferPool::default();
    let a = pool.acquire(10);
    let mut b = pool.acquire(10);
    b.ensure_capacity(5000);
    a.release();
    drop(b);
    let stats = pool.stats();
    assert_eq!(stats.acquired, 2);
    assert_eq!(stats.released, 2);
    assert_eq!(stats.outstanding(), Some(0));
}
