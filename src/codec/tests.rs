//! Tests for record framing, truncation handling and byte counting.

use std::io::{Cursor, Write};

use proptest::prelude::*;
use rstest::rstest;

use super::*;
use crate::event::{Consistency, LogEvent, Payload};
use crate::test_utils::events::sample_event;

fn write_all(events: &[LogEvent]) -> Vec<u8> {
    let mut writer = RecordWriter::new(Vec::new());
    for event in events {
        writer.write(event).expect("write event");
    }
    writer.into_inner()
}

#[test]
fn round_trips_every_field_in_order() {
    let mut events: Vec<LogEvent> = (0..25)
        .map(|i| sample_event(1_000 + i, 1_700_000_000_000 + i, &format!("message {i}")))
        .collect();
    events[3].consistency = Consistency::Durable;
    events[3].payloads.push(
        Payload::new("exception", b"Traceback: boom".to_vec()).with_content_type("text/x-trace"),
    );
    events[7].payloads.clear();

    let bytes = write_all(&events);
    let mut reader = RecordReader::new(Cursor::new(bytes));
    let mut decoded = Vec::new();
    while let Some(event) = reader.read().expect("read event") {
        decoded.push(event);
    }

    assert_eq!(decoded, events);
    assert_eq!(reader.records_read(), 25);
    assert!(reader.read().expect("read past end").is_none());
}

#[test]
fn writer_reports_frame_size() {
    let event = sample_event(1, 2, "sized");
    let mut writer = RecordWriter::new(Vec::new());
    let written = writer.write(&event).expect("write");
    let body = encode_event(&event).expect("encode");
    assert_eq!(
        written as usize,
        varint::encoded_len(body.len() as u64) + body.len()
    );
    assert_eq!(writer.get_ref().len() as u64, written);
    assert_eq!(writer.records_written(), 1);
}

#[rstest]
#[case::inside_body(5)]
#[case::inside_prefix(0)]
fn stream_ending_mid_record_is_an_error(#[case] keep_from_second: usize) {
    let first = sample_event(1, 10, "complete");
    let second = sample_event(2, 11, &"x".repeat(300));
    let mut bytes = write_all(std::slice::from_ref(&first));
    let boundary = bytes.len();
    let second_frame = frame_event(&second).expect("frame");
    // A 300 byte body needs a two byte prefix; keep only its first byte.
    let cut = if keep_from_second == 0 { 1 } else { keep_from_second };
    bytes.extend_from_slice(&second_frame[..cut]);
    assert!(bytes.len() > boundary);

    let mut reader = RecordReader::new(Cursor::new(bytes));
    assert_eq!(reader.read().expect("first record"), Some(first));
    let err = reader.read().expect_err("second record is cut short");
    assert!(matches!(err, CodecError::Truncated { .. }), "got {err:?}");
}

#[test]
fn oversized_length_is_rejected_before_allocation() {
    let mut bytes = Vec::new();
    varint::encode(1 << 40, &mut bytes);
    let mut reader = RecordReader::with_max_record_size(Cursor::new(bytes), 1024);
    let err = reader.read().expect_err("frame too large");
    assert!(matches!(err, CodecError::FrameTooLarge { max: 1024, .. }));
}

#[test]
fn garbage_body_is_a_decode_error() {
    let mut bytes = Vec::new();
    varint::encode(3, &mut bytes);
    bytes.extend_from_slice(&[0xc1, 0xc1, 0xc1]);
    let mut reader = RecordReader::new(Cursor::new(bytes));
    assert!(matches!(reader.read(), Err(CodecError::Decode(_))));
}

#[test]
fn iterator_yields_events_then_stops() {
    let events: Vec<_> = (0..3).map(|i| sample_event(i, i, "it")).collect();
    let reader = RecordReader::new(Cursor::new(write_all(&events)));
    let decoded: Vec<_> = reader
        .collect::<Result<Vec<_>, _>>()
        .expect("clean stream");
    assert_eq!(decoded, events);
}

#[test]
fn counting_writer_tracks_offsets_per_record() {
    let mut writer = RecordWriter::new(CountingWriter::with_offset(Vec::new(), 100));
    let mut offsets = Vec::new();
    for i in 0..4 {
        let start = writer.get_ref().bytes_written();
        let written = writer.write(&sample_event(i, i, "offset")).expect("write");
        let end = writer.get_ref().bytes_written();
        assert_eq!(end - start, written);
        assert_eq!(writer.get_ref().last_write_size(), written);
        offsets.push((start, end));
    }
    assert_eq!(offsets[0].0, 100);
    for pair in offsets.windows(2) {
        assert_eq!(pair[0].1, pair[1].0);
    }
}

/// Writer accepting at most three bytes per call.
struct Trickle(Vec<u8>);

impl Write for Trickle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = buf.len().min(3);
        self.0.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn split_writes_count_as_one_record() {
    let mut writer = RecordWriter::new(CountingWriter::new(Trickle(Vec::new())));
    let written = writer.write(&sample_event(9, 9, "trickled")).expect("write");
    assert_eq!(writer.get_ref().last_write_size(), written);
    assert_eq!(writer.get_ref().bytes_written(), written);
    assert_eq!(writer.get_ref().get_ref().0.len() as u64, written);
}

proptest! {
    #[test]
    fn arbitrary_payload_bytes_survive_framing(
        data in proptest::collection::vec(any::<u8>(), 0..2048),
        name in "[a-z]{1,12}",
        level in any::<i32>(),
    ) {
        let mut event = sample_event(77, 88, "primary");
        event.level = level;
        event.payloads.push(Payload::new(name, data));
        let bytes = write_all(std::slice::from_ref(&event));
        let mut reader = RecordReader::new(Cursor::new(bytes));
        prop_assert_eq!(reader.read().expect("decode"), Some(event));
        prop_assert!(reader.read().expect("eof").is_none());
    }
}
