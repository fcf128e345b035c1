use super::*;
use crate::codec::frame::FRAME_VERSION;
use crate::types::{FieldValue, Identity, Record};
use chrono::{TimeZone, Utc};
use std::io::Cursor;

fn order() -> Record {
    Record::new("Order", "Order", 1)
        .with_field("when", Utc.with_ymd_and_hms(2017, 6, 1, 12, 0, 0).unwrap())
        .with_field(
            "line_items",
            vec![Identity::Int(101), Identity::Int(102), Identity::Int(103)],
        )
}

#[test]
fn every_format_reads_back_the_same_record() {
    let record = order();
    for serializer in [Serializer::Bincode, Serializer::Json] {
        for compression in [Compression::None, Compression::Lz4, Compression::Zstd] {
            let codec = EntityCodec::new(serializer, compression);
            let frame = codec.encode(&record).unwrap();
            let decoded: Record = codec.decode(&frame).unwrap();
            assert_eq!(decoded, record, "{:?}/{:?}", serializer, compression);
        }
    }
}

#[test]
fn decoder_follows_frame_header() {
    let json = EntityCodec::new(Serializer::Json, Compression::Zstd);
    let frame = json.encode(&order()).unwrap();

    let default_codec = EntityCodec::default();
    let decoded: Record = default_codec.decode(&frame).unwrap();
    assert_eq!(decoded.field("line_items").and_then(FieldValue::as_refs).map(<[_]>::len), Some(3));
}

#[test]
fn corrupted_payload_fails_checksum() {
    let codec = EntityCodec::default();
    let mut frame = codec.encode(&order()).unwrap().to_vec();
    let last = frame.len() - 1;
    frame[last] ^= 0xFF;

    let err = codec.decode::<Record>(&frame).unwrap_err();
    assert!(matches!(err, CodecError::ChecksumMismatch { .. }));
}

#[test]
fn rejects_foreign_and_future_frames() {
    let codec = EntityCodec::default();
    let mut frame = codec.encode(&order()).unwrap().to_vec();

    frame[4] = FRAME_VERSION + 1;
    assert!(matches!(
        codec.decode::<Record>(&frame),
        Err(CodecError::UnsupportedVersion(_))
    ));

    frame[0] = b'X';
    assert!(matches!(
        codec.decode::<Record>(&frame),
        Err(CodecError::BadMagic(_))
    ));

    assert!(matches!(
        codec.decode::<Record>(&frame[..4]),
        Err(CodecError::Truncated { .. })
    ));
}

#[test]
fn reads_consecutive_frames_from_a_stream() {
    let codec = EntityCodec::new(Serializer::Bincode, Compression::Lz4);
    let mut stream = Vec::new();
    for id in 0..3 {
        let record = Record::new("LineItem", "LineItem", id).with_field("description", "soup");
        stream.extend_from_slice(&codec.encode(&record).unwrap());
    }

    let mut cursor = Cursor::new(stream);
    let mut keys = Vec::new();
    while let Some(frame) = EntityCodec::read_next(&mut cursor).unwrap() {
        let record: Record = codec.decode(&frame).unwrap();
        keys.push(record.key().clone());
    }
    assert_eq!(keys, vec![Identity::Int(0), Identity::Int(1), Identity::Int(2)]);
}

#[test]
fn torn_tail_is_reported_as_truncation() {
    let codec = EntityCodec::default();
    let frame = codec.encode(&order()).unwrap();
    let mut cursor = Cursor::new(frame[..frame.len() - 3].to_vec());
    assert!(matches!(
        EntityCodec::read_next(&mut cursor),
        Err(CodecError::Truncated { .. })
    ));
}

#[test]
fn oversized_length_is_rejected_before_reading() {
    let codec = EntityCodec::default();
    let mut frame = codec.encode(&order()).unwrap().to_vec();
    frame[8..12].copy_from_slice(&u32::MAX.to_le_bytes());

    let mut cursor = Cursor::new(frame.clone());
    assert!(matches!(
        EntityCodec::read_next(&mut cursor),
        Err(CodecError::FrameTooLarge { len, max })
            if len == u32::MAX as usize && max == MAX_FRAME_PAYLOAD as usize
    ));
    assert!(matches!(
        codec.decode::<Record>(&frame),
        Err(CodecError::FrameTooLarge { .. })
    ));
}

#[test]
fn length_past_end_of_stream_is_truncation() {
    let codec = EntityCodec::default();
    let mut frame = codec.encode(&order()).unwrap().to_vec();
    let claimed = MAX_FRAME_PAYLOAD;
    frame[8..12].copy_from_slice(&claimed.to_le_bytes());

    let mut cursor = Cursor::new(frame.clone());
    match EntityCodec::read_next(&mut cursor) {
        Err(CodecError::Truncated { expected, found }) => {
            assert_eq!(expected, FRAME_HEADER_LEN + claimed as usize);
            assert_eq!(found, frame.len());
        }
        other => panic!("expected truncation, got {:?}", other.map(|f| f.map(|b| b.len()))),
    }
}
