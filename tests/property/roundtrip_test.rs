// tests/property/roundtrip_test.rs

//! Property-based tests for the wire codec: any frame the client can
//! represent must survive encode/decode unchanged, no matter how the byte
//! stream is fragmented.

use beryl::core::protocol::{RespCodec, RespFrame};
use bytes::{Bytes, BytesMut};
use proptest::prelude::*;
use tokio_util::codec::{Decoder, Encoder};

/// Text safe for line-delimited frame types (no CR/LF).
const LINE_TEXT: &str = "[a-zA-Z0-9 _:/.-]{0,32}";

fn frame_strategy() -> impl Strategy<Value = RespFrame> {
    let leaf = prop_oneof![
        Just(RespFrame::Null),
        Just(RespFrame::NullArray),
        any::<i64>().prop_map(RespFrame::Integer),
        LINE_TEXT.prop_map(RespFrame::SimpleString),
        LINE_TEXT.prop_map(RespFrame::Error),
        prop::collection::vec(any::<u8>(), 0..128)
            .prop_map(|bytes| RespFrame::BulkString(Bytes::from(bytes))),
    ];
    leaf.prop_recursive(3, 24, 6, |inner| {
        prop::collection::vec(inner, 0..6).prop_map(RespFrame::Array)
    })
}

fn encode(frame: &RespFrame) -> BytesMut {
    let mut buf = BytesMut::new();
    RespCodec
        .encode(frame.clone(), &mut buf)
        .expect("encoding cannot fail");
    buf
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        max_shrink_iters: 1000,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_encode_decode_roundtrip(frame in frame_strategy()) {
        let mut buf = encode(&frame);
        let decoded = RespCodec.decode(&mut buf).unwrap();
        prop_assert_eq!(decoded, Some(frame));
        prop_assert!(buf.is_empty(), "decode must consume the whole frame");
    }

    #[test]
    fn test_partial_input_never_misdecodes(
        (frame, split) in frame_strategy().prop_flat_map(|frame| {
            let len = {
                let mut buf = BytesMut::new();
                RespCodec.encode(frame.clone(), &mut buf).unwrap();
                buf.len()
            };
            (Just(frame), 0..len)
        })
    ) {
        let wire = encode(&frame);
        let mut buf = BytesMut::from(&wire[..split]);

        // A strict prefix is never a complete frame and never an error.
        prop_assert_eq!(RespCodec.decode(&mut buf).unwrap(), None);

        // Feeding the remainder completes the original frame exactly.
        buf.extend_from_slice(&wire[split..]);
        prop_assert_eq!(RespCodec.decode(&mut buf).unwrap(), Some(frame));
        prop_assert!(buf.is_empty());
    }

    #[test]
    fn test_two_frames_decode_independently(
        first in frame_strategy(),
        second in frame_strategy(),
    ) {
        let mut buf = encode(&first);
        buf.extend_from_slice(&encode(&second));

        prop_assert_eq!(RespCodec.decode(&mut buf).unwrap(), Some(first));
        prop_assert_eq!(RespCodec.decode(&mut buf).unwrap(), Some(second));
        prop_assert_eq!(RespCodec.decode(&mut buf).unwrap(), None);
    }
}
