//! Property-based tests for the frame codec and close code domain.

use bytes::BytesMut;
use proptest::prelude::*;
use wspump::protocol::{Utf8Validator, apply_mask, apply_mask_fast, validate_utf8};
use wspump::{CloseCode, CloseFrame, Config, Error, Frame, FrameCodec, Limits, OpCode, Role};

fn data_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![
        Just(OpCode::Text),
        Just(OpCode::Binary),
        Just(OpCode::Continuation),
    ]
}

fn control_opcode_strategy() -> impl Strategy<Value = OpCode> {
    prop_oneof![Just(OpCode::Close), Just(OpCode::Ping), Just(OpCode::Pong)]
}

/// Any frame the codec is willing to encode.
fn frame_strategy() -> impl Strategy<Value = Frame> {
    prop_oneof![
        (
            any::<bool>(),
            data_opcode_strategy(),
            prop::collection::vec(any::<u8>(), 0..70_000)
        )
            .prop_map(|(fin, opcode, payload)| Frame::new(fin, opcode, payload)),
        (
            control_opcode_strategy(),
            prop::collection::vec(any::<u8>(), 0..=125)
        )
            .prop_map(|(opcode, payload)| Frame::new(true, opcode, payload)),
    ]
}

fn codec(role: Role) -> FrameCodec {
    let config = Config::default().with_limits(Limits::unrestricted());
    FrameCodec::new(role, &config)
}

fn encode(role: Role, frame: &Frame) -> BytesMut {
    let mut buf = BytesMut::new();
    codec(role).encode(frame, &mut buf).unwrap();
    buf
}

proptest! {
    // =========================================================================
    // Round trip in both directions
    // =========================================================================
    #[test]
    fn test_roundtrip_client_to_server(frame in frame_strategy()) {
        let mut wire = encode(Role::Client, &frame);
        let wire_len = wire.len();
        prop_assert_eq!(wire_len, frame.wire_size(true));

        let decoded = codec(Role::Server).decode(&mut wire).unwrap();
        prop_assert_eq!(decoded, Some(frame.with_masked(true)));
        prop_assert!(wire.is_empty());
    }

    #[test]
    fn test_roundtrip_server_to_client(frame in frame_strategy()) {
        let mut wire = encode(Role::Server, &frame);
        prop_assert_eq!(wire.len(), frame.wire_size(false));

        let decoded = codec(Role::Client).decode(&mut wire).unwrap();
        prop_assert_eq!(decoded, Some(frame));
    }

    // =========================================================================
    // Incomplete input is never an error and never consumed
    // =========================================================================
    #[test]
    fn test_truncated_frame_needs_more(
        payload in prop::collection::vec(any::<u8>(), 0..1000),
        cut in any::<prop::sample::Index>()
    ) {
        let wire = encode(Role::Server, &Frame::binary(payload));
        let keep = cut.index(wire.len());
        let mut partial = BytesMut::from(&wire[..keep]);

        prop_assert_eq!(codec(Role::Client).decode(&mut partial), Ok(None));
        prop_assert_eq!(partial.len(), keep);
    }

    // =========================================================================
    // Arbitrary input never panics, and errors leave no half-read frame
    // =========================================================================
    #[test]
    fn test_decode_arbitrary_bytes(data in prop::collection::vec(any::<u8>(), 0..300)) {
        let mut server = codec(Role::Server);
        let mut buf = BytesMut::from(&data[..]);
        while let Ok(Some(_)) = server.decode(&mut buf) {}
    }

    #[test]
    fn test_sequential_frames(
        frames in prop::collection::vec(frame_strategy(), 1..5)
    ) {
        let mut client = codec(Role::Client);
        let mut wire = BytesMut::new();
        for frame in &frames {
            client.encode(frame, &mut wire).unwrap();
        }

        let mut server = codec(Role::Server);
        for frame in frames {
            let decoded = server.decode(&mut wire).unwrap();
            prop_assert_eq!(decoded, Some(frame.with_masked(true)));
        }
        prop_assert_eq!(server.decode(&mut wire), Ok(None));
    }

    // =========================================================================
    // Control frame payload bound
    // =========================================================================
    #[test]
    fn test_oversized_control_frame_rejected(
        opcode in control_opcode_strategy(),
        len in 126usize..1000
    ) {
        let frame = Frame::new(true, opcode, vec![0u8; len]);
        let mut buf = BytesMut::new();
        prop_assert_eq!(
            codec(Role::Server).encode(&frame, &mut buf),
            Err(Error::ControlFrameTooLarge(len as u64))
        );
        prop_assert!(buf.is_empty());
    }

    // =========================================================================
    // Masking
    // =========================================================================
    #[test]
    fn test_mask_reversible(
        data in prop::collection::vec(any::<u8>(), 0..2000),
        mask in any::<[u8; 4]>()
    ) {
        let mut masked = data.clone();
        apply_mask(&mut masked, mask);
        apply_mask(&mut masked, mask);
        prop_assert_eq!(data, masked);
    }

    #[test]
    fn test_fast_mask_matches_scalar(
        data in prop::collection::vec(any::<u8>(), 0..2000),
        mask in any::<[u8; 4]>()
    ) {
        let mut scalar = data.clone();
        let mut fast = data;
        apply_mask(&mut scalar, mask);
        apply_mask_fast(&mut fast, mask);
        prop_assert_eq!(scalar, fast);
    }

    // =========================================================================
    // UTF-8 validation is independent of how the text is split
    // =========================================================================
    #[test]
    fn test_utf8_split_anywhere(
        text in "\\PC{0,64}",
        cut in any::<prop::sample::Index>()
    ) {
        let bytes = text.as_bytes();
        let at = cut.index(bytes.len() + 1);
        let mut validator = Utf8Validator::new();
        prop_assert!(validator.validate(&bytes[..at], false).is_ok());
        prop_assert!(validator.validate(&bytes[at..], true).is_ok());
    }

    #[test]
    fn test_utf8_agrees_with_std(data in prop::collection::vec(any::<u8>(), 0..64)) {
        prop_assert_eq!(
            validate_utf8(&data).is_ok(),
            std::str::from_utf8(&data).is_ok()
        );
    }

    // =========================================================================
    // Close code domain
    // =========================================================================
    #[test]
    fn test_close_code_domain(code in any::<u16>(), reason in "[a-z ]{0,40}") {
        let expected = matches!(code, 1000..=1003 | 1007..=1014 | 3000..=4999);
        prop_assert_eq!(CloseCode::from_u16(code).is_valid(), expected);

        let mut payload = code.to_be_bytes().to_vec();
        payload.extend_from_slice(reason.as_bytes());
        let mut frame = CloseFrame::default();
        frame.set_payload(payload);
        prop_assert_eq!(frame.is_valid().is_ok(), expected);
        prop_assert_eq!(frame.code().as_u16(), code);
    }

    #[test]
    fn test_reserved_codes_never_valid(code in prop_oneof![Just(1004u16), Just(1005), Just(1006), Just(1015)]) {
        prop_assert!(CloseCode::from_u16(code).is_reserved());
        prop_assert!(CloseFrame::new(CloseCode::from_u16(code), "").is_err());
    }
}

// =============================================================================
// Length encoding boundaries
// =============================================================================

#[test]
fn test_length_encoding_boundaries() {
    for (len, header) in [(125, 2), (126, 4), (65_535, 4), (65_536, 10)] {
        let frame = Frame::binary(vec![0u8; len]);
        let wire = encode(Role::Server, &frame);
        assert_eq!(wire.len(), header + len, "payload {len}");

        let masked = encode(Role::Client, &frame);
        assert_eq!(masked.len(), header + 4 + len, "masked payload {len}");
    }
}

#[test]
fn test_empty_close_payload_is_valid() {
    let mut frame = CloseFrame::default();
    frame.set_payload(Vec::new());
    assert!(frame.is_valid().is_ok());
}
