//! WebSocket frame model and wire header (RFC 6455 Section 5.2).
//!
//! [`Frame`] is the owned, already-unmasked form of one wire unit.
//! [`FrameHeader`] is the parsed fixed part of the wire form; the
//! [`FrameCodec`](crate::codec::FrameCodec) decides what to do with it.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::apply_mask_fast;

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Largest header: 2 fixed bytes, 8 length bytes, 4 mask bytes.
pub const MAX_HEADER_SIZE: usize = 14;

/// The fixed part of a frame as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// FIN bit.
    pub fin: bool,
    /// RSV1 bit.
    pub rsv1: bool,
    /// RSV2 bit.
    pub rsv2: bool,
    /// RSV3 bit.
    pub rsv3: bool,
    /// Decoded opcode.
    pub opcode: OpCode,
    /// MASK bit.
    pub masked: bool,
    /// Declared payload length, exactly as read from the wire.
    pub payload_len: u64,
    /// Header size in bytes including the masking key, if any.
    pub header_len: usize,
}

impl FrameHeader {
    /// Parse a header from the front of `buf`.
    ///
    /// Returns `Ok(None)` while the length field is still incomplete. The
    /// masking key is not read here; `header_len` accounts for it so the
    /// caller knows how many bytes to wait for.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidOpcode` if the opcode nibble is not an RFC 6455
    /// opcode.
    pub fn parse(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < 2 {
            return Ok(None);
        }

        let byte0 = buf[0];
        let byte1 = buf[1];

        let opcode = OpCode::from_u8(byte0 & 0x0F)?;
        let masked = (byte1 & 0x80) != 0;

        let (payload_len, len_size) = match byte1 & 0x7F {
            126 => {
                if buf.len() < 4 {
                    return Ok(None);
                }
                (u64::from(u16::from_be_bytes([buf[2], buf[3]])), 2)
            }
            127 => {
                if buf.len() < 10 {
                    return Ok(None);
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&buf[2..10]);
                (u64::from_be_bytes(raw), 8)
            }
            short => (u64::from(short), 0),
        };

        Ok(Some(Self {
            fin: (byte0 & 0x80) != 0,
            rsv1: (byte0 & 0x40) != 0,
            rsv2: (byte0 & 0x20) != 0,
            rsv3: (byte0 & 0x10) != 0,
            opcode,
            masked,
            payload_len,
            header_len: 2 + len_size + if masked { 4 } else { 0 },
        }))
    }

    /// RSV bits packed the way they sit in the first header byte.
    #[inline]
    #[must_use]
    pub const fn rsv_bits(&self) -> u8 {
        (self.rsv1 as u8) << 6 | (self.rsv2 as u8) << 5 | (self.rsv3 as u8) << 4
    }
}

/// A WebSocket frame as defined in RFC 6455.
///
/// Frames are the basic unit of communication in the WebSocket protocol.
/// The payload is always held unmasked; `masked` records whether the frame
/// travelled (or will travel) masked on the wire.
///
/// ## Frame Structure
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode |M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)   |A|     (7)     |             (16/64)           |
/// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
/// | |1|2|3|       |K|             |                               |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |                         Masking key (if present)              |
/// +---------------------------------------------------------------+
/// |                     Payload data                              |
/// +---------------------------------------------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag. True if this is the last fragment of a message.
    pub fin: bool,
    /// Reserved bit 1. Must be 0 unless an extension claims it.
    pub rsv1: bool,
    /// Reserved bit 2. Must be 0 unless an extension claims it.
    pub rsv2: bool,
    /// Reserved bit 3. Must be 0 unless an extension claims it.
    pub rsv3: bool,
    /// Frame opcode defining the interpretation of payload data.
    pub opcode: OpCode,
    /// Whether the frame is masked on the wire.
    pub masked: bool,
    payload: Bytes,
}

impl Frame {
    /// Create a new unmasked frame with clear reserved bits.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            masked: false,
            payload: payload.into(),
        }
    }

    /// Create a final text frame.
    #[must_use]
    pub fn text(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Text, data)
    }

    /// Create a final binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Binary, data)
    }

    /// Create a ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Ping, data)
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Bytes>) -> Self {
        Self::new(true, OpCode::Pong, data)
    }

    /// Mark the frame as masked (or not) on the wire.
    #[must_use]
    pub fn with_masked(mut self, masked: bool) -> Self {
        self.masked = masked;
        self
    }

    /// Get the payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get a cheap clone of the payload buffer.
    #[inline]
    #[must_use]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    /// Replace the payload.
    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        self.payload = payload.into();
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// RSV bits packed the way they sit in the first header byte.
    #[inline]
    #[must_use]
    pub const fn rsv_bits(&self) -> u8 {
        (self.rsv1 as u8) << 6 | (self.rsv2 as u8) << 5 | (self.rsv3 as u8) << 4
    }

    /// Check the structural rules every frame must satisfy before it is sent.
    ///
    /// `allowed_rsv` holds the RSV bits extensions have claimed, in
    /// header-byte position (`0x40`, `0x20`, `0x10`).
    ///
    /// # Errors
    ///
    /// - `Error::ReservedBitsSet` if an unclaimed RSV bit is set
    /// - `Error::FragmentedControlFrame` if a control frame has FIN=0
    /// - `Error::ControlFrameTooLarge` if a control frame payload > 125 bytes
    pub fn validate(&self, allowed_rsv: u8) -> Result<()> {
        if self.rsv_bits() & !allowed_rsv != 0 {
            return Err(Error::ReservedBitsSet);
        }

        if self.opcode.is_control() {
            if !self.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if self.payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(self.payload.len() as u64));
            }
        }

        Ok(())
    }

    /// Append the wire form of this frame to `dst`.
    ///
    /// `mask` is applied to the payload copy in `dst` when present; the
    /// frame itself is left untouched.
    pub fn write_to(&self, dst: &mut BytesMut, mask: Option<[u8; 4]>) {
        let payload_len = self.payload.len();
        dst.reserve(self.wire_size(mask.is_some()));

        let mut byte0 = self.opcode.as_u8() | self.rsv_bits();
        if self.fin {
            byte0 |= 0x80;
        }
        dst.put_u8(byte0);

        let mask_bit = if mask.is_some() { 0x80 } else { 0 };
        if payload_len <= MAX_CONTROL_FRAME_PAYLOAD {
            dst.put_u8(mask_bit | payload_len as u8);
        } else if let Ok(len) = u16::try_from(payload_len) {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(len);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(payload_len as u64);
        }

        match mask {
            Some(key) => {
                dst.put_slice(&key);
                let start = dst.len();
                dst.extend_from_slice(&self.payload);
                apply_mask_fast(&mut dst[start..], key);
            }
            None => dst.extend_from_slice(&self.payload),
        }
    }

    /// Calculate the number of bytes [`write_to`](Self::write_to) appends.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let payload_len = self.payload.len();
        let extended_len_size = if payload_len <= MAX_CONTROL_FRAME_PAYLOAD {
            0
        } else if payload_len <= usize::from(u16::MAX) {
            2
        } else {
            8
        };
        let mask_size = if masked { 4 } else { 0 };
        2 + extended_len_size + mask_size + payload_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Header parsing
    // ==========================================================================

    #[test]
    fn test_parse_unmasked_text_header() {
        let header = FrameHeader::parse(&[0x81, 0x05, b'H']).unwrap().unwrap();
        assert!(header.fin);
        assert_eq!(header.opcode, OpCode::Text);
        assert!(!header.masked);
        assert_eq!(header.payload_len, 5);
        assert_eq!(header.header_len, 2);
    }

    #[test]
    fn test_parse_masked_header_accounts_for_key() {
        let header = FrameHeader::parse(&[0x82, 0x83]).unwrap().unwrap();
        assert!(header.masked);
        assert_eq!(header.payload_len, 3);
        assert_eq!(header.header_len, 6);
    }

    #[test]
    fn test_parse_fragmented_header() {
        let header = FrameHeader::parse(&[0x01, 0x00]).unwrap().unwrap();
        assert!(!header.fin);
        assert_eq!(header.opcode, OpCode::Text);
    }

    #[test]
    fn test_parse_extended_length_126() {
        let header = FrameHeader::parse(&[0x82, 126, 0x01, 0x00]).unwrap().unwrap();
        assert_eq!(header.payload_len, 256);
        assert_eq!(header.header_len, 4);
    }

    #[test]
    fn test_parse_extended_length_127() {
        let buf = [0x82, 127, 0, 0, 0, 0, 0, 1, 0, 0];
        let header = FrameHeader::parse(&buf).unwrap().unwrap();
        assert_eq!(header.payload_len, 65536);
        assert_eq!(header.header_len, 10);
    }

    #[test]
    fn test_parse_keeps_raw_high_bit_length() {
        let buf = [0x82, 127, 0x80, 0, 0, 0, 0, 0, 0, 1];
        let header = FrameHeader::parse(&buf).unwrap().unwrap();
        assert_eq!(header.payload_len, 0x8000_0000_0000_0001);
    }

    #[test]
    fn test_parse_incomplete_header() {
        assert_eq!(FrameHeader::parse(&[]).unwrap(), None);
        assert_eq!(FrameHeader::parse(&[0x81]).unwrap(), None);
        assert_eq!(FrameHeader::parse(&[0x81, 126, 0x01]).unwrap(), None);
        assert_eq!(FrameHeader::parse(&[0x81, 127, 0, 0, 0]).unwrap(), None);
    }

    #[test]
    fn test_parse_invalid_opcode() {
        assert_eq!(FrameHeader::parse(&[0x83, 0x00]), Err(Error::InvalidOpcode(0x3)));
        assert_eq!(FrameHeader::parse(&[0x8B, 0x00]), Err(Error::InvalidOpcode(0xB)));
    }

    #[test]
    fn test_parse_rsv_bits() {
        let header = FrameHeader::parse(&[0xC1, 0x00]).unwrap().unwrap();
        assert!(header.rsv1);
        assert_eq!(header.rsv_bits(), 0x40);
    }

    // ==========================================================================
    // Validation
    // ==========================================================================

    #[test]
    fn test_validate_fragmented_control_frame() {
        let frame = Frame::new(false, OpCode::Ping, Bytes::new());
        assert_eq!(frame.validate(0), Err(Error::FragmentedControlFrame));
    }

    #[test]
    fn test_validate_control_frame_too_large() {
        let frame = Frame::ping(vec![0u8; 126]);
        assert_eq!(frame.validate(0), Err(Error::ControlFrameTooLarge(126)));
        assert!(Frame::ping(vec![0u8; 125]).validate(0).is_ok());
    }

    #[test]
    fn test_validate_reserved_bits() {
        let mut frame = Frame::text("x");
        frame.rsv1 = true;
        assert_eq!(frame.validate(0), Err(Error::ReservedBitsSet));
        assert!(frame.validate(0x40).is_ok());
        frame.rsv3 = true;
        assert_eq!(frame.validate(0x40), Err(Error::ReservedBitsSet));
    }

    // ==========================================================================
    // Writing
    // ==========================================================================

    #[test]
    fn test_write_unmasked_text_frame() {
        let mut buf = BytesMut::new();
        Frame::text("Hello").write_to(&mut buf, None);
        assert_eq!(&buf[..], &[0x81, 0x05, b'H', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn test_write_masked_text_frame() {
        // RFC 6455 Section 5.7 example
        let mut buf = BytesMut::new();
        Frame::text("Hello").write_to(&mut buf, Some([0x37, 0xfa, 0x21, 0x3d]));
        assert_eq!(
            &buf[..],
            &[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]
        );
    }

    #[test]
    fn test_write_extended_length_126() {
        let frame = Frame::binary(vec![0xAB; 256]);
        let mut buf = BytesMut::new();
        frame.write_to(&mut buf, None);
        assert_eq!(&buf[..4], &[0x82, 126, 0x01, 0x00]);
        assert_eq!(buf.len(), frame.wire_size(false));
    }

    #[test]
    fn test_write_extended_length_127() {
        let frame = Frame::binary(vec![0u8; 65536]);
        let mut buf = BytesMut::new();
        frame.write_to(&mut buf, None);
        assert_eq!(&buf[..10], &[0x82, 127, 0, 0, 0, 0, 0, 1, 0, 0]);
        assert_eq!(buf.len(), 10 + 65536);
    }

    #[test]
    fn test_write_sets_rsv_and_fin_bits() {
        let mut frame = Frame::new(false, OpCode::Binary, vec![1]);
        frame.rsv1 = true;
        let mut buf = BytesMut::new();
        frame.write_to(&mut buf, None);
        assert_eq!(buf[0], 0x42);
    }

    #[test]
    fn test_wire_size() {
        assert_eq!(Frame::text("abc").wire_size(false), 5);
        assert_eq!(Frame::text("abc").wire_size(true), 9);
        assert_eq!(Frame::binary(vec![0; 126]).wire_size(false), 130);
        assert_eq!(Frame::binary(vec![0; 65536]).wire_size(true), 65536 + 14);
    }
}
