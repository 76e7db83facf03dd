use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::config::Config;
use crate::connection::Role;
use crate::error::Result;
use crate::protocol::frame::FrameHeader;
use crate::protocol::mask::apply_mask_fast;
use crate::protocol::validation::FrameValidator;
use crate::protocol::Frame;

/// Generate a random seed for mask generation.
/// Falls back to system time if getrandom fails.
fn random_mask_seed() -> u32 {
    let mut buf = [0u8; 4];
    if getrandom::getrandom(&mut buf).is_ok() {
        u32::from_le_bytes(buf)
    } else {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u32)
            .unwrap_or(0x1234_5678)
    }
}

/// RFC 6455 frame codec for one side of a connection.
///
/// Decoding is incremental: [`decode`](Self::decode) returns `Ok(None)`
/// until a whole frame is buffered and leaves the buffer untouched in that
/// case. Header checks run as soon as the header is readable, so an
/// oversized or malformed frame is rejected before its payload arrives.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    role: Role,
    validator: FrameValidator,
    mask_counter: u32,
}

impl FrameCodec {
    /// Create a codec for `role` using the limits and masking policy of `config`.
    #[must_use]
    pub fn new(role: Role, config: &Config) -> Self {
        let validator = FrameValidator::new(role, config.limits.clone())
            .with_accept_unmasked(config.accept_unmasked_frames);
        Self {
            role,
            validator,
            mask_counter: random_mask_seed(),
        }
    }

    /// The local role.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Allow RSV bits claimed by active extensions (header-byte position).
    pub fn set_allowed_rsv(&mut self, bits: u8) {
        self.validator = self.validator.clone().with_allowed_rsv(bits);
    }

    /// RSV bits currently allowed on incoming and outgoing frames.
    #[must_use]
    pub const fn allowed_rsv(&self) -> u8 {
        self.validator.allowed_rsv()
    }

    fn generate_mask(&mut self) -> [u8; 4] {
        self.mask_counter = self.mask_counter.wrapping_add(0x9E37_79B9);
        let a = self.mask_counter;
        let b = a.wrapping_mul(0x85EB_CA6B);
        let c = b ^ (b >> 13);
        let d = c.wrapping_mul(0xC2B2_AE35);
        d.to_le_bytes()
    }

    /// Take one complete frame off the front of `buf`.
    ///
    /// The returned frame is unmasked and records on `masked` whether it
    /// arrived masked.
    ///
    /// # Errors
    ///
    /// Returns the first violation found, in this order: `InvalidOpcode`,
    /// `ReservedBitsSet`, `MessageTooBig` (64-bit length high bit),
    /// `FragmentedControlFrame`, `ControlFrameTooLarge`, `MessageTooBig`
    /// (frame limit), `UnmaskedClientFrame` / `MaskedServerFrame`.
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Frame>> {
        let Some(header) = FrameHeader::parse(buf)? else {
            return Ok(None);
        };
        self.validator.validate_header(&header)?;

        // Bounded by the frame limit just checked.
        let payload_len = header.payload_len as usize;
        if buf.len() < header.header_len + payload_len {
            return Ok(None);
        }

        let mask = header.masked.then(|| {
            let at = header.header_len - 4;
            [buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]
        });

        buf.advance(header.header_len);
        let mut payload = buf.split_to(payload_len);
        if let Some(key) = mask {
            apply_mask_fast(&mut payload, key);
        }

        trace!(
            opcode = %header.opcode,
            fin = header.fin,
            len = payload_len,
            "decoded frame"
        );

        let mut frame = Frame::new(header.fin, header.opcode, payload.freeze());
        frame.rsv1 = header.rsv1;
        frame.rsv2 = header.rsv2;
        frame.rsv3 = header.rsv3;
        frame.masked = header.masked;
        Ok(Some(frame))
    }

    /// Append the wire form of `frame` to `dst`, masking it when this codec
    /// is the client side.
    ///
    /// # Errors
    ///
    /// Returns the frame's structural violation (see [`Frame::validate`]).
    pub fn encode(&mut self, frame: &Frame, dst: &mut BytesMut) -> Result<()> {
        frame.validate(self.validator.allowed_rsv())?;
        let mask = self.role.must_mask().then(|| self.generate_mask());
        frame.write_to(dst, mask);
        trace!(
            opcode = %frame.opcode,
            fin = frame.fin,
            len = frame.payload().len(),
            "encoded frame"
        );
        Ok(())
    }
}
