//! Incoming frame header validation (RFC 6455 Section 5).
//!
//! Runs on the parsed header, before any payload byte is buffered for the
//! frame. Checks happen in a fixed order so the same input always yields
//! the same error:
//!
//! 1. RSV bits not claimed by an extension
//! 2. 64-bit length with the most significant bit set
//! 3. control frame fragmented or longer than 125 bytes
//! 4. declared length over the configured frame limit
//! 5. masking direction for the local role

use tracing::warn;

use crate::config::Limits;
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::protocol::frame::{FrameHeader, MAX_CONTROL_FRAME_PAYLOAD};

/// Frame validator for incoming WebSocket frames.
///
/// Enforces RFC 6455 security requirements based on connection role.
#[derive(Debug, Clone)]
pub struct FrameValidator {
    /// Connection role (Client or Server).
    role: Role,
    /// Size limits for frames.
    limits: Limits,
    /// Whether to accept unmasked frames (server-side, non-compliant).
    accept_unmasked_frames: bool,
    /// RSV bits claimed by negotiated extensions, in header-byte position.
    allowed_rsv: u8,
}

impl FrameValidator {
    /// Create a new frame validator.
    #[must_use]
    pub fn new(role: Role, limits: Limits) -> Self {
        Self {
            role,
            limits,
            accept_unmasked_frames: false,
            allowed_rsv: 0,
        }
    }

    /// Create a validator that accepts unmasked frames (non-RFC compliant).
    ///
    /// This is useful for testing but should not be used in production.
    #[must_use]
    pub fn with_accept_unmasked(mut self, accept: bool) -> Self {
        self.accept_unmasked_frames = accept;
        self
    }

    /// Allow the given RSV bits (`0x40`, `0x20`, `0x10`, or a combination).
    #[must_use]
    pub fn with_allowed_rsv(mut self, bits: u8) -> Self {
        self.allowed_rsv = bits & 0x70;
        self
    }

    /// RSV bits currently allowed.
    #[must_use]
    pub const fn allowed_rsv(&self) -> u8 {
        self.allowed_rsv
    }

    /// Connection role this validator checks for.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Validate a parsed header.
    ///
    /// # Errors
    ///
    /// - `Error::ReservedBitsSet` - RSV bits set without a claiming extension
    /// - `Error::MessageTooBig` - 64-bit length high bit set, or over the frame limit
    /// - `Error::FragmentedControlFrame` - control frame with FIN=0
    /// - `Error::ControlFrameTooLarge` - control frame longer than 125 bytes
    /// - `Error::UnmaskedClientFrame` - server received an unmasked frame
    /// - `Error::MaskedServerFrame` - client received a masked frame
    pub fn validate_header(&self, header: &FrameHeader) -> Result<()> {
        if header.rsv_bits() & !self.allowed_rsv != 0 {
            warn!(rsv = header.rsv_bits(), "reserved bits set without extension");
            return Err(Error::ReservedBitsSet);
        }

        if header.payload_len > i64::MAX as u64 {
            return Err(Error::MessageTooBig {
                size: header.payload_len,
                max: self.limits.max_frame_size as u64,
            });
        }

        if header.opcode.is_control() {
            if !header.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if header.payload_len > MAX_CONTROL_FRAME_PAYLOAD as u64 {
                return Err(Error::ControlFrameTooLarge(header.payload_len));
            }
        }

        self.limits.check_frame_size(header.payload_len)?;

        self.validate_masking(header.masked)
    }

    /// Validate masking rules per RFC 6455 Section 5.1.
    ///
    /// - Server MUST reject unmasked client frames
    /// - Client MUST reject masked server frames
    fn validate_masking(&self, masked: bool) -> Result<()> {
        match (self.role.expects_masked(), masked) {
            (true, false) if !self.accept_unmasked_frames => {
                warn!("unmasked frame from client");
                Err(Error::UnmaskedClientFrame)
            }
            (false, true) => {
                warn!("masked frame from server");
                Err(Error::MaskedServerFrame)
            }
            _ => Ok(()),
        }
    }
}
