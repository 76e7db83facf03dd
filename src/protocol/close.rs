//! Close frame semantics (RFC 6455 Section 5.5.1 and 7.4).
//!
//! A [`CloseFrame`] keeps its wire payload as the source of truth for
//! validation, alongside the code and reason it resolves to. Parsing
//! ([`CloseFrame::set_payload`]) never fails; [`CloseFrame::is_valid`] is the
//! separate check that decides whether the frame may be accepted or sent.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::message::CloseCode;
use crate::protocol::frame::{Frame, MAX_CONTROL_FRAME_PAYLOAD};
use crate::protocol::OpCode;

/// Longest reason that still fits a control frame next to the 2-byte code.
pub const MAX_REASON_LEN: usize = MAX_CONTROL_FRAME_PAYLOAD - 2;

/// A Close control frame.
///
/// The default frame carries [`CloseCode::Normal`] with an empty reason,
/// i.e. a 2-byte payload.
#[derive(Debug, Clone)]
pub struct CloseFrame {
    /// Final fragment flag. Must be set for a valid close frame.
    pub fin: bool,
    /// Reserved bit 1.
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    code: CloseCode,
    reason: String,
    payload: Bytes,
}

impl Default for CloseFrame {
    fn default() -> Self {
        let mut frame = Self {
            fin: true,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            code: CloseCode::Normal,
            reason: String::new(),
            payload: Bytes::new(),
        };
        frame.update_payload();
        frame
    }
}

impl CloseFrame {
    /// Build a close frame that is guaranteed to be sendable.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidCloseCode` if `code` may not appear on the wire
    /// - `Error::ControlFrameTooLarge` if the reason does not fit in 123 bytes
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Result<Self> {
        let reason = reason.into();
        if !code.is_valid() {
            return Err(Error::InvalidCloseCode(code.as_u16()));
        }
        if reason.len() > MAX_REASON_LEN {
            return Err(Error::ControlFrameTooLarge((reason.len() + 2) as u64));
        }
        let mut frame = Self::default();
        frame.code = code;
        frame.reason = reason;
        frame.update_payload();
        Ok(frame)
    }

    /// A close frame with an empty payload (no status code on the wire).
    ///
    /// Resolves to [`CloseCode::NoStatus`] locally.
    #[must_use]
    pub fn empty() -> Self {
        let mut frame = Self::default();
        frame.code = CloseCode::NoStatus;
        frame.payload = Bytes::new();
        frame
    }

    /// Build a close frame from a decoded frame, parsing its payload.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidFrame` if `frame` is not a Close frame.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        if frame.opcode != OpCode::Close {
            return Err(Error::InvalidFrame(format!(
                "expected Close frame, got {}",
                frame.opcode
            )));
        }
        let mut close = Self::default();
        close.fin = frame.fin;
        close.rsv1 = frame.rsv1;
        close.rsv2 = frame.rsv2;
        close.rsv3 = frame.rsv3;
        close.set_payload(frame.payload_bytes());
        Ok(close)
    }

    /// Convert into a generic frame for encoding.
    #[must_use]
    pub fn to_frame(&self) -> Frame {
        let mut frame = Frame::new(self.fin, OpCode::Close, self.payload.clone());
        frame.rsv1 = self.rsv1;
        frame.rsv2 = self.rsv2;
        frame.rsv3 = self.rsv3;
        frame
    }

    /// The resolved close code.
    #[must_use]
    pub const fn code(&self) -> CloseCode {
        self.code
    }

    /// The resolved close reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// The payload bytes as they go on the wire.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Set the code and rebuild the payload. No range check happens here.
    pub fn set_code(&mut self, code: CloseCode) {
        self.code = code;
        self.update_payload();
    }

    /// Set the reason and rebuild the payload.
    pub fn set_reason(&mut self, reason: impl Into<String>) {
        self.reason = reason.into();
        self.update_payload();
    }

    /// Replace the payload and re-derive code and reason from it.
    ///
    /// The code range is not enforced:
    /// - empty payload resolves to [`CloseCode::Normal`]
    /// - a single byte resolves to [`CloseCode::ProtocolError`]
    /// - otherwise the first two bytes are the big-endian code, and a reason
    ///   that is not UTF-8 resolves to [`CloseCode::InvalidPayload`] with an
    ///   empty reason
    ///
    /// The raw payload is kept so [`is_valid`](Self::is_valid) still sees
    /// what arrived.
    pub fn set_payload(&mut self, payload: impl Into<Bytes>) {
        let payload = payload.into();
        self.reason.clear();
        self.code = match payload.len() {
            0 => CloseCode::Normal,
            1 => CloseCode::ProtocolError,
            _ => match std::str::from_utf8(&payload[2..]) {
                Ok(reason) => {
                    self.reason.push_str(reason);
                    CloseCode::from_u16(u16::from_be_bytes([payload[0], payload[1]]))
                }
                Err(_) => CloseCode::InvalidPayload,
            },
        };
        self.payload = payload;
    }

    /// Check whether this frame may be accepted or sent.
    ///
    /// # Errors
    ///
    /// In order of evaluation:
    /// - `Error::FragmentedControlFrame` if FIN is clear
    /// - `Error::ReservedBitsSet` if any RSV bit is set
    /// - `Error::ControlFrameTooLarge` if the payload exceeds 125 bytes
    /// - `Error::InvalidClosePayload` for a 1-byte payload
    /// - `Error::InvalidCloseCode` if the wire code is outside the sendable set
    /// - `Error::InvalidUtf8` if the reason bytes are not UTF-8
    pub fn is_valid(&self) -> Result<()> {
        if !self.fin {
            return Err(Error::FragmentedControlFrame);
        }
        if self.rsv1 || self.rsv2 || self.rsv3 {
            return Err(Error::ReservedBitsSet);
        }
        if self.payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
            return Err(Error::ControlFrameTooLarge(self.payload.len() as u64));
        }

        match self.payload.len() {
            0 => Ok(()),
            1 => Err(Error::InvalidClosePayload),
            _ => {
                let code = CloseCode::from_u16(u16::from_be_bytes([
                    self.payload[0],
                    self.payload[1],
                ]));
                if !code.is_valid() {
                    return Err(Error::InvalidCloseCode(code.as_u16()));
                }
                std::str::from_utf8(&self.payload[2..])?;
                Ok(())
            }
        }
    }

    fn update_payload(&mut self) {
        if self.code == CloseCode::NoStatus && self.reason.is_empty() {
            self.payload = Bytes::new();
            return;
        }
        let mut buf = BytesMut::with_capacity(2 + self.reason.len());
        buf.put_u16(self.code.as_u16());
        buf.put_slice(self.reason.as_bytes());
        self.payload = buf.freeze();
    }
}

impl PartialEq for CloseFrame {
    fn eq(&self, other: &Self) -> bool {
        self.fin == other.fin
            && self.rsv1 == other.rsv1
            && self.rsv2 == other.rsv2
            && self.rsv3 == other.rsv3
            && self.code == other.code
            && self.reason == other.reason
    }
}

impl Eq for CloseFrame {}

impl std::fmt::Display for CloseFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CloseFrame {{ fin: {}, rsv1: {}, rsv2: {}, rsv3: {}, payload length: {} }} code: {}",
            self.fin,
            self.rsv1,
            self.rsv2,
            self.rsv3,
            self.payload.len(),
            self.code
        )
    }
}
