//! Message reassembly for fragmented WebSocket data frames (RFC 6455 Section 5.4).

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::utf8::Utf8Validator;
use crate::protocol::{Frame, OpCode};

/// Reassembles fragmented WebSocket messages.
///
/// Only data frames go through the assembler; control frames interleaved
/// with fragments are handled by the caller and never touch this state.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    fragment_count: usize,
    opcode: Option<OpCode>,
    utf8_validator: Utf8Validator,
    limits: Limits,
}

impl MessageAssembler {
    /// Create an empty assembler enforcing `limits`.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            fragment_count: 0,
            opcode: None,
            utf8_validator: Utf8Validator::new(),
            limits,
        }
    }

    /// Add a data frame to the message being assembled.
    ///
    /// Returns `Some(message)` when the frame carries FIN, `None` otherwise.
    /// Text is validated incrementally, so invalid UTF-8 fails on the
    /// fragment that contains it.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a Continuation with nothing in
    ///   progress, a new Text/Binary frame while one is, or a control frame
    /// - `Error::TooManyFragments` / `Error::MessageTooBig` when limits are hit
    /// - `Error::InvalidUtf8` for bad Text payloads
    pub fn push(&mut self, frame: Frame) -> Result<Option<Message>> {
        match frame.opcode {
            OpCode::Continuation if self.opcode.is_none() => {
                return Err(Error::ProtocolViolation(
                    "Unexpected continuation frame".into(),
                ));
            }
            OpCode::Continuation => {}
            OpCode::Text | OpCode::Binary => {
                if self.opcode.is_some() {
                    return Err(Error::ProtocolViolation(
                        "Expected continuation frame".into(),
                    ));
                }
                self.opcode = Some(frame.opcode);
            }
            OpCode::Close | OpCode::Ping | OpCode::Pong => {
                return Err(Error::ProtocolViolation(format!(
                    "{} frame is not part of a data message",
                    frame.opcode
                )));
            }
        }

        self.limits
            .check_fragment_count(self.fragment_count + 1)?;
        self.limits
            .check_message_size(self.buffer.len() + frame.payload().len())?;

        if self.opcode == Some(OpCode::Text) {
            self.utf8_validator.validate(frame.payload(), frame.fin)?;
        }

        self.buffer.extend_from_slice(frame.payload());
        self.fragment_count += 1;

        if !frame.fin {
            return Ok(None);
        }

        let payload = self.buffer.split().to_vec();
        let opcode = self.opcode.take();
        self.fragment_count = 0;
        self.utf8_validator.reset();

        match opcode {
            Some(OpCode::Text) => String::from_utf8(payload)
                .map(|text| Some(Message::Text(text)))
                .map_err(|_| Error::InvalidUtf8),
            _ => Ok(Some(Message::Binary(payload))),
        }
    }

    /// Whether a fragmented message is in progress.
    #[must_use]
    pub const fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    /// Drop any partial message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.fragment_count = 0;
        self.opcode = None;
        self.utf8_validator.reset();
    }
}
