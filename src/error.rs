//! Error types for the WebSocket engine.
//!
//! Every failure the codec, the connection state machine and the TLS pump
//! can report is a variant of [`Error`]. "Would block" is deliberately not
//! part of this enum: transports signal it with
//! [`std::io::ErrorKind::WouldBlock`] and the engine treats it as a retry
//! signal rather than a failure.

use thiserror::Error;

use crate::message::CloseCode;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// A required constructor input was missing or unusable.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The socket is valid but has not finished connecting.
    #[error("Socket is not yet connected")]
    NotYetConnected,

    /// Invalid frame structure or header.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Protocol violation detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid UTF-8 in a text message or close reason.
    #[error("Invalid UTF-8 in text payload")]
    InvalidUtf8,

    /// Declared frame length or reassembled message exceeds the configured maximum.
    #[error("Message too big: {size} bytes (max: {max})")]
    MessageTooBig {
        /// Declared or accumulated size.
        size: u64,
        /// Maximum allowed size.
        max: u64,
    },

    /// Too many fragments in a single message.
    #[error("Too many fragments: {count} (max: {max})")]
    TooManyFragments {
        /// Actual fragment count.
        count: usize,
        /// Maximum allowed fragments.
        max: usize,
    },

    /// Connection is not in a state that allows the operation.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The opening handshake was rejected by the negotiator.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Socket I/O failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// TLS engine failure (handshake, certificate, record layer).
    #[error("TLS error: {0}")]
    Tls(String),

    /// Extension-related error.
    #[error("Extension error: {0}")]
    Extension(String),

    /// Close code that must not appear on the wire.
    #[error("Invalid close code: {0}")]
    InvalidCloseCode(u16),

    /// Close frame payload of exactly one byte.
    #[error("Invalid close payload: a close frame payload cannot be 1 byte")]
    InvalidClosePayload,

    /// Opcode outside the RFC 6455 set.
    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    /// Control frame fragmented (RFC violation).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(u64),

    /// Unmasked client frame (security violation).
    #[error("Client frame must be masked")]
    UnmaskedClientFrame,

    /// Masked server frame (security violation).
    #[error("Server frame must not be masked")]
    MaskedServerFrame,

    /// Reserved bits set without extension.
    #[error("Reserved bits set without negotiated extension")]
    ReservedBitsSet,
}

impl Error {
    /// Close code sent in the best-effort Close frame when this error aborts
    /// a connection.
    ///
    /// Transport failures map to 1006, which is never put on the wire; the
    /// state machine skips the close frame for those.
    #[must_use]
    pub fn close_code(&self) -> CloseCode {
        match self {
            Error::InvalidUtf8 => CloseCode::InvalidPayload,
            Error::MessageTooBig { .. } | Error::TooManyFragments { .. } => {
                CloseCode::MessageTooBig
            }
            Error::Extension(_) => CloseCode::MandatoryExtension,
            Error::Transport(_) | Error::ConnectionClosed => CloseCode::Abnormal,
            Error::Tls(_) => CloseCode::TlsHandshake,
            _ => CloseCode::ProtocolError,
        }
    }

    /// Returns `true` for failures of the underlying byte stream.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::Tls(_))
    }
}

impl From<std::io::Error> for Error {
    /// An I/O error that wraps one of ours (as the TLS adapter produces)
    /// is unwrapped; anything else becomes `Error::Transport`.
    fn from(err: std::io::Error) -> Self {
        if err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            let message = err.to_string();
            return match err.into_inner().map(|inner| inner.downcast::<Error>()) {
                Some(Ok(inner)) => *inner,
                _ => Error::Transport(message),
            };
        }
        Error::Transport(err.to_string())
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        std::io::Error::other(err)
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(_: std::str::Utf8Error) -> Self {
        Error::InvalidUtf8
    }
}
