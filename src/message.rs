//! Close status codes and the messages exchanged with the application.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::protocol::OpCode;

/// Declares [`CloseCode`] and both directions of its numeric mapping from a
/// single table.
macro_rules! close_codes {
    ($($(#[$doc:meta])* $name:ident = $value:literal,)+) => {
        /// Close status code (RFC 6455 Section 7.4).
        ///
        /// Equality and hashing go through the numeric value, so
        /// `CloseCode::Other(1000) == CloseCode::Normal`.
        #[derive(Debug, Clone, Copy, Default)]
        #[non_exhaustive]
        pub enum CloseCode {
            $($(#[$doc])* $name,)+
            /// Any code without a name, including the 3000-4999 range.
            Other(u16),
        }

        impl CloseCode {
            /// Map a numeric code, naming it when RFC 6455 does.
            #[must_use]
            pub const fn from_u16(code: u16) -> Self {
                match code {
                    $($value => CloseCode::$name,)+
                    other => CloseCode::Other(other),
                }
            }

            /// The numeric value as it appears on the wire.
            #[must_use]
            pub const fn as_u16(&self) -> u16 {
                match self {
                    $(CloseCode::$name => $value,)+
                    CloseCode::Other(code) => *code,
                }
            }
        }
    };
}

close_codes! {
    /// 1000, the purpose of the connection was fulfilled.
    #[default]
    Normal = 1000,
    /// 1001, server shutdown or page navigation.
    GoingAway = 1001,
    /// 1002
    ProtocolError = 1002,
    /// 1003, a data type the endpoint cannot accept.
    UnsupportedData = 1003,
    /// 1005, reported locally when a Close carried no code.
    NoStatus = 1005,
    /// 1006, reported locally when the transport dropped without a Close.
    Abnormal = 1006,
    /// 1007, e.g. non-UTF-8 bytes in a Text message.
    InvalidPayload = 1007,
    /// 1008
    PolicyViolation = 1008,
    /// 1009
    MessageTooBig = 1009,
    /// 1010, sent by a client whose required extension was not negotiated.
    MandatoryExtension = 1010,
    /// 1011
    InternalError = 1011,
    /// 1012
    ServiceRestart = 1012,
    /// 1013
    TryAgainLater = 1013,
    /// 1014
    BadGateway = 1014,
    /// 1015, reported locally after a TLS failure. Never sent.
    TlsHandshake = 1015,
}

impl CloseCode {
    /// Whether the code may travel in a Close frame: 1000-1003, 1007-1014
    /// and the 3000-4999 application range.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self.as_u16(), 1000..=1003 | 1007..=1014 | 3000..=4999)
    }

    /// Codes RFC 6455 keeps for local reporting: 1004, 1005, 1006, 1015.
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self.as_u16(), 1004..=1006 | 1015)
    }
}

impl PartialEq for CloseCode {
    fn eq(&self, other: &Self) -> bool {
        self.as_u16() == other.as_u16()
    }
}

impl Eq for CloseCode {}

impl Hash for CloseCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_u16().hash(state);
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self::from_u16(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// A unit of application data.
///
/// The connection delivers complete `Text` and `Binary` messages once their
/// fragments are reassembled. `Ping` and `Pong` exist for sending; received
/// control frames surface as their own events.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Message {
    /// UTF-8 text.
    Text(String),
    /// Arbitrary bytes.
    Binary(Vec<u8>),
    /// Ping with at most 125 bytes of payload.
    Ping(Vec<u8>),
    /// Pong with at most 125 bytes of payload.
    Pong(Vec<u8>),
}

impl Message {
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Message::Text(s.into())
    }

    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Message::Binary(data.into())
    }

    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Message::Ping(data.into())
    }

    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Message::Pong(data.into())
    }

    /// Opcode of the first frame this message is sent as.
    #[must_use]
    pub const fn opcode(&self) -> OpCode {
        match self {
            Message::Text(_) => OpCode::Text,
            Message::Binary(_) => OpCode::Binary,
            Message::Ping(_) => OpCode::Ping,
            Message::Pong(_) => OpCode::Pong,
        }
    }

    /// Borrow the payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        match self {
            Message::Text(s) => s.as_bytes(),
            Message::Binary(data) | Message::Ping(data) | Message::Pong(data) => data,
        }
    }

    /// Split into the opcode and the owned payload.
    #[must_use]
    pub fn into_parts(self) -> (OpCode, Vec<u8>) {
        let opcode = self.opcode();
        let payload = match self {
            Message::Text(s) => s.into_bytes(),
            Message::Binary(data) | Message::Ping(data) | Message::Pong(data) => data,
        };
        (opcode, payload)
    }

    /// The text, if this is a Text message.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(s) => Some(s),
            _ => None,
        }
    }
}
