//! Frame opcodes (RFC 6455 Section 5.2).

use std::fmt;

use crate::error::{Error, Result};

/// The 4-bit opcode in the first header byte.
///
/// Only the six values RFC 6455 defines are representable; 0x3-0x7 and
/// 0xB-0xF fail to decode with [`Error::InvalidOpcode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    /// Carries the next fragment of a Text or Binary message.
    Continuation = 0x0,
    Text = 0x1,
    Binary = 0x2,
    Close = 0x8,
    Ping = 0x9,
    Pong = 0xA,
}

impl OpCode {
    /// Decode the low nibble of the first header byte.
    ///
    /// # Errors
    ///
    /// `Error::InvalidOpcode` for a reserved value.
    pub fn from_u8(nibble: u8) -> Result<Self> {
        Self::try_from(nibble)
    }

    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Close, Ping and Pong: at most 125 bytes and never fragmented.
    #[inline]
    #[must_use]
    pub const fn is_control(self) -> bool {
        self.as_u8() & 0x8 != 0
    }
}

impl TryFrom<u8> for OpCode {
    type Error = Error;

    fn try_from(nibble: u8) -> Result<Self> {
        Ok(match nibble {
            0x0 => OpCode::Continuation,
            0x1 => OpCode::Text,
            0x2 => OpCode::Binary,
            0x8 => OpCode::Close,
            0x9 => OpCode::Ping,
            0xA => OpCode::Pong,
            other => return Err(Error::InvalidOpcode(other)),
        })
    }
}

impl From<OpCode> for u8 {
    fn from(opcode: OpCode) -> Self {
        opcode.as_u8()
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_nibble() {
        let defined = [0x0, 0x1, 0x2, 0x8, 0x9, 0xA];
        for nibble in 0u8..16 {
            match OpCode::from_u8(nibble) {
                Ok(op) => {
                    assert!(defined.contains(&nibble));
                    assert_eq!(u8::from(op), nibble);
                    assert_eq!(op.is_control(), nibble >= 0x8);
                }
                Err(e) => {
                    assert!(!defined.contains(&nibble));
                    assert_eq!(e, Error::InvalidOpcode(nibble));
                }
            }
        }
    }

    #[test]
    fn test_display_names() {
        assert_eq!(OpCode::Continuation.to_string(), "Continuation");
        assert_eq!(OpCode::Pong.to_string(), "Pong");
    }
}
