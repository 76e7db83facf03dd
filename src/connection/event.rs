//! Notifications a connection hands to its owner.

use crate::error::Error;
use crate::protocol::handshake::HandshakeInfo;
use crate::message::{CloseCode, Message};

/// Something the application should know about.
///
/// Events are queued after the state transition that produced them has
/// committed, and drained with
/// [`Connection::poll_event`](crate::Connection::poll_event).
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Event {
    /// The opening handshake was accepted with these negotiated terms.
    /// Fires once.
    Open(HandshakeInfo),
    /// A complete Text or Binary message.
    Message(Message),
    /// A Ping arrived. While open, a Pong echoing the newest Ping is queued.
    Ping(Vec<u8>),
    /// A Pong arrived.
    Pong(Vec<u8>),
    /// The connection reached `Closed` or `Aborted`. Fires once, last.
    Close {
        /// Close code to report.
        code: CloseCode,
        /// Close reason to report.
        reason: String,
        /// `true` when the peer started the close or dropped the stream.
        remote: bool,
    },
    /// The connection is being terminated by this error. Always followed by
    /// [`Event::Close`].
    Error(Error),
}

impl Event {
    /// Returns `true` for [`Event::Close`].
    #[must_use]
    pub const fn is_close(&self) -> bool {
        matches!(self, Event::Close { .. })
    }
}
