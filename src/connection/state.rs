//! Connection lifecycle states.

/// Which side sent the first Close frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Initiator {
    /// We sent Close first and are waiting for the peer's.
    Local,
    /// The peer sent Close first.
    Remote,
}

/// WebSocket connection state.
///
/// ```text
/// Unconnected -> Handshaking -> Open -> Closing(Local | Remote) -> Closed
///                      any state -> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Nothing has happened yet.
    #[default]
    Unconnected,
    /// Opening handshake in progress.
    Handshaking,
    /// Connection is open and ready for data transfer.
    Open,
    /// One Close frame has been exchanged.
    Closing(Initiator),
    /// Close handshake finished or the connection was force-closed.
    Closed,
    /// Terminated by an error.
    Aborted,
}

impl ConnectionState {
    /// Returns `true` for `Closed` and `Aborted`.
    #[must_use]
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Aborted)
    }

    /// Check if sending data is allowed in this state.
    ///
    /// Returns `true` only for `Open`.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Check if frames may still arrive in this state.
    ///
    /// After our own Close we keep reading until the peer answers.
    #[must_use]
    #[inline]
    pub const fn can_receive(&self) -> bool {
        matches!(
            self,
            ConnectionState::Open | ConnectionState::Closing(Initiator::Local)
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Unconnected => write!(f, "Unconnected"),
            ConnectionState::Handshaking => write!(f, "Handshaking"),
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::Closing(Initiator::Local) => write!(f, "Closing(Local)"),
            ConnectionState::Closing(Initiator::Remote) => write!(f, "Closing(Remote)"),
            ConnectionState::Closed => write!(f, "Closed"),
            ConnectionState::Aborted => write!(f, "Aborted"),
        }
    }
}
