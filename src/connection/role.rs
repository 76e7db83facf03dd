//! Which end of the connection we are.

use std::fmt;

/// Endpoint role, fixed for the lifetime of a connection.
///
/// Decides masking direction (RFC 6455 Section 5.3): clients mask every
/// frame they send, servers never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Client,
    Server,
}

impl Role {
    /// Whether frames we send carry a masking key.
    #[inline]
    #[must_use]
    pub const fn must_mask(&self) -> bool {
        matches!(self, Role::Client)
    }

    /// Whether frames the peer sends must carry a masking key.
    #[inline]
    #[must_use]
    pub const fn expects_masked(&self) -> bool {
        self.opposite().must_mask()
    }

    /// The role of the peer.
    #[must_use]
    pub const fn opposite(&self) -> Role {
        match self {
            Role::Client => Role::Server,
            Role::Server => Role::Client,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Client => "client",
            Role::Server => "server",
        })
    }
}
