//! Opening handshake helpers (RFC 6455 Section 4).
//!
//! HTTP parsing and header negotiation happen outside this crate. What lives
//! here is the key material both sides need and the summary the negotiator
//! hands back to the connection once it accepts the upgrade.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Protocol draft spoken on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Draft {
    /// RFC 6455, Sec-WebSocket-Version 13.
    #[default]
    Rfc6455,
}

impl Draft {
    /// Value of the `Sec-WebSocket-Version` header for this draft.
    #[must_use]
    pub const fn version(&self) -> u8 {
        match self {
            Draft::Rfc6455 => 13,
        }
    }
}

/// Generate a fresh `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
///
/// # Errors
///
/// Returns `Error::InvalidHandshake` if the system random source fails.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce)
        .map_err(|e| Error::InvalidHandshake(format!("random source unavailable: {e}")))?;
    Ok(BASE64.encode(nonce))
}

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use wspump::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    BASE64.encode(hash)
}

/// Check the server's Sec-WebSocket-Accept against the key we sent.
///
/// # Errors
///
/// Returns `Error::InvalidHandshake` on mismatch.
pub fn verify_accept_key(key: &str, accept: &str) -> Result<()> {
    if compute_accept_key(key) == accept.trim() {
        Ok(())
    } else {
        Err(Error::InvalidHandshake(
            "Sec-WebSocket-Accept does not match the key".into(),
        ))
    }
}

/// Validate that a header value does not contain CR or LF characters.
fn validate_header_value(header_name: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::InvalidHandshake(format!(
            "{header_name} contains CR or LF characters"
        )));
    }
    Ok(())
}

/// Outcome of a successful opening handshake.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HandshakeInfo {
    /// Negotiated protocol draft.
    pub draft: Draft,
    /// Requested resource, e.g. `/chat`.
    pub resource: String,
    /// Selected subprotocol, if any.
    pub subprotocol: Option<String>,
    /// Negotiated extension tokens, in the order the server listed them.
    pub extensions: Vec<String>,
}

impl HandshakeInfo {
    /// Create handshake info for `resource` with no subprotocol or extensions.
    #[must_use]
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            ..Self::default()
        }
    }

    /// Record the selected subprotocol.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` if the value contains CR or LF.
    pub fn with_subprotocol(mut self, protocol: impl Into<String>) -> Result<Self> {
        let protocol = protocol.into();
        validate_header_value("Sec-WebSocket-Protocol", &protocol)?;
        self.subprotocol = Some(protocol);
        Ok(self)
    }

    /// Record a negotiated extension token.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` if the value contains CR or LF.
    pub fn with_extension(mut self, extension: impl Into<String>) -> Result<Self> {
        let extension = extension.into();
        validate_header_value("Sec-WebSocket-Extensions", &extension)?;
        self.extensions.push(extension);
        Ok(self)
    }
}
