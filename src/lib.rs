//! # wspump - Sans-IO WebSocket engine with a manual TLS pump
//!
//! `wspump` turns a non-blocking byte stream into RFC 6455 frames and
//! messages and back, without ever blocking the calling thread.
//!
//! ## Features
//!
//! - **Deterministic frame codec** rejecting malformed input before any
//!   payload is buffered
//! - **Sans-IO connection state machine** driven by readiness callbacks and
//!   drained through an event queue
//! - **Close handshake semantics** with validated close codes and reasons
//! - **Manual TLS pump** driving a wrap/unwrap engine over a non-blocking
//!   socket, with rustls as the default engine
//! - **Extension hook** for frame transforms that claim RSV bits
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use wspump::{Config, Connection, Event, HandshakeInfo, Message, Role};
//!
//! let mut conn = Connection::new(stream, Role::Client, Config::client());
//! conn.begin_handshake()?;
//! conn.send_handshake(&upgrade_request)?;
//! // ... parse conn.handshake_input() after on_readable() ...
//! conn.handshake_accepted(HandshakeInfo::new("/chat"), consumed)?;
//! conn.send(Message::text("Hello"))?;
//!
//! while let Some(event) = conn.poll_event() {
//!     match event {
//!         Event::Message(msg) => println!("{msg:?}"),
//!         Event::Close { code, .. } => println!("closed: {code}"),
//!         _ => {}
//!     }
//! }
//! ```

pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod extensions;
pub mod message;
pub mod protocol;
pub mod tls;
pub mod transport;

pub use codec::FrameCodec;
pub use config::{Config, Limits, Timeouts, TlsBufferConfig};
pub use connection::{Connection, ConnectionState, Event, Initiator, Role};
pub use error::{Error, Result};
pub use extensions::{Extension, ExtensionRegistry};
pub use message::{CloseCode, Message};
pub use protocol::{
    CloseFrame, Frame, HandshakeInfo, OpCode, WS_GUID, compute_accept_key, generate_key,
    verify_accept_key,
};
pub use transport::{Interest, Transport};

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn test_public_types_are_send() {
        assert_send::<Error>();
        assert_send::<Config>();
        assert_send::<Limits>();
        assert_send::<Message>();
        assert_send::<CloseCode>();
        assert_send::<CloseFrame>();
        assert_send::<Frame>();
        assert_send::<Event>();
        assert_send::<ConnectionState>();
        assert_send::<Role>();
        assert_send::<Connection<TcpStream>>();
    }

    #[test]
    fn test_public_types_are_sync() {
        assert_sync::<Error>();
        assert_sync::<Config>();
        assert_sync::<Limits>();
        assert_sync::<Message>();
        assert_sync::<CloseCode>();
        assert_sync::<CloseFrame>();
        assert_sync::<Frame>();
        assert_sync::<Event>();
        assert_sync::<ConnectionState>();
        assert_sync::<Role>();
    }

    #[cfg(feature = "tls-rustls")]
    #[test]
    fn test_tls_transport_is_send() {
        assert_send::<tls::TlsTransport<TcpStream, tls::RustlsEngine>>();
    }
}
