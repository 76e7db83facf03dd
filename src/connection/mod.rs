//! The sans-IO WebSocket connection state machine.
//!
//! A [`Connection`] owns a non-blocking [`Transport`](crate::Transport) and
//! never waits on it. The caller's event loop reports readiness and drains
//! [`Event`]s.
//!
//! ## Connection Lifecycle
//!
//! 1. **Unconnected** - created, nothing exchanged
//! 2. **Handshaking** - the HTTP upgrade is being negotiated by the caller
//! 3. **Open** - frames flow both ways
//! 4. **Closing** - one side sent a Close frame, waiting for the other
//! 5. **Closed** / **Aborted** - terminal; exactly one `Event::Close` was queued
//!
//! ## Example
//!
//! ```rust,ignore
//! use wspump::{Config, Connection, Event, Role};
//!
//! let stream = std::net::TcpStream::connect("example.com:80")?;
//! stream.set_nonblocking(true)?;
//! let mut conn = Connection::new(stream, Role::Client, Config::client());
//!
//! loop {
//!     wait_for(conn.interest());
//!     conn.on_readable();
//!     conn.on_writable();
//!     while let Some(event) = conn.poll_event() {
//!         if event.is_close() {
//!             return Ok(());
//!         }
//!     }
//! }
//! ```

mod event;
mod fragmenter;
mod role;
mod state;

#[allow(clippy::module_inception)]
mod connection;

pub use connection::Connection;
pub use event::Event;
pub use fragmenter::MessageFragmenter;
pub use role::Role;
pub use state::{ConnectionState, Initiator};
