//! TLS for `wss://` connections, pumped by hand over non-blocking sockets.
//!
//! - [`TlsEngine`]: the wrap/unwrap contract any TLS implementation exposes
//! - [`TlsTransport`]: drives an engine over a [`Transport`](crate::Transport)
//!   and is itself a `Transport`
//! - [`TaskExecutor`]: where delegated handshake work runs
//! - [`RustlsEngine`] (feature `tls-rustls`): the engine backed by rustls

mod engine;
mod executor;
mod transport;

#[cfg(feature = "tls-rustls")]
mod rustls_impl;

pub use engine::{DelegatedTask, EngineResult, HandshakeStatus, Status, TlsEngine};
pub use executor::{TaskExecutor, ThreadExecutor};
pub use transport::{TaskCompleteFn, TlsTransport, TlsTransportBuilder};

#[cfg(feature = "tls-rustls")]
pub use rustls_impl::{
    RustlsEngine, TlsError, client_config_with_roots, client_config_with_webpki_roots,
    load_certs_from_file, load_private_key_from_file, server_config,
};
