//! The wrap/unwrap contract a TLS implementation exposes to the pump.
//!
//! An engine owns no socket. `wrap` turns application bytes into TLS
//! records, `unwrap` turns TLS records into application bytes, and each
//! call reports how far it got through an [`EngineResult`].

use crate::error::Result;

/// Blocking work an engine hands out instead of doing it inline,
/// e.g. certificate validation that may hit a disk or the network.
pub type DelegatedTask = Box<dyn FnOnce() + Send + 'static>;

/// Outcome of a single `wrap` or `unwrap`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// The operation made progress.
    Ok,
    /// `unwrap` needs more network input before it can produce anything.
    BufferUnderflow,
    /// The destination buffer is too small; grow it and retry.
    BufferOverflow,
    /// The engine is closed in this direction.
    Closed,
}

/// What the handshake needs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeStatus {
    /// No handshake in progress.
    NotHandshaking,
    /// The operation that returned this completed the handshake.
    Finished,
    /// A [`DelegatedTask`] must run before the handshake can continue.
    NeedTask,
    /// The engine has records to send.
    NeedWrap,
    /// The engine needs records from the peer.
    NeedUnwrap,
}

/// Result of a `wrap` or `unwrap` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineResult {
    pub status: Status,
    pub handshake_status: HandshakeStatus,
    /// Bytes taken from the source buffer.
    pub bytes_consumed: usize,
    /// Bytes written to the destination buffer.
    pub bytes_produced: usize,
}

impl EngineResult {
    #[must_use]
    pub const fn new(
        status: Status,
        handshake_status: HandshakeStatus,
        bytes_consumed: usize,
        bytes_produced: usize,
    ) -> Self {
        Self {
            status,
            handshake_status,
            bytes_consumed,
            bytes_produced,
        }
    }
}

/// A non-blocking TLS state machine.
///
/// Engines never perform I/O; [`TlsTransport`](super::TlsTransport) moves
/// the bytes they produce and consume.
pub trait TlsEngine: Send {
    /// Encrypt from `src` into `dst`. Called with an empty `src` to emit
    /// handshake or close records.
    ///
    /// # Errors
    ///
    /// `Error::Tls` on a fatal TLS failure.
    fn wrap(&mut self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult>;

    /// Decrypt records from `src` into `dst`.
    ///
    /// # Errors
    ///
    /// `Error::Tls` on a fatal TLS failure (bad record, certificate rejected).
    fn unwrap(&mut self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult>;

    /// What the handshake needs right now.
    fn handshake_status(&self) -> HandshakeStatus;

    /// Take the next delegated task, if the engine has one.
    fn take_delegated_task(&mut self) -> Option<DelegatedTask> {
        None
    }

    /// Queue a close-notify; later `wrap` calls emit it.
    fn close_outbound(&mut self);

    /// The close-notify has been emitted by `wrap`.
    fn is_outbound_done(&self) -> bool;

    /// The peer's close-notify has been received.
    fn is_inbound_done(&self) -> bool;

    /// Initial size for network-side buffers.
    fn packet_buffer_size(&self) -> usize;

    /// Initial size for application-side buffers.
    fn application_buffer_size(&self) -> usize;
}
