//! Manual TLS over a non-blocking socket.
//!
//! [`TlsTransport`] drives a [`TlsEngine`] by hand: ciphertext read from the
//! socket is fed to `unwrap`, plaintext from the caller goes through `wrap`,
//! and every outcome is handled without blocking the calling thread:
//!
//! - `BufferUnderflow`: read more from the socket, or return `WouldBlock`
//! - `BufferOverflow`: replace the destination buffer with a larger one and
//!   retry, bounded by [`TlsBufferConfig`]
//! - `Closed`: the peer's close-notify arrived, reads report end of stream
//!
//! Handshake steps (`NeedWrap`, `NeedUnwrap`) run with empty application
//! data before any caller data moves. `NeedTask` hands the engine's task to
//! a [`TaskExecutor`] and returns `WouldBlock` until the task has finished.
//!
//! Any other failure is abrupt: the socket is shut at once, with no
//! close-notify exchange, and the error is returned to the caller.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

use super::engine::{EngineResult, HandshakeStatus, Status, TlsEngine};
use super::executor::TaskExecutor;
use crate::config::TlsBufferConfig;
use crate::error::{Error, Result};
use crate::transport::Transport;

/// Callback run once each time a delegated task completes, typically to
/// wake the event loop so it retries the transport.
pub type TaskCompleteFn = Arc<dyn Fn() + Send + Sync>;

fn would_block() -> io::Error {
    io::ErrorKind::WouldBlock.into()
}

fn is_would_block(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
}

/// Replace `buf` with a zeroed buffer twice its size (at most `max`),
/// carrying the old content over.
fn grow(buf: &mut Vec<u8>, max: usize, which: &str) -> Result<()> {
    let len = buf.len();
    if len >= max {
        return Err(Error::Tls(format!(
            "{which} buffer cannot grow past {max} bytes"
        )));
    }
    let mut grown = vec![0u8; len.saturating_mul(2).clamp(1, max)];
    grown[..len].copy_from_slice(buf);
    *buf = grown;
    trace!(which, size = buf.len(), "grew TLS buffer");
    Ok(())
}

/// A [`Transport`] that encrypts with a [`TlsEngine`] over another,
/// non-blocking [`Transport`].
pub struct TlsTransport<S, E> {
    socket: S,
    engine: E,
    executor: Arc<dyn TaskExecutor>,
    on_task_complete: Option<TaskCompleteFn>,
    limits: TlsBufferConfig,
    /// Ciphertext read from the socket, not yet unwrapped.
    net_in: BytesMut,
    /// Ciphertext produced by the engine, not yet written.
    net_out: BytesMut,
    /// Plaintext unwrapped, not yet handed to the caller.
    app_in: BytesMut,
    net_scratch: Vec<u8>,
    app_scratch: Vec<u8>,
    pending_task: Option<Arc<AtomicBool>>,
    handshake_done: bool,
    inbound_done: bool,
    outbound_closed: bool,
    closed: bool,
}

impl<S: Transport, E: TlsEngine> TlsTransport<S, E> {
    /// Start building a transport.
    pub fn builder() -> TlsTransportBuilder<S, E> {
        TlsTransportBuilder::new()
    }

    /// Wrap a connected `socket` with `engine`.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotYetConnected` if the socket has not finished
    /// connecting.
    pub fn new(socket: S, engine: E, executor: Arc<dyn TaskExecutor>) -> Result<Self> {
        Self::builder()
            .socket(socket)
            .engine(engine)
            .shared_executor(executor)
            .build()
    }

    /// Whether the TLS handshake has completed.
    pub fn is_handshake_complete(&self) -> bool {
        self.handshake_done
    }

    /// Whether a delegated task is still running.
    pub fn task_pending(&self) -> bool {
        self.pending_task.is_some()
    }

    /// Borrow the socket.
    pub fn socket(&self) -> &S {
        &self.socket
    }

    /// Borrow the engine.
    pub fn engine(&self) -> &E {
        &self.engine
    }

    // ------------------------------------------------------------------
    // Socket side
    // ------------------------------------------------------------------

    /// Read ciphertext from the socket. `Ok(false)` at end of stream.
    fn read_socket(&mut self) -> io::Result<bool> {
        let room = self
            .limits
            .max_network_buffer
            .saturating_sub(self.net_in.len());
        if room == 0 {
            return Err(Error::Tls("network buffer full without a complete record".into()).into());
        }
        let chunk = self.net_scratch.len().min(room);
        loop {
            match self.socket.read(&mut self.net_scratch[..chunk]) {
                Ok(0) => return Ok(false),
                Ok(n) => {
                    trace!(bytes = n, "read TLS records");
                    self.net_in.extend_from_slice(&self.net_scratch[..n]);
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// The socket reached end of stream without a close-notify.
    fn socket_eof(&mut self) -> io::Result<bool> {
        if !self.handshake_done {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "socket closed during TLS handshake",
            ));
        }
        debug!("socket closed without TLS close-notify");
        self.inbound_done = true;
        Ok(true)
    }

    fn flush_net_out(&mut self) -> io::Result<()> {
        while !self.net_out.is_empty() {
            match self.socket.write(&self.net_out) {
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "socket accepted no bytes",
                    ));
                }
                Ok(n) => {
                    trace!(bytes = n, "wrote TLS records");
                    self.net_out.advance(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn flush_best_effort(&mut self) -> io::Result<()> {
        match self.flush_net_out() {
            Err(e) if is_would_block(&e) => Ok(()),
            other => other,
        }
    }

    // ------------------------------------------------------------------
    // Engine side
    // ------------------------------------------------------------------

    fn note_handshake(&mut self, status: HandshakeStatus) {
        if !self.handshake_done
            && matches!(
                status,
                HandshakeStatus::Finished | HandshakeStatus::NotHandshaking
            )
        {
            debug!("TLS handshake finished");
            self.handshake_done = true;
        }
    }

    /// One `wrap`, growing the network buffer until the output fits.
    ///
    /// Engines report `BufferOverflow` without consuming input, so the
    /// retry passes the same `src`.
    fn wrap_into_net_out(&mut self, src: &[u8]) -> io::Result<EngineResult> {
        loop {
            let result = self.engine.wrap(src, &mut self.net_scratch)?;
            if result.status == Status::BufferOverflow {
                grow(&mut self.net_scratch, self.limits.max_network_buffer, "network")?;
                continue;
            }
            if result.bytes_produced > 0 {
                if self.net_out.len() + result.bytes_produced > self.limits.max_network_buffer {
                    return Err(Error::Tls("outbound network buffer limit exceeded".into()).into());
                }
                self.net_out
                    .extend_from_slice(&self.net_scratch[..result.bytes_produced]);
            }
            trace!(?result, "wrap");
            return Ok(result);
        }
    }

    /// Unwrap buffered ciphertext, reading the socket when the engine
    /// needs more. Returns `true` once the inbound side is finished.
    ///
    /// The engine is asked first even with nothing buffered: it may hold
    /// plaintext from records it already decrypted.
    fn unwrap_step(&mut self) -> io::Result<bool> {
        loop {
            let result = self.engine.unwrap(&self.net_in, &mut self.app_scratch)?;
            trace!(?result, "unwrap");
            self.net_in.advance(result.bytes_consumed);
            if result.bytes_produced > 0 {
                if self.app_in.len() + result.bytes_produced > self.limits.max_application_buffer {
                    return Err(Error::Tls("application buffer limit exceeded".into()).into());
                }
                self.app_in
                    .extend_from_slice(&self.app_scratch[..result.bytes_produced]);
            }
            self.note_handshake(result.handshake_status);

            match result.status {
                Status::Ok if result.bytes_consumed > 0 || result.bytes_produced > 0 => {
                    return Ok(false);
                }
                Status::Ok | Status::BufferUnderflow => {
                    if !self.read_socket()? {
                        return self.socket_eof();
                    }
                }
                Status::BufferOverflow => grow(
                    &mut self.app_scratch,
                    self.limits.max_application_buffer,
                    "application",
                )?,
                Status::Closed => {
                    debug!("received TLS close-notify");
                    self.inbound_done = true;
                    return Ok(true);
                }
            }
        }
    }

    fn poll_task(&mut self) -> io::Result<()> {
        match self.pending_task.as_ref().map(|done| done.load(Ordering::Acquire)) {
            Some(false) => Err(would_block()),
            Some(true) => {
                debug!("delegated TLS task finished");
                self.pending_task = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn run_delegated_task(&mut self) -> io::Result<()> {
        let task = self
            .engine
            .take_delegated_task()
            .ok_or_else(|| Error::Tls("engine needs a task but offered none".into()))?;

        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);
        let on_complete = self.on_task_complete.clone();
        debug!("handing TLS task to executor");
        self.executor
            .execute(Box::new(move || {
                task();
                flag.store(true, Ordering::Release);
                if let Some(on_complete) = on_complete {
                    on_complete();
                }
            }))
            .map_err(|e| Error::Tls(format!("could not start delegated task: {e}")))?;
        self.pending_task = Some(done);
        self.poll_task()
    }

    /// Run handshake steps until the engine stops asking for them.
    fn drive_handshake(&mut self) -> io::Result<()> {
        loop {
            self.poll_task()?;
            let status = self.engine.handshake_status();
            if matches!(
                status,
                HandshakeStatus::NotHandshaking | HandshakeStatus::Finished
            ) {
                self.note_handshake(status);
                return Ok(());
            }
            self.flush_net_out()?;
            match status {
                HandshakeStatus::NeedTask => self.run_delegated_task()?,
                HandshakeStatus::NeedWrap => {
                    let result = self.wrap_into_net_out(&[])?;
                    self.note_handshake(result.handshake_status);
                    if result.status == Status::Closed {
                        return Ok(());
                    }
                    if result.bytes_produced == 0
                        && self.engine.handshake_status() == HandshakeStatus::NeedWrap
                    {
                        return Err(Error::Tls("engine needs a wrap but produced nothing".into()).into());
                    }
                }
                HandshakeStatus::NeedUnwrap => {
                    if self.unwrap_step()? {
                        return Ok(());
                    }
                }
                HandshakeStatus::NotHandshaking | HandshakeStatus::Finished => {}
            }
        }
    }

    // ------------------------------------------------------------------
    // Pumps
    // ------------------------------------------------------------------

    fn pump_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if !self.app_in.is_empty() {
                let n = buf.len().min(self.app_in.len());
                buf[..n].copy_from_slice(&self.app_in[..n]);
                self.app_in.advance(n);
                return Ok(n);
            }
            if self.inbound_done {
                return Ok(0);
            }
            self.drive_handshake()?;
            if self.app_in.is_empty() && !self.inbound_done {
                self.unwrap_step()?;
            }
        }
    }

    fn pump_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.outbound_closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "TLS outbound side is closed",
            ));
        }
        self.drive_handshake()?;
        self.flush_net_out()?;
        loop {
            let result = self.wrap_into_net_out(buf)?;
            match result.status {
                Status::Closed => {
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "TLS engine closed",
                    ));
                }
                Status::BufferUnderflow => return Err(would_block()),
                Status::Ok | Status::BufferOverflow => {}
            }
            self.flush_best_effort()?;
            if result.bytes_consumed > 0 {
                return Ok(result.bytes_consumed);
            }
            if result.bytes_produced == 0 {
                return Err(would_block());
            }
        }
    }

    fn send_close_notify(&mut self) -> io::Result<()> {
        while !self.engine.is_outbound_done() {
            let result = self.wrap_into_net_out(&[])?;
            if result.status == Status::Closed || result.bytes_produced == 0 {
                break;
            }
        }
        self.flush_net_out()
    }

    /// Consume whatever the peer already sent, hoping for its close-notify.
    fn drain_peer_close_notify(&mut self) {
        while !self.inbound_done && !self.engine.is_inbound_done() {
            if self.unwrap_step().is_err() {
                break;
            }
        }
        self.app_in.clear();
    }

    /// Abrupt failure: shut the socket at once and pass the error on.
    fn fail(&mut self, err: io::Error) -> io::Error {
        if !is_would_block(&err) && !self.closed {
            warn!(error = %err, "TLS transport failed");
            self.closed = true;
            self.net_out.clear();
            if let Err(e) = self.socket.shutdown() {
                debug!(error = %e, "socket shutdown after TLS failure");
            }
        }
        err
    }

    fn ensure_open(&self) -> io::Result<()> {
        if self.closed {
            Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "TLS transport is closed",
            ))
        } else {
            Ok(())
        }
    }
}

impl<S: Transport, E: TlsEngine> Transport for TlsTransport<S, E> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.ensure_open()?;
        self.pump_read(buf).map_err(|e| self.fail(e))
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.ensure_open()?;
        self.pump_write(buf).map_err(|e| self.fail(e))
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        let result = self.drive_handshake().and_then(|()| self.flush_net_out());
        result.map_err(|e| self.fail(e))
    }

    fn wants_write(&self) -> bool {
        !self.closed
            && (!self.net_out.is_empty()
                || self.engine.handshake_status() == HandshakeStatus::NeedWrap)
    }

    fn is_connected(&self) -> bool {
        !self.closed && self.socket.is_connected()
    }

    /// Graceful close: send close-notify, take the peer's if it already
    /// arrived, then shut the socket. Returns `WouldBlock` while the
    /// close-notify cannot be written yet; call again when writable.
    fn shutdown(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        if !self.outbound_closed {
            debug!("closing TLS outbound side");
            self.engine.close_outbound();
            self.outbound_closed = true;
        }
        match self.send_close_notify() {
            Ok(()) => self.drain_peer_close_notify(),
            Err(e) if is_would_block(&e) => return Err(e),
            Err(e) => debug!(error = %e, "close-notify not delivered"),
        }
        self.closed = true;
        self.socket.shutdown()
    }
}

impl<S, E> fmt::Debug for TlsTransport<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsTransport")
            .field("handshake_done", &self.handshake_done)
            .field("net_in", &self.net_in.len())
            .field("net_out", &self.net_out.len())
            .field("app_in", &self.app_in.len())
            .field("task_pending", &self.pending_task.is_some())
            .field("inbound_done", &self.inbound_done)
            .field("outbound_closed", &self.outbound_closed)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Builder for [`TlsTransport`]. Socket, engine and executor are required.
pub struct TlsTransportBuilder<S, E> {
    socket: Option<S>,
    engine: Option<E>,
    executor: Option<Arc<dyn TaskExecutor>>,
    on_task_complete: Option<TaskCompleteFn>,
    buffers: TlsBufferConfig,
}

impl<S, E> Default for TlsTransportBuilder<S, E> {
    fn default() -> Self {
        Self {
            socket: None,
            engine: None,
            executor: None,
            on_task_complete: None,
            buffers: TlsBufferConfig::default(),
        }
    }
}

impl<S: Transport, E: TlsEngine> TlsTransportBuilder<S, E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn socket(mut self, socket: S) -> Self {
        self.socket = Some(socket);
        self
    }

    #[must_use]
    pub fn engine(mut self, engine: E) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Executor for delegated tasks.
    #[must_use]
    pub fn executor(self, executor: impl TaskExecutor + 'static) -> Self {
        self.shared_executor(Arc::new(executor))
    }

    /// Executor shared with other transports.
    #[must_use]
    pub fn shared_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Called once per completed delegated task.
    #[must_use]
    pub fn on_task_complete(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_task_complete = Some(Arc::new(callback));
        self
    }

    #[must_use]
    pub fn buffer_config(mut self, buffers: TlsBufferConfig) -> Self {
        self.buffers = buffers;
        self
    }

    /// Build the transport.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidArgument` if the socket, engine or executor is missing
    /// - `Error::NotYetConnected` if the socket has not finished connecting
    pub fn build(self) -> Result<TlsTransport<S, E>> {
        let socket = self
            .socket
            .ok_or_else(|| Error::InvalidArgument("TLS transport needs a socket".into()))?;
        let engine = self
            .engine
            .ok_or_else(|| Error::InvalidArgument("TLS transport needs an engine".into()))?;
        let executor = self.executor.ok_or_else(|| {
            Error::InvalidArgument("TLS transport needs a task executor".into())
        })?;
        if !socket.is_connected() {
            return Err(Error::NotYetConnected);
        }

        let limits = self.buffers;
        let net_size = engine
            .packet_buffer_size()
            .min(limits.max_network_buffer)
            .max(1);
        let app_size = engine
            .application_buffer_size()
            .min(limits.max_application_buffer)
            .max(1);

        Ok(TlsTransport {
            socket,
            engine,
            executor,
            on_task_complete: self.on_task_complete,
            limits,
            net_in: BytesMut::with_capacity(net_size),
            net_out: BytesMut::with_capacity(net_size),
            app_in: BytesMut::with_capacity(app_size),
            net_scratch: vec![0; net_size],
            app_scratch: vec![0; app_size],
            pending_task: None,
            handshake_done: false,
            inbound_done: false,
            outbound_closed: false,
            closed: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grow_doubles_and_keeps_content() {
        let mut buf = vec![1, 2, 3];
        grow(&mut buf, 100, "test").unwrap();
        assert_eq!(buf, [1, 2, 3, 0, 0, 0]);
    }

    #[test]
    fn test_grow_stops_at_limit() {
        let mut buf = vec![0; 6];
        grow(&mut buf, 8, "test").unwrap();
        assert_eq!(buf.len(), 8);
        assert!(matches!(grow(&mut buf, 8, "test"), Err(Error::Tls(_))));
    }
}
