use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tracing::{debug, trace, warn};

use crate::codec::FrameCodec;
use crate::config::Config;
use crate::connection::event::Event;
use crate::connection::fragmenter::MessageFragmenter;
use crate::connection::state::{ConnectionState, Initiator};
use crate::connection::Role;
use crate::error::{Error, Result};
use crate::extensions::ExtensionRegistry;
use crate::message::{CloseCode, Message};
use crate::protocol::assembler::MessageAssembler;
use crate::protocol::handshake::HandshakeInfo;
use crate::protocol::{CloseFrame, Frame, OpCode};
use crate::transport::{Interest, Transport};

/// A WebSocket connection over a non-blocking [`Transport`].
///
/// `Connection` never blocks and never waits. An external event loop calls
/// [`on_readable`](Self::on_readable) and [`on_writable`](Self::on_writable)
/// when the transport is ready, asks [`interest`](Self::interest) what to
/// wait for next, and drains [`Event`]s with
/// [`poll_event`](Self::poll_event).
///
/// Application calls ([`send`](Self::send), [`close`](Self::close)) return
/// `Err` only for misuse; failures of the peer or the transport surface as
/// an [`Event::Error`] followed by [`Event::Close`].
///
/// ## Example
///
/// ```rust,ignore
/// use wspump::{Config, Connection, Event, HandshakeInfo, Message, Role};
///
/// let mut conn = Connection::new(stream, Role::Server, Config::server());
/// conn.begin_handshake()?;
/// conn.on_readable();
/// let consumed = negotiate(conn.handshake_input())?;
/// conn.send_handshake(&response_bytes)?;
/// conn.handshake_accepted(HandshakeInfo::new("/chat"), consumed)?;
///
/// conn.send(Message::text("Hello"))?;
/// while let Some(event) = conn.poll_event() {
///     println!("{event:?}");
/// }
/// ```
pub struct Connection<T> {
    transport: T,
    role: Role,
    config: Config,
    state: ConnectionState,
    codec: FrameCodec,
    assembler: MessageAssembler,
    extensions: ExtensionRegistry,
    handshake: Option<HandshakeInfo>,
    read_buf: BytesMut,
    write_buf: BytesMut,
    events: VecDeque<Event>,
    close_sent: Option<(CloseCode, String)>,
    close_received: Option<(CloseCode, String)>,
    /// Payload of the newest Ping whose Pong is not queued yet. Only the
    /// newest needs an answer (RFC 6455 Section 5.5.3), so a Ping flood
    /// against a blocked transport holds at most one queued Pong plus this.
    pending_pong: Option<Bytes>,
    shutdown_pending: bool,
}

impl<T: Transport> Connection<T> {
    /// Create a connection in the `Unconnected` state.
    pub fn new(transport: T, role: Role, config: Config) -> Self {
        Self::with_extensions(transport, role, config, ExtensionRegistry::new())
    }

    /// Create a connection with extensions that may be activated once the
    /// handshake names them.
    pub fn with_extensions(
        transport: T,
        role: Role,
        config: Config,
        extensions: ExtensionRegistry,
    ) -> Self {
        Self {
            codec: FrameCodec::new(role, &config),
            assembler: MessageAssembler::new(config.limits.clone()),
            read_buf: BytesMut::with_capacity(config.read_buffer_size),
            write_buf: BytesMut::with_capacity(config.write_buffer_size),
            transport,
            role,
            config,
            state: ConnectionState::Unconnected,
            extensions,
            handshake: None,
            events: VecDeque::new(),
            close_sent: None,
            close_received: None,
            pending_pong: None,
            shutdown_pending: false,
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if the connection is open.
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// The local role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// The configuration this connection was created with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// What the accepted handshake negotiated.
    pub fn handshake_info(&self) -> Option<&HandshakeInfo> {
        self.handshake.as_ref()
    }

    /// Borrow the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutably borrow the transport.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Next queued event, oldest first.
    pub fn poll_event(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    /// Take every queued event.
    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    /// Readiness the event loop should wait for next.
    pub fn interest(&self) -> Interest {
        if self.state.is_terminal() {
            if self.shutdown_pending {
                Interest::WRITE
            } else {
                Interest::NONE
            }
        } else if self.write_buf.is_empty()
            && self.pending_pong.is_none()
            && !self.transport.wants_write()
        {
            Interest::READ
        } else {
            Interest::READ_WRITE
        }
    }

    /// How long the current phase may last: the handshake timeout while
    /// `Handshaking`, the close timeout while `Closing`. `None` in any other
    /// state or when no timeouts are configured.
    ///
    /// The event loop arms a timer with this on each state change and calls
    /// [`on_timeout`](Self::on_timeout) when it fires.
    pub fn phase_timeout(&self) -> Option<Duration> {
        let timeouts = self.config.timeouts.as_ref()?;
        match self.state {
            ConnectionState::Handshaking => Some(timeouts.handshake),
            ConnectionState::Closing(_) => Some(timeouts.close),
            _ => None,
        }
    }

    /// The timer armed from [`phase_timeout`](Self::phase_timeout) fired.
    /// Force-closes a connection still handshaking or closing; does nothing
    /// otherwise.
    pub fn on_timeout(&mut self) {
        match self.state {
            ConnectionState::Handshaking => self.force_close("opening handshake timed out"),
            ConnectionState::Closing(_) => self.force_close("close handshake timed out"),
            _ => {}
        }
    }

    // ------------------------------------------------------------------
    // Opening handshake
    // ------------------------------------------------------------------

    /// Start the opening handshake.
    ///
    /// # Errors
    ///
    /// Returns `Error::ProtocolViolation` unless the connection is `Unconnected`.
    pub fn begin_handshake(&mut self) -> Result<()> {
        if self.state != ConnectionState::Unconnected {
            return Err(Error::ProtocolViolation(format!(
                "cannot start handshake in state {}",
                self.state
            )));
        }
        self.set_state(ConnectionState::Handshaking);
        Ok(())
    }

    /// Queue raw handshake bytes (an HTTP request or response) and try to
    /// write them out.
    ///
    /// # Errors
    ///
    /// Returns `Error::ProtocolViolation` outside `Handshaking`.
    pub fn send_handshake(&mut self, data: &[u8]) -> Result<()> {
        if self.state != ConnectionState::Handshaking {
            return Err(Error::ProtocolViolation(format!(
                "cannot send handshake data in state {}",
                self.state
            )));
        }
        self.write_buf.extend_from_slice(data);
        self.flush_or_abort();
        Ok(())
    }

    /// Bytes received so far while handshaking, for the negotiator to parse.
    pub fn handshake_input(&self) -> &[u8] {
        if self.state == ConnectionState::Handshaking {
            &self.read_buf
        } else {
            &[]
        }
    }

    /// The negotiator accepted the upgrade after reading `consumed` bytes of
    /// [`handshake_input`](Self::handshake_input).
    ///
    /// Anything past `consumed` is already WebSocket traffic and is
    /// processed immediately.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` outside `Handshaking`
    /// - `Error::InvalidArgument` if `consumed` exceeds the buffered input
    /// - `Error::Extension` if the handshake names an unregistered extension
    ///   (the connection is aborted as well)
    pub fn handshake_accepted(&mut self, info: HandshakeInfo, consumed: usize) -> Result<()> {
        if self.state != ConnectionState::Handshaking {
            return Err(Error::ProtocolViolation(format!(
                "cannot accept handshake in state {}",
                self.state
            )));
        }
        if consumed > self.read_buf.len() {
            return Err(Error::InvalidArgument(format!(
                "consumed {consumed} bytes but only {} are buffered",
                self.read_buf.len()
            )));
        }

        if let Err(err) = self.extensions.activate(&info.extensions) {
            self.abort(err.clone());
            return Err(err);
        }
        self.codec.set_allowed_rsv(self.extensions.allowed_rsv());

        self.read_buf.advance(consumed);
        debug!(resource = %info.resource, role = %self.role, "handshake accepted");
        self.handshake = Some(info.clone());
        self.set_state(ConnectionState::Open);
        self.events.push_back(Event::Open(info));

        self.process_input();
        Ok(())
    }

    /// The negotiator refused the upgrade. Terminates the connection.
    pub fn handshake_rejected(&mut self, reason: &str) {
        self.abort(Error::InvalidHandshake(reason.to_string()));
    }

    // ------------------------------------------------------------------
    // Application calls
    // ------------------------------------------------------------------

    /// Send a message.
    ///
    /// Text and Binary messages larger than `fragment_size` are split into
    /// Continuation frames. Ping and Pong go out as a single control frame.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` unless the connection is `Open`
    /// - `Error::MessageTooBig` if the message exceeds `limits.max_message_size`
    /// - `Error::ControlFrameTooLarge` for a Ping/Pong payload over 125 bytes
    /// - `Error::Extension` if an active extension fails to encode
    pub fn send(&mut self, message: Message) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::ConnectionClosed);
        }

        let (opcode, payload) = message.into_parts();

        // Encode everything first so a failure leaves nothing half-queued.
        let mut encoded = BytesMut::new();
        if opcode.is_control() {
            self.codec
                .encode(&Frame::new(true, opcode, payload), &mut encoded)?;
        } else {
            self.config.limits.check_message_size(payload.len())?;
            let fragmenter = MessageFragmenter::new(payload, opcode, self.config.fragment_size);
            for mut frame in fragmenter {
                self.extensions.encode(&mut frame)?;
                self.codec.encode(&frame, &mut encoded)?;
            }
        }

        self.write_buf.unsplit(encoded);
        self.flush_or_abort();
        Ok(())
    }

    /// Send a Ping with `data` as payload.
    ///
    /// # Errors
    ///
    /// Same as [`send`](Self::send).
    pub fn ping(&mut self, data: impl Into<Vec<u8>>) -> Result<()> {
        self.send(Message::Ping(data.into()))
    }

    /// Start the close handshake.
    ///
    /// Calling this again, or once the connection is closing or closed, does
    /// nothing. Before the connection is open there is nobody to exchange
    /// Close frames with: the connection goes straight to `Closed`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCloseCode` or `Error::ControlFrameTooLarge` if
    /// the pair cannot be put in a Close frame; nothing changes in that case.
    pub fn close(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        match self.state {
            ConnectionState::Unconnected | ConnectionState::Handshaking => {
                self.finish(code, reason.to_string(), false);
                Ok(())
            }
            ConnectionState::Open => {
                let frame = CloseFrame::new(code, reason)?;
                self.queue_pong()?;
                self.codec.encode(&frame.to_frame(), &mut self.write_buf)?;
                self.close_sent = Some((code, reason.to_string()));
                self.set_state(ConnectionState::Closing(Initiator::Local));
                self.flush_or_abort();
                Ok(())
            }
            ConnectionState::Closing(_) | ConnectionState::Closed | ConnectionState::Aborted => {
                Ok(())
            }
        }
    }

    /// Terminate without a close handshake, e.g. when the event loop's
    /// handshake or close timeout fires. Reports [`CloseCode::Abnormal`].
    pub fn force_close(&mut self, reason: &str) {
        if self.state.is_terminal() {
            return;
        }
        warn!(state = %self.state, reason, "force closing connection");
        self.write_buf.clear();
        self.pending_pong = None;
        self.finish(CloseCode::Abnormal, reason.to_string(), false);
    }

    // ------------------------------------------------------------------
    // Readiness callbacks
    // ------------------------------------------------------------------

    /// The transport is readable: pull everything available and process it.
    pub fn on_readable(&mut self) {
        if !matches!(
            self.state,
            ConnectionState::Handshaking | ConnectionState::Open | ConnectionState::Closing(_)
        ) {
            return;
        }

        let chunk = self.config.read_buffer_size.max(1);
        loop {
            let start = self.read_buf.len();
            self.read_buf.resize(start + chunk, 0);
            let result = self.transport.read(&mut self.read_buf[start..]);
            match result {
                Ok(0) => {
                    self.read_buf.truncate(start);
                    self.process_input();
                    self.on_eof();
                    return;
                }
                Ok(n) => {
                    self.read_buf.truncate(start + n);
                    trace!(bytes = n, "read from transport");
                    self.process_input();
                    if self.state.is_terminal() {
                        return;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    self.read_buf.truncate(start);
                    return;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    self.read_buf.truncate(start);
                }
                Err(e) => {
                    self.read_buf.truncate(start);
                    self.abort(e.into());
                    return;
                }
            }
        }
    }

    /// The transport is writable: flush queued bytes, or finish a transport
    /// shutdown that could not complete earlier.
    pub fn on_writable(&mut self) {
        if self.state.is_terminal() {
            if self.shutdown_pending {
                self.shutdown_transport();
            }
            return;
        }
        self.flush_or_abort();
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn set_state(&mut self, state: ConnectionState) {
        debug!(from = %self.state, to = %state, role = %self.role, "state transition");
        self.state = state;
    }

    fn process_input(&mut self) {
        match self.state {
            ConnectionState::Handshaking => {
                if let Err(err) = self.config.limits.check_handshake_size(self.read_buf.len()) {
                    self.abort(err);
                }
            }
            ConnectionState::Open | ConnectionState::Closing(Initiator::Local) => {
                while self.state.can_receive() {
                    match self.codec.decode(&mut self.read_buf) {
                        Ok(Some(frame)) => {
                            if let Err(err) = self.handle_frame(frame) {
                                self.abort(err);
                                return;
                            }
                        }
                        Ok(None) => return,
                        Err(err) => {
                            self.abort(err);
                            return;
                        }
                    }
                }
            }
            _ => self.read_buf.clear(),
        }
    }

    fn handle_frame(&mut self, mut frame: Frame) -> Result<()> {
        match frame.opcode {
            OpCode::Ping => {
                let payload = frame.into_payload();
                self.events.push_back(Event::Ping(payload.to_vec()));
                if self.state == ConnectionState::Open {
                    if self.pending_pong.replace(payload).is_some() {
                        trace!("unsent pong superseded by a newer ping");
                    }
                    self.flush_or_abort();
                }
            }
            OpCode::Pong => {
                self.events.push_back(Event::Pong(frame.into_payload().to_vec()));
            }
            OpCode::Close => self.handle_close(&frame)?,
            OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                if self.extensions.active_count() > 0 {
                    self.extensions.decode(&mut frame)?;
                }
                if let Some(message) = self.assembler.push(frame)? {
                    self.events.push_back(Event::Message(message));
                }
            }
        }
        Ok(())
    }

    fn handle_close(&mut self, frame: &Frame) -> Result<()> {
        let close = CloseFrame::from_frame(frame)?;
        close.is_valid()?;

        let code = if close.payload().is_empty() {
            CloseCode::NoStatus
        } else {
            close.code()
        };
        debug!(%code, reason = close.reason(), "close frame received");
        self.close_received = Some((code, close.reason().to_string()));

        if self.state == ConnectionState::Open {
            let echo = if close.payload().is_empty() {
                CloseFrame::empty()
            } else {
                CloseFrame::new(code, close.reason())?
            };
            self.queue_pong()?;
            self.codec.encode(&echo.to_frame(), &mut self.write_buf)?;
            self.close_sent = Some((code, close.reason().to_string()));
            self.set_state(ConnectionState::Closing(Initiator::Remote));
        }

        self.flush_or_abort();
        Ok(())
    }

    /// Move the pending Pong, if any, to the end of the outbound queue.
    /// Returns whether there was one.
    fn queue_pong(&mut self) -> Result<bool> {
        let Some(payload) = self.pending_pong.take() else {
            return Ok(false);
        };
        self.codec.encode(&Frame::pong(payload), &mut self.write_buf)?;
        Ok(true)
    }

    /// Write as much as the transport takes. Transport failures abort.
    ///
    /// The pending Pong joins the queue only once everything before it is
    /// written, so it stays replaceable while the transport is blocked.
    fn flush_or_abort(&mut self) {
        loop {
            if self.write_buf.is_empty() {
                match self.queue_pong() {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(err) => {
                        self.abort(err);
                        return;
                    }
                }
            }
            match self.transport.write(&self.write_buf) {
                Ok(0) => {
                    self.abort(Error::Transport("transport accepted no bytes".into()));
                    return;
                }
                Ok(n) => {
                    trace!(bytes = n, "wrote to transport");
                    self.write_buf.advance(n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.abort(e.into());
                    return;
                }
            }
        }
        match self.transport.flush() {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => {
                self.abort(e.into());
                return;
            }
        }
        self.maybe_finish_close();
    }

    /// Both Close frames exchanged and ours is on the wire: done.
    fn maybe_finish_close(&mut self) {
        let ConnectionState::Closing(initiator) = self.state else {
            return;
        };
        if !self.write_buf.is_empty() || self.close_received.is_none() {
            return;
        }
        let reported = match initiator {
            Initiator::Local => self.close_sent.take(),
            Initiator::Remote => self.close_received.take(),
        };
        let (code, reason) = reported.unwrap_or((CloseCode::NoStatus, String::new()));
        self.finish(code, reason, initiator == Initiator::Remote);
    }

    fn on_eof(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        debug!(state = %self.state, "transport reached end of stream");
        self.write_buf.clear();
        self.finish(CloseCode::Abnormal, String::new(), true);
    }

    /// Move to `Closed`, release the transport and report the close.
    fn finish(&mut self, code: CloseCode, reason: String, remote: bool) {
        self.set_state(ConnectionState::Closed);
        self.assembler.reset();
        self.read_buf.clear();
        self.pending_pong = None;
        self.shutdown_transport();
        self.events.push_back(Event::Close {
            code,
            reason,
            remote,
        });
    }

    /// Terminate on `err`: best-effort Close frame for protocol errors on an
    /// open connection, then shut the transport and report.
    fn abort(&mut self, err: Error) {
        if self.state.is_terminal() {
            return;
        }
        warn!(error = %err, state = %self.state, "aborting connection");

        let was_open = self.state == ConnectionState::Open;
        self.set_state(ConnectionState::Aborted);
        self.assembler.reset();
        self.read_buf.clear();
        self.pending_pong = None;

        if was_open && !err.is_transport() {
            if let Ok(close) = CloseFrame::new(err.close_code(), "") {
                if self.codec.encode(&close.to_frame(), &mut self.write_buf).is_ok() {
                    self.try_flush_once();
                }
            }
        }
        self.write_buf.clear();
        self.shutdown_transport();

        let code = err.close_code();
        let reason = err.to_string();
        self.events.push_back(Event::Error(err));
        self.events.push_back(Event::Close {
            code,
            reason,
            remote: false,
        });
    }

    fn shutdown_transport(&mut self) {
        match self.transport.shutdown() {
            Ok(()) => self.shutdown_pending = false,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => self.shutdown_pending = true,
            Err(e) => {
                debug!(error = %e, "transport shutdown");
                self.shutdown_pending = false;
            }
        }
    }

    fn try_flush_once(&mut self) {
        while !self.write_buf.is_empty() {
            match self.transport.write(&self.write_buf) {
                Ok(n) if n > 0 => self.write_buf.advance(n),
                _ => return,
            }
        }
    }
}

impl<T> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("role", &self.role)
            .field("state", &self.state)
            .field("read_buffered", &self.read_buf.len())
            .field("write_pending", &self.write_buf.len())
            .field("pong_pending", &self.pending_pong.is_some())
            .field("events", &self.events.len())
            .finish()
    }
}
