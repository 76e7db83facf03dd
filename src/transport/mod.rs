//! Non-blocking byte transports the connection runs over.
//!
//! A [`Transport`] behaves like a non-blocking socket: `read` and `write`
//! move bytes or fail with [`io::ErrorKind::WouldBlock`]; `read` returning
//! `Ok(0)` is end of stream. The TLS adapter implements the same trait, so
//! the connection cannot tell a plain socket from an encrypted one.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};

/// Readiness the owner of a connection should wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interest {
    /// Wait until the transport is readable.
    pub readable: bool,
    /// Wait until the transport is writable.
    pub writable: bool,
}

impl Interest {
    /// Interest in reads only.
    pub const READ: Self = Self {
        readable: true,
        writable: false,
    };

    /// Interest in writes only.
    pub const WRITE: Self = Self {
        readable: false,
        writable: true,
    };

    /// Interest in reads and writes.
    pub const READ_WRITE: Self = Self {
        readable: true,
        writable: true,
    };

    /// No interest; the connection is finished.
    pub const NONE: Self = Self {
        readable: false,
        writable: false,
    };
}

/// A non-blocking, connection-oriented byte stream.
pub trait Transport {
    /// Read into `buf`. `Ok(0)` means the peer closed the stream.
    ///
    /// # Errors
    ///
    /// `WouldBlock` when no data is available, any other kind on failure.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write from `buf`, returning how many bytes were accepted.
    ///
    /// # Errors
    ///
    /// `WouldBlock` when the transport cannot accept data right now.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Push out bytes the transport accepted but has not sent yet.
    ///
    /// # Errors
    ///
    /// `WouldBlock` while some remain.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Whether [`flush`](Self::flush) has work to do.
    fn wants_write(&self) -> bool {
        false
    }

    /// Whether the underlying socket has finished connecting.
    fn is_connected(&self) -> bool;

    /// Close the transport. Must be idempotent.
    ///
    /// # Errors
    ///
    /// `WouldBlock` when a graceful close still has bytes to exchange.
    fn shutdown(&mut self) -> io::Result<()>;
}

impl Transport for TcpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Write::write(self, buf)
    }

    fn is_connected(&self) -> bool {
        self.peer_addr().is_ok()
    }

    fn shutdown(&mut self) -> io::Result<()> {
        match TcpStream::shutdown(self, Shutdown::Both) {
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}
