//! Connection configuration: resource limits, buffer sizes and timeouts.

use std::time::Duration;

use crate::error::Error;

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;

/// Resource limits enforced while frames and messages are received.
///
/// Every limit is checked before the corresponding memory is committed, so
/// a hostile peer cannot make the connection buffer more than these bounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Limits {
    /// Largest payload a single frame may declare. Default 16 MiB.
    pub max_frame_size: usize,
    /// Largest reassembled message. Default 64 MiB.
    pub max_message_size: usize,
    /// Most frames one message may be split into. Default 128.
    pub max_fragment_count: usize,
    /// Most bytes buffered before the opening handshake completes.
    /// Default 8 KiB.
    pub max_handshake_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self::new(16 * MIB, 64 * MIB, 128, 8 * KIB)
    }
}

impl Limits {
    #[must_use]
    pub const fn new(
        max_frame_size: usize,
        max_message_size: usize,
        max_fragment_count: usize,
        max_handshake_size: usize,
    ) -> Self {
        Self {
            max_frame_size,
            max_message_size,
            max_fragment_count,
            max_handshake_size,
        }
    }

    /// Tight limits for memory-constrained targets: 64 KiB frames, 256 KiB
    /// messages, 16 fragments, 4 KiB of handshake.
    #[must_use]
    pub const fn embedded() -> Self {
        Self::new(64 * KIB, 256 * KIB, 16, 4 * KIB)
    }

    /// Limits high enough to never trigger in practice. Only for trusted
    /// peers and tests.
    #[must_use]
    pub const fn unrestricted() -> Self {
        #[cfg(target_pointer_width = "64")]
        let (frame, message) = (1024 * MIB, 4096 * MIB);
        #[cfg(not(target_pointer_width = "64"))]
        let (frame, message) = (usize::MAX, usize::MAX);
        Self::new(frame, message, 1024, 64 * KIB)
    }

    /// # Errors
    ///
    /// [`Error::MessageTooBig`] when `size` is over `max_message_size`.
    pub const fn check_message_size(&self, size: usize) -> Result<(), Error> {
        if size > self.max_message_size {
            return Err(Error::MessageTooBig {
                size: size as u64,
                max: self.max_message_size as u64,
            });
        }
        Ok(())
    }

    /// Check a declared frame length. Takes the raw 64-bit wire value so
    /// nothing is truncated on 32-bit targets before the comparison.
    ///
    /// # Errors
    ///
    /// [`Error::MessageTooBig`] when `size` is over `max_frame_size`.
    pub const fn check_frame_size(&self, size: u64) -> Result<(), Error> {
        if size > self.max_frame_size as u64 {
            return Err(Error::MessageTooBig {
                size,
                max: self.max_frame_size as u64,
            });
        }
        Ok(())
    }

    /// # Errors
    ///
    /// [`Error::TooManyFragments`] when `count` is over `max_fragment_count`.
    pub const fn check_fragment_count(&self, count: usize) -> Result<(), Error> {
        if count > self.max_fragment_count {
            return Err(Error::TooManyFragments {
                count,
                max: self.max_fragment_count,
            });
        }
        Ok(())
    }

    /// # Errors
    ///
    /// [`Error::InvalidHandshake`] when `size` is over `max_handshake_size`.
    pub fn check_handshake_size(&self, size: usize) -> Result<(), Error> {
        if size > self.max_handshake_size {
            return Err(Error::InvalidHandshake(format!(
                "handshake data too large: {size} bytes (max: {})",
                self.max_handshake_size
            )));
        }
        Ok(())
    }
}

/// Deadlines for the opening and closing handshakes.
///
/// The connection never reads a clock. The event loop arms a timer from
/// [`Connection::phase_timeout`](crate::Connection::phase_timeout) and calls
/// [`Connection::on_timeout`](crate::Connection::on_timeout) when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Opening handshake. Default 30 s.
    pub handshake: Duration,
    /// Wait for the peer's Close after ours went out. Default 5 s.
    pub close: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::new(Duration::from_secs(30), Duration::from_secs(5))
    }
}

impl Timeouts {
    #[must_use]
    pub const fn new(handshake: Duration, close: Duration) -> Self {
        Self { handshake, close }
    }
}

/// Upper bounds for the TLS pump's buffers. They start small and double on
/// overflow until they hit these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsBufferConfig {
    /// Ciphertext buffers in both directions. Default 1 MiB.
    pub max_network_buffer: usize,
    /// Decrypted data not yet read by the application. Default 1 MiB.
    pub max_application_buffer: usize,
}

impl Default for TlsBufferConfig {
    fn default() -> Self {
        Self {
            max_network_buffer: MIB,
            max_application_buffer: MIB,
        }
    }
}

/// Per-connection settings.
#[derive(Debug, Clone)]
pub struct Config {
    pub limits: Limits,
    /// Outgoing Text and Binary payloads above this many bytes are split
    /// into Continuation frames. Default 16 KiB.
    pub fragment_size: usize,
    /// Let a server take unmasked client frames. This breaks RFC 6455 and
    /// is meant for testing. Default `false`.
    pub accept_unmasked_frames: bool,
    /// Bytes requested from the transport per read. Zero is treated as one.
    /// Default 8 KiB.
    pub read_buffer_size: usize,
    /// Initial capacity of the outbound queue. Default 8 KiB.
    pub write_buffer_size: usize,
    /// `None` leaves deadlines entirely to the caller.
    pub timeouts: Option<Timeouts>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            fragment_size: 16 * KIB,
            accept_unmasked_frames: false,
            read_buffer_size: 8 * KIB,
            write_buffer_size: 8 * KIB,
            timeouts: None,
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults for a server. Unmasked client frames are rejected.
    #[must_use]
    pub fn server() -> Self {
        Self::default().with_accept_unmasked_frames(false)
    }

    /// Defaults for a client.
    #[must_use]
    pub fn client() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    #[must_use]
    pub const fn with_fragment_size(mut self, size: usize) -> Self {
        self.fragment_size = size;
        self
    }

    #[must_use]
    pub const fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    #[must_use]
    pub const fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    #[must_use]
    pub const fn with_accept_unmasked_frames(mut self, accept: bool) -> Self {
        self.accept_unmasked_frames = accept;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }
}
