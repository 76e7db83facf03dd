//! Extension hook (RFC 6455 Section 9).
//!
//! Negotiating `Sec-WebSocket-Extensions` happens outside this crate. Once
//! the negotiator reports which extension tokens were agreed, the matching
//! registered [`Extension`]s are activated: they claim RSV bits (so the
//! codec stops rejecting them) and get to transform data frames on the way
//! in and out.

use std::fmt;
use std::ops::BitOr;

use crate::error::{Error, Result};
use crate::protocol::Frame;

/// RSV bits an extension claims, kept in their first-header-byte positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RsvBits(u8);

impl RsvBits {
    pub const NONE: Self = Self(0);
    pub const RSV1: Self = Self(0x40);
    pub const RSV2: Self = Self(0x20);
    pub const RSV3: Self = Self(0x10);

    /// Whether both declarations claim the same bit.
    #[must_use]
    pub const fn conflicts_with(&self, other: &RsvBits) -> bool {
        self.0 & other.0 != 0
    }

    /// The bits as they sit in the first header byte.
    #[must_use]
    pub const fn header_bits(&self) -> u8 {
        self.0
    }
}

impl BitOr for RsvBits {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A per-frame transform bound to a negotiated extension token.
///
/// ```rust
/// use wspump::extensions::{Extension, RsvBits};
/// use wspump::protocol::Frame;
///
/// struct NoOpExtension;
///
/// impl Extension for NoOpExtension {
///     fn name(&self) -> &str { "x-noop" }
///
///     fn encode(&mut self, _frame: &mut Frame) -> wspump::Result<()> { Ok(()) }
///
///     fn decode(&mut self, _frame: &mut Frame) -> wspump::Result<()> { Ok(()) }
/// }
/// ```
pub trait Extension: Send {
    /// Extension token as it appears in `Sec-WebSocket-Extensions`.
    fn name(&self) -> &str;

    /// RSV bits this extension uses.
    fn rsv_bits(&self) -> RsvBits {
        RsvBits::NONE
    }

    /// Transform an outgoing data frame. Applied in registration order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extension`] if the frame cannot be transformed.
    fn encode(&mut self, frame: &mut Frame) -> Result<()>;

    /// Transform an incoming data frame. Applied in reverse registration
    /// order; must clear the RSV bits it handled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extension`] if the frame cannot be transformed.
    fn decode(&mut self, frame: &mut Frame) -> Result<()>;
}

/// Registered extensions and the subset that is active on a connection.
#[derive(Default)]
pub struct ExtensionRegistry {
    extensions: Vec<Box<dyn Extension>>,
    used_rsv_bits: RsvBits,
    active: Vec<usize>,
}

impl ExtensionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an extension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extension`] if its RSV bits clash with an already
    /// registered extension.
    pub fn add(&mut self, extension: Box<dyn Extension>) -> Result<()> {
        let rsv = extension.rsv_bits();
        if self.used_rsv_bits.conflicts_with(&rsv) {
            return Err(Error::Extension(format!(
                "extension '{}' claims an RSV bit already in use",
                extension.name()
            )));
        }
        self.used_rsv_bits = self.used_rsv_bits | rsv;
        self.extensions.push(extension);
        Ok(())
    }

    /// Number of registered extensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Activate the registered extensions whose names appear in `tokens`.
    ///
    /// Tokens may carry parameters (`name; param=value`); only the name is
    /// matched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extension`] for a token no registered extension
    /// answers to; the peer agreed to something we cannot speak.
    pub fn activate(&mut self, tokens: &[String]) -> Result<()> {
        self.active.clear();
        for token in tokens {
            let name = token.split(';').next().unwrap_or_default().trim();
            let idx = self
                .extensions
                .iter()
                .position(|ext| ext.name() == name)
                .ok_or_else(|| Error::Extension(format!("unsupported extension '{name}'")))?;
            if !self.active.contains(&idx) {
                self.active.push(idx);
            }
        }
        Ok(())
    }

    /// Number of active extensions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// RSV bits claimed by active extensions, in header-byte position.
    #[must_use]
    pub fn allowed_rsv(&self) -> u8 {
        self.active
            .iter()
            .fold(RsvBits::NONE, |acc, &idx| acc | self.extensions[idx].rsv_bits())
            .header_bits()
    }

    /// Encode a frame through all active extensions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extension`] if any extension fails to encode the frame.
    pub fn encode(&mut self, frame: &mut Frame) -> Result<()> {
        for &idx in &self.active {
            self.extensions[idx].encode(frame)?;
        }
        Ok(())
    }

    /// Decode a frame through all active extensions, in reverse order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Extension`] if any extension fails to decode the frame.
    pub fn decode(&mut self, frame: &mut Frame) -> Result<()> {
        for &idx in self.active.iter().rev() {
            self.extensions[idx].decode(frame)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field(
                "extensions",
                &self.extensions.iter().map(|e| e.name()).collect::<Vec<_>>(),
            )
            .field("used_rsv_bits", &self.used_rsv_bits)
            .field("active", &self.active)
            .finish()
    }
}
