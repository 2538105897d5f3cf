//! Byte-channel seam between the test reactor and whatever carries the bytes.
//!
//! Transmission goes through a lock-then-write protocol on a shared transmit
//! buffer: a producer first reserves `n` bytes with [`Link::try_lock`], then
//! writes exactly those bytes with [`Link::write_locked`]. The buffer is
//! drained asynchronously (interrupt context on hardware, a thread on a host).
//! The raw path skips the buffer entirely.

use thiserror::Error;

pub mod bytebuf;
pub mod serial;
pub mod sim;

pub use bytebuf::{BufError, ByteBuf};

/// Identifies a class of transmit requests competing for the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockToken(pub u8);

impl LockToken {
    /// Single-character / test payload writes.
    pub const SCHAR: LockToken = LockToken(0x01);
}

/// Transmit buffer size used by the concrete links.
pub const TX_BUFFER_SIZE: usize = 256;
/// Receive queue size used by the concrete links.
pub const RX_BUFFER_SIZE: usize = 256;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("transmit buffer: {0}")]
    Buffer(#[from] BufError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub trait Link {
    /// Inbound bytes received but not yet consumed.
    fn pending_inbound(&self) -> usize;
    /// Consume one inbound byte.
    fn read_byte(&mut self) -> Option<u8>;
    /// Drop every pending inbound byte.
    fn discard_inbound(&mut self);
    /// Consume up to `buf.len()` inbound bytes; returns the count read.
    fn read_exact(&mut self, buf: &mut [u8]) -> usize;

    /// Non-blocking reservation of `len` transmit bytes for `token`.
    fn try_lock(&mut self, len: usize, token: LockToken) -> bool;
    /// Write into a reservation obtained from [`Link::try_lock`].
    fn write_locked(&mut self, bytes: &[u8], token: LockToken) -> Result<(), LinkError>;

    /// Whether the raw (unbuffered) path can take another byte.
    fn raw_ready(&self) -> bool;
    fn raw_write(&mut self, byte: u8) -> Result<(), LinkError>;
}
