use std::collections::VecDeque;

use super::{ByteBuf, Link, LinkError, LockToken, TX_BUFFER_SIZE};

/// In-memory link. The host side pushes inbound bytes with [`SimLink::inject`]
/// and collects transmitted bytes with [`SimLink::take_wire`].
///
/// There is no asynchronous drain; instead [`SimLink::drain`] stands in for
/// the transmit interrupt, and every refused `try_lock` fires it once so a
/// busy-waiting producer still makes progress on a single thread.
pub struct SimLink {
    rx: VecDeque<u8>,
    tx: ByteBuf<TX_BUFFER_SIZE>,
    wire: Vec<u8>,
    burst: usize,
    refused_locks: u64,
}

impl SimLink {
    pub fn new(burst: usize) -> Self {
        Self {
            rx: VecDeque::new(),
            tx: ByteBuf::new(),
            wire: Vec::new(),
            burst: burst.max(1),
            refused_locks: 0,
        }
    }

    pub fn inject(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    /// Move up to one burst of buffered bytes onto the wire.
    pub fn drain(&mut self) -> usize {
        self.tx.drain_into(&mut self.wire, self.burst)
    }

    /// Drain the whole transmit buffer.
    pub fn flush(&mut self) {
        while self.drain() > 0 {}
    }

    pub fn take_wire(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.wire)
    }

    pub fn refused_locks(&self) -> u64 {
        self.refused_locks
    }
}

impl Default for SimLink {
    fn default() -> Self {
        Self::new(16)
    }
}

impl Link for SimLink {
    fn pending_inbound(&self) -> usize {
        self.rx.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    fn discard_inbound(&mut self) {
        self.rx.clear();
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.rx.len());
        for (slot, b) in buf.iter_mut().zip(self.rx.drain(..n)) {
            *slot = b;
        }
        n
    }

    fn try_lock(&mut self, len: usize, token: LockToken) -> bool {
        if self.tx.request_lock(len, token) {
            return true;
        }
        self.refused_locks += 1;
        self.drain();
        false
    }

    fn write_locked(&mut self, bytes: &[u8], token: LockToken) -> Result<(), LinkError> {
        Ok(self.tx.push_locked(bytes, token)?)
    }

    fn raw_ready(&self) -> bool {
        true
    }

    fn raw_write(&mut self, byte: u8) -> Result<(), LinkError> {
        self.wire.push(byte);
        Ok(())
    }
}
