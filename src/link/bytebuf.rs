use heapless::Deque;
use thiserror::Error;

use super::LockToken;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufError {
    #[error("write without a held lock")]
    NotLocked,
    #[error("lock held by token {held:?}, write used {used:?}")]
    TokenMismatch { held: LockToken, used: LockToken },
    #[error("write of {requested} bytes exceeds {remaining} locked bytes")]
    Overrun { requested: usize, remaining: usize },
}

#[derive(Debug, Clone, Copy)]
struct Lock {
    token: LockToken,
    remaining: usize,
}

/// Transmit ring shared between tick context (producer) and the drain side.
///
/// A producer reserves space with [`ByteBuf::request_lock`] and then fills
/// exactly that reservation; the drain side pops bytes regardless of the lock.
pub struct ByteBuf<const N: usize> {
    data: Deque<u8, N>,
    lock: Option<Lock>,
}

impl<const N: usize> ByteBuf<N> {
    pub const fn new() -> Self {
        Self {
            data: Deque::new(),
            lock: None,
        }
    }

    pub fn free(&self) -> usize {
        N - self.data.len()
    }

    /// Reserve `len` bytes for `token`. Refused while another lock is
    /// outstanding or when the ring can't hold the whole reservation.
    pub fn request_lock(&mut self, len: usize, token: LockToken) -> bool {
        if len == 0 || self.lock.is_some() || self.free() < len {
            return false;
        }
        self.lock = Some(Lock {
            token,
            remaining: len,
        });
        true
    }

    /// Append into the held reservation. The lock is released once the
    /// reservation is full.
    pub fn push_locked(&mut self, bytes: &[u8], token: LockToken) -> Result<(), BufError> {
        let lock = self.lock.as_mut().ok_or(BufError::NotLocked)?;
        if lock.token != token {
            return Err(BufError::TokenMismatch {
                held: lock.token,
                used: token,
            });
        }
        if bytes.len() > lock.remaining {
            return Err(BufError::Overrun {
                requested: bytes.len(),
                remaining: lock.remaining,
            });
        }
        for &b in bytes {
            // Space was checked when the lock was granted and the drain side
            // only ever frees space.
            let _ = self.data.push_back(b);
        }
        lock.remaining -= bytes.len();
        if lock.remaining == 0 {
            self.lock = None;
        }
        Ok(())
    }

    /// Move up to `max` bytes into `out`, returning how many moved.
    pub fn drain_into(&mut self, out: &mut Vec<u8>, max: usize) -> usize {
        let mut n = 0;
        while n < max {
            match self.data.pop_front() {
                Some(b) => {
                    out.push(b);
                    n += 1;
                }
                None => break,
            }
        }
        n
    }
}

impl<const N: usize> Default for ByteBuf<N> {
    fn default() -> Self {
        Self::new()
    }
}
