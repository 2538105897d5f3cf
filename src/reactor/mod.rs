//! Test-mode reactor.
//!
//! [`Reactor::tick`] performs one bounded unit of work for the active mode and
//! returns. The entry loop calls it forever. Mode selection is only processed
//! while the reactor is `Uninitialized`: a tag byte sent while another mode is
//! running is never consumed by the selector.

use std::hint::spin_loop;

use tracing::{debug, info, warn};

use crate::indicator::{IndicatorId, Indicators};
use crate::link::{Link, LockToken};
use crate::pattern::{CHUNK_SIZE, RAW_FIRST, TEST_STR, next_raw};
use crate::prbs::{LFSR16_DEFAULT_SEED, Lfsr16, Prbs};

pub mod mode;

#[cfg(test)]
mod tests;

pub use mode::TestMode;

const TOKEN: LockToken = LockToken::SCHAR;

/// What the roundtrip handlers do when the echo can't be locked right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockPolicy {
    /// Spin on the transmit lock inside the tick. Stalls the loop until the
    /// drain side frees enough space.
    #[default]
    Block,
    /// Hold the received data and retry the lock on later ticks. No further
    /// input is read until the held data has gone out.
    BestEffort,
}

#[derive(Debug, Clone, Copy)]
pub struct ReactorConfig {
    pub roundtrip_policy: BlockPolicy,
    pub prbs_seed: u16,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            roundtrip_policy: BlockPolicy::Block,
            prbs_seed: LFSR16_DEFAULT_SEED,
        }
    }
}

pub struct Reactor<P: Prbs = Lfsr16> {
    mode: TestMode,
    /// Raw-throughput cycle position; unused by the other modes.
    persistence: u8,
    chunk: [u8; CHUNK_SIZE],
    /// Length of echo data parked in `chunk` under `BestEffort`.
    pending: Option<usize>,
    prbs: P,
    policy: BlockPolicy,
    ticks: u64,
}

impl Reactor<Lfsr16> {
    pub fn new(config: ReactorConfig) -> Self {
        Self::with_prbs(config, Lfsr16::new(config.prbs_seed))
    }
}

impl<P: Prbs> Reactor<P> {
    pub fn with_prbs(config: ReactorConfig, prbs: P) -> Self {
        Self {
            mode: TestMode::Uninitialized,
            persistence: RAW_FIRST,
            chunk: [0; CHUNK_SIZE],
            pending: None,
            prbs,
            policy: config.roundtrip_policy,
            ticks: 0,
        }
    }

    /// Bring-up: idle indicator on, active off, waiting for a mode byte.
    pub fn init<I: Indicators>(&mut self, leds: &mut I) {
        self.mode = TestMode::Uninitialized;
        self.pending = None;
        leds.set(IndicatorId::Idle, true);
        leds.set(IndicatorId::Active, false);
    }

    pub fn mode(&self) -> TestMode {
        self.mode
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn tick<L: Link, I: Indicators>(&mut self, link: &mut L, leds: &mut I) {
        self.ticks = self.ticks.wrapping_add(1);
        match self.mode {
            TestMode::Uninitialized => self.select(link, leds),
            TestMode::Throughput => Self::throughput(link),
            TestMode::BerPrbs => self.ber_prbs(link),
            TestMode::ThroughputRaw => self.throughput_raw(link),
            TestMode::Roundtrip => self.roundtrip(link),
            TestMode::RoundtripChunked => self.roundtrip_chunked(link),
            TestMode::Unrecognized(tag) => {
                debug!(tag, "unrecognized mode, back to uninitialized");
                self.mode = TestMode::Uninitialized;
            }
        }
    }

    fn select<L: Link, I: Indicators>(&mut self, link: &mut L, leds: &mut I) {
        if link.pending_inbound() == 0 {
            return;
        }
        let Some(tag) = link.read_byte() else {
            return;
        };
        link.discard_inbound();
        self.mode = TestMode::from_tag(tag);

        // Acknowledge only if it doesn't have to wait.
        if link.try_lock(1, TOKEN) {
            send(link, &[tag]);
        }

        leds.set(IndicatorId::Idle, false);
        leds.set(IndicatorId::Active, true);

        match self.mode {
            TestMode::BerPrbs => self.prbs.seed(),
            TestMode::ThroughputRaw => self.persistence = RAW_FIRST,
            _ => {}
        }
        self.pending = None;
        info!(mode = self.mode.name(), tag, "test mode selected");
    }

    /// Fill the buffered path with the fixed test string, one copy per tick.
    fn throughput<L: Link>(link: &mut L) {
        if link.try_lock(TEST_STR.len(), TOKEN) {
            send(link, TEST_STR);
        }
    }

    /// The generator only advances for bytes that actually get locked.
    fn ber_prbs<L: Link>(&mut self, link: &mut L) {
        if link.try_lock(1, TOKEN) {
            let b = self.prbs.next_byte();
            send(link, &[b]);
        }
    }

    /// Bypasses the buffer and the lock. Waits for the raw path within the tick.
    fn throughput_raw<L: Link>(&mut self, link: &mut L) {
        while !link.raw_ready() {
            spin_loop();
        }
        match link.raw_write(self.persistence) {
            Ok(()) => self.persistence = next_raw(self.persistence),
            Err(e) => warn!(error = %e, "raw write failed"),
        }
    }

    fn roundtrip<L: Link>(&mut self, link: &mut L) {
        if !self.flush_pending(link) || link.pending_inbound() == 0 {
            return;
        }
        let Some(b) = link.read_byte() else {
            return;
        };
        self.chunk[0] = b;
        self.echo(link, 1);
    }

    /// Host vectors must be whole multiples of `CHUNK_SIZE`; a short tail
    /// sits in the inbound buffer until more bytes arrive.
    fn roundtrip_chunked<L: Link>(&mut self, link: &mut L) {
        if !self.flush_pending(link) || link.pending_inbound() < CHUNK_SIZE {
            return;
        }
        let n = link.read_exact(&mut self.chunk);
        if n > 0 {
            self.echo(link, n);
        }
    }

    fn echo<L: Link>(&mut self, link: &mut L, len: usize) {
        match self.policy {
            BlockPolicy::Block => {
                while !link.try_lock(len, TOKEN) {
                    spin_loop();
                }
                send(link, &self.chunk[..len]);
            }
            BlockPolicy::BestEffort => {
                self.pending = Some(len);
                self.flush_pending(link);
            }
        }
    }

    /// Returns true once nothing is parked.
    fn flush_pending<L: Link>(&mut self, link: &mut L) -> bool {
        let Some(len) = self.pending else {
            return true;
        };
        if !link.try_lock(len, TOKEN) {
            return false;
        }
        send(link, &self.chunk[..len]);
        self.pending = None;
        true
    }
}

fn send<L: Link>(link: &mut L, bytes: &[u8]) {
    if let Err(e) = link.write_locked(bytes, TOKEN) {
        warn!(error = %e, len = bytes.len(), "locked write failed");
    }
}
