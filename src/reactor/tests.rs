use std::cell::Cell;
use std::collections::VecDeque;
use std::io;

use super::*;
use crate::indicator::LogIndicators;
use crate::link::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Read(u8),
    Wrote(u8),
}

/// Link whose lock availability is scripted: `refuse` lock attempts fail
/// before one succeeds; `blocked` makes every attempt fail. The raw path
/// reports busy for `raw_busy_polls` polls and fails `raw_fail` writes.
#[derive(Default)]
struct ScriptedLink {
    rx: VecDeque<u8>,
    out: Vec<u8>,
    raw: Vec<u8>,
    lock: Option<usize>,
    refuse: u32,
    blocked: bool,
    lock_attempts: u32,
    events: Vec<Event>,
    raw_busy_polls: Cell<u32>,
    raw_polls: Cell<u32>,
    raw_fail: u32,
}

impl ScriptedLink {
    fn with_input(bytes: &[u8]) -> Self {
        Self {
            rx: bytes.iter().copied().collect(),
            ..Default::default()
        }
    }
}

impl Link for ScriptedLink {
    fn pending_inbound(&self) -> usize {
        self.rx.len()
    }

    fn read_byte(&mut self) -> Option<u8> {
        let b = self.rx.pop_front()?;
        self.events.push(Event::Read(b));
        Some(b)
    }

    fn discard_inbound(&mut self) {
        self.rx.clear();
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> usize {
        let mut n = 0;
        for slot in buf.iter_mut() {
            let Some(b) = self.read_byte() else { break };
            *slot = b;
            n += 1;
        }
        n
    }

    fn try_lock(&mut self, len: usize, token: LockToken) -> bool {
        assert_eq!(token, LockToken::SCHAR);
        self.lock_attempts += 1;
        if self.blocked || self.lock.is_some() {
            return false;
        }
        if self.refuse > 0 {
            self.refuse -= 1;
            return false;
        }
        self.lock = Some(len);
        true
    }

    fn write_locked(&mut self, bytes: &[u8], _token: LockToken) -> Result<(), LinkError> {
        let held = self.lock.take().expect("write without lock");
        assert_eq!(held, bytes.len(), "write must fill the reservation");
        self.out.extend_from_slice(bytes);
        self.events.extend(bytes.iter().map(|&b| Event::Wrote(b)));
        Ok(())
    }

    fn raw_ready(&self) -> bool {
        self.raw_polls.set(self.raw_polls.get() + 1);
        let busy = self.raw_busy_polls.get();
        if busy > 0 {
            self.raw_busy_polls.set(busy - 1);
            return false;
        }
        true
    }

    fn raw_write(&mut self, byte: u8) -> Result<(), LinkError> {
        assert_eq!(self.raw_busy_polls.get(), 0, "raw write while busy");
        if self.raw_fail > 0 {
            self.raw_fail -= 1;
            return Err(io::Error::other("raw path fault").into());
        }
        self.raw.push(byte);
        Ok(())
    }
}

/// Lfsr16 that counts how often it was advanced.
struct CountingPrbs {
    inner: Lfsr16,
    advances: usize,
}

impl Prbs for CountingPrbs {
    fn seed(&mut self) {
        self.inner.seed();
    }

    fn next_byte(&mut self) -> u8 {
        self.advances += 1;
        self.inner.next_byte()
    }
}

fn selected(mode: TestMode, policy: BlockPolicy) -> (Reactor, ScriptedLink, LogIndicators) {
    let mut reactor = Reactor::new(ReactorConfig {
        roundtrip_policy: policy,
        ..Default::default()
    });
    let mut leds = LogIndicators::default();
    reactor.init(&mut leds);
    let mut link = ScriptedLink::with_input(&[mode.tag()]);
    reactor.tick(&mut link, &mut leds);
    assert_eq!(reactor.mode(), mode);
    link.out.clear();
    link.events.clear();
    link.lock_attempts = 0;
    (reactor, link, leds)
}

#[test]
fn selects_each_mode_once() {
    for mode in TestMode::ALL {
        let mut reactor = Reactor::new(ReactorConfig::default());
        let mut leds = LogIndicators::default();
        reactor.init(&mut leds);
        assert!(leds.idle && !leds.active);

        let mut link = ScriptedLink::default();
        reactor.tick(&mut link, &mut leds);
        assert_eq!(reactor.mode(), TestMode::Uninitialized);

        link.rx.push_back(mode.tag());
        reactor.tick(&mut link, &mut leds);
        assert_eq!(reactor.mode(), mode);
        // Only the echo; no handler ran in the selecting tick.
        assert_eq!(link.out, vec![mode.tag()]);
        assert!(link.raw.is_empty());
        assert!(!leds.idle && leds.active);
        assert_eq!(leds.changes, 3);
    }
}

#[test]
fn echo_skipped_when_lock_busy() {
    let mut reactor = Reactor::new(ReactorConfig::default());
    let mut leds = LogIndicators::default();
    reactor.init(&mut leds);
    let mut link = ScriptedLink::with_input(b"a");
    link.blocked = true;
    reactor.tick(&mut link, &mut leds);
    assert_eq!(reactor.mode(), TestMode::Throughput);
    assert!(link.out.is_empty());
    assert_eq!(link.lock_attempts, 1);
    assert!(leds.active);
}

#[test]
fn select_discards_trailing_input() {
    let mut reactor = Reactor::new(ReactorConfig::default());
    let mut leds = LogIndicators::default();
    let mut link = ScriptedLink::with_input(b"dxyz");
    reactor.tick(&mut link, &mut leds);
    assert_eq!(reactor.mode(), TestMode::Roundtrip);
    assert_eq!(link.pending_inbound(), 0);
    reactor.tick(&mut link, &mut leds);
    assert_eq!(link.out, b"d");
}

#[test]
fn unrecognized_resets_on_next_tick() {
    let mut reactor = Reactor::new(ReactorConfig::default());
    let mut leds = LogIndicators::default();
    reactor.init(&mut leds);
    let mut link = ScriptedLink::with_input(b"z");
    reactor.tick(&mut link, &mut leds);
    assert_eq!(reactor.mode(), TestMode::Unrecognized(b'z'));
    assert_eq!(link.out, b"z");

    link.rx.push_back(b'a');
    reactor.tick(&mut link, &mut leds);
    assert_eq!(reactor.mode(), TestMode::Uninitialized);
    // The reset tick does no selection work.
    assert_eq!(link.pending_inbound(), 1);

    reactor.tick(&mut link, &mut leds);
    assert_eq!(reactor.mode(), TestMode::Throughput);
}

#[test]
fn zero_byte_selects_uninitialized() {
    let mut reactor = Reactor::new(ReactorConfig::default());
    let mut leds = LogIndicators::default();
    reactor.init(&mut leds);
    let mut link = ScriptedLink::with_input(&[0x00]);
    reactor.tick(&mut link, &mut leds);
    assert_eq!(reactor.mode(), TestMode::Uninitialized);
    assert!(leds.active);
}

#[test]
fn reselection_ignored_while_active() {
    let (mut reactor, mut link, mut leds) = selected(TestMode::Throughput, BlockPolicy::Block);
    link.rx.push_back(b'b');
    for _ in 0..4 {
        reactor.tick(&mut link, &mut leds);
    }
    assert_eq!(reactor.mode(), TestMode::Throughput);
    assert_eq!(link.pending_inbound(), 1);
}

#[test]
fn throughput_sends_whole_string() {
    let (mut reactor, mut link, mut leds) = selected(TestMode::Throughput, BlockPolicy::Block);
    for _ in 0..3 {
        reactor.tick(&mut link, &mut leds);
    }
    assert_eq!(link.out, TEST_STR.repeat(3));

    link.out.clear();
    link.blocked = true;
    reactor.tick(&mut link, &mut leds);
    assert!(link.out.is_empty());
}

#[test]
fn prbs_advances_only_on_transmit() {
    let mut reactor = Reactor::with_prbs(
        ReactorConfig::default(),
        CountingPrbs {
            inner: Lfsr16::default(),
            advances: 0,
        },
    );
    let mut leds = LogIndicators::default();
    reactor.init(&mut leds);
    let mut link = ScriptedLink::with_input(b"b");
    reactor.tick(&mut link, &mut leds);
    link.out.clear();

    for i in 0..64 {
        link.refuse = (i % 3 == 0) as u32;
        reactor.tick(&mut link, &mut leds);
    }
    assert_eq!(reactor.prbs.advances, link.out.len());

    let mut expected = Lfsr16::default();
    let want: Vec<u8> = (0..link.out.len()).map(|_| expected.next_byte()).collect();
    assert_eq!(link.out, want);
}

#[test]
fn prbs_reseeded_on_entry() {
    let (mut reactor, mut link, mut leds) = selected(TestMode::BerPrbs, BlockPolicy::Block);
    for _ in 0..10 {
        reactor.tick(&mut link, &mut leds);
    }
    let first = link.out.clone();

    // Fall back to uninitialized through a bad tag, then select again.
    reactor.mode = TestMode::Unrecognized(b'?');
    reactor.tick(&mut link, &mut leds);
    link.rx.push_back(b'b');
    reactor.tick(&mut link, &mut leds);
    link.out.clear();
    for _ in 0..10 {
        reactor.tick(&mut link, &mut leds);
    }
    assert_eq!(link.out, first);
}

#[test]
fn raw_cycles_through_printables() {
    let (mut reactor, mut link, mut leds) = selected(TestMode::ThroughputRaw, BlockPolicy::Block);
    assert_eq!(reactor.persistence, b'0');
    for _ in 0..(TEST_STR.len() + 2) {
        reactor.tick(&mut link, &mut leds);
    }
    let mut want = TEST_STR.to_vec();
    want.extend_from_slice(b"01");
    assert_eq!(link.raw, want);
    // Raw path never touches the buffer.
    assert!(link.out.is_empty());
    assert_eq!(link.lock_attempts, 0);
}

#[test]
fn raw_waits_for_ready_within_tick() {
    let (mut reactor, mut link, mut leds) = selected(TestMode::ThroughputRaw, BlockPolicy::Block);
    link.raw_busy_polls.set(3);
    reactor.tick(&mut link, &mut leds);
    assert_eq!(link.raw, b"0");
    assert_eq!(link.raw_polls.get(), 4);
    assert_eq!(reactor.persistence, b'1');
}

#[test]
fn raw_failure_resends_same_byte() {
    let (mut reactor, mut link, mut leds) = selected(TestMode::ThroughputRaw, BlockPolicy::Block);
    reactor.tick(&mut link, &mut leds);
    link.raw_fail = 2;
    reactor.tick(&mut link, &mut leds);
    reactor.tick(&mut link, &mut leds);
    assert_eq!(reactor.persistence, b'1');
    assert_eq!(link.raw, b"0");
    reactor.tick(&mut link, &mut leds);
    reactor.tick(&mut link, &mut leds);
    assert_eq!(link.raw, b"012");
    assert_eq!(reactor.persistence, b'3');
}

#[test]
fn raw_resets_on_entry() {
    let (mut reactor, mut link, mut leds) = selected(TestMode::ThroughputRaw, BlockPolicy::Block);
    for _ in 0..5 {
        reactor.tick(&mut link, &mut leds);
    }
    assert_eq!(reactor.persistence, b'5');
    reactor.mode = TestMode::Uninitialized;
    link.rx.push_back(b'c');
    reactor.tick(&mut link, &mut leds);
    assert_eq!(reactor.persistence, b'0');
}

#[test]
fn roundtrip_echoes_in_order() {
    let input = b"glitch-free round trip";
    let (mut reactor, mut link, mut leds) = selected(TestMode::Roundtrip, BlockPolicy::Block);
    link.rx.extend(input.iter().copied());
    let mut ticks = 0;
    while link.pending_inbound() > 0 {
        // Every fourth echo has to wait for the lock.
        link.refuse = if ticks % 4 == 0 { 3 } else { 0 };
        reactor.tick(&mut link, &mut leds);
        ticks += 1;
    }
    assert_eq!(link.out, input);
    assert_eq!(ticks, input.len());

    let mut reads = 0;
    let mut writes = 0;
    for ev in &link.events {
        match ev {
            Event::Read(_) => reads += 1,
            Event::Wrote(_) => {
                writes += 1;
                assert!(writes <= reads, "echo sent before its byte was read");
            }
        }
    }
}

#[test]
fn roundtrip_idle_without_input() {
    let (mut reactor, mut link, mut leds) = selected(TestMode::Roundtrip, BlockPolicy::Block);
    reactor.tick(&mut link, &mut leds);
    assert!(link.out.is_empty());
    assert_eq!(link.lock_attempts, 0);
}

#[test]
fn chunked_echoes_whole_chunks() {
    let input: Vec<u8> = (0..3 * CHUNK_SIZE as u8).collect();
    let (mut reactor, mut link, mut leds) =
        selected(TestMode::RoundtripChunked, BlockPolicy::Block);
    link.rx.extend(input.iter().copied());
    link.refuse = 2;
    for _ in 0..3 {
        reactor.tick(&mut link, &mut leds);
    }
    assert_eq!(link.out, input);
}

#[test]
fn chunked_waits_for_full_chunk() {
    let (mut reactor, mut link, mut leds) =
        selected(TestMode::RoundtripChunked, BlockPolicy::Block);
    link.rx.extend([1, 2, 3, 4, 5, 6, 7]);
    reactor.tick(&mut link, &mut leds);
    reactor.tick(&mut link, &mut leds);
    assert_eq!(link.out, vec![1, 2, 3, 4, 5]);
    assert_eq!(link.pending_inbound(), 2);

    link.rx.extend([8, 9, 10]);
    reactor.tick(&mut link, &mut leds);
    assert_eq!(link.out, (1..=10).collect::<Vec<u8>>());
}

#[test]
fn best_effort_parks_echo() {
    let (mut reactor, mut link, mut leds) =
        selected(TestMode::Roundtrip, BlockPolicy::BestEffort);
    link.rx.extend(b"abc".iter().copied());
    link.blocked = true;
    for _ in 0..5 {
        reactor.tick(&mut link, &mut leds);
    }
    // First byte read and held; nothing else consumed.
    assert!(link.out.is_empty());
    assert_eq!(link.pending_inbound(), 2);

    link.blocked = false;
    for _ in 0..6 {
        reactor.tick(&mut link, &mut leds);
    }
    assert_eq!(link.out, b"abc");
}

#[test]
fn best_effort_chunked() {
    let (mut reactor, mut link, mut leds) =
        selected(TestMode::RoundtripChunked, BlockPolicy::BestEffort);
    link.rx.extend(0..10u8);
    link.blocked = true;
    reactor.tick(&mut link, &mut leds);
    reactor.tick(&mut link, &mut leds);
    assert_eq!(link.pending_inbound(), 5);
    link.blocked = false;
    for _ in 0..3 {
        reactor.tick(&mut link, &mut leds);
    }
    assert_eq!(link.out, (0..10u8).collect::<Vec<u8>>());
}
