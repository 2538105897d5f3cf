use crate::pattern::{TEST_STR, is_raw, next_raw};
use crate::prbs::{Lfsr16, Prbs};
use crate::reactor::TestMode;
use crate::stats::Stats;

/// Verifies a device-to-host stream as it arrives.
pub trait StreamCheck {
    fn feed(&mut self, bytes: &[u8], stats: &mut Stats);
}

/// Stream check for the streaming modes; `None` for the roundtrip ones.
pub fn for_mode(mode: TestMode, prbs_seed: u16) -> Option<Box<dyn StreamCheck>> {
    match mode {
        TestMode::Throughput => Some(Box::new(ThroughputCheck::default())),
        TestMode::BerPrbs => Some(Box::new(PrbsCheck::new(prbs_seed))),
        TestMode::ThroughputRaw => Some(Box::new(RawCheck::default())),
        _ => None,
    }
}

/// Expects back-to-back copies of the throughput string. One `ok` per
/// complete copy; a wrong byte counts `bad` and resyncs on the next '0'.
#[derive(Debug, Default)]
pub struct ThroughputCheck {
    pos: Option<usize>,
}

impl StreamCheck for ThroughputCheck {
    fn feed(&mut self, bytes: &[u8], stats: &mut Stats) {
        stats.add_bytes(bytes.len());
        for &b in bytes {
            self.pos = match self.pos {
                Some(p) if TEST_STR[p] == b => {
                    if p + 1 == TEST_STR.len() {
                        stats.inc_ok();
                        Some(0)
                    } else {
                        Some(p + 1)
                    }
                }
                Some(_) => {
                    stats.inc_bad();
                    (b == TEST_STR[0]).then_some(1)
                }
                None => (b == TEST_STR[0]).then_some(1),
            };
        }
    }
}

/// Runs its own generator from the same seed as the device; the first byte
/// after the echo is the first generator output.
#[derive(Debug)]
pub struct PrbsCheck {
    lfsr: Lfsr16,
}

impl PrbsCheck {
    pub fn new(seed: u16) -> Self {
        Self {
            lfsr: Lfsr16::new(seed),
        }
    }
}

impl StreamCheck for PrbsCheck {
    fn feed(&mut self, bytes: &[u8], stats: &mut Stats) {
        stats.add_bytes(bytes.len());
        for &b in bytes {
            let diff = (b ^ self.lfsr.next_byte()).count_ones();
            if diff == 0 {
                stats.inc_ok();
            } else {
                stats.inc_bad();
                stats.add_bit_errors(diff);
            }
        }
    }
}

/// Follows the '0'..'Z' cycle. A skip forward counts the skipped bytes as
/// lost and continues from the byte actually received.
#[derive(Debug, Default)]
pub struct RawCheck {
    expect: Option<u8>,
}

const RAW_LAP: u8 = TEST_STR.len() as u8;

impl StreamCheck for RawCheck {
    fn feed(&mut self, bytes: &[u8], stats: &mut Stats) {
        stats.add_bytes(bytes.len());
        for &b in bytes {
            if !is_raw(b) {
                stats.inc_bad();
                continue;
            }
            if let Some(e) = self.expect
                && e != b
            {
                let gap = (b + RAW_LAP - e) % RAW_LAP;
                stats.add_lost(gap as u64);
            } else {
                stats.inc_ok();
            }
            self.expect = Some(next_raw(b));
        }
    }
}

/// Compare one echoed vector with what was sent.
pub fn check_echo(sent: &[u8], got: &[u8], stats: &mut Stats) -> bool {
    stats.add_bytes(got.len());
    if sent == got {
        stats.inc_ok();
        return true;
    }
    stats.inc_bad();
    let errs: u32 = sent
        .iter()
        .zip(got)
        .map(|(a, b)| (a ^ b).count_ones())
        .sum();
    stats.add_bit_errors(errs);
    stats.add_lost(sent.len().saturating_sub(got.len()) as u64);
    false
}
