//! In-process run of the reactor against [`SimLink`], checked with the same
//! host-side checks used on real hardware.

use anyhow::{Result, bail};
use tracing::{debug, info, warn};

use crate::cli::SimOpts;
use crate::host::check::{self, check_echo};
use crate::indicator::LogIndicators;
use crate::link::Link;
use crate::link::sim::SimLink;
use crate::pattern::{build_vector, chunk_aligned};
use crate::reactor::{Reactor, ReactorConfig, TestMode};
use crate::stats::Stats;

/// Ticks granted after a roundtrip vector is consumed, for parked echoes.
const SETTLE_TICKS: u32 = 2;

pub fn run(opts: SimOpts) -> Result<()> {
    let config = opts.reactor.config();
    info!(
        "sim: mode={} ticks={} policy={:?} burst={}",
        opts.mode.name(),
        opts.ticks,
        config.roundtrip_policy,
        opts.burst
    );
    let stats = run_sim(opts.mode, config, opts.ticks, opts.len, opts.burst);
    stats.report(opts.mode.name());
    if !stats.pass() {
        bail!("{} sim failed", opts.mode.name());
    }
    Ok(())
}

pub fn run_sim(
    mode: TestMode,
    config: ReactorConfig,
    ticks: u64,
    len: usize,
    burst: usize,
) -> Stats {
    let mut link = SimLink::new(burst);
    let mut leds = LogIndicators::default();
    let mut reactor = Reactor::new(config);
    reactor.init(&mut leds);

    link.inject(&[mode.tag()]);
    reactor.tick(&mut link, &mut leds);
    link.flush();
    if link.take_wire() != [mode.tag()] {
        warn!(tag = mode.tag(), "no mode echo");
    }

    let mut stats = Stats::new(10);
    match check::for_mode(mode, config.prbs_seed) {
        Some(mut checker) => {
            for _ in 0..ticks {
                reactor.tick(&mut link, &mut leds);
                link.drain();
                checker.feed(&link.take_wire(), &mut stats);
            }
            link.flush();
            checker.feed(&link.take_wire(), &mut stats);
        }
        None => {
            let len = match mode {
                TestMode::RoundtripChunked => chunk_aligned(len),
                _ => len.max(1),
            };
            let mut seq: u64 = 0;
            while reactor.ticks() < ticks {
                let vector = build_vector(seq, len);
                link.inject(&vector);
                while link.pending_inbound() > 0 {
                    reactor.tick(&mut link, &mut leds);
                    link.drain();
                }
                for _ in 0..SETTLE_TICKS {
                    reactor.tick(&mut link, &mut leds);
                }
                link.flush();
                check_echo(&vector, &link.take_wire(), &mut stats);
                seq = seq.wrapping_add(1);
            }
        }
    }
    stats.finish();
    debug!(
        ticks = reactor.ticks(),
        refused_locks = link.refused_locks(),
        "sim done"
    );
    stats
}
