//! Device side entry loop: bring-up once, then tick the reactor.

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::cli::DeviceOpts;
use crate::indicator::{Indicators, LogIndicators};
use crate::link::Link;
use crate::link::serial::SerialLink;
use crate::port::open_port;
use crate::prbs::Prbs;
use crate::reactor::Reactor;

pub fn run(opts: DeviceOpts) -> Result<()> {
    let config = opts.reactor.config();
    info!(
        "device: dev={} baud={} rtscts={} policy={:?} prbs_seed={:#06x}",
        opts.ser.dev, opts.ser.baud, opts.ser.rtscts, config.roundtrip_policy, config.prbs_seed
    );

    let port = open_port(&opts.ser)?;
    let mut link = SerialLink::new(port).context("starting serial link")?;
    let mut leds = LogIndicators::default();
    let mut reactor = Reactor::new(config);
    reactor.init(&mut leds);

    std::thread::sleep(Duration::from_millis(opts.settle_ms));
    info!("reactor running, waiting for mode tag");

    run_loop(&mut reactor, &mut link, &mut leds, opts.max_ticks);

    info!(
        ticks = reactor.ticks(),
        mode = reactor.mode().name(),
        rx_overruns = link.rx_overruns(),
        "reactor stopped"
    );
    Ok(())
}

/// Tick until `max_ticks` (forever when `None`).
pub fn run_loop<P: Prbs, L: Link, I: Indicators>(
    reactor: &mut Reactor<P>,
    link: &mut L,
    leds: &mut I,
    max_ticks: Option<u64>,
) {
    loop {
        if let Some(max) = max_ticks
            && reactor.ticks() >= max
        {
            break;
        }
        reactor.tick(link, leds);
    }
}
