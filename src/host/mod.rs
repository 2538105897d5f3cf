//! Host side: pick a mode on the device, then verify what it sends back.

use std::io::ErrorKind;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use serialport::{ClearBuffer, SerialPort};
use tracing::{debug, info, warn};

use crate::cli::{HostOpts, Pacing};
use crate::pattern::{build_vector, chunk_aligned};
use crate::port::open_port;
use crate::reactor::TestMode;
use crate::stats::Stats;

pub mod check;

use check::{StreamCheck, check_echo};

pub fn run(opts: HostOpts) -> Result<()> {
    info!(
        "host: dev={} baud={} mode={} duration_ms={} rtscts={}",
        opts.ser.dev,
        opts.ser.baud,
        opts.mode.name(),
        opts.duration_ms,
        opts.ser.rtscts
    );
    let mut port = open_port(&opts.ser)?;
    port.clear(ClearBuffer::All).context("clearing port buffers")?;

    select_mode(
        &mut *port,
        opts.mode,
        Duration::from_millis(opts.echo_timeout_ms),
    )?;

    let mut stats = Stats::new(opts.bpb);
    match check::for_mode(opts.mode, opts.prbs_seed) {
        Some(mut check) => stream(&mut *port, check.as_mut(), &opts, &mut stats)?,
        None => roundtrip(&mut *port, &opts, &mut stats)?,
    }
    stats.finish();
    stats.report(opts.mode.name());

    if !stats.pass() {
        bail!("{} test failed", opts.mode.name());
    }
    Ok(())
}

/// Send the mode tag and wait for the echo. The device only echoes when its
/// transmit lock is free, so a missing echo is not fatal.
pub fn select_mode(port: &mut dyn SerialPort, mode: TestMode, timeout: Duration) -> Result<bool> {
    let tag = mode.tag();
    port.write_all(&[tag]).context("sending mode tag")?;

    let start = Instant::now();
    let mut b = [0u8; 1];
    while start.elapsed() < timeout {
        match port.read(&mut b) {
            Ok(1) if b[0] == tag => {
                debug!(tag, "mode echo received");
                return Ok(true);
            }
            Ok(1) => debug!(byte = b[0], "discarding byte before echo"),
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::TimedOut => {}
            Err(e) => return Err(e).context("waiting for mode echo"),
        }
    }
    warn!(tag, "no echo for mode tag; is the device uninitialized?");
    Ok(false)
}

fn stream(
    port: &mut dyn SerialPort,
    check: &mut dyn StreamCheck,
    opts: &HostOpts,
    stats: &mut Stats,
) -> Result<()> {
    let duration = Duration::from_millis(opts.duration_ms);
    let start = Instant::now();
    let mut buf = [0u8; 1024];

    while start.elapsed() < duration {
        match port.read(&mut buf) {
            Ok(n) => check.feed(&buf[..n], stats),
            Err(e) if e.kind() == ErrorKind::TimedOut => {}
            Err(e) => return Err(e).context("serial read"),
        }
        stats.maybe_print(opts.stats);
    }
    Ok(())
}

fn roundtrip(port: &mut dyn SerialPort, opts: &HostOpts, stats: &mut Stats) -> Result<()> {
    let len = match opts.mode {
        TestMode::RoundtripChunked => chunk_aligned(opts.len),
        _ => opts.len.max(1),
    };
    let pacing = Pacing::from_cli(&opts.gap, opts.util)?;
    let echo_timeout = Duration::from_millis(opts.echo_timeout_ms);
    let duration = Duration::from_millis(opts.duration_ms);
    let start = Instant::now();
    let mut got = Vec::with_capacity(len);
    let mut seq: u64 = 0;

    while start.elapsed() < duration {
        let vector = build_vector(seq, len);
        port.write_all(&vector).context("serial write")?;

        got.clear();
        read_echo(port, &mut got, len, echo_timeout)?;
        if !check_echo(&vector, &got, stats) {
            debug!(seq, sent = len, got = got.len(), "echo mismatch");
        }

        if let Some(sleep) = pacing.sleep_for(len, opts.bpb, opts.ser.baud) {
            std::thread::sleep(sleep);
        }
        seq = seq.wrapping_add(1);
        stats.maybe_print(opts.stats);
    }
    Ok(())
}

fn read_echo(
    port: &mut dyn SerialPort,
    got: &mut Vec<u8>,
    len: usize,
    timeout: Duration,
) -> Result<()> {
    let start = Instant::now();
    let mut buf = [0u8; 256];
    while got.len() < len && start.elapsed() < timeout {
        let want = (len - got.len()).min(buf.len());
        match port.read(&mut buf[..want]) {
            Ok(n) => got.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::TimedOut => {}
            Err(e) => return Err(e).context("reading echo"),
        }
    }
    Ok(())
}
