use anyhow::anyhow;
use clap::{Args, Parser, Subcommand};
use std::time::Duration;

use crate::prbs::LFSR16_DEFAULT_SEED;
use crate::reactor::{BlockPolicy, ReactorConfig, TestMode};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "serial-test",
    about = "Serial link test harness: device-side test reactor and host-side checks"
)]
pub struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(long, global = true, default_value_t = false)]
    pub debug: bool,
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Cmd {
    /// Run the test reactor on a serial port (device side)
    Device(DeviceOpts),
    /// Select a mode on a device and verify what comes back
    Host(HostOpts),
    /// Run reactor and checks in-process over a loopback link
    Sim(SimOpts),
}

#[derive(Args, Debug, Clone)]
pub struct SerialOpts {
    /// Serial device path
    #[arg(long, default_value = "/dev/ttyS0")]
    pub dev: String,
    /// Baud rate
    #[arg(long, default_value_t = 115_200)]
    pub baud: u32,
    /// Enable RTS/CTS
    #[arg(long, default_value_t = false)]
    pub rtscts: bool,
    /// Read timeout in milliseconds
    #[arg(long, default_value_t = 100)]
    pub timeout_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ReactorOpts {
    /// Roundtrip modes hold the echo and retry on later ticks instead of
    /// spinning on the transmit lock
    #[arg(long, default_value_t = false)]
    pub best_effort: bool,
    /// PRBS seed (decimal or 0x-prefixed hex)
    #[arg(long, default_value_t = LFSR16_DEFAULT_SEED, value_parser = parse_seed)]
    pub prbs_seed: u16,
}

impl ReactorOpts {
    pub fn config(&self) -> ReactorConfig {
        ReactorConfig {
            roundtrip_policy: if self.best_effort {
                BlockPolicy::BestEffort
            } else {
                BlockPolicy::Block
            },
            prbs_seed: self.prbs_seed,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct DeviceOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    #[command(flatten)]
    pub reactor: ReactorOpts,
    /// Delay between bring-up and the first tick, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub settle_ms: u64,
    /// Stop after this many ticks (runs forever by default)
    #[arg(long)]
    pub max_ticks: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct HostOpts {
    #[command(flatten)]
    pub ser: SerialOpts,
    /// Test mode: name (throughput, ber-prbs, throughput-raw, roundtrip,
    /// roundtrip-chunked) or tag letter a-e
    #[arg(long)]
    pub mode: TestMode,
    /// PRBS seed the device was started with
    #[arg(long, default_value_t = LFSR16_DEFAULT_SEED, value_parser = parse_seed)]
    pub prbs_seed: u16,
    /// Test duration in milliseconds
    #[arg(long, default_value_t = 5_000)]
    pub duration_ms: u64,
    /// How long to wait for the mode echo, in milliseconds
    #[arg(long, default_value_t = 1_000)]
    pub echo_timeout_ms: u64,
    /// Roundtrip vector size in bytes (rounded up to whole chunks when chunked)
    #[arg(long, default_value_t = 64)]
    pub len: usize,
    /// "max" or milliseconds gap (e.g. 0, 5, 10) or "auto"
    #[arg(long, default_value = "max")]
    pub gap: String,
    /// Bits per byte for pacing math and rate reports
    #[arg(long, default_value_t = 10)]
    pub bpb: u32,
    /// Utilization (0.0..1.0) when gap="auto" (1.0 = line-rate)
    #[arg(long, default_value_t = 1.0)]
    pub util: f64,
    /// Stats print interval in seconds
    #[arg(long, default_value_t = 1.0)]
    pub stats: f64,
}

#[derive(Args, Debug, Clone)]
pub struct SimOpts {
    /// Test mode: name or tag letter a-e
    #[arg(long)]
    pub mode: TestMode,
    #[command(flatten)]
    pub reactor: ReactorOpts,
    /// Reactor ticks to run
    #[arg(long, default_value_t = 10_000)]
    pub ticks: u64,
    /// Roundtrip vector size in bytes
    #[arg(long, default_value_t = 64)]
    pub len: usize,
    /// Bytes moved per emulated transmit interrupt
    #[arg(long, default_value_t = 16)]
    pub burst: usize,
}

fn parse_seed(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("bad seed {s:?}: {e}"))
}

/// Typed pacing model for host-side roundtrip writes.
#[derive(Debug, Clone, Copy)]
pub enum Pacing {
    Max,
    Fixed(Duration),
    Auto { util: f64 },
}

impl Pacing {
    pub fn from_cli(gap: &str, util: f64) -> anyhow::Result<Self> {
        if gap.eq_ignore_ascii_case("max") {
            Ok(Pacing::Max)
        } else if gap.eq_ignore_ascii_case("auto") {
            Ok(Pacing::Auto { util })
        } else {
            let ms: u64 = gap
                .parse()
                .map_err(|_| anyhow!("gap must be integer ms, 'auto', or 'max'"))?;
            Ok(Pacing::Fixed(Duration::from_millis(ms)))
        }
    }
    /// Compute sleep time to achieve desired pacing given a write of `bytes`.
    pub fn sleep_for(self, bytes: usize, bpb: u32, baud: u32) -> Option<Duration> {
        match self {
            Pacing::Max => None,
            Pacing::Fixed(d) => Some(d),
            Pacing::Auto { util } => {
                let util = util.max(1e-3); // avoid div by 0
                let bit_time_s = (bytes as f64) * (bpb as f64) / (baud as f64);
                let target_s = bit_time_s / util;
                Some(Duration::from_micros((target_s * 1_000_000.0) as u64))
            }
        }
    }
}
