use std::time::Instant;

use tracing::info;

#[derive(Debug, Clone)]
pub struct Stats {
    /// Units that verified: string laps, PRBS bytes, raw bytes or echoed vectors.
    pub ok: u64,
    pub bad: u64,
    pub lost: u64,
    pub bit_errors: u64,
    pub bytes: u64,
    pub total_bytes: u64,
    pub bpb: u32,
    pub duration_micros: u64,
    start: Instant,
    t0: Instant,
    last: Instant,
}

impl Stats {
    pub fn new(bpb: u32) -> Self {
        let now = Instant::now();
        Self {
            ok: 0,
            bad: 0,
            lost: 0,
            bit_errors: 0,
            bytes: 0,
            total_bytes: 0,
            bpb,
            duration_micros: 0,
            start: now,
            t0: now,
            last: now,
        }
    }
    pub fn add_bytes(&mut self, n: usize) {
        self.bytes += n as u64;
        self.total_bytes += n as u64;
    }
    pub fn inc_ok(&mut self) {
        self.ok += 1;
    }
    pub fn inc_bad(&mut self) {
        self.bad += 1;
    }
    pub fn add_lost(&mut self, n: u64) {
        self.lost += n;
    }
    pub fn add_bit_errors(&mut self, n: u32) {
        self.bit_errors += n as u64;
    }

    pub fn pass(&self) -> bool {
        self.ok > 0 && self.bad == 0 && self.lost == 0 && self.bit_errors == 0
    }

    /// Bit error ratio over everything received so far.
    pub fn ber(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.bit_errors as f64 / (self.total_bytes as f64 * 8.0)
    }

    pub fn finish(&mut self) {
        self.duration_micros = self.start.elapsed().as_micros() as u64;
    }

    pub fn maybe_print(&mut self, stats_int: f64) {
        if self.last.elapsed().as_secs_f64() >= stats_int {
            let dur = self.t0.elapsed().as_secs_f64().max(1e-3);
            let bps_bytes = (self.bytes as f64) / dur;
            let bps_bits = bps_bytes * (self.bpb as f64);
            info!(
                "ok={} bad={} lost={} bit_err={} bytes={} over {:.1}s => {:.1}kB/s (~{:.0} bps, bpb={})",
                self.ok,
                self.bad,
                self.lost,
                self.bit_errors,
                self.bytes,
                dur,
                bps_bytes / 1000.0,
                bps_bits,
                self.bpb
            );
            self.last = Instant::now();
            self.t0 = Instant::now();
            self.bytes = 0;
        }
    }

    pub fn report(&self, label: &str) {
        let dur = (self.duration_micros as f64 / 1e6).max(1e-3);
        info!(
            "[{}] {} ok={} bad={} lost={} bit_err={} ber={:.3e} bytes={} over {:.1}s ({:.1}kB/s)",
            label,
            if self.pass() { "PASS" } else { "FAIL" },
            self.ok,
            self.bad,
            self.lost,
            self.bit_errors,
            self.ber(),
            self.total_bytes,
            dur,
            self.total_bytes as f64 / dur / 1000.0,
        );
    }
}
