/// Pseudo-random byte source consumed by the BER test.
pub trait Prbs {
    /// Reset to the configured seed.
    fn seed(&mut self);
    /// Advance by one byte.
    fn next_byte(&mut self) -> u8;
}

pub const LFSR16_DEFAULT_SEED: u16 = 0xACE1;
const LFSR16_TAPS: u16 = 0xB400; // x^16 + x^14 + x^13 + x^11 + 1

/// 16-bit Galois LFSR, period 65535.
#[derive(Debug, Clone)]
pub struct Lfsr16 {
    seed: u16,
    state: u16,
}

impl Lfsr16 {
    pub fn new(seed: u16) -> Self {
        // An all-zero register never leaves zero.
        let seed = if seed == 0 { LFSR16_DEFAULT_SEED } else { seed };
        Self { seed, state: seed }
    }

    fn next_bit(&mut self) -> u8 {
        let out = (self.state & 1) as u8;
        self.state >>= 1;
        if out != 0 {
            self.state ^= LFSR16_TAPS;
        }
        out
    }
}

impl Default for Lfsr16 {
    fn default() -> Self {
        Self::new(LFSR16_DEFAULT_SEED)
    }
}

impl Prbs for Lfsr16 {
    fn seed(&mut self) {
        self.state = self.seed;
    }

    fn next_byte(&mut self) -> u8 {
        (0..8).fold(0u8, |acc, _| (acc << 1) | self.next_bit())
    }
}
