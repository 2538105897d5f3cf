use thiserror::Error;

/// Active test mode. The host byte that selected it is stored verbatim, so
/// bytes outside the known tags survive as `Unrecognized` until the next
/// dispatch resets them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TestMode {
    #[default]
    Uninitialized,
    Throughput,
    BerPrbs,
    ThroughputRaw,
    Roundtrip,
    RoundtripChunked,
    Unrecognized(u8),
}

impl TestMode {
    pub const ALL: [TestMode; 5] = [
        TestMode::Throughput,
        TestMode::BerPrbs,
        TestMode::ThroughputRaw,
        TestMode::Roundtrip,
        TestMode::RoundtripChunked,
    ];

    pub fn from_tag(tag: u8) -> Self {
        match tag {
            0x00 => TestMode::Uninitialized,
            b'a' => TestMode::Throughput,
            b'b' => TestMode::BerPrbs,
            b'c' => TestMode::ThroughputRaw,
            b'd' => TestMode::Roundtrip,
            b'e' => TestMode::RoundtripChunked,
            other => TestMode::Unrecognized(other),
        }
    }

    pub fn tag(self) -> u8 {
        match self {
            TestMode::Uninitialized => 0x00,
            TestMode::Throughput => b'a',
            TestMode::BerPrbs => b'b',
            TestMode::ThroughputRaw => b'c',
            TestMode::Roundtrip => b'd',
            TestMode::RoundtripChunked => b'e',
            TestMode::Unrecognized(b) => b,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TestMode::Uninitialized => "uninitialized",
            TestMode::Throughput => "throughput",
            TestMode::BerPrbs => "ber-prbs",
            TestMode::ThroughputRaw => "throughput-raw",
            TestMode::Roundtrip => "roundtrip",
            TestMode::RoundtripChunked => "roundtrip-chunked",
            TestMode::Unrecognized(_) => "unrecognized",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown test mode: {0}")]
pub struct ModeParseError(pub String);

impl std::str::FromStr for TestMode {
    type Err = ModeParseError;

    /// Accepts a mode name or its single-letter tag.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let [tag] = s.as_bytes()
            && let mode @ (TestMode::Throughput
            | TestMode::BerPrbs
            | TestMode::ThroughputRaw
            | TestMode::Roundtrip
            | TestMode::RoundtripChunked) = TestMode::from_tag(*tag)
        {
            return Ok(mode);
        }
        TestMode::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ModeParseError(s.to_string()))
    }
}
