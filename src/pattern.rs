/// Payload of the buffered throughput test. One lap of the raw cycle.
pub const TEST_STR: &[u8; 43] = b"0123456789:;<=>?@ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Bounds of the printable cycle used by the raw throughput test.
pub const RAW_FIRST: u8 = b'0';
pub const RAW_LAST: u8 = b'Z';

/// Bytes per transfer in the chunked roundtrip test.
pub const CHUNK_SIZE: usize = 5;

/// Successor of `b` in the raw cycle, wrapping 'Z' -> '0'.
pub fn next_raw(b: u8) -> u8 {
    if b == RAW_LAST { RAW_FIRST } else { b.wrapping_add(1) }
}

pub fn is_raw(b: u8) -> bool {
    (RAW_FIRST..=RAW_LAST).contains(&b)
}

/// Host-side roundtrip vector: byte i = (i + seq) % 256.
pub fn build_vector(seq: u64, len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i as u64 + seq) & 0xFF) as u8).collect()
}

/// Round `len` up to a whole number of chunks (at least one).
pub fn chunk_aligned(len: usize) -> usize {
    len.max(1).div_ceil(CHUNK_SIZE) * CHUNK_SIZE
}
