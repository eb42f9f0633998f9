//! Decoded message value and its output line format.

use std::fmt;

use crate::sdr::N_FILTERS;

/// Payload bytes of a long message with the CRC stripped: (112 - 24) / 8.
pub const PAYLOAD_BYTES_MAX: usize = 11;

/// One successfully decoded squitter, ready for the output stream.
///
/// The line format is `NNNNNNNNNNNNNN.PP: 0xAAAAAA, 0xHH..HH;` — a 14-digit
/// sample timestamp of the first payload sample, the interpolation phase as a
/// percentage of the sample period, the ICAO address and the payload hex
/// (22 digits long, 8 short; the CRC is not printed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedMessage {
    /// Absolute sample index of the first payload sample.
    pub timestamp: u64,
    /// Fractional-delay filter the message was demodulated with.
    pub phase: usize,
    /// Transmitting aircraft address, from the message or from the CRC.
    pub icao: u32,
    payload: [u8; PAYLOAD_BYTES_MAX],
    payload_len: usize,
}

impl DecodedMessage {
    pub fn new(
        timestamp: u64,
        phase: usize,
        icao: u32,
        payload: [u8; PAYLOAD_BYTES_MAX],
        payload_len: usize,
    ) -> Self {
        Self {
            timestamp,
            phase,
            icao,
            payload,
            payload_len,
        }
    }

    /// Message body with the CRC stripped.
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_len]
    }
}

impl fmt::Display for DecodedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:014}.{:02}: 0x{:06x}, 0x{};",
            self.timestamp,
            100 * self.phase / N_FILTERS,
            self.icao,
            hex::encode(self.payload())
        )
    }
}
