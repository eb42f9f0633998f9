//! Configuration loaded from environment variables

/// Receiver tuning knobs. The structural constants (filter count, block
/// size, registry capacity) are compile-time parameters in their modules;
/// everything here can be changed per run without rebuilding.
#[derive(Debug, Clone)]
pub struct Config {
    /// RTL-SDR device index
    pub device_index: u32,

    /// Correlation peak threshold required for a decode attempt. Zero means
    /// the mark energy merely has to match the space energy, a poor SNR.
    pub detect_threshold: f32,

    /// Attempt single-bit fixes on messages whose CRC is XORed with the
    /// aircraft address. Computationally more intensive.
    pub fix_xored_crcs: bool,

    /// Attempt double-bit fixes on plain-CRC messages. Quite intensive.
    pub fix_two_bit_errors: bool,

    /// Verbose per-decode notes on the diagnostic stream.
    pub debug: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            device_index: std::env::var("DEVICE_INDEX")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),

            detect_threshold: std::env::var("DETECT_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0.0),

            fix_xored_crcs: env_flag("FIX_XORED_CRCS"),

            fix_two_bit_errors: env_flag("FIX_2_BIT_ERRORS"),

            debug: env_flag("DEBUG"),
        }
    }
}

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}
