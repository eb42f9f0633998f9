//! Software-defined Mode S receiver front end.
//!
//! The signal path per processing block:
//! 1. Offset-binary IQ bytes arrive from the hardware callback or a dump
//!    file and are converted to floats into the shared sample slot.
//! 2. A bank of fractional-delay filters interpolates the block at sub-sample
//!    offsets and squares the magnitudes.
//! 3. A 16-tap matched correlator scores the Mode S preamble pattern on every
//!    phase at every sample.
//! 4. Above-threshold correlation runs are reduced to one candidate each and
//!    handed to the PPM demodulator, then to CRC checking and correction.

pub mod filter;
pub mod pipeline;
pub mod slot;
pub mod source;

pub use pipeline::{run_worker, Pipeline};
pub use slot::{BlockSlot, SampleBlock};
pub use source::SampleSource;

/// Mode S downlink carrier frequency.
pub const MODE_S_FREQ: u32 = 1_090_000_000;
/// Sample rate required for Mode S timing (2 samples per microsecond).
pub const MODE_S_RATE: u32 = 2_000_000;

/// Number of fractional-delay filters (interpolated points per sample
/// period).
pub const N_FILTERS: usize = 4;
/// Taps per fractional-delay filter. Power of two.
pub const FILTER_LEN: usize = 32;
/// Samples processed per block; one hardware callback delivers exactly this
/// many IQ pairs. A multiple of 256 keeps the driver buffers a multiple of
/// 512 bytes.
pub const BLOCK_SAMPLES: usize = 256 * 1024;
/// Length of the Mode S preamble in samples.
pub const PREAMBLE_SAMPLES: usize = 16;
/// PPM half-bit slots per message bit.
pub const SAMPLES_PER_BIT: usize = 2;
