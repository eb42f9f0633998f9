//! Block processing: interpolation, preamble correlation, peak selection and
//! PPM demodulation.
//!
//! At 2 Msps there are only two samples per bit, not enough to pin the
//! preamble edges, so every block is interpolated at N_FILTERS sub-sample
//! phases and all phases are searched in parallel. Squared magnitudes are
//! used throughout; they are sufficient for both correlation and PPM
//! demodulation and avoid the square root. The inner loops are written as
//! straight-line passes over contiguous buffers so the autovectorizer can
//! keep up with the sample rate.

use std::sync::Arc;

use crossbeam_channel::Sender;
use tracing::debug;

use crate::config::Config;
use crate::modes::decoder::CorrectionPolicy;
use crate::modes::{Decode, DecodedMessage, Decoder, HardBits, LONG_MSG_BITS};

use super::filter::FilterBank;
use super::slot::{BlockSlot, SampleBlock};
use super::{BLOCK_SAMPLES, FILTER_LEN, N_FILTERS, PREAMBLE_SAMPLES, SAMPLES_PER_BIT};

/// Row stride of the interpolated magnitude matrix. The PREAMBLE_SAMPLES
/// padding keeps the correlator window in bounds at the block edge.
const INTERP_ROW: usize = BLOCK_SAMPLES + PREAMBLE_SAMPLES;

/// Floor for the correlator denominator. The all-ones buffer padding already
/// guarantees non-zero tail energy; the clamp additionally covers an
/// all-zero signal window, which must never score above threshold.
const MIN_WINDOW_ENERGY: f32 = 1e-10;

/// Everything the worker owns: filter bank, work matrices, demodulation
/// buffers and the message decoder with its address registry.
pub struct Pipeline {
    filters: FilterBank,
    /// N_FILTERS rows of squared interpolated magnitudes, padded tail held
    /// at the non-zero sentinel.
    interp: Box<[f32]>,
    /// N_FILTERS rows of normalized preamble correlation scores.
    detect: Box<[f32]>,
    soft: [f32; LONG_MSG_BITS],
    hard: HardBits,
    decoder: Decoder,
    detect_threshold: f32,
}

impl Pipeline {
    pub fn new(config: &Config) -> Self {
        Self {
            filters: FilterBank::new(),
            interp: vec![1.0; N_FILTERS * INTERP_ROW].into_boxed_slice(),
            detect: vec![0.0; N_FILTERS * BLOCK_SAMPLES].into_boxed_slice(),
            soft: [0.0; LONG_MSG_BITS],
            hard: [0; LONG_MSG_BITS],
            decoder: Decoder::new(CorrectionPolicy {
                fix_xored_crcs: config.fix_xored_crcs,
                fix_two_bit_errors: config.fix_two_bit_errors,
            }),
            detect_threshold: config.detect_threshold,
        }
    }

    /// Process one block end to end, passing every decoded message to
    /// `emit` in chronological order.
    pub fn process_block(&mut self, block: &SampleBlock, emit: &mut dyn FnMut(DecodedMessage)) {
        self.interpolate(block);
        self.correlate();

        let detect = std::mem::take(&mut self.detect);
        let thresh = self.detect_threshold;
        select_peaks(&detect, thresh, &mut |phase, start| {
            self.demod_decode(phase, start, block.index, emit)
        });
        self.detect = detect;
    }

    /// Apply each fractional-delay kernel along the block and store the
    /// squared magnitude of every interpolated sample.
    fn interpolate(&mut self, block: &SampleBlock) {
        for (kernel, row) in self
            .filters
            .kernels()
            .iter()
            .zip(self.interp.chunks_exact_mut(INTERP_ROW))
        {
            for j in 0..BLOCK_SAMPLES {
                let mut acc_re = 0.0f32;
                let mut acc_im = 0.0f32;
                for k in 0..FILTER_LEN {
                    acc_re += block.re[j + k] * kernel[k];
                    acc_im += block.im[j + k] * kernel[k];
                }
                row[j] = acc_re * acc_re + acc_im * acc_im;
            }
        }
    }

    /// Matched correlation against the preamble pattern -_-____-_-______
    /// (marks at offsets 0, 2, 7 and 9). The score is the mark energy minus
    /// the space energy, normalized by the total energy of the sixteen
    /// samples so the detection threshold is independent of signal strength.
    fn correlate(&mut self) {
        for (mag, scores) in self
            .interp
            .chunks_exact(INTERP_ROW)
            .zip(self.detect.chunks_exact_mut(BLOCK_SAMPLES))
        {
            for j in 0..BLOCK_SAMPLES {
                let w = &mag[j..j + PREAMBLE_SAMPLES];
                let marks = w[0] + w[2] + w[7] + w[9];
                let total: f32 = w.iter().sum();
                let spaces = total - marks;
                scores[j] = (marks - spaces) / total.max(MIN_WINDOW_ENERGY);
            }
        }
    }

    /// Demodulate a candidate at (phase, start) and run the CRC decision.
    /// Returns the number of samples consumed by a decoded message, 0 when
    /// nothing decodable was found.
    fn demod_decode(
        &mut self,
        phase: usize,
        start: usize,
        block_index: u64,
        emit: &mut dyn FnMut(DecodedMessage),
    ) -> usize {
        let data_start = start + PREAMBLE_SAMPLES;
        let mag =
            &self.interp[phase * INTERP_ROW + data_start..][..LONG_MSG_BITS * SAMPLES_PER_BIT];

        // Soft and hard decisions for all 112 bits unconditionally; the
        // message length is decided downstream from the first hard bit. The
        // soft values are kept for confidence-ordered correction later.
        for k in 0..LONG_MSG_BITS {
            let early = mag[2 * k];
            let late = mag[2 * k + 1];
            self.soft[k] = 0.5 + 0.5 * (early - late) / (early + late);
        }
        for k in 0..LONG_MSG_BITS {
            self.hard[k] = (self.soft[k] > 0.5) as u8;
        }

        match self.decoder.decode(&mut self.hard) {
            Decode::Message {
                icao,
                payload,
                payload_len,
                bits,
            } => {
                emit(DecodedMessage::new(
                    block_index * BLOCK_SAMPLES as u64 + data_start as u64,
                    phase,
                    icao,
                    payload,
                    payload_len,
                ));
                bits * SAMPLES_PER_BIT
            }
            Decode::InvalidAddress { bits } => bits * SAMPLES_PER_BIT,
            Decode::Failed => 0,
        }
    }
}

/// Walk the correlation matrix in chronological order (outer loop over
/// sample index, inner over phase) and reduce every above-threshold run to
/// one decode attempt at its maximum. The first maximum encountered wins
/// ties. A candidate too close to the block edge to hold a long message is
/// dropped rather than decoded across blocks. When an attempt consumes
/// samples the walk jumps past them, suppressing overlapping candidates.
fn select_peaks(detect: &[f32], thresh: f32, attempt: &mut dyn FnMut(usize, usize) -> usize) {
    let mut max_score = thresh - 1.0;
    let mut max_phase = 0usize;
    let mut max_start = 0usize;

    let mut j = 0;
    while j < BLOCK_SAMPLES {
        for i in 0..N_FILTERS {
            let score = detect[i * BLOCK_SAMPLES + j];
            if score > thresh {
                if score > max_score {
                    max_score = score;
                    max_phase = i;
                    max_start = j;
                }
            } else if max_score > thresh {
                if BLOCK_SAMPLES - max_start >= LONG_MSG_BITS * SAMPLES_PER_BIT {
                    j += attempt(max_phase, max_start);
                }
                max_score = thresh - 1.0;
                break;
            }
        }
        j += 1;
    }
}

/// Worker thread body: process blocks from the slot until shutdown, sending
/// decoded messages to the output channel.
pub fn run_worker(slot: Arc<BlockSlot>, mut pipeline: Pipeline, messages: Sender<DecodedMessage>) {
    while let Some(block) = slot.wait_fresh() {
        pipeline.process_block(&block, &mut |msg| {
            // A closed channel means the printer is gone and we are exiting.
            let _ = messages.send(msg);
        });
    }
    debug!("sample worker exiting");
}
