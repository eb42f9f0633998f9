//! Fractional-delay interpolation filter bank.
//!
//! Each kernel is a Hann-windowed sinc shifted by -i/N samples, giving N
//! evenly spaced interpolation points per sample period. The window is
//! parameterized over FILTER_LEN + 1 points so the first tap stays nonzero
//! and the last is zero, which keeps every tap useful as the kernels slide
//! in time.

use std::f64::consts::PI;

use super::{FILTER_LEN, N_FILTERS};

/// Precomputed filter coefficients, fixed for the process lifetime.
pub struct FilterBank {
    coeffs: [[f32; FILTER_LEN]; N_FILTERS],
}

impl FilterBank {
    pub fn new() -> Self {
        let mut coeffs = [[0.0f32; FILTER_LEN]; N_FILTERS];
        for (i, kernel) in coeffs.iter_mut().enumerate() {
            let frac = i as f64 / N_FILTERS as f64;
            for (j, tap) in kernel.iter_mut().enumerate() {
                let window =
                    0.5 * (1.0 - (2.0 * PI * ((j + 1) as f64 - frac) / FILTER_LEN as f64).cos());
                let x = PI * (j as f64 - (FILTER_LEN / 2 - 1) as f64 - frac);
                let sinc = if x == 0.0 { 1.0 } else { x.sin() / x };
                *tap = (sinc * window) as f32;
            }
        }
        Self { coeffs }
    }

    /// All kernels, one row per interpolation phase.
    #[inline]
    pub fn kernels(&self) -> &[[f32; FILTER_LEN]; N_FILTERS] {
        &self.coeffs
    }
}

impl Default for FilterBank {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernels_have_unit_dc_gain() {
        let bank = FilterBank::new();
        for kernel in bank.kernels() {
            let gain: f64 = kernel.iter().map(|&c| c as f64).sum();
            assert!((gain - 1.0).abs() < 1e-3, "dc gain {gain}");
            assert!(kernel.iter().all(|c| c.is_finite()));
        }
    }

    #[test]
    fn phase_zero_is_a_pure_delay() {
        // With zero fractional shift the sinc hits integer sample points, so
        // the kernel collapses to an impulse at FILTER_LEN / 2 - 1.
        let bank = FilterBank::new();
        let kernel = &bank.kernels()[0];
        for (j, &tap) in kernel.iter().enumerate() {
            if j == FILTER_LEN / 2 - 1 {
                assert!((tap - 1.0).abs() < 1e-6);
            } else {
                assert!(tap.abs() < 1e-6, "tap {j} = {tap}");
            }
        }
    }

    #[test]
    fn successive_phases_delay_by_quarter_samples() {
        // Interpolating a slow sinusoid with kernel i should reproduce the
        // signal sampled i/N of a sample later than the phase-0 output.
        let bank = FilterBank::new();
        let signal: Vec<f32> = (0..256)
            .map(|t| (2.0 * std::f32::consts::PI * t as f32 / 40.0).sin())
            .collect();

        let group_delay = (FILTER_LEN / 2 - 1) as f32;
        for (i, kernel) in bank.kernels().iter().enumerate() {
            let frac = i as f32 / N_FILTERS as f32;
            for j in 64..128 {
                let out: f32 = (0..FILTER_LEN).map(|k| signal[j + k] * kernel[k]).sum();
                let t = j as f32 + group_delay + frac;
                let expected = (2.0 * std::f32::consts::PI * t / 40.0).sin();
                assert!(
                    (out - expected).abs() < 1e-2,
                    "phase {i} sample {j}: {out} vs {expected}"
                );
            }
        }
    }
}
