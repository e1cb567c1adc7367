//! Discrete-Fourier-transform helpers for oscillation analysis.
//!
//! The measurement modulates the count rate with a known number of full
//! oscillations per foil cycle, so all spectral work happens on a single
//! known-frequency bin (plus the DC bin carrying the offset). The
//! analyzer pre-plans forward and inverse transforms once per series
//! length and reuses them across calls.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use crate::{Error, Result};
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::Arc;

/// How a phase shift is applied to a channel series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShiftMethod {
    /// Reconstruct only the offset and the known-frequency component,
    /// discarding every other harmonic.
    SineOnly,
    /// Rotate every harmonic proportionally (a uniform time shift),
    /// keeping the full waveform.
    #[default]
    ZeroOrder,
}

/// Wraps an angle into `[0, 2*pi)`.
#[must_use]
pub fn wrap_phase(phi: f64) -> f64 {
    let wrapped = phi % (2.0 * PI);
    if wrapped < 0.0 {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

/// Single-bin DFT coefficient `sum_i data[i] * exp(-2*pi*i*bin*i/N)`.
///
/// Cheaper than a full transform when only the oscillation bin is
/// needed, e.g. for fit seeding.
#[must_use]
pub fn dft_coefficient(bin: usize, data: &[f64]) -> Complex<f64> {
    let n = data.len() as f64;
    data.iter()
        .enumerate()
        .map(|(i, &v)| {
            let angle = -2.0 * PI * bin as f64 * i as f64 / n;
            Complex::new(v * angle.cos(), v * angle.sin())
        })
        .sum()
}

/// Pre-planned forward/inverse DFT pair over a fixed series length.
pub struct SpectralAnalyzer {
    len: usize,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl SpectralAnalyzer {
    /// Plans both transform directions for series of `len` samples.
    #[must_use]
    pub fn new(len: usize) -> Self {
        let mut planner = FftPlanner::new();
        let forward = planner.plan_fft_forward(len);
        let inverse = planner.plan_fft_inverse(len);
        Self {
            len,
            forward,
            inverse,
        }
    }

    /// Planned series length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for the degenerate zero-length analyzer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// In-place forward transform.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] for a buffer of the wrong size.
    pub fn transform(&self, buffer: &mut [Complex<f64>]) -> Result<()> {
        self.check_len(buffer.len())?;
        self.forward.process(buffer);
        Ok(())
    }

    /// In-place inverse transform (unnormalized, like the forward one).
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] for a buffer of the wrong size.
    pub fn inverse_transform(&self, buffer: &mut [Complex<f64>]) -> Result<()> {
        self.check_len(buffer.len())?;
        self.inverse.process(buffer);
        Ok(())
    }

    fn check_len(&self, actual: usize) -> Result<()> {
        if actual == self.len {
            Ok(())
        } else {
            Err(Error::LengthMismatch {
                expected: self.len,
                actual,
            })
        }
    }

    fn oscillation_bin(&self, num_osc: f64) -> Result<usize> {
        let bin = num_osc.round().abs() as usize;
        if bin == 0 || 2 * bin >= self.len {
            return Err(Error::InvalidBin { bin, len: self.len });
        }
        Ok(bin)
    }

    /// Reconstructs the series from its offset and its known-frequency
    /// component only, with the oscillation rotated by `phase_shift`.
    ///
    /// All bins other than DC and `round(num_osc)` are discarded; the DC
    /// imaginary part is zeroed. A zero shift therefore acts as a
    /// sinusoid filter and reproduces a pure input sinusoid unchanged.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] or [`Error::InvalidBin`] on
    /// unusable input.
    pub fn shift_sinusoid(&self, num_osc: f64, input: &[f64], phase_shift: f64) -> Result<Vec<f64>> {
        self.check_len(input.len())?;
        let bin = self.oscillation_bin(num_osc)?;

        let mut buffer: Vec<Complex<f64>> =
            input.iter().map(|&v| Complex::new(v, 0.0)).collect();
        self.forward.process(&mut buffer);

        let dc = Complex::new(buffer[0].re, 0.0);
        let rotated = buffer[bin] * Complex::from_polar(1.0, phase_shift);

        buffer.iter_mut().for_each(|c| *c = Complex::new(0.0, 0.0));
        buffer[0] = dc;
        buffer[bin] = rotated;
        buffer[self.len - bin] = rotated.conj();

        self.inverse.process(&mut buffer);
        let norm = self.len as f64;
        Ok(buffer.into_iter().map(|c| c.re / norm).collect())
    }

    /// Applies a uniform time shift: harmonic `j` is rotated by
    /// `phase_shift * j / round(num_osc)`, so the full waveform moves by
    /// `phase_shift` at the oscillation frequency.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] or [`Error::InvalidBin`] on
    /// unusable input.
    pub fn phase_shift_all(
        &self,
        num_osc: f64,
        input: &[f64],
        phase_shift: f64,
    ) -> Result<Vec<f64>> {
        self.check_len(input.len())?;
        let bin = self.oscillation_bin(num_osc)?;

        let mut buffer: Vec<Complex<f64>> =
            input.iter().map(|&v| Complex::new(v, 0.0)).collect();
        self.forward.process(&mut buffer);

        for j in 1..=self.len / 2 {
            let angle = phase_shift * j as f64 / bin as f64;
            if 2 * j == self.len {
                // Nyquist bin has no distinct mirror; keep the spectrum
                // conjugate-symmetric by scaling instead of rotating.
                buffer[j] *= angle.cos();
            } else {
                buffer[j] *= Complex::from_polar(1.0, angle);
                buffer[self.len - j] = buffer[j].conj();
            }
        }

        self.inverse.process(&mut buffer);
        let norm = self.len as f64;
        Ok(buffer.into_iter().map(|c| c.re / norm).collect())
    }

    /// Dispatches on the configured shift method.
    ///
    /// # Errors
    /// See [`SpectralAnalyzer::shift_sinusoid`].
    pub fn shift(
        &self,
        method: ShiftMethod,
        num_osc: f64,
        input: &[f64],
        phase_shift: f64,
    ) -> Result<Vec<f64>> {
        match method {
            ShiftMethod::SineOnly => self.shift_sinusoid(num_osc, input, phase_shift),
            ShiftMethod::ZeroOrder => self.phase_shift_all(num_osc, input, phase_shift),
        }
    }

    /// Amplitude/phase of the known-frequency bin, as `(contrast, phase)`.
    ///
    /// The amplitude is `2*|c_bin|/N`, the offset `Re(c_0)/N`, contrast
    /// their ratio; the phase is `atan2(im, re) + pi/2` wrapped into
    /// `[0, 2*pi)`, matching the sinusoid-fit convention. A vanishing
    /// offset yields a non-finite contrast the caller must reject.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] or [`Error::InvalidBin`] on
    /// unusable input.
    pub fn contrast(&self, num_osc: f64, input: &[f64]) -> Result<(f64, f64)> {
        self.check_len(input.len())?;
        let bin = self.oscillation_bin(num_osc)?;

        let mut buffer: Vec<Complex<f64>> =
            input.iter().map(|&v| Complex::new(v, 0.0)).collect();
        self.forward.process(&mut buffer);

        let norm = self.len as f64;
        let amp = 2.0 * buffer[bin].norm() / norm;
        let offset = buffer[0].re / norm;
        let phase = wrap_phase(buffer[bin].im.atan2(buffer[bin].re) + PI / 2.0);

        Ok((amp / offset, phase))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sinusoid(len: usize, num_osc: f64, amp: f64, phase: f64, offset: f64) -> Vec<f64> {
        (0..len)
            .map(|i| amp * (2.0 * PI * num_osc * i as f64 / len as f64 + phase).sin() + offset)
            .collect()
    }

    #[test]
    fn test_zero_shift_is_identity_on_pure_sinusoid() {
        let analyzer = SpectralAnalyzer::new(16);
        let input = sinusoid(16, 2.0, 50.0, 0.7, 100.0);
        let output = analyzer.shift_sinusoid(2.0, &input, 0.0).unwrap();
        for (a, b) in input.iter().zip(&output) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_shift_moves_phase() {
        let analyzer = SpectralAnalyzer::new(32);
        let input = sinusoid(32, 1.0, 10.0, 0.0, 20.0);
        let expected = sinusoid(32, 1.0, 10.0, 0.5, 20.0);
        let output = analyzer.shift_sinusoid(1.0, &input, 0.5).unwrap();
        for (a, b) in expected.iter().zip(&output) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_shift_discards_other_harmonics() {
        let analyzer = SpectralAnalyzer::new(32);
        let mut input = sinusoid(32, 1.0, 10.0, 0.3, 20.0);
        let spurious = sinusoid(32, 5.0, 4.0, 1.1, 0.0);
        for (a, b) in input.iter_mut().zip(&spurious) {
            *a += b;
        }
        let cleaned = analyzer.shift_sinusoid(1.0, &input, 0.0).unwrap();
        let pure = sinusoid(32, 1.0, 10.0, 0.3, 20.0);
        for (a, b) in pure.iter().zip(&cleaned) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_zero_order_shift_moves_whole_waveform() {
        let analyzer = SpectralAnalyzer::new(32);
        let input = sinusoid(32, 2.0, 8.0, 0.0, 15.0);
        let expected = sinusoid(32, 2.0, 8.0, 1.0, 15.0);
        let output = analyzer.phase_shift_all(2.0, &input, 1.0).unwrap();
        for (a, b) in expected.iter().zip(&output) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_contrast_extraction() {
        let analyzer = SpectralAnalyzer::new(16);
        let input = sinusoid(16, 1.0, 50.0, 0.4, 100.0);
        let (contrast, phase) = analyzer.contrast(1.0, &input).unwrap();
        assert_relative_eq!(contrast, 0.5, epsilon = 1e-9);
        assert_relative_eq!(phase, 0.4, epsilon = 1e-9);
    }

    #[test]
    fn test_dft_coefficient_matches_transform() {
        let analyzer = SpectralAnalyzer::new(16);
        let input = sinusoid(16, 3.0, 7.0, 1.2, 40.0);
        let direct = dft_coefficient(3, &input);
        let mut buffer: Vec<Complex<f64>> =
            input.iter().map(|&v| Complex::new(v, 0.0)).collect();
        analyzer.transform(&mut buffer).unwrap();
        assert_relative_eq!(direct.re, buffer[3].re, epsilon = 1e-9);
        assert_relative_eq!(direct.im, buffer[3].im, epsilon = 1e-9);
    }

    #[test]
    fn test_length_mismatch_is_rejected() {
        let analyzer = SpectralAnalyzer::new(16);
        let short = vec![0.0; 8];
        assert!(matches!(
            analyzer.shift_sinusoid(1.0, &short, 0.0),
            Err(Error::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_unresolvable_bin_is_rejected() {
        let analyzer = SpectralAnalyzer::new(8);
        let input = vec![1.0; 8];
        assert!(matches!(
            analyzer.contrast(4.0, &input),
            Err(Error::InvalidBin { .. })
        ));
        assert!(matches!(
            analyzer.contrast(0.0, &input),
            Err(Error::InvalidBin { .. })
        ));
    }

    #[test]
    fn test_wrap_phase() {
        assert_relative_eq!(wrap_phase(-PI), PI);
        assert_relative_eq!(wrap_phase(5.0 * PI), PI);
        assert_relative_eq!(wrap_phase(0.5), 0.5);
    }
}
