//! Fixed-frequency sinusoid fitting of time-channel graphs.
//!
//! The model is `y(i) = amp * sin(freq*i + phase) + offset` with `freq`
//! fixed from the configured oscillation count; only phase, amplitude
//! and offset are free. Points are weighted by their Poisson counting
//! error, candidate steps with negative amplitude are priced out of the
//! search, and anything that does not converge to finite parameters is
//! rejected rather than returned.
#![allow(clippy::cast_precision_loss)]

use crate::fourier::{dft_coefficient, wrap_phase};
use crate::{Error, Result};
use cascade_core::DerivedGraph;
use std::f64::consts::PI;

/// Cost assigned to forbidden parameter regions.
const MAX_COST: f64 = f64::MAX;

/// Settings for the sinusoid fitter.
#[derive(Debug, Clone, Copy)]
pub struct FitSettings {
    /// Graphs with fewer total counts are not fit at all.
    pub min_counts_to_fit: u64,
    /// Iteration cap for the minimizer.
    pub max_iterations: usize,
    /// Relative chi-square decrease below which the fit is converged.
    pub tolerance: f64,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            min_counts_to_fit: 50,
            max_iterations: 200,
            tolerance: 1e-10,
        }
    }
}

/// Result of a successful sinusoid fit. Only constructible by
/// [`fit_sinusoid`], so downstream code can never consume parameters of
/// a failed fit.
#[derive(Debug, Clone, Copy)]
pub struct SinusoidFit {
    /// Fixed angular frequency per channel index.
    pub freq: f64,
    /// Phase in `[0, 2*pi)`.
    pub phase: f64,
    /// Oscillation amplitude, non-negative.
    pub amp: f64,
    /// Mean offset.
    pub offset: f64,
    /// One-sigma phase uncertainty.
    pub phase_err: f64,
    /// One-sigma amplitude uncertainty.
    pub amp_err: f64,
    /// One-sigma offset uncertainty.
    pub offset_err: f64,
}

/// Fits the oscillation model to a time-channel graph.
///
/// # Errors
/// - [`Error::LowStatistics`] below the minimum-counts threshold (the
///   minimizer is never invoked);
/// - [`Error::DegenerateData`] for empty or constant input;
/// - [`Error::FitInvalid`] when the minimizer does not converge or any
///   output parameter is NaN.
pub fn fit_sinusoid(graph: &DerivedGraph, settings: &FitSettings) -> Result<SinusoidFit> {
    let n = graph.len();
    if n == 0 {
        return Err(Error::DegenerateData);
    }

    let sum = graph.sum();
    if sum < settings.min_counts_to_fit {
        return Err(Error::LowStatistics {
            sum,
            threshold: settings.min_counts_to_fit,
        });
    }

    let min = graph.min();
    let max = graph.max();
    if min == max {
        log::error!("constant data, sinusoid fit not possible");
        return Err(Error::DegenerateData);
    }

    let num_osc = graph.config().oscillations();
    let freq = num_osc * 2.0 * PI / n as f64;

    let y: Vec<f64> = graph.values().iter().map(|&v| f64::from(v)).collect();
    // Poisson counting error per point, floored to avoid dividing by 0.
    let sigma: Vec<f64> = y.iter().map(|&v| v.sqrt().max(f64::EPSILON)).collect();

    // Seed from the known-frequency DFT bin plus the data range.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let coeff = dft_coefficient(num_osc.round().abs() as usize, &y);
    let phase0 = wrap_phase(coeff.im.atan2(coeff.re) + PI / 2.0);
    let amp0 = 0.5 * f64::from(max - min);
    let offset0 = f64::from(min) + amp0;

    let problem = Problem {
        y: &y,
        sigma: &sigma,
        freq,
    };
    let params = levenberg_marquardt(&problem, [phase0, amp0, offset0], settings)?;

    let errors = parameter_errors(&problem, &params).ok_or(Error::FitInvalid)?;

    let [mut phase, mut amp, offset] = params;
    if amp < 0.0 {
        amp = -amp;
        phase += PI;
    }
    phase = wrap_phase(phase);

    let values = [phase, amp, offset, errors[0], errors[1], errors[2]];
    if values.iter().any(|v| v.is_nan()) {
        log::warn!("sinusoid fit produced NaN parameters");
        return Err(Error::FitInvalid);
    }

    Ok(SinusoidFit {
        freq,
        phase,
        amp,
        offset,
        phase_err: errors[0],
        amp_err: errors[1],
        offset_err: errors[2],
    })
}

struct Problem<'a> {
    y: &'a [f64],
    sigma: &'a [f64],
    freq: f64,
}

impl Problem<'_> {
    fn model(&self, params: &[f64; 3], i: usize) -> f64 {
        let [phase, amp, offset] = *params;
        amp * (self.freq * i as f64 + phase).sin() + offset
    }

    /// Weighted chi-square; negative amplitudes get the sentinel cost so
    /// the minimizer is pushed out of that region instead of failing.
    fn chi2(&self, params: &[f64; 3]) -> f64 {
        if params[1] < 0.0 {
            return MAX_COST;
        }
        self.y
            .iter()
            .enumerate()
            .map(|(i, &yi)| {
                let d = (yi - self.model(params, i)) / self.sigma[i];
                d * d
            })
            .sum()
    }

    /// Weighted normal equations `(J^T J, J^T r)` at `params`.
    fn normal_equations(&self, params: &[f64; 3]) -> ([[f64; 3]; 3], [f64; 3]) {
        let [phase, amp, _] = *params;
        let mut jtj = [[0.0; 3]; 3];
        let mut jtr = [0.0; 3];

        for (i, &yi) in self.y.iter().enumerate() {
            let t = self.freq * i as f64 + phase;
            let w = 1.0 / self.sigma[i];
            let jac = [amp * t.cos() * w, t.sin() * w, w];
            let r = (yi - self.model(params, i)) * w;
            for a in 0..3 {
                jtr[a] += jac[a] * r;
                for b in 0..3 {
                    jtj[a][b] += jac[a] * jac[b];
                }
            }
        }
        (jtj, jtr)
    }
}

fn levenberg_marquardt(
    problem: &Problem<'_>,
    start: [f64; 3],
    settings: &FitSettings,
) -> Result<[f64; 3]> {
    let mut params = start;
    let mut cost = problem.chi2(&params);
    let mut lambda = 1e-3;

    for _ in 0..settings.max_iterations {
        if cost <= settings.tolerance {
            return Ok(params);
        }

        let (jtj, jtr) = problem.normal_equations(&params);

        let mut improved = false;
        while lambda <= 1e12 {
            let mut damped = jtj;
            for k in 0..3 {
                damped[k][k] *= 1.0 + lambda;
            }
            let Some(step) = solve3(&damped, &jtr) else {
                lambda *= 10.0;
                continue;
            };
            let trial = [
                params[0] + step[0],
                params[1] + step[1],
                params[2] + step[2],
            ];
            let trial_cost = problem.chi2(&trial);
            if trial_cost < cost {
                let drop = cost - trial_cost;
                params = trial;
                cost = trial_cost;
                lambda = (lambda * 0.1).max(1e-12);
                improved = true;
                if drop <= settings.tolerance * (1.0 + cost) {
                    return Ok(params);
                }
                break;
            }
            lambda *= 10.0;
        }

        // No damping produced an improving step: we are at a minimum.
        if !improved {
            return Ok(params);
        }
    }

    log::error!("sinusoid fit did not converge");
    Err(Error::FitInvalid)
}

/// One-sigma parameter errors from the inverse of the weighted normal
/// matrix at the minimum; `None` if the matrix is singular.
fn parameter_errors(problem: &Problem<'_>, params: &[f64; 3]) -> Option<[f64; 3]> {
    let (jtj, _) = problem.normal_equations(params);
    let cov = invert3(&jtj)?;
    Some([cov[0][0].sqrt(), cov[1][1].sqrt(), cov[2][2].sqrt()])
}

/// Solves a 3x3 system by Gaussian elimination with partial pivoting.
fn solve3(a: &[[f64; 3]; 3], b: &[f64; 3]) -> Option<[f64; 3]> {
    let mut m = [[0.0f64; 4]; 3];
    for r in 0..3 {
        m[r][..3].copy_from_slice(&a[r]);
        m[r][3] = b[r];
    }

    for col in 0..3 {
        let pivot = (col..3).max_by(|&i, &j| {
            m[i][col]
                .abs()
                .partial_cmp(&m[j][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if m[pivot][col].abs() < 1e-300 {
            return None;
        }
        m.swap(col, pivot);
        for row in (col + 1)..3 {
            let factor = m[row][col] / m[col][col];
            for k in col..4 {
                m[row][k] -= factor * m[col][k];
            }
        }
    }

    let mut x = [0.0f64; 3];
    for row in (0..3).rev() {
        let mut acc = m[row][3];
        for k in (row + 1)..3 {
            acc -= m[row][k] * x[k];
        }
        x[row] = acc / m[row][row];
    }
    if x.iter().all(|v| v.is_finite()) {
        Some(x)
    } else {
        None
    }
}

/// Inverts a 3x3 matrix column by column; `None` if singular.
fn invert3(a: &[[f64; 3]; 3]) -> Option<[[f64; 3]; 3]> {
    let mut inv = [[0.0f64; 3]; 3];
    for col in 0..3 {
        let mut e = [0.0f64; 3];
        e[col] = 1.0;
        let x = solve3(a, &e)?;
        for row in 0..3 {
            inv[row][col] = x[row];
        }
    }
    Some(inv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use cascade_core::{PadConfig, TofConfig};

    fn graph_config(channels: usize, oscillations: f64) -> TofConfig {
        TofConfig::new(PadConfig::new(4, 4), 1, channels, channels)
            .with_oscillations(oscillations)
    }

    fn synthetic_graph(
        channels: usize,
        oscillations: f64,
        amp: f64,
        phase: f64,
        offset: f64,
    ) -> DerivedGraph {
        let freq = oscillations * 2.0 * PI / channels as f64;
        let counts: Vec<u32> = (0..channels)
            .map(|i| (amp * (freq * i as f64 + phase).sin() + offset).round() as u32)
            .collect();
        DerivedGraph::from_counts(graph_config(channels, oscillations), counts)
    }

    #[test]
    fn test_recovers_known_parameters() {
        let graph = synthetic_graph(16, 1.0, 500.0, 0.8, 1000.0);
        let fit = fit_sinusoid(&graph, &FitSettings::default()).unwrap();
        assert_abs_diff_eq!(fit.phase, 0.8, epsilon = 0.02);
        assert_relative_eq!(fit.amp, 500.0, max_relative = 0.02);
        assert_relative_eq!(fit.offset, 1000.0, max_relative = 0.02);
    }

    #[test]
    fn test_recovers_two_oscillations() {
        let graph = synthetic_graph(32, 2.0, 300.0, 2.5, 900.0);
        let fit = fit_sinusoid(&graph, &FitSettings::default()).unwrap();
        assert_abs_diff_eq!(fit.phase, 2.5, epsilon = 0.02);
        assert_relative_eq!(fit.amp, 300.0, max_relative = 0.02);
        assert_relative_eq!(fit.offset, 900.0, max_relative = 0.02);
    }

    #[test]
    fn test_phase_is_wrapped() {
        let graph = synthetic_graph(16, 1.0, 400.0, 6.0, 800.0);
        let fit = fit_sinusoid(&graph, &FitSettings::default()).unwrap();
        assert!(fit.phase >= 0.0 && fit.phase < 2.0 * PI);
        assert_abs_diff_eq!(fit.phase, 6.0, epsilon = 0.02);
    }

    #[test]
    fn test_rejects_low_statistics() {
        let graph = DerivedGraph::from_counts(graph_config(16, 1.0), vec![1; 16]);
        let result = fit_sinusoid(&graph, &FitSettings::default());
        assert!(matches!(result, Err(Error::LowStatistics { .. })));
    }

    #[test]
    fn test_rejects_constant_data() {
        let graph = DerivedGraph::from_counts(graph_config(16, 1.0), vec![100; 16]);
        let result = fit_sinusoid(&graph, &FitSettings::default());
        assert!(matches!(result, Err(Error::DegenerateData)));
    }

    #[test]
    fn test_amplitude_is_non_negative() {
        // Phase near pi looks like a negative amplitude at phase 0; the
        // fitter must fold it into the physical branch instead.
        let graph = synthetic_graph(16, 1.0, 200.0, PI, 600.0);
        let fit = fit_sinusoid(&graph, &FitSettings::default()).unwrap();
        assert!(fit.amp >= 0.0);
        assert_abs_diff_eq!(fit.phase, PI, epsilon = 0.05);
    }

    #[test]
    fn test_errors_shrink_with_amplitude() {
        let weak = synthetic_graph(16, 1.0, 60.0, 1.0, 2000.0);
        let strong = synthetic_graph(16, 1.0, 900.0, 1.0, 2000.0);
        let weak_fit = fit_sinusoid(&weak, &FitSettings::default()).unwrap();
        let strong_fit = fit_sinusoid(&strong, &FitSettings::default()).unwrap();
        assert!(strong_fit.phase_err < weak_fit.phase_err);
    }

    #[test]
    fn test_solve3() {
        let a = [[2.0, 0.0, 0.0], [0.0, 3.0, 0.0], [1.0, 0.0, 1.0]];
        let x = solve3(&a, &[4.0, 9.0, 5.0]).unwrap();
        assert_relative_eq!(x[0], 2.0);
        assert_relative_eq!(x[1], 3.0);
        assert_relative_eq!(x[2], 3.0);
    }

    #[test]
    fn test_invert3_singular() {
        let a = [[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 0.0, 1.0]];
        assert!(invert3(&a).is_none());
    }
}
