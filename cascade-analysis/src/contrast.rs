//! Contrast and phase extraction over graphs, blocks and whole cubes.
//!
//! Contrast is the ratio of oscillation amplitude to mean offset, the
//! key observable of the measurement. This module computes it per
//! region graph (with propagated uncertainties and optional underground
//! subtraction), paints per-block phase/contrast maps, aligns foils in
//! phase before summation and applies the per-pixel path-length phase
//! correction.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap
)]

use crate::fit::{fit_sinusoid, FitSettings, SinusoidFit};
use crate::fourier::{wrap_phase, ShiftMethod, SpectralAnalyzer};
use crate::{Error, Result};
use cascade_core::{DerivedGraph, DerivedImage, InstrumentConfig, SharedBuffer, TofCube};
use std::f64::consts::PI;

/// How oscillation parameters are extracted from a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalysisMethod {
    /// Weighted nonlinear sinusoid fit (with uncertainties).
    #[default]
    SinusoidFit,
    /// Single-bin Fourier extraction (fast, no error estimate).
    Fourier,
}

/// Contrast and phase of one region, with propagated uncertainties.
/// Only constructible from a valid analysis.
#[derive(Debug, Clone, Copy)]
pub struct ContrastResult {
    pub contrast: f64,
    pub phase: f64,
    pub contrast_err: f64,
    pub phase_err: f64,
}

/// Tiling of the per-block phase/contrast maps. The block size trades
/// spatial resolution for per-block statistics.
#[derive(Debug, Clone, Copy)]
pub struct BlockOptions {
    pub block_w: usize,
    pub block_h: usize,
    /// Emit phases in degrees instead of radians.
    pub degrees: bool,
}

impl Default for BlockOptions {
    fn default() -> Self {
        Self {
            block_w: 1,
            block_h: 2,
            degrees: true,
        }
    }
}

#[derive(Clone, Copy)]
enum BlockQuantity {
    Phase,
    Contrast,
}

/// Orchestrates fitting and spectral analysis over cubes.
#[derive(Debug, Clone, Default)]
pub struct ContrastEngine {
    pub settings: FitSettings,
    pub method: AnalysisMethod,
    pub shift_method: ShiftMethod,
    pub blocks: BlockOptions,
}

impl ContrastEngine {
    /// Engine with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Contrast and phase of one graph.
    ///
    /// # Errors
    /// Propagates fit rejection ([`Error::LowStatistics`],
    /// [`Error::DegenerateData`], [`Error::FitInvalid`]); a non-finite
    /// contrast (degenerate offset) is reported as [`Error::FitInvalid`]
    /// rather than returned.
    pub fn contrast_of_graph(&self, graph: &DerivedGraph) -> Result<ContrastResult> {
        match self.method {
            AnalysisMethod::SinusoidFit => {
                let fit = fit_sinusoid(graph, &self.settings)?;
                let result = contrast_from_fit(&fit);
                validate_contrast(result)
            }
            AnalysisMethod::Fourier => {
                let sum = graph.sum();
                if sum < self.settings.min_counts_to_fit {
                    return Err(Error::LowStatistics {
                        sum,
                        threshold: self.settings.min_counts_to_fit,
                    });
                }
                let analyzer = SpectralAnalyzer::new(graph.len());
                let series: Vec<f64> = graph.values().iter().map(|&v| f64::from(v)).collect();
                let (contrast, phase) =
                    analyzer.contrast(graph.config().oscillations(), &series)?;
                validate_contrast(ContrastResult {
                    contrast,
                    phase,
                    contrast_err: 0.0,
                    phase_err: 0.0,
                })
            }
        }
    }

    /// Contrast with an underground (background) graph subtracted:
    /// `(amp - m*amp_u) / (offset - m*offset_u)`, with the four-term
    /// propagated uncertainty over both fits.
    ///
    /// # Errors
    /// Propagates fit rejection for either graph; a non-finite contrast
    /// is [`Error::FitInvalid`].
    pub fn contrast_subtract_underground(
        &self,
        graph: &DerivedGraph,
        underground: &DerivedGraph,
        multiplier: f64,
    ) -> Result<ContrastResult> {
        let signal = fit_sinusoid(graph, &self.settings)?;
        let background = fit_sinusoid(underground, &self.settings)?;

        let amp = signal.amp - multiplier * background.amp;
        let offset = signal.offset - multiplier * background.offset;
        let contrast = amp / offset;

        let d_amp = 1.0 / offset * signal.amp_err;
        let d_amp_u = multiplier / offset * background.amp_err;
        let d_offset = amp / (offset * offset) * signal.offset_err;
        let d_offset_u = multiplier * amp / (offset * offset) * background.offset_err;
        let contrast_err =
            (d_amp * d_amp + d_amp_u * d_amp_u + d_offset * d_offset + d_offset_u * d_offset_u)
                .sqrt();

        validate_contrast(ContrastResult {
            contrast,
            phase: signal.phase,
            contrast_err,
            phase_err: signal.phase_err,
        })
    }

    /// Per-block phase map of one foil. Each tile is reduced to a graph,
    /// analyzed, and its phase painted across the tile; blocks that
    /// cannot be analyzed paint 0.
    ///
    /// # Errors
    /// Propagates allocation failures from the reductions.
    pub fn phase_image(&self, cube: &TofCube, foil: i64) -> Result<DerivedImage> {
        self.block_map(cube, foil, BlockQuantity::Phase)
    }

    /// Per-block contrast map of one foil; blocks that cannot be
    /// analyzed paint 0.
    ///
    /// # Errors
    /// Propagates allocation failures from the reductions.
    pub fn contrast_image(&self, cube: &TofCube, foil: i64) -> Result<DerivedImage> {
        self.block_map(cube, foil, BlockQuantity::Contrast)
    }

    fn block_map(
        &self,
        cube: &TofCube,
        foil: i64,
        quantity: BlockQuantity,
    ) -> Result<DerivedImage> {
        let width = cube.width();
        let height = cube.height();
        let block_w = self.blocks.block_w.max(1);
        let block_h = self.blocks.block_h.max(1);

        let mut values = Vec::new();
        if values.try_reserve_exact(width * height).is_err() {
            log::error!("could not allocate block map of {} pixels", width * height);
            return Err(Error::Core(cascade_core::Error::AllocationFailure {
                len: width * height,
            }));
        }
        values.resize(width * height, 0.0);

        let analyzer = match self.method {
            AnalysisMethod::Fourier => Some(SpectralAnalyzer::new(
                cube.config().channels_per_foil(),
            )),
            AnalysisMethod::SinusoidFit => None,
        };

        for y in (0..height).step_by(block_h) {
            for x in (0..width).step_by(block_w) {
                let graph = cube.graph_unweighted(
                    x as i64,
                    (x + block_w) as i64,
                    y as i64,
                    (y + block_h) as i64,
                    foil,
                )?;

                let value = match quantity {
                    BlockQuantity::Phase => {
                        let phase = self.block_phase(&graph, analyzer.as_ref());
                        if self.blocks.degrees {
                            phase * 180.0 / PI
                        } else {
                            phase
                        }
                    }
                    BlockQuantity::Contrast => self.block_contrast(&graph, analyzer.as_ref()),
                };

                for j in y..(y + block_h).min(height) {
                    for i in x..(x + block_w).min(width) {
                        values[j * width + i] = value;
                    }
                }
            }
        }

        Ok(DerivedImage::from_values(
            width,
            height,
            SharedBuffer::from_vec(values),
        )?)
    }

    /// Block phase with the ported failure policy: anything invalid
    /// paints 0.
    fn block_phase(&self, graph: &DerivedGraph, analyzer: Option<&SpectralAnalyzer>) -> f64 {
        let value = match analyzer {
            Some(analyzer) => self
                .fourier_block(graph, analyzer)
                .map(|(_, phase)| phase),
            None => fit_sinusoid(graph, &self.settings).map(|fit| fit.phase),
        };
        match value {
            Ok(phase) if phase.is_finite() => phase,
            _ => 0.0,
        }
    }

    fn block_contrast(&self, graph: &DerivedGraph, analyzer: Option<&SpectralAnalyzer>) -> f64 {
        let value = match analyzer {
            Some(analyzer) => self
                .fourier_block(graph, analyzer)
                .map(|(contrast, _)| contrast),
            None => fit_sinusoid(graph, &self.settings).map(|fit| (fit.amp / fit.offset).abs()),
        };
        match value {
            Ok(contrast) if contrast.is_finite() => contrast,
            _ => 0.0,
        }
    }

    fn fourier_block(
        &self,
        graph: &DerivedGraph,
        analyzer: &SpectralAnalyzer,
    ) -> Result<(f64, f64)> {
        let sum = graph.sum();
        if sum < self.settings.min_counts_to_fit {
            return Err(Error::LowStatistics {
                sum,
                threshold: self.settings.min_counts_to_fit,
            });
        }
        let series: Vec<f64> = graph.values().iter().map(|&v| f64::from(v)).collect();
        analyzer.contrast(graph.config().oscillations(), &series)
    }

    /// Sums per-foil phase maps over the selected foils, wrapping the
    /// summed phases modulo a full turn.
    ///
    /// # Errors
    /// Propagates allocation failures from the reductions.
    pub fn add_phase_images(&self, cube: &TofCube, foils: &[bool]) -> Result<DerivedImage> {
        let mut image = self.sum_foil_maps(cube, foils, BlockQuantity::Phase)?;
        let modulo = if self.blocks.degrees { 360.0 } else { 2.0 * PI };
        image.map_values(|v| v % modulo);
        Ok(image)
    }

    /// Sums per-foil contrast maps over the selected foils.
    ///
    /// # Errors
    /// Propagates allocation failures from the reductions.
    pub fn add_contrast_images(&self, cube: &TofCube, foils: &[bool]) -> Result<DerivedImage> {
        self.sum_foil_maps(cube, foils, BlockQuantity::Contrast)
    }

    fn sum_foil_maps(
        &self,
        cube: &TofCube,
        foils: &[bool],
        quantity: BlockQuantity,
    ) -> Result<DerivedImage> {
        let mut accumulated: Option<DerivedImage> = None;
        for foil in 0..cube.config().foil_count() {
            if !foils.get(foil).copied().unwrap_or(false) {
                continue;
            }
            let map = self.block_map(cube, foil as i64, quantity)?;
            match &mut accumulated {
                None => accumulated = Some(map),
                Some(acc) => acc.add_assign(&map)?,
            }
        }
        match accumulated {
            Some(image) => Ok(image),
            None => {
                let blank = vec![0.0; cube.width() * cube.height()];
                Ok(DerivedImage::from_values(
                    cube.width(),
                    cube.height(),
                    SharedBuffer::from_vec(blank),
                )?)
            }
        }
    }

    /// Sums all foils of a region into one graph after aligning them in
    /// phase.
    ///
    /// Foils are out of phase with each other due to electronics skew;
    /// a naive sum would wash the oscillation out. Each foil's phase is
    /// fit over the full frame, the count-weighted mean phase is formed,
    /// and every foil's region series is spectrally shifted onto that
    /// mean before summation.
    ///
    /// # Errors
    /// Propagates fit rejection for any foil and allocation failures
    /// from the reductions.
    pub fn total_graph(
        &self,
        cube: &TofCube,
        x0: i64,
        x1: i64,
        y0: i64,
        y1: i64,
    ) -> Result<DerivedGraph> {
        let config = cube.config();
        let channels = config.channels_per_foil();
        let num_osc = config.oscillations();
        let region = cube.clamp_region(x0, x1, y0, y1);

        let mut phases = Vec::with_capacity(config.foil_count());
        let mut weighted_phase = 0.0;
        let mut total_counts = 0.0;
        for foil in 0..config.foil_count() {
            let graph = cube.foil_graph(foil as i64)?;
            let fit = fit_sinusoid(&graph, &self.settings)?;
            let counts = graph.sum() as f64;
            phases.push(fit.phase);
            weighted_phase += fit.phase * counts;
            total_counts += counts;
        }
        if total_counts <= 0.0 {
            return Err(Error::DegenerateData);
        }
        let mean_phase = wrap_phase(weighted_phase / total_counts);

        let analyzer = SpectralAnalyzer::new(channels);
        let mut sum = vec![0.0f64; channels];
        for (foil, &phase) in phases.iter().enumerate() {
            let mut series = vec![0.0f64; channels];
            for (channel, slot) in series.iter_mut().enumerate() {
                for y in region.y0..region.y1 {
                    for x in region.x0..region.x1 {
                        *slot += cube.data_in_roi(foil, channel, x, y);
                    }
                }
            }
            let shifted =
                analyzer.shift(self.shift_method, num_osc, &series, mean_phase - phase)?;
            for (acc, v) in sum.iter_mut().zip(&shifted) {
                *acc += v;
            }
        }

        let counts: Vec<u32> = sum.iter().map(|&v| v.max(0.0) as u32).collect();
        Ok(DerivedGraph::from_counts(config.clone(), counts))
    }

    /// Region graph with the per-pixel path-length phase correction
    /// applied first.
    ///
    /// Pixels away from the beam center see a longer flight path; the
    /// extra length maps to a time and hence phase offset at the
    /// modulation frequency. Each pixel's channel series is shifted by
    /// the negated offset on a private copy of the cube before the
    /// region is reduced, so the caller's data is never mutated.
    ///
    /// # Errors
    /// Propagates spectral-shift failures and allocation failures from
    /// the reductions.
    pub fn graph_with_path_correction(
        &self,
        cube: &TofCube,
        x0: i64,
        x1: i64,
        y0: i64,
        y1: i64,
        foil: i64,
        instrument: &InstrumentConfig,
    ) -> Result<DerivedGraph> {
        let config = cube.config();
        let region = cube.clamp_region(x0, x1, y0, y1);
        let foil = config.clamp_foil(foil);
        let num_osc = config.oscillations();

        let width = config.width() as f64;
        let height = config.height() as f64;
        let ls = instrument.sample_distance;
        let velocity = instrument.neutron_velocity();

        let analyzer = SpectralAnalyzer::new(config.channels_per_foil());
        let mut corrected = cube.clone();

        for y in region.y0..region.y1 {
            for x in region.x0..region.x1 {
                let dx = instrument.detector_len_x * (x as f64 + 0.5) / width
                    - instrument.detector_center_x;
                let dy = instrument.detector_len_y * (y as f64 + 0.5) / height
                    - instrument.detector_center_y;

                let path_diff = (dx * dx + dy * dy + ls * ls).sqrt() - ls;
                let time_diff = path_diff / velocity;
                let phase_diff = (instrument.modulation_omega * time_diff) % (2.0 * PI);

                let series = corrected.channel_series(foil, x, y);
                let shifted = analyzer.shift(self.shift_method, num_osc, &series, -phase_diff)?;
                corrected.set_channel_series(foil, x, y, &shifted);
            }
        }

        Ok(corrected.graph(
            region.x0 as i64,
            region.x1 as i64,
            region.y0 as i64,
            region.y1 as i64,
            foil as i64,
        )?)
    }
}

fn contrast_from_fit(fit: &SinusoidFit) -> ContrastResult {
    let contrast = fit.amp / fit.offset;
    let d_amp = fit.amp_err / fit.offset;
    let d_offset = fit.amp / (fit.offset * fit.offset) * fit.offset_err;
    ContrastResult {
        contrast,
        phase: fit.phase,
        contrast_err: (d_amp * d_amp + d_offset * d_offset).sqrt(),
        phase_err: fit.phase_err,
    }
}

fn validate_contrast(result: ContrastResult) -> Result<ContrastResult> {
    if result.contrast.is_finite() {
        Ok(result)
    } else {
        log::warn!("non-finite contrast rejected");
        Err(Error::FitInvalid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use cascade_core::{PadConfig, TofConfig};

    fn sin_counts(channels: usize, num_osc: f64, amp: f64, phase: f64, offset: f64) -> Vec<u32> {
        (0..channels)
            .map(|i| {
                (amp * (2.0 * PI * num_osc * i as f64 / channels as f64 + phase).sin() + offset)
                    .round() as u32
            })
            .collect()
    }

    fn graph_config(channels: usize) -> TofConfig {
        TofConfig::new(PadConfig::new(4, 4), 1, channels, channels).with_oscillations(1.0)
    }

    fn sinusoid_cube(phases: &[f64]) -> TofCube {
        let config = TofConfig::new(PadConfig::new(4, 4), phases.len(), 16, phases.len() * 16)
            .with_oscillations(1.0);
        let mut cube = TofCube::zeroed(&config).unwrap();
        for (foil, &phase) in phases.iter().enumerate() {
            let counts = sin_counts(16, 1.0, 50.0, phase, 100.0);
            for (channel, &value) in counts.iter().enumerate() {
                for y in 0..4 {
                    for x in 0..4 {
                        cube.set_data(foil, channel, x, y, value);
                    }
                }
            }
        }
        cube
    }

    #[test]
    fn test_fit_and_fourier_methods_agree() {
        let graph = DerivedGraph::from_counts(
            graph_config(16),
            sin_counts(16, 1.0, 500.0, 0.9, 1000.0),
        );

        let fit_engine = ContrastEngine::new();
        let fourier_engine = ContrastEngine {
            method: AnalysisMethod::Fourier,
            ..ContrastEngine::new()
        };

        let by_fit = fit_engine.contrast_of_graph(&graph).unwrap();
        let by_fourier = fourier_engine.contrast_of_graph(&graph).unwrap();

        assert_relative_eq!(by_fit.contrast, 0.5, max_relative = 0.02);
        assert_relative_eq!(by_fourier.contrast, 0.5, max_relative = 0.02);
        // The Fourier phase formula must reproduce the fitted phase.
        assert_abs_diff_eq!(by_fit.phase, by_fourier.phase, epsilon = 0.03);
    }

    #[test]
    fn test_underground_subtraction() {
        let signal = DerivedGraph::from_counts(
            graph_config(16),
            sin_counts(16, 1.0, 600.0, 0.3, 1200.0),
        );
        let underground = DerivedGraph::from_counts(
            graph_config(16),
            sin_counts(16, 1.0, 100.0, 0.3, 200.0),
        );

        let engine = ContrastEngine::new();
        let result = engine
            .contrast_subtract_underground(&signal, &underground, 1.0)
            .unwrap();
        // (600 - 100) / (1200 - 200) = 0.5
        assert_relative_eq!(result.contrast, 0.5, max_relative = 0.03);
        assert!(result.contrast_err > 0.0);
    }

    #[test]
    fn test_fourier_respects_min_counts() {
        let graph = DerivedGraph::from_counts(graph_config(16), vec![1; 16]);
        let engine = ContrastEngine {
            method: AnalysisMethod::Fourier,
            ..ContrastEngine::new()
        };
        assert!(matches!(
            engine.contrast_of_graph(&graph),
            Err(Error::LowStatistics { .. })
        ));
    }

    #[test]
    fn test_contrast_image_paints_blocks() {
        let cube = sinusoid_cube(&[0.0]);
        let engine = ContrastEngine {
            blocks: BlockOptions {
                block_w: 2,
                block_h: 2,
                degrees: false,
            },
            settings: FitSettings {
                min_counts_to_fit: 10,
                ..FitSettings::default()
            },
            ..ContrastEngine::new()
        };
        let map = engine.contrast_image(&cube, 0).unwrap();
        for y in 0..4 {
            for x in 0..4 {
                assert_relative_eq!(map.value(x, y), 0.5, max_relative = 0.05);
            }
        }
    }

    #[test]
    fn test_phase_image_in_degrees() {
        let cube = sinusoid_cube(&[1.0]);
        let engine = ContrastEngine {
            blocks: BlockOptions {
                block_w: 4,
                block_h: 4,
                degrees: true,
            },
            settings: FitSettings {
                min_counts_to_fit: 10,
                ..FitSettings::default()
            },
            ..ContrastEngine::new()
        };
        let map = engine.phase_image(&cube, 0).unwrap();
        assert_abs_diff_eq!(map.value(0, 0), 1.0 * 180.0 / PI, epsilon = 2.0);
    }

    #[test]
    fn test_total_graph_aligns_foils() {
        // Two foils deliberately out of phase: a naive sum would damp
        // the oscillation, the aligned sum must keep full amplitude.
        let cube = sinusoid_cube(&[0.2, 0.8]);
        let engine = ContrastEngine::new();
        let total = engine.total_graph(&cube, 0, 4, 0, 4).unwrap();

        let fit = fit_sinusoid(&total, &FitSettings::default()).unwrap();
        // Each foil contributes 16 pixels x amp 50.
        assert_relative_eq!(fit.amp, 2.0 * 16.0 * 50.0, max_relative = 0.05);
        assert_abs_diff_eq!(fit.phase, 0.5, epsilon = 0.05);
    }

    #[test]
    fn test_path_correction_is_noop_at_beam_center() {
        let cube = sinusoid_cube(&[0.4]);
        let engine = ContrastEngine::new();
        // A pointlike detector sits entirely at the beam center: every
        // pixel has zero extra path length, the graph must be untouched.
        let instrument = InstrumentConfig {
            detector_len_x: 0.0,
            detector_len_y: 0.0,
            detector_center_x: 0.0,
            detector_center_y: 0.0,
            ..InstrumentConfig::default()
        };
        let corrected = engine
            .graph_with_path_correction(&cube, 0, 4, 0, 4, 0, &instrument)
            .unwrap();
        let plain = cube.graph(0, 4, 0, 4, 0).unwrap();
        for i in 0..16 {
            let delta = f64::from(corrected.value(i)) - f64::from(plain.value(i));
            assert!(delta.abs() <= 1.0, "channel {i} moved by {delta}");
        }
    }

    #[test]
    fn test_path_correction_leaves_caller_cube_untouched() {
        let cube = sinusoid_cube(&[0.4]);
        let before: Vec<u32> = cube.raw().to_vec();
        let engine = ContrastEngine::new();
        engine
            .graph_with_path_correction(&cube, 0, 4, 0, 4, 0, &InstrumentConfig::default())
            .unwrap();
        assert_eq!(cube.raw(), &before[..]);
    }
}
