//! End-to-end reduction scenario: a small synthetic cube with a known
//! oscillation must yield the known contrast through both analysis
//! paths.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use cascade_analysis::{fit_sinusoid, AnalysisMethod, ContrastEngine, FitSettings};
use cascade_core::{PadConfig, TofCube, TofConfig};
use std::f64::consts::PI;

/// 2 foils, 16 time channels, 4x4 pixels, one oscillation:
/// `count(foil, tc, x, y) = 100 + 50*sin(2*pi*tc/16)`.
fn scenario_cube() -> TofCube {
    let config =
        TofConfig::new(PadConfig::new(4, 4), 2, 16, 32).with_oscillations(1.0);
    let mut cube = TofCube::zeroed(&config).unwrap();
    for foil in 0..2 {
        for tc in 0..16 {
            let value = (100.0 + 50.0 * (2.0 * PI * tc as f64 / 16.0).sin()).round() as u32;
            for y in 0..4 {
                for x in 0..4 {
                    cube.set_data(foil, tc, x, y, value);
                }
            }
        }
    }
    cube
}

#[test]
fn full_region_graph_fit_recovers_parameters() {
    let cube = scenario_cube();
    let graph = cube.graph(0, 4, 0, 4, 0).unwrap();
    assert_eq!(graph.len(), 16);

    let fit = fit_sinusoid(&graph, &FitSettings::default()).unwrap();
    // 16 pixels per channel scale amplitude and offset.
    assert_relative_eq!(fit.amp, 16.0 * 50.0, max_relative = 0.02);
    assert_relative_eq!(fit.offset, 16.0 * 100.0, max_relative = 0.02);
    // Phase 0 may come back as either end of the wrap interval.
    let phase = fit.phase.min((2.0 * PI - fit.phase).abs());
    assert_abs_diff_eq!(phase, 0.0, epsilon = 0.02);
}

#[test]
fn contrast_is_half_by_both_methods() {
    let cube = scenario_cube();
    let graph = cube.graph(0, 4, 0, 4, 0).unwrap();

    for method in [AnalysisMethod::SinusoidFit, AnalysisMethod::Fourier] {
        let engine = ContrastEngine {
            method,
            ..ContrastEngine::new()
        };
        let result = engine.contrast_of_graph(&graph).unwrap();
        assert_relative_eq!(result.contrast, 0.5, max_relative = 0.02);
    }
}

#[test]
fn both_foils_reduce_identically() {
    let cube = scenario_cube();
    let first = cube.graph(0, 4, 0, 4, 0).unwrap();
    let second = cube.graph(0, 4, 0, 4, 1).unwrap();
    assert_eq!(first.values(), second.values());
}

#[test]
fn total_graph_doubles_the_amplitude() {
    let cube = scenario_cube();
    let engine = ContrastEngine::new();
    let total = engine.total_graph(&cube, 0, 4, 0, 4).unwrap();
    let fit = fit_sinusoid(&total, &FitSettings::default()).unwrap();
    assert_relative_eq!(fit.amp, 2.0 * 16.0 * 50.0, max_relative = 0.05);
    assert_relative_eq!(fit.offset, 2.0 * 16.0 * 100.0, max_relative = 0.05);
}
