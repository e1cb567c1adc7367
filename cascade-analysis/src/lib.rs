//! cascade-analysis: numerical reduction of Cascade TOF data.
//!
//! Turns per-channel count graphs into physical quantities: sinusoid
//! fits of the count-rate oscillation, Fourier-based amplitude/phase
//! extraction, contrast maps, phase-aligned foil summation and the
//! per-pixel path-length phase correction.
//!

pub mod contrast;
pub mod error;
pub mod fit;
pub mod fourier;

pub use contrast::{AnalysisMethod, BlockOptions, ContrastEngine, ContrastResult};
pub use error::{Error, Result};
pub use fit::{fit_sinusoid, FitSettings, SinusoidFit};
pub use fourier::{dft_coefficient, wrap_phase, ShiftMethod, SpectralAnalyzer};
