//! Error types for cascade-analysis.

use thiserror::Error;

/// Result type alias for analysis operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Analysis error types.
#[derive(Error, Debug)]
pub enum Error {
    /// A series was handed to an analyzer planned for a different length.
    #[error("series of {actual} samples handed to analyzer of length {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    /// The oscillation count maps to a Fourier bin outside the
    /// resolvable range of the series.
    #[error("oscillation bin {bin} not resolvable with {len} samples")]
    InvalidBin { bin: usize, len: usize },

    /// Too few counts to attempt a fit; the minimizer is not invoked.
    #[error("total counts {sum} below fit threshold {threshold}")]
    LowStatistics { sum: u64, threshold: u64 },

    /// Constant or empty input data.
    #[error("degenerate input data, nothing to fit")]
    DegenerateData,

    /// The minimizer reported an invalid minimum or produced NaN output.
    #[error("fit did not converge to a valid minimum")]
    FitInvalid,

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] cascade_core::Error),
}
