//! Error types for cascade-core.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for detector-image operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Buffer allocation failed.
    #[error("allocation of {len} elements failed")]
    AllocationFailure { len: usize },

    /// Buffer length disagrees with the configured geometry.
    #[error("buffer holds {actual} elements, geometry expects {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Two images with different shapes were combined.
    #[error("incompatible shapes: {expected_w}x{expected_h} vs {actual_w}x{actual_h}")]
    ShapeMismatch {
        expected_w: usize,
        expected_h: usize,
        actual_w: usize,
        actual_h: usize,
    },

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
