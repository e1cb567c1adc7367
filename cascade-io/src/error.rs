//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File could not be opened, read or written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File is smaller than the configured geometry requires. Distinct
    /// from [`Error::Io`] so callers can retry with a guessed geometry.
    #[error("file holds {actual} bytes, geometry expects {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Text or ROI file contents could not be parsed.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// ROI (de)serialization error.
    #[error("ROI file error: {0}")]
    Json(#[from] serde_json::Error),

    /// Core library error.
    #[error("core error: {0}")]
    Core(#[from] cascade_core::Error),
}
