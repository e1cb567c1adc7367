//! cascade-io: file formats for Cascade TOF data.
//!
//! Raw PAD/TOF files are flat little-endian u32 sequences sized by the
//! detector geometry; oversized files carry an appended overlay
//! configuration block, and a sibling `.conf` file is consulted when
//! present. This crate also persists ROI definitions, dumps text
//! renditions and guesses geometries from unannounced file sizes.
//!

pub mod error;
pub mod guess;
pub mod overlay;
pub mod pad_file;
pub mod roi_file;
pub mod text;
pub mod tof_file;
pub mod xml;

pub use error::{Error, Result};
pub use guess::{guess_pad_geometry, guess_tof_geometry};
pub use overlay::OverlayConfig;
pub use pad_file::{load_pad, save_pad, LoadedPad};
pub use roi_file::{load_roi, save_roi};
pub use tof_file::{load_tof, save_tof, LoadedTof};
pub use xml::{write_measurement_xml, MeasurementMeta};
