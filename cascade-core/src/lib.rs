//! cascade-core: Detector-image data model for the Cascade TOF detector.
//!
//! This crate holds the in-memory representation of raw detector
//! acquisitions: single-frame PAD images, time-resolved TOF cubes,
//! region-of-interest geometry with fractional pixel coverage, and the
//! shared-buffer ownership that lets derived graphs and images be passed
//! around by value cheaply.
//!

pub mod config;
pub mod error;
pub mod graph;
pub mod image;
pub mod pad;
pub mod roi;
pub mod shared;
pub mod tof;

pub use config::{Compression, InstrumentConfig, PadConfig, Region, TofConfig};
pub use error::{Error, Result};
pub use graph::DerivedGraph;
pub use image::{DerivedImage, ImageData};
pub use pad::PadImage;
pub use roi::{Roi, RoiElement};
pub use shared::SharedBuffer;
pub use tof::TofCube;
