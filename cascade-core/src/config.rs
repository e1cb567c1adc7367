//! Detector geometry and measurement configuration.
//!
//! Every image, cube and graph carries its own configuration; there is no
//! process-wide state. Region arguments coming from callers are clamped
//! into the detector bounds through one code path, [`PadConfig::clamp_region`].
#![allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_wrap)]

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// h/m_n in m/s per Angstrom of wavelength.
const PLANCK_OVER_NEUTRON_MASS: f64 = 3956.034;

/// Storage layout of a TOF cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compression {
    /// Frames addressed through the per-foil start-index table.
    #[default]
    None,
    /// Contiguous layout: frame = foil * channels_per_foil + channel.
    Pseudo,
}

/// A clamped rectangular pixel region, half-open in both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x0: usize,
    pub x1: usize,
    pub y0: usize,
    pub y1: usize,
    clamped: bool,
}

impl Region {
    /// Region width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        self.x1 - self.x0
    }

    /// Region height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        self.y1 - self.y0
    }

    /// True if the input had to be swapped or clamped to fit the detector.
    ///
    /// Clamping itself is silent to stay compatible with existing callers;
    /// this flag surfaces it for diagnostics and tests.
    #[must_use]
    pub fn was_clamped(&self) -> bool {
        self.clamped
    }
}

/// Geometry of a single detector frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadConfig {
    width: usize,
    height: usize,
}

impl Default for PadConfig {
    fn default() -> Self {
        Self {
            width: 128,
            height: 128,
        }
    }
}

impl PadConfig {
    /// Creates a frame geometry.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    /// Frame width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Frame height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Pixels per frame.
    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Bytes of one raw frame (u32 per pixel).
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.pixel_count() * 4
    }

    /// Checks the geometry is usable.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] on a zero-sized axis.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidConfig(format!(
                "zero-sized frame: {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Normalizes a caller-supplied rectangle: reversed pairs are swapped,
    /// both ends are clamped into `[0, dimension]`. Never fails; the
    /// returned region records whether the input was adjusted.
    #[must_use]
    pub fn clamp_region(&self, x0: i64, x1: i64, y0: i64, y1: i64) -> Region {
        let (x0, x1, sx) = sort_pair(x0, x1);
        let (y0, y1, sy) = sort_pair(y0, y1);

        let (cx0, ax) = clamp_index(x0, self.width);
        let (cx1, bx) = clamp_index(x1, self.width);
        let (cy0, ay) = clamp_index(y0, self.height);
        let (cy1, by) = clamp_index(y1, self.height);

        Region {
            x0: cx0,
            x1: cx1,
            y0: cy0,
            y1: cy1,
            clamped: sx || sy || ax || bx || ay || by,
        }
    }

    /// The whole frame as a region.
    #[must_use]
    pub fn full_region(&self) -> Region {
        Region {
            x0: 0,
            x1: self.width,
            y0: 0,
            y1: self.height,
            clamped: false,
        }
    }
}

fn sort_pair(a: i64, b: i64) -> (i64, i64, bool) {
    if a > b {
        (b, a, true)
    } else {
        (a, b, false)
    }
}

fn clamp_index(v: i64, dim: usize) -> (usize, bool) {
    if v < 0 {
        (0, true)
    } else if v as usize > dim {
        (dim, true)
    } else {
        (v as usize, false)
    }
}

/// Geometry of a TOF cube: frame geometry plus the foil / time-channel
/// structure and the expected oscillation count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TofConfig {
    pad: PadConfig,
    foil_count: usize,
    channels_per_foil: usize,
    image_count: usize,
    foil_begin: Vec<usize>,
    compression: Compression,
    sum_first_last: bool,
    oscillations: f64,
}

impl Default for TofConfig {
    /// The geometry the instrument ships with: 128x128 pixels, 6 foils of
    /// 16 time channels inside 128 raw frames, two oscillations per cycle.
    fn default() -> Self {
        Self {
            pad: PadConfig::default(),
            foil_count: 6,
            channels_per_foil: 16,
            image_count: 128,
            foil_begin: vec![0, 16, 32, 64, 80, 96],
            compression: Compression::None,
            sum_first_last: false,
            oscillations: 2.0,
        }
    }
}

impl TofConfig {
    /// Creates a cube geometry with evenly spaced foil windows.
    #[must_use]
    pub fn new(
        pad: PadConfig,
        foil_count: usize,
        channels_per_foil: usize,
        image_count: usize,
    ) -> Self {
        let foil_begin = (0..foil_count).map(|i| i * channels_per_foil).collect();
        Self {
            pad,
            foil_count,
            channels_per_foil,
            image_count,
            foil_begin,
            compression: Compression::None,
            sum_first_last: false,
            oscillations: 1.0,
        }
    }

    /// Frame geometry.
    #[must_use]
    pub fn pad(&self) -> &PadConfig {
        &self.pad
    }

    /// Frame width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        self.pad.width()
    }

    /// Frame height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        self.pad.height()
    }

    /// Number of foils.
    #[must_use]
    pub fn foil_count(&self) -> usize {
        self.foil_count
    }

    /// Time channels per foil.
    #[must_use]
    pub fn channels_per_foil(&self) -> usize {
        self.channels_per_foil
    }

    /// Raw frame count of the acquisition.
    #[must_use]
    pub fn image_count(&self) -> usize {
        self.image_count
    }

    /// Storage layout.
    #[must_use]
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Whether channel 0 is split across two physical frames.
    #[must_use]
    pub fn sum_first_last(&self) -> bool {
        self.sum_first_last
    }

    /// Expected full oscillations over one foil's channels.
    #[must_use]
    pub fn oscillations(&self) -> f64 {
        self.oscillations
    }

    /// First raw frame of a foil's window, if the foil exists.
    #[must_use]
    pub fn foil_begin(&self, foil: usize) -> Option<usize> {
        self.foil_begin.get(foil).copied()
    }

    /// Flat frame count implied by the layout.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        match self.compression {
            Compression::Pseudo => self.foil_count * self.channels_per_foil,
            Compression::None => self.image_count,
        }
    }

    /// Cells in the whole cube.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.frame_count() * self.pad.pixel_count()
    }

    /// Bytes of the raw cube (u32 per cell).
    #[must_use]
    pub fn byte_len(&self) -> usize {
        self.cell_count() * 4
    }

    /// Sets the foil start-index table.
    pub fn set_foil_begin(&mut self, table: Vec<usize>) {
        self.foil_count = table.len();
        self.foil_begin = table;
    }

    /// Sets the raw frame count (used by geometry guessing at load time).
    pub fn set_image_count(&mut self, count: usize) {
        self.image_count = count;
    }

    /// Sets the frame geometry (used by geometry guessing at load time).
    pub fn set_pad(&mut self, pad: PadConfig) {
        self.pad = pad;
    }

    /// Selects the storage layout.
    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Enables wrap-around summation of the first and last time channel.
    #[must_use]
    pub fn with_sum_first_last(mut self, sum: bool) -> Self {
        self.sum_first_last = sum;
        self
    }

    /// Sets the oscillation count. Non-integral values are accepted but
    /// logged, since the Fourier analysis needs a whole bin.
    #[must_use]
    pub fn with_oscillations(mut self, oscillations: f64) -> Self {
        let oscillations = oscillations.abs();
        if (oscillations - oscillations.floor()).abs() > f64::EPSILON {
            log::warn!(
                "oscillation count {oscillations} is not an integer; \
                 Fourier-based analysis will be off-bin"
            );
        }
        self.oscillations = oscillations;
        self
    }

    /// Replaces the foil start table.
    #[must_use]
    pub fn with_foil_begin(mut self, table: Vec<usize>) -> Self {
        self.set_foil_begin(table);
        self
    }

    /// Checks internal consistency of the layout.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if the foil table does not match
    /// the foil count, is not monotonically increasing, or a foil window
    /// (including the wrap-around frame, when enabled) falls outside the
    /// raw frame count.
    pub fn validate(&self) -> Result<()> {
        self.pad.validate()?;

        if self.foil_count == 0 || self.channels_per_foil == 0 {
            return Err(Error::InvalidConfig(
                "foil count and channels per foil must be nonzero".into(),
            ));
        }

        if self.compression == Compression::Pseudo {
            return Ok(());
        }

        if self.foil_begin.len() != self.foil_count {
            return Err(Error::InvalidConfig(format!(
                "foil table has {} entries for {} foils",
                self.foil_begin.len(),
                self.foil_count
            )));
        }
        if self.foil_begin.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::InvalidConfig(
                "foil start indices must be monotonically increasing".into(),
            ));
        }

        let window = self.channels_per_foil + usize::from(self.sum_first_last);
        for (foil, &begin) in self.foil_begin.iter().enumerate() {
            if begin + window > self.image_count {
                return Err(Error::InvalidConfig(format!(
                    "foil {foil} window [{begin}, {}) exceeds image count {}",
                    begin + window,
                    self.image_count
                )));
            }
        }
        Ok(())
    }

    /// Clamps a foil index into the valid range.
    #[must_use]
    pub fn clamp_foil(&self, foil: i64) -> usize {
        clamp_into(foil, self.foil_count)
    }

    /// Clamps a time-channel index into the valid range.
    #[must_use]
    pub fn clamp_channel(&self, channel: i64) -> usize {
        clamp_into(channel, self.channels_per_foil)
    }

    /// See [`PadConfig::clamp_region`].
    #[must_use]
    pub fn clamp_region(&self, x0: i64, x1: i64, y0: i64, y1: i64) -> Region {
        self.pad.clamp_region(x0, x1, y0, y1)
    }

    /// The whole frame as a region.
    #[must_use]
    pub fn full_region(&self) -> Region {
        self.pad.full_region()
    }
}

fn clamp_into(v: i64, count: usize) -> usize {
    if v < 0 {
        0
    } else if v as usize >= count {
        count.saturating_sub(1)
    } else {
        v as usize
    }
}

/// Instrument geometry needed for the per-pixel path-length phase
/// correction: detector extent and position relative to the sample, and
/// the modulation frequency of the measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// Detector active length in x, meters.
    pub detector_len_x: f64,
    /// Detector active length in y, meters.
    pub detector_len_y: f64,
    /// Beam-center position on the detector in x, meters.
    pub detector_center_x: f64,
    /// Beam-center position on the detector in y, meters.
    pub detector_center_y: f64,
    /// Sample-detector distance, meters.
    pub sample_distance: f64,
    /// Neutron wavelength, Angstrom.
    pub wavelength: f64,
    /// Modulation angular frequency, rad/s.
    pub modulation_omega: f64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            detector_len_x: 0.2,
            detector_len_y: 0.2,
            detector_center_x: 0.1,
            detector_center_y: 0.1,
            sample_distance: 0.9,
            wavelength: 4.8,
            modulation_omega: 10000.0,
        }
    }
}

impl InstrumentConfig {
    /// Neutron velocity in m/s for the configured wavelength.
    #[must_use]
    pub fn neutron_velocity(&self) -> f64 {
        PLANCK_OVER_NEUTRON_MASS / self.wavelength
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_region_swaps_and_clamps() {
        let pad = PadConfig::new(128, 128);
        let region = pad.clamp_region(100, 20, -5, 400);
        assert_eq!((region.x0, region.x1), (20, 100));
        assert_eq!((region.y0, region.y1), (0, 128));
        assert!(region.was_clamped());
    }

    #[test]
    fn test_clamp_region_is_idempotent() {
        let pad = PadConfig::new(64, 32);
        let first = pad.clamp_region(-10, 90, 40, 8);
        let second = pad.clamp_region(
            first.x0 as i64,
            first.x1 as i64,
            first.y0 as i64,
            first.y1 as i64,
        );
        assert_eq!((first.x0, first.x1, first.y0, first.y1), (
            second.x0, second.x1, second.y0, second.y1
        ));
        assert!(!second.was_clamped());
    }

    #[test]
    fn test_clamp_region_orders_bounds() {
        let pad = PadConfig::new(16, 16);
        for (a, b, c, d) in [(-3, 99, 7, 2), (5, 5, 0, 0), (20, -20, 16, 0)] {
            let r = pad.clamp_region(a, b, c, d);
            assert!(r.x0 <= r.x1 && r.x1 <= 16);
            assert!(r.y0 <= r.y1 && r.y1 <= 16);
        }
    }

    #[test]
    fn test_in_range_region_untouched() {
        let pad = PadConfig::new(128, 128);
        let region = pad.clamp_region(10, 20, 30, 40);
        assert!(!region.was_clamped());
        assert_eq!(region.width(), 10);
        assert_eq!(region.height(), 10);
    }

    #[test]
    fn test_tof_validate_default() {
        TofConfig::default().validate().unwrap();
    }

    #[test]
    fn test_tof_validate_rejects_overrunning_window() {
        let cfg = TofConfig::new(PadConfig::new(4, 4), 2, 16, 24);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_tof_validate_wrap_needs_extra_frame() {
        // 2 foils x 16 channels in exactly 32 frames: fine without the
        // wrap rule, one frame short with it.
        let cfg = TofConfig::new(PadConfig::new(4, 4), 2, 16, 32);
        cfg.validate().unwrap();
        let wrapped = cfg.with_sum_first_last(true);
        assert!(wrapped.validate().is_err());
    }

    #[test]
    fn test_tof_validate_rejects_unsorted_foil_table() {
        let cfg = TofConfig::new(PadConfig::new(4, 4), 3, 8, 64).with_foil_begin(vec![0, 32, 16]);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_clamp_foil_and_channel() {
        let cfg = TofConfig::default();
        assert_eq!(cfg.clamp_foil(-1), 0);
        assert_eq!(cfg.clamp_foil(99), 5);
        assert_eq!(cfg.clamp_channel(16), 15);
        assert_eq!(cfg.clamp_channel(3), 3);
    }

    #[test]
    fn test_frame_count_by_layout() {
        let cfg = TofConfig::default();
        assert_eq!(cfg.frame_count(), 128);
        let pseudo = cfg.with_compression(Compression::Pseudo);
        assert_eq!(pseudo.frame_count(), 6 * 16);
    }

    #[test]
    fn test_neutron_velocity() {
        let instr = InstrumentConfig::default();
        // 4.8 A neutrons travel at roughly 824 m/s.
        assert!((instr.neutron_velocity() - 824.2).abs() < 1.0);
    }
}
