//! Single-frame PAD images.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use crate::config::{PadConfig, Region};
use crate::image::DerivedImage;
use crate::roi::Roi;
use crate::shared::SharedBuffer;
use crate::{Error, Result};
use rand::Rng;

/// One 2-D frame of unsigned counts over the detector area.
///
/// The buffer length always matches the configured geometry. The min/max
/// cache is refreshed explicitly with [`PadImage::update_range`] after
/// bulk writes; accessors never panic on out-of-range coordinates.
#[derive(Debug, Clone)]
pub struct PadImage {
    config: PadConfig,
    data: Vec<u32>,
    min: u32,
    max: u32,
    roi: Roi,
    use_roi: bool,
}

impl PadImage {
    /// Creates a zero-filled frame.
    ///
    /// # Errors
    /// Returns [`Error::AllocationFailure`] if the buffer cannot be
    /// reserved.
    pub fn zeroed(config: &PadConfig) -> Result<Self> {
        let len = config.pixel_count();
        let mut data = Vec::new();
        if data.try_reserve_exact(len).is_err() {
            log::error!("could not allocate PAD buffer of {len} counts");
            return Err(Error::AllocationFailure { len });
        }
        data.resize(len, 0);
        Ok(Self {
            config: *config,
            data,
            min: 0,
            max: 0,
            roi: Roi::new(),
            use_roi: false,
        })
    }

    /// Takes ownership of an already-decoded count buffer.
    ///
    /// # Errors
    /// Returns [`Error::SizeMismatch`] if the buffer length disagrees
    /// with the geometry.
    pub fn from_counts(config: &PadConfig, data: Vec<u32>) -> Result<Self> {
        if data.len() != config.pixel_count() {
            return Err(Error::SizeMismatch {
                expected: config.pixel_count(),
                actual: data.len(),
            });
        }
        let mut image = Self {
            config: *config,
            data,
            min: 0,
            max: 0,
            roi: Roi::new(),
            use_roi: false,
        };
        image.update_range();
        Ok(image)
    }

    /// Decodes a little-endian raw frame. Trailing bytes beyond the
    /// frame are ignored here; undersized input is a size mismatch.
    ///
    /// # Errors
    /// Returns [`Error::SizeMismatch`] if fewer than `width*height`
    /// 32-bit words are present.
    pub fn from_bytes(config: &PadConfig, bytes: &[u8]) -> Result<Self> {
        let expected = config.byte_len();
        if bytes.len() < expected {
            return Err(Error::SizeMismatch {
                expected: config.pixel_count(),
                actual: bytes.len() / 4,
            });
        }
        let data = bytes[..expected]
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect();
        Self::from_counts(config, data)
    }

    /// Frame geometry.
    #[must_use]
    pub fn config(&self) -> &PadConfig {
        &self.config
    }

    /// Frame width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        self.config.width()
    }

    /// Frame height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        self.config.height()
    }

    /// Raw counts, row-major.
    #[must_use]
    pub fn raw(&self) -> &[u32] {
        &self.data
    }

    /// Counts at `(x, y)`; 0 out of bounds.
    #[must_use]
    pub fn data(&self, x: usize, y: usize) -> u32 {
        if x < self.width() && y < self.height() {
            self.data[y * self.width() + x]
        } else {
            0
        }
    }

    /// Writes counts at `(x, y)`; a no-op out of bounds.
    pub fn set_data(&mut self, x: usize, y: usize, counts: u32) {
        if x < self.width() && y < self.height() {
            let w = self.width();
            self.data[y * w + x] = counts;
        }
    }

    /// Recomputes the cached count range.
    pub fn update_range(&mut self) {
        self.min = self.data.iter().copied().min().unwrap_or(0);
        self.max = self.data.iter().copied().max().unwrap_or(0);
    }

    /// Cached minimum count.
    #[must_use]
    pub fn min(&self) -> u32 {
        self.min
    }

    /// Cached maximum count.
    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Enables or disables ROI filtering.
    pub fn use_roi(&mut self, use_roi: bool) {
        self.use_roi = use_roi;
    }

    /// True if ROI filtering is enabled.
    #[must_use]
    pub fn roi_enabled(&self) -> bool {
        self.use_roi
    }

    /// The current ROI.
    #[must_use]
    pub fn roi(&self) -> &Roi {
        &self.roi
    }

    /// Mutable access to the ROI.
    pub fn roi_mut(&mut self) -> &mut Roi {
        &mut self.roi
    }

    /// Replaces the ROI.
    pub fn set_roi(&mut self, roi: Roi) {
        self.roi = roi;
    }

    /// Counts at `(x, y)` weighted by the fractional ROI coverage of the
    /// pixel; unweighted when ROI filtering is off.
    #[must_use]
    pub fn data_in_roi(&self, x: usize, y: usize) -> f64 {
        let counts = f64::from(self.data(x, y));
        if self.use_roi {
            counts * self.roi.how_much_inside(x, y)
        } else {
            counts
        }
    }

    /// Total counts. With ROI filtering enabled the scan is restricted to
    /// the ROI bounding rectangle and every pixel is weighted by its
    /// covered fraction.
    #[must_use]
    pub fn counts(&self) -> u64 {
        let (x0, y0, x1, y1) = if self.use_roi {
            self.roi.pixel_bounds(self.width(), self.height())
        } else {
            (0, 0, self.width(), self.height())
        };

        let mut total = 0.0;
        for y in y0..y1 {
            for x in x0..x1 {
                total += self.data_in_roi(x, y);
            }
        }
        total as u64
    }

    /// Raw counts inside a caller-supplied rectangle (clamped).
    #[must_use]
    pub fn counts_in_region(&self, x0: i64, x1: i64, y0: i64, y1: i64) -> u64 {
        let region = self.config.clamp_region(x0, x1, y0, y1);
        self.counts_in(&region)
    }

    fn counts_in(&self, region: &Region) -> u64 {
        let mut total = 0u64;
        for y in region.y0..region.y1 {
            for x in region.x0..region.x1 {
                total += u64::from(self.data(x, y));
            }
        }
        total
    }

    /// ROI counts with a uniform background estimated from the area
    /// outside the ROI subtracted, clamped at zero.
    ///
    /// Each pixel contributes its covered fraction to the inside tally
    /// and the remainder to the outside tally. If the outside area is
    /// numerically zero the subtraction is skipped with a warning.
    #[must_use]
    pub fn counts_subtract_background(&self) -> u64 {
        let mut inside = 0.0;
        let mut outside = 0.0;
        let mut area_inside = 0.0;
        let mut area_outside = 0.0;

        for y in 0..self.height() {
            for x in 0..self.width() {
                let fraction = self.roi.how_much_inside(x, y);
                let counts = f64::from(self.data(x, y));
                inside += counts * fraction;
                outside += counts * (1.0 - fraction);
                area_inside += fraction;
                area_outside += 1.0 - fraction;
            }
        }

        if area_outside.abs() < f64::EPSILON {
            log::warn!("area outside ROI is 0, skipping background subtraction");
            return inside as u64;
        }

        let to_subtract = outside / area_outside * area_inside;
        if to_subtract >= inside {
            0
        } else {
            (inside - to_subtract) as u64
        }
    }

    /// The frame with every pixel weighted by its ROI coverage.
    ///
    /// # Errors
    /// Propagates allocation failure from the shared-buffer pool.
    pub fn roi_weighted_image(&self) -> Result<DerivedImage> {
        let mut weighted = Vec::new();
        if weighted.try_reserve_exact(self.data.len()).is_err() {
            log::error!("could not allocate ROI-weighted image");
            return Err(Error::AllocationFailure {
                len: self.data.len(),
            });
        }
        for y in 0..self.height() {
            for x in 0..self.width() {
                weighted.push(self.data_in_roi(x, y) as u32);
            }
        }
        DerivedImage::from_counts(self.width(), self.height(), SharedBuffer::from_vec(weighted))
    }

    /// Fills the frame with a synthetic Gaussian beam spot: one 2-D peak
    /// over a flat offset, with ±10% multiplicative jitter on every
    /// parameter. Useful for demos and tests without detector hardware.
    pub fn generate_random(&mut self, rng: &mut impl Rng) {
        let width = self.width();
        let height = self.height();
        for y in 0..height {
            for x in 0..width {
                let mut jitter = |v: f64| v + rng.gen_range(-1.0..1.0) * v * 0.1;

                let px = jitter(x as f64);
                let py = jitter(y as f64);
                let center_x = jitter(0.5 * width as f64);
                let center_y = jitter(0.5 * height as f64);
                let spread_x = jitter((0.5 * width as f64).sqrt());
                let spread_y = jitter((0.5 * height as f64).sqrt());
                let amp = jitter(10000.0);
                let offset = jitter(10.0);

                let peak = amp
                    * (-0.5 * (px - center_x) * (px - center_x) / (spread_x * spread_x)).exp()
                    * (-0.5 * (py - center_y) * (py - center_y) / (spread_y * spread_y)).exp();

                self.set_data(x, y, (peak + offset).max(0.0) as u32);
            }
        }
        self.update_range();
    }
}
