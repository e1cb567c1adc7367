//! Time-of-flight cubes: stacks of per-foil, per-time-channel frames.
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]

use crate::config::{Compression, Region, TofConfig};
use crate::graph::DerivedGraph;
use crate::image::DerivedImage;
use crate::roi::Roi;
use crate::shared::SharedBuffer;
use crate::{Error, Result};
use rand::Rng;

use std::f64::consts::PI;

/// A stack of 2-D frames indexed by foil and time channel.
///
/// Frames live in one flat buffer; the `(foil, channel)` mapping goes
/// through the configuration's foil table (or the pseudo-compressed
/// layout) and honors the wrap-around summation of the first and last
/// time channel. Clones deep-copy the buffer.
#[derive(Debug, Clone)]
pub struct TofCube {
    config: TofConfig,
    data: Vec<u32>,
    roi: Roi,
    use_roi: bool,
}

impl TofCube {
    /// Creates a zero-filled cube.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] for inconsistent geometry and
    /// [`Error::AllocationFailure`] if the buffer cannot be reserved.
    pub fn zeroed(config: &TofConfig) -> Result<Self> {
        config.validate()?;
        let len = config.cell_count();
        let mut data = Vec::new();
        if data.try_reserve_exact(len).is_err() {
            log::error!("could not allocate TOF buffer of {len} counts");
            return Err(Error::AllocationFailure { len });
        }
        data.resize(len, 0);
        log::info!(
            "new TOF cube: {}x{} pixels, {} foils x {} channels, {} frames, compression {:?}",
            config.width(),
            config.height(),
            config.foil_count(),
            config.channels_per_foil(),
            config.frame_count(),
            config.compression(),
        );
        Ok(Self {
            config: config.clone(),
            data,
            roi: Roi::new(),
            use_roi: false,
        })
    }

    /// Takes ownership of an already-decoded cube buffer.
    ///
    /// # Errors
    /// Returns [`Error::SizeMismatch`] if the buffer length disagrees
    /// with the geometry.
    pub fn from_counts(config: &TofConfig, data: Vec<u32>) -> Result<Self> {
        config.validate()?;
        if data.len() != config.cell_count() {
            return Err(Error::SizeMismatch {
                expected: config.cell_count(),
                actual: data.len(),
            });
        }
        Ok(Self {
            config: config.clone(),
            data,
            roi: Roi::new(),
            use_roi: false,
        })
    }

    /// Decodes a little-endian raw cube. Trailing bytes are ignored;
    /// undersized input is a size mismatch.
    ///
    /// # Errors
    /// Returns [`Error::SizeMismatch`] if fewer than the expected number
    /// of 32-bit words are present.
    pub fn from_bytes(config: &TofConfig, bytes: &[u8]) -> Result<Self> {
        let expected = config.byte_len();
        if bytes.len() < expected {
            return Err(Error::SizeMismatch {
                expected: config.cell_count(),
                actual: bytes.len() / 4,
            });
        }
        let data = bytes[..expected]
            .chunks_exact(4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
            .collect();
        Self::from_counts(config, data)
    }

    /// Cube geometry.
    #[must_use]
    pub fn config(&self) -> &TofConfig {
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

    /// Raw counts, frame-major then row-major.
    #[must_use]
    pub fn raw(&self) -> &[u32] {
        &self.data
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

    /// Counts of a flat frame at `(x, y)`; 0 out of bounds.
    #[must_use]
    pub fn frame_data(&self, frame: usize, x: usize, y: usize) -> u32 {
        if frame < self.config.frame_count() && x < self.width() && y < self.height() {
            let pixels = self.config.pad().pixel_count();
            self.data[frame * pixels + y * self.width() + x]
        } else {
            0
        }
    }

    /// Writes counts of a flat frame at `(x, y)`; a no-op out of bounds.
    pub fn set_frame_data(&mut self, frame: usize, x: usize, y: usize, counts: u32) {
        if frame < self.config.frame_count() && x < self.width() && y < self.height() {
            let pixels = self.config.pad().pixel_count();
            let w = self.width();
            self.data[frame * pixels + y * w + x] = counts;
        }
    }

    /// Flat frame index of `(foil, channel)` under the configured layout,
    /// `None` when either index is out of range.
    fn nominal_frame(&self, foil: usize, channel: usize) -> Option<usize> {
        if foil >= self.config.foil_count() || channel >= self.config.channels_per_foil() {
            return None;
        }
        match self.config.compression() {
            Compression::Pseudo => Some(foil * self.config.channels_per_foil() + channel),
            Compression::None => Some(self.config.foil_begin(foil)? + channel),
        }
    }

    /// Counts at `(foil, channel, x, y)`; 0 out of bounds.
    ///
    /// With wrap-around summation enabled (and the real layout), channel
    /// 0 is the sum of the nominal first frame and the frame one full
    /// cycle later.
    #[must_use]
    pub fn data(&self, foil: usize, channel: usize, x: usize, y: usize) -> u32 {
        let Some(frame) = self.nominal_frame(foil, channel) else {
            return 0;
        };
        let value = self.frame_data(frame, x, y);
        if channel == 0
            && self.config.sum_first_last()
            && self.config.compression() == Compression::None
        {
            value + self.frame_data(frame + self.config.channels_per_foil(), x, y)
        } else {
            value
        }
    }

    /// Writes counts at `(foil, channel, x, y)` into the nominal frame;
    /// a no-op out of bounds.
    pub fn set_data(&mut self, foil: usize, channel: usize, x: usize, y: usize, counts: u32) {
        if let Some(frame) = self.nominal_frame(foil, channel) {
            self.set_frame_data(frame, x, y, counts);
        }
    }

    /// Counts at `(foil, channel, x, y)` weighted by fractional ROI
    /// coverage; unweighted when ROI filtering is off.
    #[must_use]
    pub fn data_in_roi(&self, foil: usize, channel: usize, x: usize, y: usize) -> f64 {
        let counts = f64::from(self.data(foil, channel, x, y));
        if self.use_roi {
            counts * self.roi.how_much_inside(x, y)
        } else {
            counts
        }
    }

    /// Per-channel ROI-weighted sums over a rectangular region for one
    /// foil.
    ///
    /// # Errors
    /// Propagates allocation failure from the shared-buffer pool.
    pub fn graph(&self, x0: i64, x1: i64, y0: i64, y1: i64, foil: i64) -> Result<DerivedGraph> {
        self.graph_impl(x0, x1, y0, y1, foil, false)
    }

    /// Like [`TofCube::graph`] but ignoring any enabled ROI. The per-block
    /// phase/contrast maps reduce over their own rectangles and must not
    /// be additionally masked.
    ///
    /// # Errors
    /// Propagates allocation failure from the shared-buffer pool.
    pub fn graph_unweighted(
        &self,
        x0: i64,
        x1: i64,
        y0: i64,
        y1: i64,
        foil: i64,
    ) -> Result<DerivedGraph> {
        self.graph_impl(x0, x1, y0, y1, foil, true)
    }

    fn graph_impl(
        &self,
        x0: i64,
        x1: i64,
        y0: i64,
        y1: i64,
        foil: i64,
        ignore_roi: bool,
    ) -> Result<DerivedGraph> {
        let region = self.config.clamp_region(x0, x1, y0, y1);
        let foil = self.config.clamp_foil(foil);
        let channels = self.config.channels_per_foil();

        let mut counts = Vec::new();
        if counts.try_reserve_exact(channels).is_err() {
            log::error!("could not allocate graph of {channels} channels");
            return Err(Error::AllocationFailure { len: channels });
        }

        for channel in 0..channels {
            let mut sum = 0.0;
            for y in region.y0..region.y1 {
                for x in region.x0..region.x1 {
                    if ignore_roi {
                        sum += f64::from(self.data(foil, channel, x, y));
                    } else {
                        sum += self.data_in_roi(foil, channel, x, y);
                    }
                }
            }
            counts.push(sum as u32);
        }

        Ok(DerivedGraph::new(
            self.config.clone(),
            SharedBuffer::from_vec(counts),
        ))
    }

    /// Per-channel sums over the whole frame for one foil.
    ///
    /// # Errors
    /// Propagates allocation failure from the shared-buffer pool.
    pub fn foil_graph(&self, foil: i64) -> Result<DerivedGraph> {
        let full = self.config.full_region();
        self.graph(0, full.x1 as i64, 0, full.y1 as i64, foil)
    }

    /// Spatial sum over all foils and channels.
    ///
    /// # Errors
    /// Propagates allocation failure from the shared-buffer pool.
    pub fn overview(&self, only_roi: bool) -> Result<DerivedImage> {
        let mut image = self.blank_counts_image()?;
        for foil in 0..self.config.foil_count() {
            self.accumulate_foil(&mut image, foil, only_roi);
        }
        DerivedImage::from_counts(self.width(), self.height(), SharedBuffer::from_vec(image))
    }

    /// Spatial sum over all channels of one foil.
    ///
    /// # Errors
    /// Propagates allocation failure from the shared-buffer pool.
    pub fn foil_image(&self, foil: i64, only_roi: bool) -> Result<DerivedImage> {
        let foil = self.config.clamp_foil(foil);
        let mut image = self.blank_counts_image()?;
        self.accumulate_foil(&mut image, foil, only_roi);
        DerivedImage::from_counts(self.width(), self.height(), SharedBuffer::from_vec(image))
    }

    fn blank_counts_image(&self) -> Result<Vec<u32>> {
        let len = self.config.pad().pixel_count();
        let mut image = Vec::new();
        if image.try_reserve_exact(len).is_err() {
            log::error!("could not allocate overview image of {len} pixels");
            return Err(Error::AllocationFailure { len });
        }
        image.resize(len, 0);
        Ok(image)
    }

    fn accumulate_foil(&self, image: &mut [u32], foil: usize, only_roi: bool) {
        let width = self.width();
        for channel in 0..self.config.channels_per_foil() {
            for y in 0..self.height() {
                for x in 0..width {
                    let add = if only_roi {
                        self.data_in_roi(foil, channel, x, y) as u32
                    } else {
                        self.data(foil, channel, x, y)
                    };
                    image[y * width + x] += add;
                }
            }
        }
    }

    /// The raw frame of one `(foil, channel)` cut to a region.
    ///
    /// # Errors
    /// Propagates allocation failure from the shared-buffer pool.
    pub fn region_frame(
        &self,
        x0: i64,
        x1: i64,
        y0: i64,
        y1: i64,
        foil: i64,
        channel: i64,
    ) -> Result<DerivedImage> {
        let region = self.config.clamp_region(x0, x1, y0, y1);
        let foil = self.config.clamp_foil(foil);
        let channel = self.config.clamp_channel(channel);

        let len = region.width() * region.height();
        let mut cut = Vec::new();
        if cut.try_reserve_exact(len).is_err() {
            log::error!("could not allocate region frame of {len} pixels");
            return Err(Error::AllocationFailure { len });
        }
        for y in region.y0..region.y1 {
            for x in region.x0..region.x1 {
                cut.push(self.data(foil, channel, x, y));
            }
        }
        DerivedImage::from_counts(region.width(), region.height(), SharedBuffer::from_vec(cut))
    }

    /// Sums the frames selected per `(foil, channel)` in `active`, a
    /// boolean slice of length `foil_count * channels_per_foil`.
    ///
    /// # Errors
    /// Propagates allocation failure from the shared-buffer pool.
    pub fn add_selected(&self, active: &[bool]) -> Result<DerivedImage> {
        let width = self.width();
        let channels = self.config.channels_per_foil();
        let mut image = self.blank_counts_image()?;
        for foil in 0..self.config.foil_count() {
            for channel in 0..channels {
                if !active
                    .get(foil * channels + channel)
                    .copied()
                    .unwrap_or(false)
                {
                    continue;
                }
                for y in 0..self.height() {
                    for x in 0..width {
                        image[y * width + x] += self.data(foil, channel, x, y);
                    }
                }
            }
        }
        DerivedImage::from_counts(self.width(), self.height(), SharedBuffer::from_vec(image))
    }

    /// Sums the frames of the foils set in `foil_bits` restricted to the
    /// channels set in `channel_bits` (bit i = foil/channel i).
    ///
    /// # Errors
    /// Propagates allocation failure from the shared-buffer pool.
    pub fn add_foils(&self, foil_bits: u64, channel_bits: u64) -> Result<DerivedImage> {
        let channels = self.config.channels_per_foil();
        let mut active = vec![false; self.config.foil_count() * channels];
        for foil in 0..self.config.foil_count().min(64) {
            if foil_bits & (1u64 << foil) == 0 {
                continue;
            }
            for channel in 0..channels.min(64) {
                if channel_bits & (1u64 << channel) != 0 {
                    active[foil * channels + channel] = true;
                }
            }
        }
        self.add_selected(&active)
    }

    /// Total counts over the overview, ROI-weighted when enabled.
    ///
    /// # Errors
    /// Propagates allocation failure from the shared-buffer pool.
    pub fn counts(&self) -> Result<u64> {
        let overview = self.overview(false)?;
        Ok(self.weighted_total(&overview))
    }

    /// Total counts of one foil, ROI-weighted when enabled.
    ///
    /// # Errors
    /// Propagates allocation failure from the shared-buffer pool.
    pub fn counts_for_foil(&self, foil: i64) -> Result<u64> {
        let image = self.foil_image(foil, false)?;
        Ok(self.weighted_total(&image))
    }

    fn weighted_total(&self, image: &DerivedImage) -> u64 {
        let (x0, y0, x1, y1) = if self.use_roi {
            self.roi.pixel_bounds(self.width(), self.height())
        } else {
            (0, 0, self.width(), self.height())
        };
        let mut total = 0.0;
        for y in y0..y1 {
            for x in x0..x1 {
                let weight = if self.use_roi {
                    self.roi.how_much_inside(x, y)
                } else {
                    1.0
                };
                total += image.value(x, y) * weight;
            }
        }
        total as u64
    }

    /// Raw counts of the overview inside a caller-supplied rectangle
    /// (clamped).
    ///
    /// # Errors
    /// Propagates allocation failure from the shared-buffer pool.
    pub fn counts_in_region(&self, x0: i64, x1: i64, y0: i64, y1: i64) -> Result<u64> {
        let region = self.config.clamp_region(x0, x1, y0, y1);
        let overview = self.overview(false)?;
        let mut total = 0u64;
        for y in region.y0..region.y1 {
            for x in region.x0..region.x1 {
                total += u64::from(overview.counts_value(x, y));
            }
        }
        Ok(total)
    }

    /// Overview counts with the outside-ROI background estimate
    /// subtracted, clamped at zero; see
    /// [`crate::PadImage::counts_subtract_background`].
    ///
    /// # Errors
    /// Propagates allocation failure from the shared-buffer pool.
    pub fn counts_subtract_background(&self) -> Result<u64> {
        let overview = self.overview(false)?;

        let mut inside = 0.0;
        let mut outside = 0.0;
        let mut area_inside = 0.0;
        let mut area_outside = 0.0;
        for y in 0..self.height() {
            for x in 0..self.width() {
                let fraction = self.roi.how_much_inside(x, y);
                let counts = overview.value(x, y);
                inside += counts * fraction;
                outside += counts * (1.0 - fraction);
                area_inside += fraction;
                area_outside += 1.0 - fraction;
            }
        }

        if area_outside.abs() < f64::EPSILON {
            log::warn!("area outside ROI is 0, skipping background subtraction");
            return Ok(inside as u64);
        }
        let to_subtract = outside / area_outside * area_inside;
        Ok(if to_subtract >= inside {
            0
        } else {
            (inside - to_subtract) as u64
        })
    }

    /// Subtracts `other * multiplier` cell-wise, truncating at zero.
    /// Used for background-run subtraction.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] if the cubes disagree in
    /// geometry.
    pub fn subtract(&mut self, other: &TofCube, multiplier: f64) -> Result<()> {
        if self.config.width() != other.config.width()
            || self.config.height() != other.config.height()
            || self.config.foil_count() != other.config.foil_count()
            || self.config.channels_per_foil() != other.config.channels_per_foil()
        {
            log::error!("refusing to subtract TOF cubes with different geometry");
            return Err(Error::ShapeMismatch {
                expected_w: self.config.width(),
                expected_h: self.config.height(),
                actual_w: other.config.width(),
                actual_h: other.config.height(),
            });
        }

        for foil in 0..self.config.foil_count() {
            for channel in 0..self.config.channels_per_foil() {
                for y in 0..self.height() {
                    for x in 0..self.width() {
                        let this = self.data(foil, channel, x, y);
                        let that = (f64::from(other.data(foil, channel, x, y)) * multiplier) as u32;
                        self.set_data(foil, channel, x, y, this.saturating_sub(that));
                    }
                }
            }
        }
        Ok(())
    }

    /// Fills the cube with a synthetic Gaussian beam spot whose intensity
    /// oscillates over the time channels, with a small phase skew per
    /// foil and ±10% multiplicative jitter throughout.
    pub fn generate_random(&mut self, rng: &mut impl Rng) {
        let width = self.width();
        let height = self.height();
        let foils = self.config.foil_count();
        let channels = self.config.channels_per_foil();
        let oscillations = self.config.oscillations();
        let base_phase = rng.gen_range(0.0..1.0) * 2.0 * PI;

        for channel in 0..channels {
            for y in 0..height {
                for x in 0..width {
                    let mut jitter = |v: f64| v + rng.gen_range(-1.0..1.0) * v * 0.1;

                    let px = jitter(x as f64);
                    let py = jitter(y as f64);
                    let center_x = jitter(0.5 * width as f64);
                    let center_y = jitter(0.5 * height as f64);
                    let spread_x = jitter((0.5 * width as f64).sqrt());
                    let spread_y = jitter((0.5 * height as f64).sqrt());
                    let amp = jitter(100.0);

                    let peak = amp
                        * (-0.5 * (px - center_x) * (px - center_x) / (spread_x * spread_x)).exp()
                        * (-0.5 * (py - center_y) * (py - center_y) / (spread_y * spread_y)).exp();

                    for foil in 0..foils {
                        let foil_phase = 0.1 * foil as f64 / foils as f64 * 2.0 * PI;
                        let modulation = 1.0
                            + (base_phase
                                + foil_phase
                                + 2.0 * PI * channel as f64 * oscillations / channels as f64)
                                .sin();

                        let mut offset = 10.0;
                        offset += rng.gen_range(-1.0..1.0) * offset * 0.1;
                        let mut value = peak * modulation + offset;
                        value += rng.gen_range(-1.0..1.0) * value * 0.1;
                        self.set_data(foil, channel, x, y, value.max(0.0) as u32);
                    }
                }
            }
        }
    }

    /// ROI-weighted per-channel series of one pixel, as doubles. Helper
    /// for the per-pixel phase correction.
    #[must_use]
    pub fn channel_series(&self, foil: usize, x: usize, y: usize) -> Vec<f64> {
        (0..self.config.channels_per_foil())
            .map(|channel| f64::from(self.data(foil, channel, x, y)))
            .collect()
    }

    /// Writes a per-channel series back into one pixel, rounding to
    /// whole counts and clamping negative values at zero.
    pub fn set_channel_series(&mut self, foil: usize, x: usize, y: usize, series: &[f64]) {
        for (channel, &value) in series.iter().enumerate() {
            self.set_data(foil, channel, x, y, value.max(0.0).round() as u32);
        }
    }

    /// The clamped region helper, re-exported for reduction drivers.
    #[must_use]
    pub fn clamp_region(&self, x0: i64, x1: i64, y0: i64, y1: i64) -> Region {
        self.config.clamp_region(x0, x1, y0, y1)
    }
}
