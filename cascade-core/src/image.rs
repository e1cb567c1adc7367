//! 2-D spatial maps derived from PAD images and TOF cubes.
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]

use crate::shared::SharedBuffer;
use crate::{Error, Result};

/// Payload of a derived image: raw counts or floating-point values
/// (phase/contrast maps), never both.
#[derive(Debug, Clone)]
pub enum ImageData {
    Counts(SharedBuffer<u32>),
    Values(SharedBuffer<f64>),
}

/// A 2-D map produced by reducing a cube or weighting a PAD frame.
///
/// Clones share the pixel buffer. The min/max cache and the coordinate
/// of the maximum are refreshed explicitly with [`DerivedImage::update_range`].
#[derive(Debug, Clone)]
pub struct DerivedImage {
    width: usize,
    height: usize,
    data: ImageData,
    min: f64,
    max: f64,
    max_coord: (usize, usize),
}

impl DerivedImage {
    /// Wraps a count map of the given shape.
    ///
    /// # Errors
    /// Returns [`Error::SizeMismatch`] if the buffer length is not
    /// `width * height`.
    pub fn from_counts(width: usize, height: usize, data: SharedBuffer<u32>) -> Result<Self> {
        if data.len() != width * height {
            return Err(Error::SizeMismatch {
                expected: width * height,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data: ImageData::Counts(data),
            min: 0.0,
            max: 0.0,
            max_coord: (0, 0),
        })
    }

    /// Wraps a floating-point map of the given shape.
    ///
    /// # Errors
    /// Returns [`Error::SizeMismatch`] if the buffer length is not
    /// `width * height`.
    pub fn from_values(width: usize, height: usize, data: SharedBuffer<f64>) -> Result<Self> {
        if data.len() != width * height {
            return Err(Error::SizeMismatch {
                expected: width * height,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data: ImageData::Values(data),
            min: 0.0,
            max: 0.0,
            max_coord: (0, 0),
        })
    }

    /// Map width in pixels.
    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Map height in pixels.
    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    /// The payload.
    #[must_use]
    pub fn data(&self) -> &ImageData {
        &self.data
    }

    /// Value at `(x, y)` as a double; 0 out of bounds.
    #[must_use]
    pub fn value(&self, x: usize, y: usize) -> f64 {
        if x >= self.width || y >= self.height {
            return 0.0;
        }
        match &self.data {
            ImageData::Counts(buf) => f64::from(buf.as_slice()[y * self.width + x]),
            ImageData::Values(buf) => buf.as_slice()[y * self.width + x],
        }
    }

    /// Value at `(x, y)` truncated to counts; 0 out of bounds.
    #[must_use]
    pub fn counts_value(&self, x: usize, y: usize) -> u32 {
        if x >= self.width || y >= self.height {
            return 0;
        }
        match &self.data {
            ImageData::Counts(buf) => buf.as_slice()[y * self.width + x],
            ImageData::Values(buf) => buf.as_slice()[y * self.width + x].max(0.0) as u32,
        }
    }

    /// Recomputes the min/max cache and the coordinate of the maximum.
    pub fn update_range(&mut self) {
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
        for y in 0..self.height {
            for x in 0..self.width {
                let v = self.value(x, y);
                if v > self.max {
                    self.max = v;
                    self.max_coord = (x, y);
                }
                self.min = self.min.min(v);
            }
        }
        if self.width * self.height == 0 {
            self.min = 0.0;
            self.max = 0.0;
        }
    }

    /// Cached minimum.
    #[must_use]
    pub fn min(&self) -> f64 {
        self.min
    }

    /// Cached maximum.
    #[must_use]
    pub fn max(&self) -> f64 {
        self.max
    }

    /// Coordinate of the cached maximum.
    #[must_use]
    pub fn max_coord(&self) -> (usize, usize) {
        self.max_coord
    }

    /// Adds `other` cell-wise into this image.
    ///
    /// The result buffer is rebuilt, so aliases of the previous payload
    /// are unaffected. Count maps stay counts; anything else promotes to
    /// floating point.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] (and logs it) when the shapes
    /// differ; the image is left unchanged.
    pub fn add_assign(&mut self, other: &DerivedImage) -> Result<()> {
        if self.width != other.width || self.height != other.height {
            log::error!(
                "refusing to sum images of different shapes: {}x{} vs {}x{}",
                self.width,
                self.height,
                other.width,
                other.height
            );
            return Err(Error::ShapeMismatch {
                expected_w: self.width,
                expected_h: self.height,
                actual_w: other.width,
                actual_h: other.height,
            });
        }

        let summed = match (&self.data, &other.data) {
            (ImageData::Counts(a), ImageData::Counts(b)) => {
                let counts: Vec<u32> = a
                    .iter()
                    .zip(b.iter())
                    .map(|(&x, &y)| x.saturating_add(y))
                    .collect();
                ImageData::Counts(SharedBuffer::from_vec(counts))
            }
            _ => {
                let values: Vec<f64> = (0..self.height)
                    .flat_map(|y| (0..self.width).map(move |x| (x, y)))
                    .map(|(x, y)| self.value(x, y) + other.value(x, y))
                    .collect();
                ImageData::Values(SharedBuffer::from_vec(values))
            }
        };
        self.data = summed;
        Ok(())
    }

    /// Integrates the map into radial bins of width `dr` around a
    /// center, weighting boundary pixels by their ring coverage. With
    /// `angular_mean` each bin is divided by its ring area, turning the
    /// profile into a mean radial slice.
    #[must_use]
    pub fn radial_profile(&self, cx: f64, cy: f64, dr: f64, angular_mean: bool) -> Vec<f64> {
        use crate::roi::RoiElement;
        use std::f64::consts::PI;

        let max_radius = ((self.width as f64 / 2.0).powi(2)
            + (self.height as f64 / 2.0).powi(2))
        .sqrt();
        let steps = (max_radius / dr) as usize;

        let mut profile = Vec::with_capacity(steps);
        for step in 0..steps {
            let inner = step as f64 * dr;
            let outer = (step + 1) as f64 * dr;
            let ring = RoiElement::CircleRing {
                cx,
                cy,
                inner,
                outer,
            };

            let mut sum = 0.0;
            for y in 0..self.height {
                for x in 0..self.width {
                    let fraction = ring.coverage(x, y);
                    if fraction > 0.0 {
                        sum += fraction * self.value(x, y);
                    }
                }
            }
            if angular_mean {
                sum /= (outer * outer - inner * inner) * PI;
            }
            profile.push(sum);
        }
        profile
    }

    /// Rebuilds the payload with `f` applied to every value, promoting to
    /// floating point.
    pub fn map_values(&mut self, f: impl Fn(f64) -> f64) {
        let mapped: Vec<f64> = (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| (x, y)))
            .map(|(x, y)| f(self.value(x, y)))
            .collect();
        self.data = ImageData::Values(SharedBuffer::from_vec(mapped));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn counts_image(width: usize, height: usize, counts: Vec<u32>) -> DerivedImage {
        DerivedImage::from_counts(width, height, SharedBuffer::from_vec(counts)).unwrap()
    }

    #[test]
    fn test_shape_checked_construction() {
        let result = DerivedImage::from_counts(4, 4, SharedBuffer::from_vec(vec![0u32; 15]));
        assert!(matches!(result, Err(Error::SizeMismatch { .. })));
    }

    #[test]
    fn test_value_out_of_bounds_is_zero() {
        let img = counts_image(2, 2, vec![1, 2, 3, 4]);
        assert_relative_eq!(img.value(1, 1), 4.0);
        assert_relative_eq!(img.value(2, 0), 0.0);
        assert_relative_eq!(img.value(0, 2), 0.0);
    }

    #[test]
    fn test_update_range_tracks_max_coord() {
        let mut img = counts_image(3, 2, vec![5, 1, 2, 9, 4, 3]);
        img.update_range();
        assert_relative_eq!(img.min(), 1.0);
        assert_relative_eq!(img.max(), 9.0);
        assert_eq!(img.max_coord(), (0, 1));
    }

    #[test]
    fn test_add_assign_counts() {
        let mut a = counts_image(2, 1, vec![1, 2]);
        let b = counts_image(2, 1, vec![10, 20]);
        a.add_assign(&b).unwrap();
        assert_eq!(a.counts_value(0, 0), 11);
        assert_eq!(a.counts_value(1, 0), 22);
    }

    #[test]
    fn test_add_assign_rejects_shape_mismatch() {
        let mut a = counts_image(2, 1, vec![1, 2]);
        let b = counts_image(1, 2, vec![1, 2]);
        assert!(a.add_assign(&b).is_err());
        assert_eq!(a.counts_value(0, 0), 1);
    }

    #[test]
    fn test_radial_profile_conserves_counts() {
        // A flat field integrated over all rings recovers (nearly) the
        // total, since every pixel falls into exactly one ring.
        let img = counts_image(8, 8, vec![3; 64]);
        let profile = img.radial_profile(4.0, 4.0, 1.0, false);
        let integrated: f64 = profile.iter().sum();
        assert!((integrated - 3.0 * 64.0).abs() < 3.0 * 64.0 * 0.05);
    }

    #[test]
    fn test_map_values_promotes() {
        let mut img = counts_image(2, 1, vec![350, 10]);
        img.map_values(|v| v % 360.0);
        assert_relative_eq!(img.value(0, 0), 350.0);
        assert!(matches!(img.data(), ImageData::Values(_)));
    }
}
