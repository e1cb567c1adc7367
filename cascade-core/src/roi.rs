//! Region-of-interest geometry with fractional pixel coverage.
//!
//! A ROI is an ordered union of named primitive shapes. Containment is
//! decided at the pixel center; boundary pixels are weighted by the
//! fraction of their unit cell the ROI covers instead of being hard
//! included or excluded.
#![allow(clippy::cast_precision_loss)]

use serde::{Deserialize, Serialize};

/// Sub-sampling grid used for coverage of curved and polygonal shapes.
/// Rectangles are computed exactly.
const COVERAGE_SAMPLES: usize = 16;

/// Axis-aligned bounding box in detector coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoundingBox {
    fn union(self, other: Self) -> Self {
        Self {
            x_min: self.x_min.min(other.x_min),
            y_min: self.y_min.min(other.y_min),
            x_max: self.x_max.max(other.x_max),
            y_max: self.y_max.max(other.y_max),
        }
    }
}

/// A geometric ROI primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum RoiElement {
    /// Axis-aligned rectangle spanning `[x0, x1) x [y0, y1)`.
    Rect { x0: f64, y0: f64, x1: f64, y1: f64 },
    /// Filled circle.
    Circle { cx: f64, cy: f64, radius: f64 },
    /// Annulus between two radii.
    CircleRing {
        cx: f64,
        cy: f64,
        inner: f64,
        outer: f64,
    },
    /// Simple polygon, implicitly closed.
    Polygon { points: Vec<[f64; 2]> },
}

impl RoiElement {
    /// True if the point lies inside the shape.
    #[must_use]
    pub fn contains(&self, px: f64, py: f64) -> bool {
        match self {
            Self::Rect { x0, y0, x1, y1 } => {
                let (xa, xb) = minmax(*x0, *x1);
                let (ya, yb) = minmax(*y0, *y1);
                px >= xa && px < xb && py >= ya && py < yb
            }
            Self::Circle { cx, cy, radius } => dist(px - cx, py - cy) <= *radius,
            Self::CircleRing {
                cx,
                cy,
                inner,
                outer,
            } => {
                let d = dist(px - cx, py - cy);
                d >= *inner && d <= *outer
            }
            Self::Polygon { points } => polygon_contains(points, px, py),
        }
    }

    /// Fraction of the unit pixel cell `[x, x+1) x [y, y+1)` the shape
    /// covers, in `[0, 1]`.
    #[must_use]
    pub fn coverage(&self, x: usize, y: usize) -> f64 {
        match self {
            Self::Rect { x0, y0, x1, y1 } => {
                let (xa, xb) = minmax(*x0, *x1);
                let (ya, yb) = minmax(*y0, *y1);
                let cell_x0 = x as f64;
                let cell_y0 = y as f64;
                let dx = (xb.min(cell_x0 + 1.0) - xa.max(cell_x0)).max(0.0);
                let dy = (yb.min(cell_y0 + 1.0) - ya.max(cell_y0)).max(0.0);
                dx * dy
            }
            _ => {
                let n = COVERAGE_SAMPLES;
                let mut hit = 0usize;
                for j in 0..n {
                    for i in 0..n {
                        let sx = x as f64 + (i as f64 + 0.5) / n as f64;
                        let sy = y as f64 + (j as f64 + 0.5) / n as f64;
                        if self.contains(sx, sy) {
                            hit += 1;
                        }
                    }
                }
                hit as f64 / (n * n) as f64
            }
        }
    }

    /// Axis-aligned bounding box of the shape.
    #[must_use]
    pub fn bounding_box(&self) -> BoundingBox {
        match self {
            Self::Rect { x0, y0, x1, y1 } => {
                let (xa, xb) = minmax(*x0, *x1);
                let (ya, yb) = minmax(*y0, *y1);
                BoundingBox {
                    x_min: xa,
                    y_min: ya,
                    x_max: xb,
                    y_max: yb,
                }
            }
            Self::Circle { cx, cy, radius } => BoundingBox {
                x_min: cx - radius,
                y_min: cy - radius,
                x_max: cx + radius,
                y_max: cy + radius,
            },
            Self::CircleRing { cx, cy, outer, .. } => BoundingBox {
                x_min: cx - outer,
                y_min: cy - outer,
                x_max: cx + outer,
                y_max: cy + outer,
            },
            Self::Polygon { points } => {
                let mut bb = BoundingBox {
                    x_min: f64::INFINITY,
                    y_min: f64::INFINITY,
                    x_max: f64::NEG_INFINITY,
                    y_max: f64::NEG_INFINITY,
                };
                for p in points {
                    bb.x_min = bb.x_min.min(p[0]);
                    bb.y_min = bb.y_min.min(p[1]);
                    bb.x_max = bb.x_max.max(p[0]);
                    bb.y_max = bb.y_max.max(p[1]);
                }
                bb
            }
        }
    }
}

fn minmax(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

fn dist(dx: f64, dy: f64) -> f64 {
    (dx * dx + dy * dy).sqrt()
}

/// Even-odd ray cast; the polygon is implicitly closed.
fn polygon_contains(points: &[[f64; 2]], px: f64, py: f64) -> bool {
    if points.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = points.len() - 1;
    for i in 0..points.len() {
        let (xi, yi) = (points[i][0], points[i][1]);
        let (xj, yj) = (points[j][0], points[j][1]);
        if ((yi > py) != (yj > py)) && px < (xj - xi) * (py - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// One named element of a ROI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedElement {
    pub name: String,
    #[serde(flatten)]
    pub element: RoiElement,
}

/// A region of interest: the union of an ordered list of named elements.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    elements: Vec<NamedElement>,
}

impl Roi {
    /// Creates an empty ROI.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a named element.
    pub fn add(&mut self, name: impl Into<String>, element: RoiElement) {
        self.elements.push(NamedElement {
            name: name.into(),
            element,
        });
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// True if the ROI has no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// The named elements in order.
    #[must_use]
    pub fn elements(&self) -> &[NamedElement] {
        &self.elements
    }

    /// True if the center of pixel `(x, y)` lies in the union.
    #[must_use]
    pub fn is_inside(&self, x: usize, y: usize) -> bool {
        let px = x as f64 + 0.5;
        let py = y as f64 + 0.5;
        self.elements.iter().any(|e| e.element.contains(px, py))
    }

    /// Covered fraction of the unit cell of pixel `(x, y)`.
    ///
    /// Overlapping elements saturate at full coverage.
    #[must_use]
    pub fn how_much_inside(&self, x: usize, y: usize) -> f64 {
        self.elements
            .iter()
            .map(|e| e.element.coverage(x, y))
            .fold(0.0, f64::max)
            .min(1.0)
    }

    /// Union of the element bounding boxes, clamped into the given frame
    /// and rounded outward to whole pixels. Empty ROIs cover nothing.
    #[must_use]
    pub fn pixel_bounds(&self, width: usize, height: usize) -> (usize, usize, usize, usize) {
        let Some(bb) = self
            .elements
            .iter()
            .map(|e| e.element.bounding_box())
            .reduce(BoundingBox::union)
        else {
            return (0, 0, 0, 0);
        };

        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let clamp = |v: f64, dim: usize| -> usize {
            if v <= 0.0 {
                0
            } else if v >= dim as f64 {
                dim
            } else {
                v as usize
            }
        };
        (
            clamp(bb.x_min.floor(), width),
            clamp(bb.y_min.floor(), height),
            clamp(bb.x_max.ceil(), width),
            clamp(bb.y_max.ceil(), height),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_aligned_rect_coverage_is_binary() {
        let rect = RoiElement::Rect {
            x0: 2.0,
            y0: 3.0,
            x1: 6.0,
            y1: 7.0,
        };
        for y in 0..10 {
            for x in 0..10 {
                let c = rect.coverage(x, y);
                assert!(
                    c == 0.0 || c == 1.0,
                    "pixel ({x},{y}) has fractional coverage {c} on an aligned rect"
                );
                let expect = (2..6).contains(&x) && (3..7).contains(&y);
                assert_eq!(c == 1.0, expect);
            }
        }
    }

    #[test]
    fn test_straddling_rect_coverage_is_fractional() {
        let rect = RoiElement::Rect {
            x0: 2.5,
            y0: 0.0,
            x1: 4.0,
            y1: 1.0,
        };
        let c = rect.coverage(2, 0);
        assert!(c > 0.0 && c < 1.0);
        assert_relative_eq!(c, 0.5);
        assert_relative_eq!(rect.coverage(3, 0), 1.0);
        assert_relative_eq!(rect.coverage(4, 0), 0.0);
    }

    #[test]
    fn test_circle_contains_and_coverage() {
        let circle = RoiElement::Circle {
            cx: 8.0,
            cy: 8.0,
            radius: 4.0,
        };
        assert!(circle.contains(8.0, 8.0));
        assert!(!circle.contains(8.0, 12.5));
        // Deep inside the circle: full cell coverage.
        assert_relative_eq!(circle.coverage(7, 7), 1.0);
        // Far outside: none.
        assert_relative_eq!(circle.coverage(0, 0), 0.0);
        // On the rim: partial.
        let rim = circle.coverage(11, 8);
        assert!(rim > 0.0 && rim < 1.0);
    }

    #[test]
    fn test_circle_ring_excludes_center() {
        let ring = RoiElement::CircleRing {
            cx: 10.0,
            cy: 10.0,
            inner: 3.0,
            outer: 6.0,
        };
        assert!(!ring.contains(10.0, 10.0));
        assert!(ring.contains(10.0, 14.0));
        assert!(!ring.contains(10.0, 17.0));
    }

    #[test]
    fn test_polygon_contains() {
        let tri = RoiElement::Polygon {
            points: vec![[0.0, 0.0], [8.0, 0.0], [0.0, 8.0]],
        };
        assert!(tri.contains(1.0, 1.0));
        assert!(!tri.contains(6.0, 6.0));
    }

    #[test]
    fn test_roi_union_and_bounds() {
        let mut roi = Roi::new();
        roi.add(
            "left",
            RoiElement::Rect {
                x0: 1.0,
                y0: 1.0,
                x1: 3.0,
                y1: 3.0,
            },
        );
        roi.add(
            "spot",
            RoiElement::Circle {
                cx: 10.0,
                cy: 10.0,
                radius: 2.0,
            },
        );
        assert!(roi.is_inside(1, 1));
        assert!(roi.is_inside(10, 10));
        assert!(!roi.is_inside(6, 6));

        let (x0, y0, x1, y1) = roi.pixel_bounds(16, 16);
        assert_eq!((x0, y0), (1, 1));
        assert_eq!((x1, y1), (12, 12));
    }

    #[test]
    fn test_empty_roi() {
        let roi = Roi::new();
        assert!(roi.is_empty());
        assert!(!roi.is_inside(0, 0));
        assert_eq!(roi.how_much_inside(0, 0), 0.0);
        assert_eq!(roi.pixel_bounds(128, 128), (0, 0, 0, 0));
    }

    #[test]
    fn test_overlapping_elements_saturate() {
        let mut roi = Roi::new();
        for _ in 0..2 {
            roi.add(
                "dup",
                RoiElement::Rect {
                    x0: 0.0,
                    y0: 0.0,
                    x1: 4.0,
                    y1: 4.0,
                },
            );
        }
        assert_eq!(roi.how_much_inside(2, 2), 1.0);
    }
}
