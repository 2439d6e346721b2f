//! # Detections
//!
//! Data model for the objects produced by the external CNO detector, and the
//! adapter boundary through which they enter the analysis.
//!
//! ## Overview
//! -----------------
//! * [`BoundingBox`] – axis-aligned box in pixel space, center + extents.
//! * [`Detection`] – one detected CNO: its box and the detector confidence.
//! * [`DetectionSet`] – the ordered detections of one image.
//! * [`DetectionParams`] – thresholds applied at the detector boundary.
//! * [`detector::Detector`] – batched detector capability (one call per folder).
//! * [`nms::non_max_suppression`] – greedy IoU suppression used by adapters.
//!
//! ## Conventions
//! -----------------
//! Pixel coordinates have their origin at the top-left corner of the image, `x`
//! growing along columns and `y` along rows. The integer location of a detection
//! (used for KDE fitting and for hard-membership matching) is its center rounded
//! to the nearest integer, ties to even.
use std::ops::Index;

use nalgebra::Point2;

use crate::{
    config::ScaleSettings,
    constants::{round_to, Pixel, PixelCoord, PixelPoint, SquareMicron},
};

pub mod detector;
pub mod nms;

/// Axis-aligned bounding box in pixel space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub center: PixelPoint,
    pub width: Pixel,
    pub height: Pixel,
}

impl BoundingBox {
    pub fn new(cx: Pixel, cy: Pixel, width: Pixel, height: Pixel) -> Self {
        BoundingBox {
            center: Point2::new(cx, cy),
            width,
            height,
        }
    }

    /// Corners as `(x1, y1, x2, y2)`.
    pub fn xyxy(&self) -> (Pixel, Pixel, Pixel, Pixel) {
        let hw = self.width / 2.0;
        let hh = self.height / 2.0;
        (
            self.center.x - hw,
            self.center.y - hh,
            self.center.x + hw,
            self.center.y + hh,
        )
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> f64 {
        let (ax1, ay1, ax2, ay2) = self.xyxy();
        let (bx1, by1, bx2, by2) = other.xyxy();
        let x1 = ax1.max(bx1);
        let y1 = ay1.max(by1);
        let x2 = ax2.min(bx2);
        let y2 = ay2.min(by2);

        if x2 > x1 && y2 > y1 {
            (x2 - x1) * (y2 - y1)
        } else {
            0.0
        }
    }

    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let intersection = self.intersection_area(other);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// One detected corneocyte nano-object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BoundingBox,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Detection {
    pub fn new(cx: Pixel, cy: Pixel, width: Pixel, height: Pixel, confidence: f64) -> Self {
        Detection {
            bbox: BoundingBox::new(cx, cy, width, height),
            confidence,
        }
    }

    /// Integer pixel location of the center, ties rounded to even.
    pub fn pixel(&self) -> PixelCoord {
        (
            self.bbox.center.x.round_ties_even() as i64,
            self.bbox.center.y.round_ties_even() as i64,
        )
    }

    /// Circular-equivalent physical area (µm²) of the bounding box.
    ///
    /// The box is treated as an ellipse inscribed in it (`π·w·h/4` pixels²), then
    /// converted with the reference scale (`(20 µm / 512 px)²` by default).
    pub fn physical_area(&self, scale: &ScaleSettings) -> SquareMicron {
        std::f64::consts::PI * self.bbox.width * self.bbox.height / 4.0 * scale.um2_per_pixel()
    }
}

/// Average and total physical area of a set of detections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AreaSummary {
    pub average: SquareMicron,
    pub total: SquareMicron,
}

/// Ordered detections of one image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionSet {
    detections: Vec<Detection>,
}

impl DetectionSet {
    pub fn new(detections: Vec<Detection>) -> Self {
        DetectionSet { detections }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }

    pub fn pixel_coords(&self) -> Vec<PixelCoord> {
        self.detections.iter().map(Detection::pixel).collect()
    }

    /// Average and total circular-equivalent area, rounded to 4 decimals.
    ///
    /// Return
    /// ----------
    /// * `None` for an empty set.
    pub fn area_summary(&self, scale: &ScaleSettings) -> Option<AreaSummary> {
        if self.detections.is_empty() {
            return None;
        }
        let total: f64 = self.detections.iter().map(|d| d.physical_area(scale)).sum();
        let average = total / self.detections.len() as f64;
        Some(AreaSummary {
            average: round_to(average, 4),
            total: round_to(total, 4),
        })
    }
}

impl Index<usize> for DetectionSet {
    type Output = Detection;

    fn index(&self, index: usize) -> &Self::Output {
        &self.detections[index]
    }
}

impl FromIterator<Detection> for DetectionSet {
    fn from_iter<T: IntoIterator<Item = Detection>>(iter: T) -> Self {
        DetectionSet::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.iter()
    }
}

/// Thresholds applied at the detector boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionParams {
    pub confidence_threshold: f64,
    pub iou_threshold: f64,
    pub max_detections: usize,
}

#[cfg(test)]
mod detections_test {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_xyxy_and_iou() {
        let a = BoundingBox::new(10.0, 10.0, 10.0, 10.0);
        assert_eq!(a.xyxy(), (5.0, 5.0, 15.0, 15.0));

        let b = BoundingBox::new(15.0, 10.0, 10.0, 10.0);
        // overlap 5x10 = 50, union 150
        assert_relative_eq!(a.iou(&b), 50.0 / 150.0);

        let far = BoundingBox::new(100.0, 100.0, 4.0, 4.0);
        assert_eq!(a.iou(&far), 0.0);
        assert_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_pixel_rounding() {
        let d = Detection::new(10.5, 3.49, 2.0, 2.0, 0.9);
        assert_eq!(d.pixel(), (10, 3));
        assert_eq!(Detection::new(11.5, 12.5, 2.0, 2.0, 0.9).pixel(), (12, 12));
        assert_eq!(Detection::new(-0.5, 7.51, 2.0, 2.0, 0.9).pixel(), (0, 8));
    }

    #[test]
    fn test_physical_area() {
        let scale = ScaleSettings::default();
        let d = Detection::new(0.0, 0.0, 25.6, 25.6, 0.9);
        // 25.6 px = 1 µm at 512 px / 20 µm, so the inscribed disk has area π/4 µm²
        assert_relative_eq!(
            d.physical_area(&scale),
            std::f64::consts::FRAC_PI_4,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_area_summary() {
        let scale = ScaleSettings::default();
        let set: DetectionSet = (0..4)
            .map(|i| Detection::new(i as f64, 0.0, 25.6, 25.6, 0.9))
            .collect();
        let summary = set.area_summary(&scale).unwrap();
        assert_eq!(summary.average, 0.7854);
        assert_eq!(summary.total, 3.1416);
        assert!(DetectionSet::default().area_summary(&scale).is_none());
    }
}
