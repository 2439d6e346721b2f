//! # Constants and type definitions for cno_kde
//!
//! This module centralizes the **numeric contracts**, **physical scale factors**, and **common type
//! aliases** used throughout the crate.
//!
//! ## Overview
//!
//! - Layer partitioning of a density surface (number of bands)
//! - Analyzability threshold and cross-validation limits for bandwidth selection
//! - Detector boundary constants (IoU threshold, maximum detections)
//! - Reference scale mapping pixels to micrometers
//! - Type aliases shared by the detection, density and reporting modules
//!
//! These values are part of the output contract: downstream consumers of the
//! result tables rely on 25 layers and on the 512 px / 20 µm reference scale.

use nalgebra::Point2;

// -------------------------------------------------------------------------------------------------
// Density layers
// -------------------------------------------------------------------------------------------------

/// Number of concentric density layers a surface is partitioned into.
pub const LAYER_COUNT: usize = 25;

/// Bands whose densities are averaged into the headline density index.
pub const DENSITY_INDEX_BANDS: [usize; 3] = [16, 17, 18];

/// Placeholder stored in a surface cell before it is evaluated.
///
/// A fitted density is never negative, so any cell still holding this value
/// after evaluation was skipped.
pub const UNFIT_CELL: f64 = -9999.0;

// -------------------------------------------------------------------------------------------------
// Bandwidth selection
// -------------------------------------------------------------------------------------------------

/// Below this many detections a sample is unanalyzable.
pub const MIN_DETECTIONS: usize = 5;

/// Upper bound on the number of cross-validation folds.
pub const MAX_FOLDS: usize = 7;

/// Smallest candidate bandwidth (pixels).
pub const BANDWIDTH_MIN: f64 = 20.0;

/// Largest candidate bandwidth (pixels).
pub const BANDWIDTH_MAX: f64 = 60.0;

/// Number of linearly spaced candidate bandwidths in `[BANDWIDTH_MIN, BANDWIDTH_MAX]`.
pub const BANDWIDTH_CANDIDATES: usize = 41;

// -------------------------------------------------------------------------------------------------
// Detector boundary
// -------------------------------------------------------------------------------------------------

/// IoU above which a lower-confidence box is suppressed.
pub const IOU_THRESHOLD: f64 = 0.5;

/// Maximum number of detections kept per image.
pub const MAX_DETECTIONS: usize = 1200;

// -------------------------------------------------------------------------------------------------
// Physical scale
// -------------------------------------------------------------------------------------------------

/// Side length (pixels) of the reference scan image.
pub const REFERENCE_PIXELS: u32 = 512;

/// Physical side length (µm) covered by the reference scan image.
pub const SCAN_WIDTH_UM: f64 = 20.0;

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Length in pixels
pub type Pixel = f64;

/// Area in square micrometers
pub type SquareMicron = f64;

/// 2-D location in pixel space (`x` = column, `y` = row, origin top-left)
pub type PixelPoint = Point2<f64>;

/// Integer pixel coordinate `(x, y)`
pub type PixelCoord = (i64, i64);

/// Round to a fixed number of decimals, ties to even.
#[inline]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}
