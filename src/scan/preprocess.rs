//! Height-map preprocessing.
//!
//! ## Steps
//! -----------------
//! 1. **Line leveling**: each scan line is shifted so that its mean equals the
//!    mean of the same line in a σ = 10 Gaussian-blurred copy. This removes the
//!    line-to-line offsets typical of AFM raster scans.
//! 2. **Normalization** to `[0, 1]`.
//! 3. **Pyramid contrast**: for each disk radius in [`CONTRAST_RADII`], the
//!    local 10th and 90th percentiles `m`, `M` are computed over the disk and
//!    the image is stretched to `clip((im − m) / (M − m), 0, 1)`. The stretched
//!    images are averaged over the radii.
//! 4. **Blending**: `enhanced = 0.5 · contrast + 0.5 · im`.
//!
//! Percentile filters use mirrored borders (`d c b a | a b c d | d c b a`).
use image::{ImageBuffer, Luma, RgbImage};
use imageproc::filter::gaussian_blur_f32;
use nalgebra::DMatrix;
use rayon::prelude::*;

use crate::render::colormap::afmhot;

/// Gaussian σ (pixels) of the leveling reference.
pub const LEVELING_SIGMA: f32 = 10.0;

/// Disk radii of the contrast pyramid.
pub const CONTRAST_RADII: [i64; 2] = [9, 15];

/// Local percentiles used as black and white points.
pub const CONTRAST_PERCENTILES: (f64, f64) = (10.0, 90.0);

/// Weight of the contrast-stretched image in the enhanced blend.
pub const CONTRAST_WEIGHT: f64 = 0.5;

/// Leveled height map normalized to `[0, 1]` (rows = scan lines).
#[derive(Debug, Clone, PartialEq)]
pub struct HeightMap {
    values: DMatrix<f64>,
}

impl HeightMap {
    /// Level and normalize raw heights.
    ///
    /// Return
    /// ----------
    /// * `None` for an empty matrix or when the leveled heights are constant.
    pub fn from_raw(raw: &DMatrix<f64>) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }
        let (rows, cols) = raw.shape();

        let blurred = gaussian_blur_f32(&to_gray_f32(raw), LEVELING_SIGMA);
        let mut leveled = raw.clone();
        for r in 0..rows {
            let raw_mean = raw.row(r).mean();
            let blurred_mean =
                (0..cols).map(|c| blurred.get_pixel(c as u32, r as u32).0[0] as f64).sum::<f64>()
                    / cols as f64;
            leveled
                .row_mut(r)
                .apply(|v| *v = *v - raw_mean + blurred_mean);
        }

        let min = leveled.min();
        leveled.apply(|v| *v -= min);
        let max = leveled.max();
        if !(max.is_finite() && max > 0.0) {
            return None;
        }
        leveled.apply(|v| *v /= max);
        Some(HeightMap { values: leveled })
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    /// Local-percentile contrast stretch averaged over [`CONTRAST_RADII`].
    pub fn pyramid_contrast(&self) -> DMatrix<f64> {
        let (rows, cols) = self.values.shape();
        let mut land: DMatrix<f64> = DMatrix::zeros(rows, cols);
        for &radius in &CONTRAST_RADII {
            let (low, high) = percentile_filter_pair(
                &self.values,
                radius,
                CONTRAST_PERCENTILES.0,
                CONTRAST_PERCENTILES.1,
            );
            for c in 0..cols {
                for r in 0..rows {
                    let v = (self.values[(r, c)] - low[(r, c)]) / (high[(r, c)] - low[(r, c)]);
                    land[(r, c)] += if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
                }
            }
        }
        land / CONTRAST_RADII.len() as f64
    }

    pub fn enhanced(&self) -> DMatrix<f64> {
        self.pyramid_contrast() * CONTRAST_WEIGHT + &self.values * (1.0 - CONTRAST_WEIGHT)
    }

    pub fn original_image(&self) -> RgbImage {
        afmhot_image(&self.values)
    }

    pub fn enhanced_image(&self) -> RgbImage {
        afmhot_image(&self.enhanced())
    }
}

fn to_gray_f32(m: &DMatrix<f64>) -> ImageBuffer<Luma<f32>, Vec<f32>> {
    ImageBuffer::from_fn(m.ncols() as u32, m.nrows() as u32, |x, y| {
        Luma([m[(y as usize, x as usize)] as f32])
    })
}

fn afmhot_image(m: &DMatrix<f64>) -> RgbImage {
    RgbImage::from_fn(m.ncols() as u32, m.nrows() as u32, |x, y| {
        afmhot(m[(y as usize, x as usize)])
    })
}

/// Mirror an index into `0..n` (edge sample repeated).
fn reflect(i: i64, n: i64) -> usize {
    let period = 2 * n;
    let k = i.rem_euclid(period);
    (if k < n { k } else { period - 1 - k }) as usize
}

/// Offsets `(dr, dc)` with `dr² + dc² <= radius²`.
pub fn disk_offsets(radius: i64) -> Vec<(i64, i64)> {
    (-radius..=radius)
        .flat_map(|dr| (-radius..=radius).map(move |dc| (dr, dc)))
        .filter(|(dr, dc)| dr * dr + dc * dc <= radius * radius)
        .collect()
}

/// Rank of a percentile within a footprint of `size` samples.
fn percentile_rank(size: usize, percentile: f64) -> usize {
    ((size as f64 * percentile / 100.0) as usize).min(size - 1)
}

/// Local `low` and `high` percentiles over a disk footprint.
pub fn percentile_filter_pair(
    m: &DMatrix<f64>,
    radius: i64,
    low: f64,
    high: f64,
) -> (DMatrix<f64>, DMatrix<f64>) {
    let (rows, cols) = m.shape();
    let offsets = disk_offsets(radius);
    let low_rank = percentile_rank(offsets.len(), low);
    let high_rank = percentile_rank(offsets.len(), high);

    let per_row: Vec<Vec<(f64, f64)>> = (0..rows)
        .into_par_iter()
        .map(|r| {
            let mut window = Vec::with_capacity(offsets.len());
            (0..cols)
                .map(|c| {
                    window.clear();
                    window.extend(offsets.iter().map(|&(dr, dc)| {
                        m[(
                            reflect(r as i64 + dr, rows as i64),
                            reflect(c as i64 + dc, cols as i64),
                        )]
                    }));
                    let (_, lo, upper) = window.select_nth_unstable_by(low_rank, f64::total_cmp);
                    let lo = *lo;
                    // high_rank >= low_rank, so the high percentile lies in `upper`
                    let hi = if high_rank == low_rank {
                        lo
                    } else {
                        *upper.select_nth_unstable_by(high_rank - low_rank - 1, f64::total_cmp).1
                    };
                    (lo, hi)
                })
                .collect()
        })
        .collect();

    let low_m = DMatrix::from_fn(rows, cols, |r, c| per_row[r][c].0);
    let high_m = DMatrix::from_fn(rows, cols, |r, c| per_row[r][c].1);
    (low_m, high_m)
}
