//! Density surface sampled on the integer pixel grid of an image.
//!
//! The matrix is indexed `(row, col)` = `(y, x)`, matching the image
//! convention (origin top-left, `y` growing downward).
use itertools::iproduct;
use nalgebra::{DMatrix, Point2};
use rayon::prelude::*;

use crate::{
    cno_errors::CnoError,
    constants::{PixelCoord, LAYER_COUNT, UNFIT_CELL},
};

use super::{bandwidth::linspace, KernelDensity};

#[derive(Debug, Clone, PartialEq)]
pub struct DensitySurface {
    values: DMatrix<f64>,
    max: f64,
}

impl DensitySurface {
    /// Evaluate `kde` at every pixel of a `height × width` grid.
    ///
    /// Rows are evaluated in parallel. The grid is seeded with [`UNFIT_CELL`]
    /// and every cell is checked afterwards.
    ///
    /// Return
    /// ----------
    /// * [`CnoError::UnfitSurfaceCell`] if a cell is negative or non-finite after evaluation,
    /// * [`CnoError::DegenerateDensity`] if the grid is empty or its maximum is not
    ///   strictly positive,
    /// * the surface otherwise.
    pub fn evaluate(kde: &KernelDensity, height: usize, width: usize) -> Result<Self, CnoError> {
        if height == 0 || width == 0 {
            return Err(CnoError::DegenerateDensity(format!(
                "empty evaluation grid {height}x{width}"
            )));
        }

        let rows: Vec<Vec<f64>> = (0..height)
            .into_par_iter()
            .map(|y| {
                (0..width)
                    .map(|x| kde.density(&Point2::new(x as f64, y as f64)))
                    .collect()
            })
            .collect();

        let mut values = DMatrix::from_element(height, width, UNFIT_CELL);
        for (y, row) in rows.into_iter().enumerate() {
            for (x, v) in row.into_iter().enumerate() {
                values[(y, x)] = v;
            }
        }

        Self::from_matrix(values)
    }

    /// Wrap precomputed density values, applying the same checks as [`Self::evaluate`].
    pub fn from_matrix(values: DMatrix<f64>) -> Result<Self, CnoError> {
        if values.is_empty() {
            return Err(CnoError::DegenerateDensity("empty density surface".into()));
        }
        for col in 0..values.ncols() {
            for row in 0..values.nrows() {
                let v = values[(row, col)];
                if !v.is_finite() || v < 0.0 {
                    return Err(CnoError::UnfitSurfaceCell { row, col });
                }
            }
        }

        let max = values.max();
        if !(max.is_finite() && max > 0.0) {
            return Err(CnoError::DegenerateDensity(format!(
                "surface maximum {max} is not positive"
            )));
        }
        Ok(DensitySurface { values, max })
    }

    pub fn height(&self) -> usize {
        self.values.nrows()
    }

    pub fn width(&self) -> usize {
        self.values.ncols()
    }

    pub fn values(&self) -> &DMatrix<f64> {
        &self.values
    }

    /// Value at pixel `(x, y)`, `None` outside the grid.
    pub fn get(&self, x: i64, y: i64) -> Option<f64> {
        let (row, col) = (usize::try_from(y).ok()?, usize::try_from(x).ok()?);
        self.values.get((row, col)).copied()
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Sum of the surface over every cell.
    pub fn total_mass(&self) -> f64 {
        self.values.sum()
    }

    /// The `LAYER_COUNT + 1` evenly spaced thresholds `j · max / LAYER_COUNT`.
    ///
    /// The first is exactly `0` and the last exactly `max`.
    pub fn levels(&self) -> Vec<f64> {
        linspace(0.0, self.max, LAYER_COUNT + 1)
    }

    pub fn cells_at_or_above(&self, threshold: f64) -> usize {
        self.values.iter().filter(|&&v| v >= threshold).count()
    }

    /// Filled-contour band of a value: `j` such that `levels[j] <= v < levels[j+1]`,
    /// the maximum itself falling in the last band.
    pub fn band_of(&self, value: f64) -> usize {
        let band = (value / self.max * LAYER_COUNT as f64).floor();
        if band <= 0.0 {
            0
        } else {
            (band as usize).min(LAYER_COUNT - 1)
        }
    }

    /// Pixels `(x, y)` strictly greater than all of their 8 neighbours.
    pub fn local_maxima(&self) -> Vec<PixelCoord> {
        let (h, w) = (self.height() as i64, self.width() as i64);
        let mut maxima = Vec::new();
        for y in 0..h {
            for x in 0..w {
                let v = self.values[(y as usize, x as usize)];
                let is_peak = iproduct!(-1..=1, -1..=1)
                    .filter(|&(dx, dy)| dx != 0 || dy != 0)
                    .filter_map(|(dx, dy)| self.get(x + dx, y + dy))
                    .all(|n| v > n);
                if is_peak {
                    maxima.push((x, y));
                }
            }
        }
        maxima
    }
}
