//! # Spatial density engine
//!
//! Turns the detection centers of one image into a continuous density surface.
//!
//! ## Pipeline overview
//!
//! 1. **Bandwidth selection**
//!    A k-fold cross-validated grid search ([`bandwidth::BandwidthSearch`]) scores every
//!    candidate bandwidth by its mean held-out log-likelihood and keeps the first
//!    maximum. The fold count is `min(n, max_folds)`, so small samples degrade to
//!    leave-one-out.
//!
//! 2. **Refit**
//!    A Gaussian [`KernelDensity`] is fitted on all `n` centers with the selected bandwidth.
//!
//! 3. **Surface evaluation**
//!    The density is evaluated at every integer pixel of the `H × W` image grid
//!    ([`surface::DensitySurface`]), then partitioned into 25 nested levels.
//!
//! ## Example
//!
//! ```rust,no_run
//! use nalgebra::Point2;
//! use cno_kde::config::KdeSettings;
//! use cno_kde::kde::DensityEngine;
//!
//! let points: Vec<_> = (0..20)
//!     .map(|i| Point2::new((i % 5) as f64 * 15.0 + 20.0, (i / 5) as f64 * 15.0 + 20.0))
//!     .collect();
//! let engine = DensityEngine::new(&KdeSettings::default());
//! let fit = engine.run(&points, 100, 100).unwrap();
//! println!("bandwidth = {:.2}", fit.bandwidth);
//! ```
use std::f64::consts::TAU;

use tracing::debug;

use crate::{
    cno_errors::CnoError,
    config::KdeSettings,
    constants::{Pixel, PixelPoint},
    pipeline::progress_bar::fmt_dur,
};

pub mod bandwidth;
pub mod folds;
pub mod surface;

use bandwidth::BandwidthSearch;
use surface::DensitySurface;

/// Gaussian kernel density estimate over 2-D points with a Euclidean metric.
///
/// The log density at `p` is
///
/// ```text
/// log f(p) = logsumexp_i( -|p - x_i|² / (2h²) ) - ln n - ln(2π) - 2 ln h
/// ```
///
/// which integrates to one over the plane.
#[derive(Debug, Clone)]
pub struct KernelDensity {
    points: Vec<PixelPoint>,
    bandwidth: Pixel,
    inv_two_h2: f64,
    log_norm: f64,
}

impl KernelDensity {
    /// Fit the estimator on `points` with the given bandwidth.
    ///
    /// Return
    /// ----------
    /// * [`CnoError::DegenerateDensity`] if `points` is empty, contains a non-finite
    ///   coordinate, or `bandwidth` is not strictly positive and finite.
    pub fn fit(points: &[PixelPoint], bandwidth: Pixel) -> Result<Self, CnoError> {
        if points.is_empty() {
            return Err(CnoError::DegenerateDensity("no points to fit".into()));
        }
        if !(bandwidth.is_finite() && bandwidth > 0.0) {
            return Err(CnoError::DegenerateDensity(format!(
                "invalid bandwidth {bandwidth}"
            )));
        }
        if points.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
            return Err(CnoError::DegenerateDensity(
                "non-finite point coordinate".into(),
            ));
        }

        let n = points.len() as f64;
        Ok(KernelDensity {
            points: points.to_vec(),
            bandwidth,
            inv_two_h2: 1.0 / (2.0 * bandwidth * bandwidth),
            log_norm: -n.ln() - TAU.ln() - 2.0 * bandwidth.ln(),
        })
    }

    pub fn bandwidth(&self) -> Pixel {
        self.bandwidth
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn log_density(&self, at: &PixelPoint) -> f64 {
        // logsumexp: the largest exponent is the nearest point
        let min_d2 = self
            .points
            .iter()
            .map(|p| (p - at).norm_squared())
            .fold(f64::INFINITY, f64::min);
        let shift = -min_d2 * self.inv_two_h2;

        let sum: f64 = self
            .points
            .iter()
            .map(|p| (-(p - at).norm_squared() * self.inv_two_h2 - shift).exp())
            .sum();

        shift + sum.ln() + self.log_norm
    }

    pub fn density(&self, at: &PixelPoint) -> f64 {
        self.log_density(at).exp()
    }

    /// Total log-likelihood of `points` under the fitted density.
    pub fn score(&self, points: &[PixelPoint]) -> f64 {
        points.iter().map(|p| self.log_density(p)).sum()
    }
}

/// Result of running the density engine on one image.
#[derive(Debug, Clone)]
pub struct DensityFit {
    /// Selected bandwidth (pixels).
    pub bandwidth: Pixel,
    /// Number of cross-validation folds used for the selection.
    pub folds: usize,
    pub surface: DensitySurface,
}

/// Bandwidth selection + refit + surface evaluation.
#[derive(Debug, Clone)]
pub struct DensityEngine {
    search: BandwidthSearch,
    min_detections: usize,
}

impl DensityEngine {
    pub fn new(settings: &KdeSettings) -> Self {
        DensityEngine {
            search: BandwidthSearch::from_settings(settings),
            min_detections: settings.min_detections,
        }
    }

    /// Fit a density surface over an `height × width` pixel grid.
    ///
    /// Arguments
    /// -----------------
    /// * `points`: detection centers in pixel space.
    /// * `height`, `width`: grid dimensions (rows, columns).
    ///
    /// Return
    /// ----------
    /// * [`CnoError::TooFewDetections`] if fewer than `min_detections` points are given,
    /// * [`CnoError::DegenerateDensity`] / [`CnoError::UnfitSurfaceCell`] for numerical failures,
    /// * the selected bandwidth, fold count and surface otherwise.
    pub fn run(
        &self,
        points: &[PixelPoint],
        height: usize,
        width: usize,
    ) -> Result<DensityFit, CnoError> {
        if points.len() < self.min_detections {
            return Err(CnoError::TooFewDetections {
                found: points.len(),
                required: self.min_detections,
            });
        }

        let started = std::time::Instant::now();
        let choice = self.search.select(points)?;
        debug!(
            "optimal bandwidth={:.2} ({}-fold cross-validation): {}",
            choice.bandwidth,
            choice.folds,
            fmt_dur(started.elapsed())
        );

        let kde = KernelDensity::fit(points, choice.bandwidth)?;
        let surface = DensitySurface::evaluate(&kde, height, width)?;

        Ok(DensityFit {
            bandwidth: choice.bandwidth,
            folds: choice.folds,
            surface,
        })
    }
}
