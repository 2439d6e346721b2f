//! Cross-validated bandwidth selection.
//!
//! Every candidate bandwidth is scored by the mean, over the folds, of the
//! held-out log-likelihood of the test fold under a KDE fitted on the training
//! folds. The first candidate reaching the maximum score wins. Candidates are
//! independent of each other and are scored in parallel; the result does not
//! depend on the thread count.
use rayon::prelude::*;

use crate::{
    cno_errors::CnoError,
    config::KdeSettings,
    constants::{Pixel, PixelPoint},
};

use super::{
    folds::{FoldSplit, KFold},
    KernelDensity,
};

/// `count` evenly spaced values over `[start, stop]`, endpoints included.
pub fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (count - 1) as f64;
            (0..count)
                .map(|i| {
                    if i == count - 1 {
                        stop
                    } else {
                        start + i as f64 * step
                    }
                })
                .collect()
        }
    }
}

/// Outcome of a bandwidth search.
#[derive(Debug, Clone, PartialEq)]
pub struct BandwidthChoice {
    pub bandwidth: Pixel,
    pub folds: usize,
    /// Mean held-out log-likelihood of each candidate, in candidate order.
    pub scores: Vec<f64>,
}

/// Grid search over candidate bandwidths.
#[derive(Debug, Clone, PartialEq)]
pub struct BandwidthSearch {
    candidates: Vec<Pixel>,
    max_folds: usize,
}

impl BandwidthSearch {
    pub fn new(candidates: Vec<Pixel>, max_folds: usize) -> Self {
        BandwidthSearch {
            candidates,
            max_folds,
        }
    }

    pub fn from_settings(settings: &KdeSettings) -> Self {
        Self::new(
            linspace(
                settings.bandwidth_min,
                settings.bandwidth_max,
                settings.bandwidth_candidates,
            ),
            settings.max_folds,
        )
    }

    pub fn candidates(&self) -> &[Pixel] {
        &self.candidates
    }

    /// Fold count used for a sample of `n` points.
    pub fn folds_for(&self, n: usize) -> usize {
        n.min(self.max_folds)
    }

    /// Select the bandwidth maximizing the mean held-out log-likelihood.
    ///
    /// Return
    /// ----------
    /// * [`CnoError::DegenerateDensity`] if no candidate produces a finite score
    ///   (or there are too few points to form two folds),
    /// * the winning bandwidth with all candidate scores otherwise.
    pub fn select(&self, points: &[PixelPoint]) -> Result<BandwidthChoice, CnoError> {
        let folds = self.folds_for(points.len());
        if folds < 2 {
            return Err(CnoError::DegenerateDensity(format!(
                "{} points are not enough for cross-validation",
                points.len()
            )));
        }
        let splits = KFold::new(folds)?.split(points.len())?;

        let scores: Vec<f64> = self
            .candidates
            .par_iter()
            .map(|&h| cross_validated_score(points, &splits, h))
            .collect();

        let mut best: Option<(usize, f64)> = None;
        for (idx, &score) in scores.iter().enumerate() {
            if !score.is_finite() {
                continue;
            }
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((idx, score)),
            }
        }

        let (idx, _) = best.ok_or_else(|| {
            CnoError::DegenerateDensity("no candidate bandwidth has a finite score".into())
        })?;

        Ok(BandwidthChoice {
            bandwidth: self.candidates[idx],
            folds,
            scores,
        })
    }
}

/// Mean over folds of the held-out log-likelihood, `NaN` if any fold fails.
fn cross_validated_score(points: &[PixelPoint], splits: &[FoldSplit], bandwidth: Pixel) -> f64 {
    let mut total = 0.0;
    for split in splits {
        let train: Vec<PixelPoint> = split.train.iter().map(|&i| points[i]).collect();
        let test: Vec<PixelPoint> = split.test.iter().map(|&i| points[i]).collect();
        match KernelDensity::fit(&train, bandwidth) {
            Ok(kde) => total += kde.score(&test),
            Err(_) => return f64::NAN,
        }
    }
    total / splits.len() as f64
}

#[cfg(test)]
mod bandwidth_test {
    use nalgebra::Point2;

    use super::*;

    #[test]
    fn test_linspace() {
        let grid = linspace(20.0, 60.0, 41);
        assert_eq!(grid.len(), 41);
        assert_eq!(grid[0], 20.0);
        assert_eq!(grid[1], 21.0);
        assert_eq!(grid[40], 60.0);
        assert_eq!(linspace(3.0, 9.0, 1), vec![3.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
    }

    #[test]
    fn test_select_is_deterministic() {
        let points: Vec<PixelPoint> = (0..20)
            .map(|i| Point2::new(((i * 37) % 100) as f64, ((i * 61) % 100) as f64))
            .collect();
        let search = BandwidthSearch::from_settings(&KdeSettings::default());
        let first = search.select(&points).unwrap();
        let second = search.select(&points).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.folds, 7);
        assert_eq!(first.scores.len(), 41);
        assert!(search.candidates().contains(&first.bandwidth));
    }

    #[test]
    fn test_first_maximum_wins_ties() {
        // identical candidates score identically; the first index must be reported
        let points: Vec<PixelPoint> = (0..6).map(|i| Point2::new(i as f64 * 3.0, 0.0)).collect();
        let search = BandwidthSearch::new(vec![5.0, 5.0, 5.0], 7);
        let choice = search.select(&points).unwrap();
        assert_eq!(choice.bandwidth, 5.0);
        assert_eq!(choice.folds, 6);
        assert_eq!(choice.scores[0], choice.scores[2]);
    }

    #[test]
    fn test_tight_cluster_prefers_small_bandwidth() {
        let points: Vec<PixelPoint> = (0..10)
            .map(|i| Point2::new(50.0 + (i % 2) as f64, 50.0 + (i / 2) as f64))
            .collect();
        let choice = BandwidthSearch::from_settings(&KdeSettings::default())
            .select(&points)
            .unwrap();
        assert_eq!(choice.bandwidth, 20.0);
    }
}
