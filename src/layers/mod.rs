//! # Layer aggregation
//!
//! Partition a [`DensitySurface`] into [`LAYER_COUNT`] nested bands and derive,
//! for each band, its pixel area, the number of CNOs attributable to it and the
//! corresponding density per unit physical area.
//!
//! ## Bands
//! -----------------
//! With `levels = linspace(0, max, 26)`, band `j` is the set of cells whose value
//! is `>= levels[j]`. Bands are cumulative: band `j` contains band `j + 1`, and
//! band 0 covers the whole grid.
//!
//! ## Accounting policies
//! -----------------
//! * [`DensityPolicy::HardMembership`]: a detection belongs to band `j` if the
//!   surface value at its integer pixel location is `>= levels[j]`. Counts are
//!   integral.
//! * [`DensityPolicy::ProbabilityMass`]: band `j` receives the share
//!   `mass_j / mass_total` of the `n` detections, where `mass_j` is the sum of the
//!   surface over the band. Counts are rounded to 2 decimals.
//!
//! In both cases `density = count / pixel_area × pixels_per_µm²`, rounded to 4
//! decimals, and an empty band has zero count and zero density.
//!
//! ## Unanalyzable samples
//! -----------------
//! Samples the density engine cannot handle are carried as
//! [`LayerStatistics::Unanalyzable`]; the NaN representation only appears when
//! flattening into output columns.
use crate::{
    config::{DensityPolicy, ScaleSettings},
    constants::{round_to, PixelCoord, DENSITY_INDEX_BANDS, LAYER_COUNT},
    kde::surface::DensitySurface,
};

/// Statistics of one density band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layer {
    /// Lower density threshold of the band.
    pub threshold: f64,
    /// Number of cells with a value `>= threshold`.
    pub pixel_area: usize,
    /// CNOs attributed to the band.
    pub object_count: f64,
    /// CNOs per µm².
    pub density: f64,
}

/// Per-sample layer statistics.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerStatistics {
    Analyzed([Layer; LAYER_COUNT]),
    Unanalyzable,
}

impl LayerStatistics {
    pub fn is_analyzed(&self) -> bool {
        matches!(self, LayerStatistics::Analyzed(_))
    }

    pub fn layers(&self) -> Option<&[Layer; LAYER_COUNT]> {
        match self {
            LayerStatistics::Analyzed(layers) => Some(layers),
            LayerStatistics::Unanalyzable => None,
        }
    }

    fn column(&self, field: impl Fn(&Layer) -> f64) -> [f64; LAYER_COUNT] {
        match self {
            LayerStatistics::Analyzed(layers) => std::array::from_fn(|j| field(&layers[j])),
            LayerStatistics::Unanalyzable => [f64::NAN; LAYER_COUNT],
        }
    }

    /// Pixel area of every band, NaN when unanalyzable.
    pub fn areas(&self) -> [f64; LAYER_COUNT] {
        self.column(|l| l.pixel_area as f64)
    }

    /// Object count of every band, NaN when unanalyzable.
    pub fn counts(&self) -> [f64; LAYER_COUNT] {
        self.column(|l| l.object_count)
    }

    /// Density of every band, NaN when unanalyzable.
    pub fn densities(&self) -> [f64; LAYER_COUNT] {
        self.column(|l| l.density)
    }

    /// Mean density of the bands in [`DENSITY_INDEX_BANDS`], rounded to 4 decimals.
    pub fn density_index(&self) -> Option<f64> {
        let layers = self.layers()?;
        let sum: f64 = DENSITY_INDEX_BANDS.iter().map(|&j| layers[j].density).sum();
        Some(round_to(sum / DENSITY_INDEX_BANDS.len() as f64, 4))
    }
}

/// Computes [`LayerStatistics`] under a fixed policy and physical scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerAggregator {
    policy: DensityPolicy,
    pixels_per_um2: f64,
}

impl LayerAggregator {
    pub fn new(policy: DensityPolicy, scale: &ScaleSettings) -> Self {
        LayerAggregator {
            policy,
            pixels_per_um2: scale.pixels_per_um2(),
        }
    }

    pub fn policy(&self) -> DensityPolicy {
        self.policy
    }

    /// Aggregate a fitted surface.
    ///
    /// Arguments
    /// -----------------
    /// * `surface`: density evaluated on the image grid.
    /// * `centers`: integer pixel locations `(x, y)` of the `n` detections the
    ///   surface was fitted on.
    ///
    /// Return
    /// ----------
    /// * Always [`LayerStatistics::Analyzed`]; the 25 bands ordered by increasing threshold.
    pub fn aggregate(&self, surface: &DensitySurface, centers: &[PixelCoord]) -> LayerStatistics {
        let levels = surface.levels();
        let layers = match self.policy {
            DensityPolicy::HardMembership => {
                let center_values: Vec<f64> = centers
                    .iter()
                    .filter_map(|&(x, y)| surface.get(x, y))
                    .collect();
                std::array::from_fn(|j| {
                    let threshold = levels[j];
                    let pixel_area = surface.cells_at_or_above(threshold);
                    let count = center_values.iter().filter(|&&v| v >= threshold).count() as f64;
                    self.layer(threshold, pixel_area, count)
                })
            }
            DensityPolicy::ProbabilityMass => {
                let n = centers.len() as f64;
                let total_mass = surface.total_mass();
                std::array::from_fn(|j| {
                    let threshold = levels[j];
                    let (pixel_area, mass) = surface
                        .values()
                        .iter()
                        .filter(|&&v| v >= threshold)
                        .fold((0usize, 0.0), |(area, mass), &v| (area + 1, mass + v));
                    let share = mass / total_mass * n;
                    let layer = self.layer(threshold, pixel_area, share);
                    Layer {
                        object_count: round_to(layer.object_count, 2),
                        ..layer
                    }
                })
            }
        };
        LayerStatistics::Analyzed(layers)
    }

    /// Density of `count` objects spread over `pixel_area` cells; empty bands get 0.
    fn layer(&self, threshold: f64, pixel_area: usize, count: f64) -> Layer {
        if pixel_area == 0 {
            return Layer {
                threshold,
                pixel_area,
                object_count: 0.0,
                density: 0.0,
            };
        }
        Layer {
            threshold,
            pixel_area,
            object_count: count,
            density: round_to(count / pixel_area as f64 * self.pixels_per_um2, 4),
        }
    }
}

#[cfg(test)]
mod layers_test {
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    use super::*;

    /// 4×4 surface with values 1..=16 laid out row by row.
    fn ramp() -> DensitySurface {
        DensitySurface::from_matrix(DMatrix::from_fn(4, 4, |r, c| (r * 4 + c + 1) as f64)).unwrap()
    }

    #[test]
    fn test_nested_areas() {
        let agg = LayerAggregator::new(DensityPolicy::HardMembership, &ScaleSettings::default());
        let stats = agg.aggregate(&ramp(), &[(0, 0), (3, 3)]);
        let areas = stats.areas();
        assert_eq!(areas[0], 16.0);
        assert!(areas.windows(2).all(|w| w[0] >= w[1]));
        // top band threshold is the maximum itself
        assert_eq!(areas[24], 1.0);
    }

    #[test]
    fn test_hard_membership_counts() {
        let scale = ScaleSettings::default();
        let agg = LayerAggregator::new(DensityPolicy::HardMembership, &scale);
        // (3, 3) holds the maximum, (0, 0) the minimum; (9, 9) is off-grid
        let stats = agg.aggregate(&ramp(), &[(0, 0), (3, 3), (3, 3), (9, 9)]);
        let layers = stats.layers().unwrap();

        assert_eq!(layers[0].object_count, 3.0);
        assert_eq!(layers[24].object_count, 2.0);
        assert_eq!(layers[24].pixel_area, 1);
        assert_eq!(layers[24].density, round_to(2.0 * 655.36, 4));
        assert_eq!(layers[0].density, round_to(3.0 / 16.0 * 655.36, 4));
    }

    #[test]
    fn test_probability_mass_band_zero() {
        let agg = LayerAggregator::new(DensityPolicy::ProbabilityMass, &ScaleSettings::default());
        let centers: Vec<PixelCoord> = (0..7).map(|i| (i % 4, i / 4)).collect();
        let stats = agg.aggregate(&ramp(), &centers);
        let layers = stats.layers().unwrap();

        assert_eq!(layers[0].object_count, 7.0);
        assert_relative_eq!(layers[0].density, 7.0 / 16.0 * 655.36, epsilon = 1e-4);
        // top band: single cell holding 16 / 136 of the mass
        assert_eq!(layers[24].object_count, round_to(16.0 / 136.0 * 7.0, 2));
        assert!(stats.counts().windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_unanalyzable_columns() {
        let stats = LayerStatistics::Unanalyzable;
        assert!(stats.areas().iter().all(|v| v.is_nan()));
        assert!(stats.counts().iter().all(|v| v.is_nan()));
        assert!(stats.densities().iter().all(|v| v.is_nan()));
        assert_eq!(stats.density_index(), None);
    }

    #[test]
    fn test_density_index() {
        let mut layers = [Layer {
            threshold: 0.0,
            pixel_area: 1,
            object_count: 1.0,
            density: 0.0,
        }; LAYER_COUNT];
        layers[16].density = 1.0;
        layers[17].density = 2.0;
        layers[18].density = 4.0;
        let stats = LayerStatistics::Analyzed(layers);
        assert_eq!(stats.density_index(), Some(2.3333));
    }
}
