//! # Analysis configuration
//!
//! This module defines [`AnalysisConfig`], the single configuration object handed to
//! [`CnoPipeline`](crate::pipeline::CnoPipeline) at construction, together with its
//! fluent builder and its TOML loader.
//!
//! ## Purpose
//!
//! Every tunable of the analysis lives here instead of in process-wide state:
//!
//! - where the scan sessions are (`[path]`),
//! - which detector output to consume and at which confidence (`[model]`),
//! - the bandwidth grid and cross-validation limits (`[kde]`),
//! - the layer accounting policy (`[density]`),
//! - whether and how large the visualization artifacts are (`[render]`),
//! - the pixel ↔ micrometer reference scale (`[scale]`).
//!
//! ## File layout
//!
//! ```toml
//! [path]
//! source = "/data/afm"
//!
//! [model]
//! name = "yolov8s-cno"
//! labels_dir = "/data/labels"
//! conf_threshold = 0.5
//!
//! [density]
//! policy = "hard-membership"
//! ```
//!
//! All sections other than `[path]` and `[model]` are optional and fall back to the
//! defaults documented on each field.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cno_kde::config::{AnalysisConfig, DensityPolicy};
//!
//! let config = AnalysisConfig::builder()
//!     .source("/data/afm")
//!     .model_name("yolov8s-cno")
//!     .labels_dir("/data/labels")
//!     .conf_threshold(0.4)
//!     .policy(DensityPolicy::HardMembership)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.kde.max_folds, 7);
//! ```
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::{
    cno_errors::CnoError,
    constants::{
        BANDWIDTH_CANDIDATES, BANDWIDTH_MAX, BANDWIDTH_MIN, IOU_THRESHOLD, MAX_DETECTIONS,
        MAX_FOLDS, MIN_DETECTIONS, REFERENCE_PIXELS, SCAN_WIDTH_UM,
    },
    detections::DetectionParams,
};

/// Layer accounting policy used by the aggregator.
///
/// * `HardMembership` – a band counts the detection centers lying on one of its cells.
/// * `ProbabilityMass` – a band counts its share of the total KDE mass, scaled by `n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DensityPolicy {
    HardMembership,
    #[default]
    ProbabilityMass,
}

impl fmt::Display for DensityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DensityPolicy::HardMembership => write!(f, "hard-membership"),
            DensityPolicy::ProbabilityMass => write!(f, "probability-mass"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Root directory holding one subfolder per scan session.
    pub source: Utf8PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Detector name, used in artifact file names.
    pub name: String,
    /// Directory with the detector's per-image label files.
    pub labels_dir: Utf8PathBuf,
    /// Minimum detection confidence in `[0, 1]`.
    pub conf_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdeSettings {
    pub bandwidth_min: f64,
    pub bandwidth_max: f64,
    pub bandwidth_candidates: usize,
    pub max_folds: usize,
    pub min_detections: usize,
}

impl Default for KdeSettings {
    fn default() -> Self {
        KdeSettings {
            bandwidth_min: BANDWIDTH_MIN,
            bandwidth_max: BANDWIDTH_MAX,
            bandwidth_candidates: BANDWIDTH_CANDIDATES,
            max_folds: MAX_FOLDS,
            min_detections: MIN_DETECTIONS,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensitySettings {
    pub policy: DensityPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Write visualization artifacts next to the results.
    pub enabled: bool,
    /// Side length (pixels) of the KDE and scatter images.
    pub output_size: u32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        RenderSettings {
            enabled: true,
            output_size: 800,
        }
    }
}

/// Mapping between image pixels and physical micrometers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleSettings {
    pub reference_pixels: u32,
    pub scan_width_um: f64,
}

impl Default for ScaleSettings {
    fn default() -> Self {
        ScaleSettings {
            reference_pixels: REFERENCE_PIXELS,
            scan_width_um: SCAN_WIDTH_UM,
        }
    }
}

impl ScaleSettings {
    /// Number of reference pixels per square micrometer (`512² / 400` by default).
    pub fn pixels_per_um2(&self) -> f64 {
        let side = self.reference_pixels as f64;
        side * side / (self.scan_width_um * self.scan_width_um)
    }

    /// Physical area (µm²) of one reference pixel.
    pub fn um2_per_pixel(&self) -> f64 {
        1.0 / self.pixels_per_um2()
    }
}

/// Configuration of a full analysis run.
///
/// Built either from a TOML file ([`AnalysisConfig::from_file`]) or programmatically
/// through [`AnalysisConfig::builder`]. Both paths go through [`AnalysisConfig::validate`].
///
/// Validation
/// -----------------
/// * `0 ≤ model.conf_threshold ≤ 1`
/// * `0 < kde.bandwidth_min ≤ kde.bandwidth_max`, `kde.bandwidth_candidates ≥ 1`
/// * `kde.max_folds ≥ 2`, `kde.min_detections ≥ 5` (below five points the bandwidth search is unstable)
/// * `render.output_size ≥ 16`
/// * `scale.reference_pixels > 0`, `scale.scan_width_um > 0`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub path: PathSettings,
    pub model: ModelSettings,
    #[serde(default)]
    pub kde: KdeSettings,
    #[serde(default)]
    pub density: DensitySettings,
    #[serde(default)]
    pub render: RenderSettings,
    #[serde(default)]
    pub scale: ScaleSettings,
}

impl AnalysisConfig {
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder::new()
    }

    /// Load and validate a configuration from a TOML file.
    ///
    /// Arguments
    /// -----------------
    /// * `path`: location of the TOML file.
    ///
    /// Return
    /// ----------
    /// * The validated configuration, or a [`CnoError`] if the file cannot be read,
    ///   parsed, or fails validation.
    pub fn from_file(path: impl AsRef<Utf8Path>) -> Result<Self, CnoError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, CnoError> {
        let config: AnalysisConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CnoError> {
        let invalid = |msg: String| -> Result<(), CnoError> { Err(CnoError::InvalidConfig(msg)) };

        if !(0.0..=1.0).contains(&self.model.conf_threshold) {
            return invalid(format!(
                "conf_threshold must be in [0, 1], got {}",
                self.model.conf_threshold
            ));
        }
        if !(self.kde.bandwidth_min > 0.0 && self.kde.bandwidth_min <= self.kde.bandwidth_max) {
            return invalid(format!(
                "bandwidth range must satisfy 0 < min <= max, got [{}, {}]",
                self.kde.bandwidth_min, self.kde.bandwidth_max
            ));
        }
        if self.kde.bandwidth_candidates == 0 {
            return invalid("bandwidth_candidates must be at least 1".into());
        }
        if self.kde.max_folds < 2 {
            return invalid(format!("max_folds must be at least 2, got {}", self.kde.max_folds));
        }
        if self.kde.min_detections < MIN_DETECTIONS {
            return invalid(format!(
                "min_detections must be at least {MIN_DETECTIONS}, got {}",
                self.kde.min_detections
            ));
        }
        if self.render.output_size < 16 {
            return invalid(format!(
                "render.output_size must be at least 16, got {}",
                self.render.output_size
            ));
        }
        if self.scale.reference_pixels == 0 || self.scale.scan_width_um <= 0.0 {
            return invalid("scale must have positive reference_pixels and scan_width_um".into());
        }
        Ok(())
    }

    /// Detector parameters derived from the model section and the fixed detector constants.
    pub fn detection_params(&self) -> DetectionParams {
        DetectionParams {
            confidence_threshold: self.model.conf_threshold,
            iou_threshold: IOU_THRESHOLD,
            max_detections: MAX_DETECTIONS,
        }
    }
}

/// Builder for [`AnalysisConfig`], with validation.
#[derive(Debug, Clone)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl Default for AnalysisConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalysisConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AnalysisConfig {
                path: PathSettings {
                    source: Utf8PathBuf::from("."),
                },
                model: ModelSettings {
                    name: "cno".into(),
                    labels_dir: Utf8PathBuf::from("labels"),
                    conf_threshold: 0.5,
                },
                kde: KdeSettings::default(),
                density: DensitySettings::default(),
                render: RenderSettings::default(),
                scale: ScaleSettings::default(),
            },
        }
    }

    // --- Paths / model ---
    pub fn source(mut self, v: impl Into<Utf8PathBuf>) -> Self {
        self.config.path.source = v.into();
        self
    }
    pub fn model_name(mut self, v: impl Into<String>) -> Self {
        self.config.model.name = v.into();
        self
    }
    pub fn labels_dir(mut self, v: impl Into<Utf8PathBuf>) -> Self {
        self.config.model.labels_dir = v.into();
        self
    }
    pub fn conf_threshold(mut self, v: f64) -> Self {
        self.config.model.conf_threshold = v;
        self
    }

    // --- Bandwidth search ---
    pub fn bandwidth_range(mut self, min: f64, max: f64) -> Self {
        self.config.kde.bandwidth_min = min;
        self.config.kde.bandwidth_max = max;
        self
    }
    pub fn bandwidth_candidates(mut self, v: usize) -> Self {
        self.config.kde.bandwidth_candidates = v;
        self
    }
    pub fn max_folds(mut self, v: usize) -> Self {
        self.config.kde.max_folds = v;
        self
    }
    pub fn min_detections(mut self, v: usize) -> Self {
        self.config.kde.min_detections = v;
        self
    }

    // --- Output ---
    pub fn policy(mut self, v: DensityPolicy) -> Self {
        self.config.density.policy = v;
        self
    }
    pub fn render(mut self, v: bool) -> Self {
        self.config.render.enabled = v;
        self
    }
    pub fn output_size(mut self, v: u32) -> Self {
        self.config.render.output_size = v;
        self
    }
    pub fn scale(mut self, reference_pixels: u32, scan_width_um: f64) -> Self {
        self.config.scale = ScaleSettings {
            reference_pixels,
            scan_width_um,
        };
        self
    }

    pub fn build(self) -> Result<AnalysisConfig, CnoError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod config_test {
    use super::*;

    const MINIMAL: &str = r#"
[path]
source = "/data/afm"

[model]
name = "yolov8s-cno"
labels_dir = "/data/labels"
conf_threshold = 0.5
"#;

    #[test]
    fn test_minimal_file_uses_defaults() {
        let config = AnalysisConfig::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.path.source, Utf8PathBuf::from("/data/afm"));
        assert_eq!(config.kde, KdeSettings::default());
        assert_eq!(config.density.policy, DensityPolicy::ProbabilityMass);
        assert!(config.render.enabled);
        assert_eq!(config.scale.pixels_per_um2(), 655.36);
    }

    #[test]
    fn test_policy_section() {
        let content = format!("{MINIMAL}\n[density]\npolicy = \"hard-membership\"\n");
        let config = AnalysisConfig::from_toml_str(&content).unwrap();
        assert_eq!(config.density.policy, DensityPolicy::HardMembership);
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let err = AnalysisConfig::builder().conf_threshold(1.5).build().unwrap_err();
        assert!(matches!(err, CnoError::InvalidConfig(_)));

        let err = AnalysisConfig::builder()
            .bandwidth_range(60.0, 20.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, CnoError::InvalidConfig(_)));

        let err = AnalysisConfig::builder().max_folds(1).build().unwrap_err();
        assert!(matches!(err, CnoError::InvalidConfig(_)));
    }

    #[test]
    fn test_min_detections_floor() {
        let err = AnalysisConfig::builder().min_detections(4).build().unwrap_err();
        assert!(matches!(err, CnoError::InvalidConfig(_)));

        let config = AnalysisConfig::builder().min_detections(5).build().unwrap();
        assert_eq!(config.kde.min_detections, MIN_DETECTIONS);
    }

    #[test]
    fn test_missing_model_section_is_a_parse_error() {
        let err = AnalysisConfig::from_toml_str("[path]\nsource = \"x\"\n").unwrap_err();
        assert!(matches!(err, CnoError::TomlError(_)));
    }

    #[test]
    fn test_detection_params() {
        let config = AnalysisConfig::builder().conf_threshold(0.25).build().unwrap();
        let params = config.detection_params();
        assert_eq!(params.confidence_threshold, 0.25);
        assert_eq!(params.iou_threshold, 0.5);
        assert_eq!(params.max_detections, 1200);
    }
}
