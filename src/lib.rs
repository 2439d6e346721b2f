pub mod cno_errors;
pub mod config;
pub mod constants;
pub mod detections;
pub mod kde;
pub mod layers;
pub mod pipeline;
pub mod render;
pub mod sample;
pub mod scan;

pub use cno_errors::CnoError;
pub use config::{AnalysisConfig, DensityPolicy};
pub use detections::{detector::Detector, Detection, DetectionSet};
pub use kde::{DensityEngine, DensityFit};
pub use layers::{Layer, LayerAggregator, LayerStatistics};
pub use pipeline::{BatchReport, CnoPipeline, FolderReport, SampleAnalyzer};
pub use sample::SampleRecord;
