use camino::Utf8PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CnoError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unable to create directory {path}: {source}")]
    DirectoryCreation {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("UTF-8 Path error: {0}")]
    Utf8PathError(String),

    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("Invalid result table: {0}")]
    InvalidCsv(String),

    #[error("Unable to parse TOML configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Too few detections for density estimation: found {found}, required {required}")]
    TooFewDetections { found: usize, required: usize },

    #[error("Degenerate density estimate: {0}")]
    DegenerateDensity(String),

    #[error("Density surface cell ({row}, {col}) was not evaluated")]
    UnfitSurfaceCell { row: usize, col: usize },

    #[error("Detector failure: {0}")]
    DetectorFailure(String),

    #[error("Malformed label in {path} at line {line}: {reason}")]
    MalformedLabel {
        path: Utf8PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Unable to decode raw scan {path}: {reason}")]
    ScanDecode { path: Utf8PathBuf, reason: String },

    #[error("Unable to read the system clock: {0}")]
    ClockError(String),
}

impl CnoError {
    /// Whether the error makes a single sample unanalyzable rather than failing the batch.
    pub fn is_unanalyzable(&self) -> bool {
        matches!(
            self,
            CnoError::TooFewDetections { .. }
                | CnoError::DegenerateDensity(_)
                | CnoError::UnfitSurfaceCell { .. }
        )
    }

    /// Whether the error must abort the whole batch: without detections no folder
    /// can produce meaningful statistics.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CnoError::DetectorFailure(_) | CnoError::MalformedLabel { .. }
        )
    }
}

impl PartialEq for CnoError {
    fn eq(&self, other: &Self) -> bool {
        use CnoError::*;
        match (self, other) {
            (InvalidConfig(a), InvalidConfig(b)) => a == b,
            (Utf8PathError(a), Utf8PathError(b)) => a == b,
            (InvalidCsv(a), InvalidCsv(b)) => a == b,
            (DegenerateDensity(a), DegenerateDensity(b)) => a == b,
            (DetectorFailure(a), DetectorFailure(b)) => a == b,
            (ClockError(a), ClockError(b)) => a == b,
            (
                TooFewDetections {
                    found: fa,
                    required: ra,
                },
                TooFewDetections {
                    found: fb,
                    required: rb,
                },
            ) => fa == fb && ra == rb,
            (UnfitSurfaceCell { row: ra, col: ca }, UnfitSurfaceCell { row: rb, col: cb }) => {
                ra == rb && ca == cb
            }
            (
                MalformedLabel {
                    path: pa, line: la, ..
                },
                MalformedLabel {
                    path: pb, line: lb, ..
                },
            ) => pa == pb && la == lb,
            (ScanDecode { path: a, .. }, ScanDecode { path: b, .. }) => a == b,
            (DirectoryCreation { path: a, .. }, DirectoryCreation { path: b, .. }) => a == b,

            // Not comparable: same variant is enough
            (IoError(_), IoError(_)) => true,
            (ImageError(_), ImageError(_)) => true,
            (CsvError(_), CsvError(_)) => true,
            (TomlError(_), TomlError(_)) => true,

            _ => false,
        }
    }
}
