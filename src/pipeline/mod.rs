//! # Batch orchestration
//!
//! Drives a full analysis over a directory of scan sessions, one subfolder per
//! session.
//!
//! ## Per-folder workflow
//! -----------------
//! For a session folder `F`:
//!
//! 1. **Layout** – create `F/CNO_Detection/Image/{Original,Enhanced,KDE}` and
//!    `F/CNO_Detection/Result`. Failing to create them fails the folder only.
//! 2. **Preprocessing** – if `Enhanced/` is empty, decode every raw trace file of
//!    `F` and write its original/enhanced previews. A scan that cannot be
//!    decoded is skipped with a warning.
//! 3. **Detection** – one batched [`Detector::predict`] call over the sorted
//!    enhanced images. Detector failures abort the whole batch.
//! 4. **Analysis** – each image is analyzed independently ([`CnoPipeline::analyze_sample`]),
//!    in parallel on the rayon pool; records keep the image order.
//! 5. **Output** – one result table `F/CNO_Detection/Result/{F}_{timestamp}.csv`,
//!    written atomically.
//!
//! ## Unanalyzable samples
//! -----------------
//! A sample with fewer than `kde.min_detections` detections, or whose density
//! estimate degenerates, yields a row whose layer statistics and areas are
//! empty ([`LayerStatistics::Unanalyzable`]); its detection count is kept.
//!
//! ## Example
//!
//! ```rust,no_run
//! use cno_kde::config::AnalysisConfig;
//! use cno_kde::pipeline::CnoPipeline;
//!
//! let config = AnalysisConfig::from_file("analysis.toml").unwrap();
//! let pipeline = CnoPipeline::from_config(config).unwrap();
//! let report = pipeline.run().unwrap();
//! println!("{} folders done, {} failed", report.completed().count(), report.failed().count());
//! ```
use camino::{Utf8Path, Utf8PathBuf};
use hifitime::Epoch;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    cno_errors::CnoError,
    config::{AnalysisConfig, DensityPolicy, KdeSettings, ScaleSettings},
    constants::PixelCoord,
    detections::{
        detector::{Detector, LabelFileDetector},
        DetectionSet,
    },
    kde::{DensityEngine, DensityFit},
    layers::{LayerAggregator, LayerStatistics},
    render::ArtifactWriter,
    sample::{
        table::{result_file_name, write_result_table},
        FolderMetadata, SampleRecord,
    },
    scan::discover_scans,
};

pub mod progress_bar;

#[cfg(feature = "progress")]
use progress_bar::{fmt_dur, folder_progress, IterTimer};

/// Output directories of one session folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderLayout {
    pub original: Utf8PathBuf,
    pub enhanced: Utf8PathBuf,
    pub kde: Utf8PathBuf,
    pub result: Utf8PathBuf,
}

impl FolderLayout {
    pub fn new(folder: &Utf8Path) -> Self {
        let base = folder.join("CNO_Detection");
        let images = base.join("Image");
        FolderLayout {
            original: images.join("Original"),
            enhanced: images.join("Enhanced"),
            kde: images.join("KDE"),
            result: base.join("Result"),
        }
    }

    pub fn create(&self) -> Result<(), CnoError> {
        for dir in [&self.original, &self.enhanced, &self.kde, &self.result] {
            std::fs::create_dir_all(dir).map_err(|source| CnoError::DirectoryCreation {
                path: dir.clone(),
                source,
            })?;
        }
        Ok(())
    }

    /// Sorted PNG files of `Enhanced/`.
    pub fn enhanced_images(&self) -> Result<Vec<Utf8PathBuf>, CnoError> {
        let mut images = Vec::new();
        for entry in self.enhanced.read_dir_utf8()? {
            let entry = entry?;
            let is_png = entry
                .path()
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
            if is_png && entry.file_type()?.is_file() {
                images.push(entry.into_path());
            }
        }
        images.sort();
        Ok(images)
    }

    fn enhanced_is_empty(&self) -> Result<bool, CnoError> {
        Ok(self.enhanced.read_dir_utf8()?.next().is_none())
    }
}

/// Density surface and layer statistics of one analyzable sample.
#[derive(Debug, Clone)]
pub struct SurfaceAnalysis {
    pub fit: DensityFit,
    pub layers: LayerStatistics,
}

/// Density engine + layer aggregator over integer detection centers.
#[derive(Debug, Clone)]
pub struct SampleAnalyzer {
    engine: DensityEngine,
    aggregator: LayerAggregator,
}

impl SampleAnalyzer {
    pub fn new(kde: &KdeSettings, policy: DensityPolicy, scale: &ScaleSettings) -> Self {
        SampleAnalyzer {
            engine: DensityEngine::new(kde),
            aggregator: LayerAggregator::new(policy, scale),
        }
    }

    pub fn policy(&self) -> DensityPolicy {
        self.aggregator.policy()
    }

    /// Fit and aggregate the density of `centers` over a `height × width` grid.
    ///
    /// Return
    /// ----------
    /// * The errors of [`DensityEngine::run`]; callers decide whether they make
    ///   the sample unanalyzable (see [`CnoError::is_unanalyzable`]).
    pub fn analyze(
        &self,
        centers: &[PixelCoord],
        height: usize,
        width: usize,
    ) -> Result<SurfaceAnalysis, CnoError> {
        let points: Vec<_> = centers
            .iter()
            .map(|&(x, y)| nalgebra::Point2::new(x as f64, y as f64))
            .collect();
        let fit = self.engine.run(&points, height, width)?;
        let layers = self.aggregator.aggregate(&fit.surface, centers);
        Ok(SurfaceAnalysis { fit, layers })
    }
}

/// Outcome of one processed folder.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderReport {
    pub folder: Utf8PathBuf,
    pub csv_path: Utf8PathBuf,
    pub records: Vec<SampleRecord>,
}

impl FolderReport {
    pub fn analyzed(&self) -> usize {
        self.records.iter().filter(|r| r.is_analyzed()).count()
    }
}

#[derive(Debug, PartialEq)]
pub enum FolderOutcome {
    Completed(FolderReport),
    Failed { folder: Utf8PathBuf, error: CnoError },
}

/// Per-folder outcomes of a batch, in processing order.
#[derive(Debug, Default, PartialEq)]
pub struct BatchReport {
    pub folders: Vec<FolderOutcome>,
}

impl BatchReport {
    pub fn completed(&self) -> impl Iterator<Item = &FolderReport> {
        self.folders.iter().filter_map(|o| match o {
            FolderOutcome::Completed(report) => Some(report),
            FolderOutcome::Failed { .. } => None,
        })
    }

    pub fn failed(&self) -> impl Iterator<Item = (&Utf8PathBuf, &CnoError)> {
        self.folders.iter().filter_map(|o| match o {
            FolderOutcome::Failed { folder, error } => Some((folder, error)),
            FolderOutcome::Completed(_) => None,
        })
    }
}

fn file_name_of(path: &Utf8Path) -> Result<&str, CnoError> {
    path.file_name()
        .ok_or_else(|| CnoError::Utf8PathError(format!("path without file name: {path}")))
}

/// Batch analysis driver.
pub struct CnoPipeline {
    config: AnalysisConfig,
    detector: Box<dyn Detector>,
    analyzer: SampleAnalyzer,
}

impl CnoPipeline {
    /// Build a pipeline around an explicit detector.
    pub fn new(config: AnalysisConfig, detector: Box<dyn Detector>) -> Result<Self, CnoError> {
        config.validate()?;
        let analyzer = SampleAnalyzer::new(&config.kde, config.density.policy, &config.scale);
        Ok(CnoPipeline {
            config,
            detector,
            analyzer,
        })
    }

    /// Build a pipeline reading detections from `model.labels_dir`.
    pub fn from_config(config: AnalysisConfig) -> Result<Self, CnoError> {
        let detector = LabelFileDetector::new(config.model.labels_dir.clone());
        Self::new(config, Box::new(detector))
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Session folders of `path.source`, sorted.
    pub fn session_folders(&self) -> Result<Vec<Utf8PathBuf>, CnoError> {
        let mut folders = Vec::new();
        for entry in self.config.path.source.read_dir_utf8()? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                folders.push(entry.into_path());
            }
        }
        folders.sort();
        Ok(folders)
    }

    /// Process every session folder.
    ///
    /// Folder-local failures are recorded in the report and the batch moves on;
    /// detector failures ([`CnoError::is_fatal`]) abort it.
    pub fn run(&self) -> Result<BatchReport, CnoError> {
        let folders = self.session_folders()?;
        info!(
            source = %self.config.path.source,
            folders = folders.len(),
            policy = %self.analyzer.policy(),
            "starting batch"
        );

        #[cfg(feature = "progress")]
        let pb = folder_progress(folders.len());
        #[cfg(feature = "progress")]
        let mut timer = IterTimer::new(0.2);

        let mut report = BatchReport::default();
        for folder in folders {
            #[cfg(feature = "progress")]
            {
                let last = timer.tick();
                pb.set_message(format!(
                    "last: {}, avg: {}",
                    fmt_dur(last),
                    fmt_dur(timer.avg())
                ));
            }

            match self.process_folder(&folder) {
                Ok(folder_report) => report.folders.push(FolderOutcome::Completed(folder_report)),
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    warn!(%folder, %error, "folder skipped");
                    report.folders.push(FolderOutcome::Failed { folder, error });
                }
            }

            #[cfg(feature = "progress")]
            pb.inc(1);
        }

        #[cfg(feature = "progress")]
        pb.finish_and_clear();
        Ok(report)
    }

    /// Preprocess, detect, analyze and write the result table of one session folder.
    pub fn process_folder(&self, folder: &Utf8Path) -> Result<FolderReport, CnoError> {
        let folder_name = file_name_of(folder)?;
        let metadata = FolderMetadata::parse(folder_name);
        info!(
            folder = folder_name,
            %metadata,
            policy = %self.analyzer.policy(),
            "processing folder"
        );

        let layout = FolderLayout::new(folder);
        layout.create()?;
        let started = Epoch::now().map_err(|e| CnoError::ClockError(e.to_string()))?;

        if layout.enhanced_is_empty()? {
            self.preprocess_scans(folder, &layout)?;
        } else {
            debug!(folder = folder_name, "enhanced images present, preprocessing skipped");
        }

        let images = layout.enhanced_images()?;
        info!(folder = folder_name, images = images.len(), "detecting CNOs");
        let detections = self
            .detector
            .predict(&images, &self.config.detection_params())?;
        if detections.len() != images.len() {
            return Err(CnoError::DetectorFailure(format!(
                "{} detection sets returned for {} images",
                detections.len(),
                images.len()
            )));
        }

        let artifacts = self.config.render.enabled.then(|| {
            ArtifactWriter::new(
                layout.kde.clone(),
                self.config.model.name.clone(),
                self.config.model.conf_threshold,
                self.config.render.output_size,
            )
        });

        info!(folder = folder_name, "estimating densities");
        let records = images
            .par_iter()
            .zip(detections.par_iter())
            .map(|(image, set)| {
                let name = image.file_stem().unwrap_or_default();
                self.analyze_sample(name, image, set, &metadata, artifacts.as_ref())
            })
            .collect::<Result<Vec<_>, CnoError>>()?;

        let csv_path = layout.result.join(result_file_name(folder_name, started));
        write_result_table(&csv_path, &records)?;

        let report = FolderReport {
            folder: folder.to_owned(),
            csv_path,
            records,
        };
        info!(
            folder = folder_name,
            csv = %report.csv_path,
            samples = report.records.len(),
            analyzed = report.analyzed(),
            "result table written"
        );
        Ok(report)
    }

    fn preprocess_scans(&self, folder: &Utf8Path, layout: &FolderLayout) -> Result<(), CnoError> {
        let scans = discover_scans(folder)?;
        info!(%folder, scans = scans.len(), "preprocessing raw scans");
        scans.par_iter().for_each(|scan| {
            if let Err(error) = scan.preprocess(&layout.original, &layout.enhanced) {
                warn!(scan = %scan.path, %error, "scan skipped");
            }
        });
        Ok(())
    }

    /// Analyze the detections of one image.
    ///
    /// Arguments
    /// -----------------
    /// * `name`: sample name, used in the record and the artifact file names.
    /// * `image_path`: enhanced image the detections were made on; its size is the
    ///   density grid.
    /// * `detections`: detector output for the image.
    /// * `metadata`: cohort metadata of the folder.
    /// * `artifacts`: artifact writer, `None` to skip rendering.
    ///
    /// Return
    /// ----------
    /// * The sample record, analyzed or unanalyzable. Errors are limited to reading
    ///   the image size; artifact failures are logged and ignored.
    pub fn analyze_sample(
        &self,
        name: &str,
        image_path: &Utf8Path,
        detections: &DetectionSet,
        metadata: &FolderMetadata,
        artifacts: Option<&ArtifactWriter>,
    ) -> Result<SampleRecord, CnoError> {
        let cno = detections.len();
        let unanalyzable = SampleRecord {
            file: name.to_string(),
            metadata: metadata.clone(),
            cno,
            areas: None,
            layers: LayerStatistics::Unanalyzable,
            bandwidth: None,
        };

        if let Some(writer) = artifacts {
            if let Err(error) = writer.write_bounding_boxes(name, image_path, detections) {
                warn!(sample = name, %error, "bounding box overlay not written");
            }
        }

        if cno < self.config.kde.min_detections {
            debug!(sample = name, cno, "too few detections, sample unanalyzable");
            return Ok(unanalyzable);
        }

        let (width, height) = image::image_dimensions(image_path)?;
        let (height, width) = (height as usize, width as usize);
        let centers = detections.pixel_coords();

        let analysis = match self.analyzer.analyze(&centers, height, width) {
            Ok(analysis) => analysis,
            Err(error) if error.is_unanalyzable() => {
                warn!(sample = name, %error, "density estimation failed, sample unanalyzable");
                return Ok(unanalyzable);
            }
            Err(error) => return Err(error),
        };

        if let Some(layers) = analysis.layers.layers() {
            for (j, layer) in layers.iter().enumerate() {
                debug!(
                    sample = name,
                    "level {j}: area={}, cno={}, density={}",
                    layer.pixel_area,
                    layer.object_count,
                    layer.density
                );
            }
        }

        if let Some(writer) = artifacts {
            if let Err(error) = writer.write_density(name, &analysis.fit.surface) {
                warn!(sample = name, %error, "density map not written");
            }
            if let Err(error) = writer.write_scatter(name, &centers, width, height) {
                warn!(sample = name, %error, "scatter plot not written");
            }
        }

        Ok(SampleRecord {
            file: name.to_string(),
            metadata: metadata.clone(),
            cno,
            areas: detections.area_summary(&self.config.scale),
            layers: analysis.layers,
            bandwidth: Some(analysis.fit.bandwidth),
        })
    }
}
