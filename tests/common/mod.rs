#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use cno_kde::{
    config::{AnalysisConfig, KdeSettings},
    constants::PixelCoord,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Bandwidth grid small enough for tests: 20, 30, 40, 50, 60.
pub fn fast_kde() -> KdeSettings {
    KdeSettings {
        bandwidth_candidates: 5,
        ..KdeSettings::default()
    }
}

/// `n` integer points uniformly spread around `center`, at most `spread` pixels away per axis.
pub fn cluster(rng: &mut StdRng, center: PixelCoord, n: usize, spread: i64) -> Vec<PixelCoord> {
    (0..n)
        .map(|_| {
            (
                center.0 + rng.random_range(-spread..=spread),
                center.1 + rng.random_range(-spread..=spread),
            )
        })
        .collect()
}

/// Two clusters of `n_per` points each, around `a` and `b`.
pub fn two_clusters(seed: u64, a: PixelCoord, b: PixelCoord, n_per: usize) -> Vec<PixelCoord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut points = cluster(&mut rng, a, n_per, 5);
    points.extend(cluster(&mut rng, b, n_per, 5));
    points
}

/// `n` integer points uniformly drawn over a `width × height` grid.
pub fn uniform_points(seed: u64, n: usize, width: i64, height: i64) -> Vec<PixelCoord> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| (rng.random_range(0..width), rng.random_range(0..height)))
        .collect()
}

pub fn write_png(path: &Utf8Path, width: u32, height: u32) {
    image::RgbImage::from_pixel(width, height, image::Rgb([60, 40, 20]))
        .save(path)
        .unwrap();
}

/// Write a label file for square boxes of side `side` centered on `centers`.
pub fn write_labels(path: &Utf8Path, centers: &[PixelCoord], side: f64, width: u32, height: u32) {
    let (w, h) = (width as f64, height as f64);
    let content: String = centers
        .iter()
        .map(|&(x, y)| {
            format!(
                "0 {} {} {} {} 0.9\n",
                x as f64 / w,
                y as f64 / h,
                side / w,
                side / h
            )
        })
        .collect();
    std::fs::write(path, content).unwrap();
}

/// A source directory with one session folder per call to [`SourceTree::add_sample`].
pub struct SourceTree {
    _dir: tempfile::TempDir,
    pub root: Utf8PathBuf,
    pub source: Utf8PathBuf,
    pub labels: Utf8PathBuf,
}

impl SourceTree {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8Path::from_path(dir.path()).unwrap().to_owned();
        let source = root.join("sessions");
        let labels = root.join("labels");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::create_dir_all(&labels).unwrap();
        SourceTree {
            _dir: dir,
            root,
            source,
            labels,
        }
    }

    /// Add an already-enhanced image `{stem}.png` to `folder`, with its labels.
    pub fn add_sample(&self, folder: &str, stem: &str, size: u32, centers: &[PixelCoord]) {
        let enhanced = self
            .source
            .join(folder)
            .join("CNO_Detection/Image/Enhanced");
        std::fs::create_dir_all(&enhanced).unwrap();
        write_png(&enhanced.join(format!("{stem}.png")), size, size);
        write_labels(&self.labels.join(format!("{stem}.txt")), centers, 6.0, size, size);
    }

    pub fn config(&self, render: bool) -> AnalysisConfig {
        AnalysisConfig::builder()
            .source(self.source.clone())
            .labels_dir(self.labels.clone())
            .model_name("yolo")
            .conf_threshold(0.5)
            .bandwidth_candidates(5)
            .render(render)
            .output_size(64)
            .build()
            .unwrap()
    }
}

/// Read a result table as a header plus string rows.
pub fn read_rows(path: &Utf8Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let header = reader.headers().unwrap().iter().map(String::from).collect();
    let rows = reader
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect();
    (header, rows)
}
