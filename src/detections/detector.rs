//! # Detection adapter
//!
//! The CNO detector (pretrained weights, inference) is an external capability.
//! This module defines the boundary the rest of the crate consumes, the
//! [`Detector`] trait, and one concrete adapter, [`LabelFileDetector`], which
//! reads the per-image label files an external detector run writes.
//!
//! ## Label format
//! -----------------
//! One `<image stem>.txt` file per image, one object per line:
//!
//! ```text
//! class cx cy w h [confidence]
//! ```
//!
//! All geometric fields are normalized to `[0, 1]` by the image width/height.
//! A missing label file means the detector found nothing in that image; a
//! missing confidence column means `1.0`.
//!
//! ## Batching
//! -----------------
//! [`Detector::predict`] receives the whole image list of a folder at once, so
//! adapters backed by a real inference engine can batch their calls.
use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::cno_errors::CnoError;

use super::{nms::non_max_suppression, Detection, DetectionParams, DetectionSet};

/// Batched object detector.
///
/// Implementations must return exactly one [`DetectionSet`] per input image, in
/// input order. Any failure (model unavailable, unreadable image) is fatal for
/// the batch and must be reported as an error rather than an empty set.
pub trait Detector: Send + Sync {
    fn predict(
        &self,
        images: &[Utf8PathBuf],
        params: &DetectionParams,
    ) -> Result<Vec<DetectionSet>, CnoError>;
}

/// Adapter over label files written by an external detector run.
#[derive(Debug, Clone)]
pub struct LabelFileDetector {
    labels_dir: Utf8PathBuf,
}

impl LabelFileDetector {
    pub fn new(labels_dir: impl Into<Utf8PathBuf>) -> Self {
        LabelFileDetector {
            labels_dir: labels_dir.into(),
        }
    }

    fn label_path(&self, image: &Utf8Path) -> Result<Utf8PathBuf, CnoError> {
        let stem = image
            .file_stem()
            .ok_or_else(|| CnoError::DetectorFailure(format!("image path without file name: {image}")))?;
        Ok(self.labels_dir.join(format!("{stem}.txt")))
    }

    fn predict_one(
        &self,
        image: &Utf8Path,
        params: &DetectionParams,
    ) -> Result<DetectionSet, CnoError> {
        let (width, height) = image::image_dimensions(image)
            .map_err(|e| CnoError::DetectorFailure(format!("cannot read image {image}: {e}")))?;

        let label_path = self.label_path(image)?;
        if !label_path.exists() {
            debug!(%image, "no label file, zero detections");
            return Ok(DetectionSet::default());
        }
        let content = std::fs::read_to_string(&label_path)?;
        let raw = parse_labels(&content, &label_path, width, height)?;

        let candidates: Vec<Detection> = raw
            .into_iter()
            .filter(|d| d.confidence >= params.confidence_threshold)
            .collect();

        let kept = non_max_suppression(candidates, params.iou_threshold, params.max_detections);
        Ok(DetectionSet::new(kept))
    }
}

impl Detector for LabelFileDetector {
    fn predict(
        &self,
        images: &[Utf8PathBuf],
        params: &DetectionParams,
    ) -> Result<Vec<DetectionSet>, CnoError> {
        images
            .iter()
            .map(|image| self.predict_one(image, params))
            .collect()
    }
}

/// Parse normalized label lines into pixel-space detections.
///
/// Blank lines are skipped. Any other line must have 5 or 6 finite numeric fields.
pub fn parse_labels(
    content: &str,
    path: &Utf8Path,
    image_width: u32,
    image_height: u32,
) -> Result<Vec<Detection>, CnoError> {
    let (w_img, h_img) = (image_width as f64, image_height as f64);
    let malformed = |line: usize, reason: String| CnoError::MalformedLabel {
        path: path.to_owned(),
        line,
        reason,
    };

    let mut detections = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let fields = trimmed
            .split_whitespace()
            .map(|tok| {
                match tok.parse::<f64>() {
                    Ok(v) if v.is_finite() => Ok(v),
                    _ => Err(malformed(line_no, format!("not a finite number: {tok:?}"))),
                }
            })
            .collect::<Result<Vec<f64>, CnoError>>()?;

        let (cx, cy, w, h, conf) = match fields.as_slice() {
            [_, cx, cy, w, h] => (*cx, *cy, *w, *h, 1.0),
            [_, cx, cy, w, h, conf] => (*cx, *cy, *w, *h, *conf),
            other => {
                return Err(malformed(
                    line_no,
                    format!("expected 5 or 6 fields, got {}", other.len()),
                ))
            }
        };

        if !(0.0..=1.0).contains(&conf) {
            return Err(malformed(line_no, format!("confidence out of range: {conf}")));
        }
        if w < 0.0 || h < 0.0 {
            return Err(malformed(line_no, "negative box extent".into()));
        }

        detections.push(Detection::new(
            cx * w_img,
            cy * h_img,
            w * w_img,
            h * h_img,
            conf,
        ));
    }
    Ok(detections)
}

#[cfg(test)]
mod detector_test {
    use super::*;

    #[test]
    fn test_parse_labels_scaling() {
        let path = Utf8Path::new("a.txt");
        let content = "0 0.5 0.25 0.1 0.2 0.8\n\n0 0.1 0.1 0.05 0.05\n";
        let dets = parse_labels(content, path, 512, 256).unwrap();
        assert_eq!(dets.len(), 2);
        assert_eq!(dets[0], Detection::new(256.0, 64.0, 51.2, 51.2, 0.8));
        assert_eq!(dets[1].confidence, 1.0);
    }

    #[test]
    fn test_parse_labels_malformed() {
        let path = Utf8Path::new("bad.txt");
        let err = parse_labels("0 0.5 0.5\n", path, 10, 10).unwrap_err();
        assert_eq!(
            err,
            CnoError::MalformedLabel {
                path: path.to_owned(),
                line: 1,
                reason: String::new(),
            }
        );

        let err = parse_labels("0 0.5 0.5 0.1 0.1 0.9\n0 a 0.5 0.1 0.1\n", path, 10, 10)
            .unwrap_err();
        assert!(matches!(err, CnoError::MalformedLabel { line: 2, .. }));
    }

    #[test]
    fn test_parse_labels_rejects_non_finite() {
        let path = Utf8Path::new("bad.txt");
        for content in [
            "0 nan 0.5 0.1 0.1 0.9\n",
            "0 0.5 inf 0.1 0.1\n",
            "0 0.5 0.5 0.1 -inf 0.9\n",
            "0 0.5 0.5 0.1 0.1 NaN\n",
        ] {
            let err = parse_labels(content, path, 100, 100).unwrap_err();
            assert!(matches!(err, CnoError::MalformedLabel { line: 1, .. }), "{content:?}");
        }
    }
}
