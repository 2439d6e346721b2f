//! # Visualization artifacts
//!
//! Per analyzed sample, three PNG files are written next to each other in the
//! folder's `KDE/` image directory:
//!
//! | kind                      | content                                            |
//! |---------------------------|----------------------------------------------------|
//! | [`ArtifactKind::BoundingBoxes`] | the enhanced image with every detection boxed in green |
//! | [`ArtifactKind::Density`]       | filled contours of the density surface over the 25 bands, "bone" colormap |
//! | [`ArtifactKind::Spatial`]       | scatter plot of the detection centers on white     |
//!
//! Files are named `{sample}_{model}_{confidence}_{bbox|KDE|Spatial}.png`, so
//! concurrent samples never write the same file. Rasters keep the image
//! convention (origin top-left, `y` downward); density and scatter renders are
//! square, `output_size` pixels wide.
//!
//! Writing artifacts is best-effort: callers log failures and carry on.
use camino::{Utf8Path, Utf8PathBuf};
use image::{imageops::FilterType, Rgb, RgbImage};
use imageproc::{
    drawing::{draw_filled_circle_mut, draw_hollow_rect_mut},
    rect::Rect,
};

use crate::{
    cno_errors::CnoError,
    constants::{PixelCoord, LAYER_COUNT},
    detections::DetectionSet,
    kde::surface::DensitySurface,
};

pub mod colormap;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const MARKER_COLOR: Rgb<u8> = Rgb([31, 119, 180]);
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// Kinds of per-sample artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    BoundingBoxes,
    Density,
    Spatial,
}

impl ArtifactKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            ArtifactKind::BoundingBoxes => "bbox",
            ArtifactKind::Density => "KDE",
            ArtifactKind::Spatial => "Spatial",
        }
    }
}

/// Writes the artifacts of one folder.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    dir: Utf8PathBuf,
    model_name: String,
    confidence: f64,
    output_size: u32,
}

impl ArtifactWriter {
    pub fn new(
        dir: impl Into<Utf8PathBuf>,
        model_name: impl Into<String>,
        confidence: f64,
        output_size: u32,
    ) -> Self {
        ArtifactWriter {
            dir: dir.into(),
            model_name: model_name.into(),
            confidence,
            output_size,
        }
    }

    /// `{sample}_{model}_{confidence}_{kind}.png`; whole confidences keep their `.0`.
    pub fn path(&self, sample: &str, kind: ArtifactKind) -> Utf8PathBuf {
        self.dir.join(format!(
            "{sample}_{}_{:?}_{}.png",
            self.model_name,
            self.confidence,
            kind.suffix()
        ))
    }

    pub fn write_bounding_boxes(
        &self,
        sample: &str,
        image_path: &Utf8Path,
        detections: &DetectionSet,
    ) -> Result<Utf8PathBuf, CnoError> {
        let mut canvas = image::open(image_path)?.to_rgb8();
        draw_bounding_boxes(&mut canvas, detections);
        let path = self.path(sample, ArtifactKind::BoundingBoxes);
        canvas.save(&path)?;
        Ok(path)
    }

    pub fn write_density(
        &self,
        sample: &str,
        surface: &DensitySurface,
    ) -> Result<Utf8PathBuf, CnoError> {
        let path = self.path(sample, ArtifactKind::Density);
        render_density(surface, self.output_size).save(&path)?;
        Ok(path)
    }

    pub fn write_scatter(
        &self,
        sample: &str,
        centers: &[PixelCoord],
        width: usize,
        height: usize,
    ) -> Result<Utf8PathBuf, CnoError> {
        let path = self.path(sample, ArtifactKind::Spatial);
        render_scatter(centers, width, height, self.output_size).save(&path)?;
        Ok(path)
    }
}

/// Outline every detection box, corners rounded to the nearest pixel.
pub fn draw_bounding_boxes(canvas: &mut RgbImage, detections: &DetectionSet) {
    for detection in detections {
        let (x1, y1, x2, y2) = detection.bbox.xyxy();
        let (x1, y1) = (x1.round() as i32, y1.round() as i32);
        let (x2, y2) = (x2.round() as i32, y2.round() as i32);
        let rect = Rect::at(x1, y1).of_size((x2 - x1).max(1) as u32, (y2 - y1).max(1) as u32);
        draw_hollow_rect_mut(canvas, rect, BOX_COLOR);
    }
}

/// Filled-contour raster: each cell takes the color of its band.
pub fn render_density(surface: &DensitySurface, output_size: u32) -> RgbImage {
    let values = surface.values();
    let raster = RgbImage::from_fn(surface.width() as u32, surface.height() as u32, |x, y| {
        let band = surface.band_of(values[(y as usize, x as usize)]);
        colormap::bone(band as f64 / (LAYER_COUNT - 1) as f64)
    });
    image::imageops::resize(&raster, output_size, output_size, FilterType::Nearest)
}

/// Detection centers drawn as dots on a white square canvas.
pub fn render_scatter(
    centers: &[PixelCoord],
    width: usize,
    height: usize,
    output_size: u32,
) -> RgbImage {
    let mut canvas = RgbImage::from_pixel(output_size, output_size, BACKGROUND);
    let sx = output_size as f64 / width.max(1) as f64;
    let sy = output_size as f64 / height.max(1) as f64;
    let radius = (output_size / 200).max(2) as i32;
    for &(x, y) in centers {
        let center = ((x as f64 * sx).round() as i32, (y as f64 * sy).round() as i32);
        draw_filled_circle_mut(&mut canvas, center, radius, MARKER_COLOR);
    }
    canvas
}

#[cfg(test)]
mod render_test {
    use nalgebra::DMatrix;

    use super::*;
    use crate::detections::Detection;

    #[test]
    fn test_artifact_names() {
        let writer = ArtifactWriter::new("out", "yolov8s", 0.25, 800);
        assert_eq!(
            writer.path("S01_trace", ArtifactKind::Density),
            Utf8PathBuf::from("out/S01_trace_yolov8s_0.25_KDE.png")
        );
        assert_eq!(
            writer.path("S01_trace", ArtifactKind::BoundingBoxes).file_name(),
            Some("S01_trace_yolov8s_0.25_bbox.png")
        );

        let strict = ArtifactWriter::new("out", "yolov8s", 1.0, 800);
        assert_eq!(
            strict.path("S01_trace", ArtifactKind::Spatial).file_name(),
            Some("S01_trace_yolov8s_1.0_Spatial.png")
        );
    }

    #[test]
    fn test_bounding_box_outline() {
        let mut canvas = RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]));
        let dets = DetectionSet::new(vec![Detection::new(10.0, 10.0, 6.0, 4.0, 0.9)]);
        draw_bounding_boxes(&mut canvas, &dets);
        assert_eq!(*canvas.get_pixel(7, 8), BOX_COLOR);
        assert_eq!(*canvas.get_pixel(10, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_density_render_size() {
        let surface =
            DensitySurface::from_matrix(DMatrix::from_fn(10, 12, |r, c| (r + c) as f64))
                .unwrap();
        let img = render_density(&surface, 64);
        assert_eq!(img.dimensions(), (64, 64));
        // the peak sits in the bottom-right corner and gets the lightest band
        assert_eq!(*img.get_pixel(63, 63), colormap::bone(1.0));
        assert_eq!(*img.get_pixel(0, 0), colormap::bone(0.0));
    }

    #[test]
    fn test_scatter_marks_centers() {
        let img = render_scatter(&[(50, 25)], 100, 100, 200);
        assert_eq!(*img.get_pixel(100, 50), MARKER_COLOR);
        assert_eq!(*img.get_pixel(0, 0), BACKGROUND);
    }
}
