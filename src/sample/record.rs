use crate::{
    constants::LAYER_COUNT,
    detections::AreaSummary,
    layers::LayerStatistics,
};

use super::metadata::FolderMetadata;

/// Leading identification columns of a result table.
pub const ID_COLUMNS: [&str; 7] = ["File", "Country", "Group", "No.", "TLSS", "Lesional", "CNO"];

/// Trailing area columns: mean and total circular-equivalent area (µm²).
pub const AREA_COLUMNS: [&str; 2] = ["AVG_Area", "AVG_Size"];

/// Column names of a result table, in order.
pub fn result_header() -> Vec<String> {
    ID_COLUMNS
        .iter()
        .map(|c| c.to_string())
        .chain(layered("Area"))
        .chain(layered("CNO"))
        .chain(layered("Density"))
        .chain(AREA_COLUMNS.iter().map(|c| c.to_string()))
        .collect()
}

fn layered(prefix: &'static str) -> impl Iterator<Item = String> {
    (0..LAYER_COUNT).map(move |j| format!("Layer_{prefix}_{j}"))
}

/// CSV text of a float: `nan` for NaN, shortest round-trip representation otherwise.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        value.to_string()
    }
}

fn format_opt<T: ToString>(value: &Option<T>) -> String {
    value.as_ref().map_or_else(String::new, T::to_string)
}

fn format_bool(value: Option<bool>) -> String {
    match value {
        Some(true) => "True".into(),
        Some(false) => "False".into(),
        None => String::new(),
    }
}

/// Result of analyzing one image.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRecord {
    /// Sample name (enhanced image stem).
    pub file: String,
    pub metadata: FolderMetadata,
    /// Number of detections kept by the detector.
    pub cno: usize,
    /// `None` when the sample is unanalyzable.
    pub areas: Option<AreaSummary>,
    pub layers: LayerStatistics,
    /// Selected KDE bandwidth (pixels), `None` when unanalyzable.
    pub bandwidth: Option<f64>,
}

impl SampleRecord {
    pub fn is_analyzed(&self) -> bool {
        self.layers.is_analyzed()
    }

    /// The record as one CSV row matching [`result_header`].
    pub fn to_row(&self) -> Vec<String> {
        let meta = &self.metadata;
        let mut row = vec![
            self.file.clone(),
            format_opt(&meta.country),
            format_opt(&meta.group),
            format_opt(&meta.number),
            format_opt(&meta.tlss),
            format_bool(meta.lesional),
            self.cno.to_string(),
        ];
        for column in [
            self.layers.areas(),
            self.layers.counts(),
            self.layers.densities(),
        ] {
            row.extend(column.iter().map(|&v| format_float(v)));
        }
        let (average, total) = self
            .areas
            .map_or((f64::NAN, f64::NAN), |a| (a.average, a.total));
        row.push(format_float(average));
        row.push(format_float(total));
        row
    }
}

#[cfg(test)]
mod record_test {
    use super::*;
    use crate::layers::Layer;

    #[test]
    fn test_header_layout() {
        let header = result_header();
        assert_eq!(header.len(), 7 + 3 * LAYER_COUNT + 2);
        assert_eq!(header[6], "CNO");
        assert_eq!(header[7], "Layer_Area_0");
        assert_eq!(header[31], "Layer_Area_24");
        assert_eq!(header[32], "Layer_CNO_0");
        assert_eq!(header[57], "Layer_Density_0");
        assert_eq!(header[82], "AVG_Area");
        assert_eq!(header[83], "AVG_Size");
    }

    #[test]
    fn test_unanalyzable_row() {
        let record = SampleRecord {
            file: "S1_trace".into(),
            metadata: FolderMetadata::parse("DK_G2_TL0_No.3"),
            cno: 4,
            areas: None,
            layers: LayerStatistics::Unanalyzable,
            bandwidth: None,
        };
        let row = record.to_row();
        assert_eq!(row.len(), result_header().len());
        assert_eq!(&row[..7], ["S1_trace", "DK", "2", "3", "0", "False", "4"]);
        assert!(row[7..].iter().all(|v| v == "nan"));
    }

    #[test]
    fn test_analyzed_row() {
        let layers = [Layer {
            threshold: 0.1,
            pixel_area: 120,
            object_count: 6.5,
            density: 35.5013,
        }; LAYER_COUNT];
        let record = SampleRecord {
            file: "S2_trace".into(),
            metadata: FolderMetadata::default(),
            cno: 7,
            areas: Some(AreaSummary {
                average: 0.0123,
                total: 0.0861,
            }),
            layers: LayerStatistics::Analyzed(layers),
            bandwidth: Some(24.0),
        };
        let row = record.to_row();
        assert_eq!(&row[1..6], ["", "", "", "", ""]);
        assert_eq!(row[7], "120");
        assert_eq!(row[32], "6.5");
        assert_eq!(row[57], "35.5013");
        assert_eq!(row[82], "0.0123");
        assert_eq!(row[83], "0.0861");
    }
}
