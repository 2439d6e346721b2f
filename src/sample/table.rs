//! Result table persistence.
//!
//! A table is written once, after every sample of a folder has been analyzed.
//! Rows go to a `.part` sibling first and the file is renamed into place when
//! complete, so an interrupted run never leaves a truncated table behind.
use camino::{Utf8Path, Utf8PathBuf};
use hifitime::Epoch;

use crate::{
    cno_errors::CnoError,
    constants::{round_to, DENSITY_INDEX_BANDS},
};

use super::record::{result_header, SampleRecord};

/// `{folder}_{YYYYmmdd-HHMMSS}.csv` for a run started at `epoch` (UTC).
pub fn result_file_name(folder_name: &str, epoch: Epoch) -> String {
    let (y, m, d, hh, mm, ss, _) = epoch.to_gregorian_utc();
    format!("{folder_name}_{y:04}{m:02}{d:02}-{hh:02}{mm:02}{ss:02}.csv")
}

pub fn write_result_table(path: &Utf8Path, records: &[SampleRecord]) -> Result<(), CnoError> {
    let part = Utf8PathBuf::from(format!("{path}.part"));
    {
        let mut writer = csv::Writer::from_path(&part)?;
        writer.write_record(result_header())?;
        for record in records {
            writer.write_record(record.to_row())?;
        }
        writer.flush()?;
    }
    std::fs::rename(&part, path)?;
    Ok(())
}

/// Per-file summary read back from a result table.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSummary {
    pub file: String,
    pub cno: usize,
    /// Mean density of the index bands, `None` for unanalyzable rows.
    pub density_index: Option<f64>,
}

/// Load the `File`, `CNO` and density-index columns of a result table.
pub fn read_result_table(path: &Utf8Path) -> Result<Vec<ResultSummary>, CnoError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let column = |name: &str| -> Result<usize, CnoError> {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| CnoError::InvalidCsv(format!("{path}: missing column '{name}'")))
    };

    let file_col = column("File")?;
    let cno_col = column("CNO")?;
    let density_cols = DENSITY_INDEX_BANDS
        .iter()
        .map(|j| column(&format!("Layer_Density_{j}")))
        .collect::<Result<Vec<_>, _>>()?;

    let mut summaries = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let row = row?;
        let field = |col: usize| row.get(col).unwrap_or_default();
        let invalid = |what: &str| {
            CnoError::InvalidCsv(format!("{path}: row {}: invalid {what}", idx + 1))
        };

        let cno = field(cno_col).parse::<usize>().map_err(|_| invalid("CNO"))?;
        let densities = density_cols
            .iter()
            .map(|&c| field(c).parse::<f64>().map_err(|_| invalid("layer density")))
            .collect::<Result<Vec<f64>, _>>()?;

        let density_index = if densities.iter().any(|d| d.is_nan()) {
            None
        } else {
            Some(round_to(
                densities.iter().sum::<f64>() / densities.len() as f64,
                4,
            ))
        };

        summaries.push(ResultSummary {
            file: field(file_col).to_string(),
            cno,
            density_index,
        });
    }
    Ok(summaries)
}

#[cfg(test)]
mod table_test {
    use super::*;
    use crate::{
        constants::LAYER_COUNT,
        layers::{Layer, LayerStatistics},
        sample::metadata::FolderMetadata,
    };

    #[test]
    fn test_result_file_name() {
        let epoch = Epoch::from_gregorian_utc(2024, 3, 7, 9, 5, 2, 0);
        assert_eq!(
            result_file_name("DK_G2_TL3_No.14", epoch),
            "DK_G2_TL3_No.14_20240307-090502.csv"
        );
    }

    #[test]
    fn test_write_then_summarize() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(dir.path()).unwrap().join("run.csv");

        let mut layers = [Layer {
            threshold: 0.0,
            pixel_area: 10,
            object_count: 1.0,
            density: 1.0,
        }; LAYER_COUNT];
        layers[16].density = 3.0;
        let records = vec![
            SampleRecord {
                file: "a_trace".into(),
                metadata: FolderMetadata::default(),
                cno: 12,
                areas: None,
                layers: LayerStatistics::Analyzed(layers),
                bandwidth: Some(30.0),
            },
            SampleRecord {
                file: "b_trace".into(),
                metadata: FolderMetadata::default(),
                cno: 2,
                areas: None,
                layers: LayerStatistics::Unanalyzable,
                bandwidth: None,
            },
        ];

        write_result_table(&path, &records).unwrap();
        assert!(path.exists());
        assert!(!Utf8PathBuf::from(format!("{path}.part")).exists());

        let summary = read_result_table(&path).unwrap();
        assert_eq!(
            summary,
            vec![
                ResultSummary {
                    file: "a_trace".into(),
                    cno: 12,
                    density_index: Some(1.6667),
                },
                ResultSummary {
                    file: "b_trace".into(),
                    cno: 2,
                    density_index: None,
                },
            ]
        );
    }

    #[test]
    fn test_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8Path::from_path(dir.path()).unwrap().join("bad.csv");
        std::fs::write(&path, "File,CNO\na,3\n").unwrap();
        assert!(matches!(
            read_result_table(&path),
            Err(CnoError::InvalidCsv(_))
        ));
    }
}
