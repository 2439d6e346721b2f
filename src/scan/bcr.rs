use camino::Utf8Path;
use nalgebra::DMatrix;
use regex::Regex;

use crate::cno_errors::CnoError;

use super::RawScanDecoder;

/// Size in bytes of the text header preceding the samples.
pub const BCR_HEADER_LEN: usize = 2048;

/// BCR-STM decoder: `xpixels × ypixels` little-endian `i16` samples after a
/// fixed-size ASCII header, stored line by line.
#[derive(Debug, Clone, Copy, Default)]
pub struct BcrDecoder;

fn header_dimension(header: &str, key: &str, path: &Utf8Path) -> Result<usize, CnoError> {
    let decode_err = |reason: String| CnoError::ScanDecode {
        path: path.to_owned(),
        reason,
    };
    let pattern = Regex::new(&format!(r"{key}\s?=\s?([0-9]+)"))
        .map_err(|e| decode_err(e.to_string()))?;
    pattern
        .captures(header)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .filter(|&v| v > 0)
        .ok_or_else(|| decode_err(format!("missing or invalid '{key}' in header")))
}

impl RawScanDecoder for BcrDecoder {
    fn decode(&self, bytes: &[u8], path: &Utf8Path) -> Result<DMatrix<f64>, CnoError> {
        if bytes.len() < BCR_HEADER_LEN {
            return Err(CnoError::ScanDecode {
                path: path.to_owned(),
                reason: format!("file shorter than the {BCR_HEADER_LEN}-byte header"),
            });
        }
        let (header, data) = bytes.split_at(BCR_HEADER_LEN);
        let header = String::from_utf8_lossy(header);

        let xpix = header_dimension(&header, "xpixels", path)?;
        let ypix = header_dimension(&header, "ypixels", path)?;

        let needed = xpix * ypix * 2;
        if data.len() < needed {
            return Err(CnoError::ScanDecode {
                path: path.to_owned(),
                reason: format!("expected {needed} data bytes, found {}", data.len()),
            });
        }

        let samples: Vec<f64> = data[..needed]
            .chunks_exact(2)
            .map(|w| i16::from_le_bytes([w[0], w[1]]) as f64)
            .collect();
        Ok(DMatrix::from_row_slice(ypix, xpix, &samples))
    }
}
