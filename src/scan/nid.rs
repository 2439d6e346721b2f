use std::collections::HashMap;

use camino::Utf8Path;
use nalgebra::DMatrix;

use crate::cno_errors::CnoError;

use super::RawScanDecoder;

/// Marker separating the text header from the binary payload.
const DATA_MARKER: &[u8] = b"#!";

/// Nanosurf NID decoder.
///
/// The header is an INI-like list of `[Section]` blocks with `Key=Value`
/// lines. Every data set has a `[DataSet-g:c]` section giving its geometry
/// (`Points` per line, `Lines`) and encoding (`SaveBits`, `SaveSign`). The
/// payload holds the data sets back to back, in header order, so the first
/// data set starts right after the marker. Only that one is decoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct NidDecoder;

type Section = HashMap<String, String>;

fn parse_header(header: &str) -> Vec<(String, Section)> {
    let mut sections: Vec<(String, Section)> = Vec::new();
    for line in header.lines().map(str::trim) {
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            sections.push((name.to_string(), Section::new()));
        } else if let Some((key, value)) = line.split_once('=') {
            if let Some((_, section)) = sections.last_mut() {
                section.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
    }
    sections
}

impl RawScanDecoder for NidDecoder {
    fn decode(&self, bytes: &[u8], path: &Utf8Path) -> Result<DMatrix<f64>, CnoError> {
        let decode_err = |reason: String| CnoError::ScanDecode {
            path: path.to_owned(),
            reason,
        };

        let marker = bytes
            .windows(DATA_MARKER.len())
            .position(|w| w == DATA_MARKER)
            .ok_or_else(|| decode_err("no '#!' data marker".into()))?;
        let header = String::from_utf8_lossy(&bytes[..marker]);
        let data = &bytes[marker + DATA_MARKER.len()..];

        let sections = parse_header(&header);
        let (name, section) = sections
            .iter()
            .find(|(name, s)| {
                name.starts_with("DataSet-") && s.contains_key("Points") && s.contains_key("Lines")
            })
            .ok_or_else(|| decode_err("no data set section in header".into()))?;

        let field = |key: &str| -> Result<usize, CnoError> {
            section
                .get(key)
                .and_then(|v| v.parse::<usize>().ok())
                .ok_or_else(|| decode_err(format!("[{name}] has no valid '{key}'")))
        };
        let points = field("Points")?;
        let lines = field("Lines")?;
        let bits = field("SaveBits")?;
        let signed = section
            .get("SaveSign")
            .map_or(true, |s| !s.eq_ignore_ascii_case("unsigned"));

        let width = match bits {
            16 => 2,
            32 => 4,
            other => return Err(decode_err(format!("unsupported SaveBits={other}"))),
        };
        let needed = points * lines * width;
        if points == 0 || lines == 0 || data.len() < needed {
            return Err(decode_err(format!(
                "expected {needed} data bytes for {points}x{lines}, found {}",
                data.len()
            )));
        }

        let samples: Vec<f64> = data[..needed]
            .chunks_exact(width)
            .map(|w| match (width, signed) {
                (2, true) => i16::from_le_bytes([w[0], w[1]]) as f64,
                (2, false) => u16::from_le_bytes([w[0], w[1]]) as f64,
                (_, true) => i32::from_le_bytes([w[0], w[1], w[2], w[3]]) as f64,
                (_, false) => u32::from_le_bytes([w[0], w[1], w[2], w[3]]) as f64,
            })
            .collect();
        Ok(DMatrix::from_row_slice(lines, points, &samples))
    }
}

#[cfg(test)]
mod nid_test {
    use super::*;

    fn nid_bytes(bits: usize, payload: &[u8]) -> Vec<u8> {
        let header = format!(
            "[DataSet]\nVersion=2\nGr0-Ch0=DataSet-0:1\n\n\
             [DataSet-0:1]\nFrame=Scan forward\nPoints=2\nLines=2\nSaveBits={bits}\nSaveSign=Signed\n\n\
             [DataSet-0:2]\nPoints=2\nLines=2\nSaveBits={bits}\n"
        );
        let mut bytes = header.into_bytes();
        bytes.extend_from_slice(DATA_MARKER);
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_decode_32_bit() {
        let payload: Vec<u8> = [10i32, -20, 30, -40]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let m = NidDecoder
            .decode(&nid_bytes(32, &payload), Utf8Path::new("a_trace.nid"))
            .unwrap();
        assert_eq!(m.shape(), (2, 2));
        assert_eq!(m[(0, 1)], -20.0);
        assert_eq!(m[(1, 1)], -40.0);
    }

    #[test]
    fn test_decode_16_bit() {
        let payload: Vec<u8> = [1i16, 2, 3, 4].iter().flat_map(|v| v.to_le_bytes()).collect();
        let m = NidDecoder
            .decode(&nid_bytes(16, &payload), Utf8Path::new("a_trace.nid"))
            .unwrap();
        assert_eq!(m[(1, 0)], 3.0);
    }

    #[test]
    fn test_rejects_bad_headers() {
        let path = Utf8Path::new("a_trace.nid");
        assert!(NidDecoder.decode(b"[DataSet]\nVersion=2\n", path).is_err());
        assert!(NidDecoder.decode(&nid_bytes(8, &[0; 4]), path).is_err());
        assert!(NidDecoder.decode(&nid_bytes(32, &[0; 7]), path).is_err());
    }
}
