//! # Raw AFM scans
//!
//! Discovery, decoding and preprocessing of the raw topography files found in
//! a session folder.
//!
//! ## Overview
//! -----------------
//! * [`ScanFormat`] is decided once, from the file name, when a folder is
//!   scanned ([`discover_scans`]); it travels with the path as a [`ScanFile`].
//! * Each format has a [`RawScanDecoder`] turning the file bytes into a raw
//!   height matrix ([`bcr::BcrDecoder`], [`nid::NidDecoder`]).
//! * [`preprocess::HeightMap`] levels, normalizes and contrast-enhances the
//!   heights; the result is written as two afm-hot PNG previews, the
//!   *original* and the *enhanced* image. The enhanced image is what the
//!   detector consumes.
//!
//! ## File naming
//! -----------------
//! Only files named `*_trace.bcr` or `*_trace.nid` (any case) lying directly
//! in the session folder are considered; resource-fork files (`._*`) are
//! skipped. Previews keep the file stem, so `A1_trace.bcr` produces
//! `A1_trace.png` in both preview directories.
use camino::{Utf8Path, Utf8PathBuf};
use nalgebra::DMatrix;

use crate::cno_errors::CnoError;

pub mod bcr;
pub mod nid;
pub mod preprocess;

use bcr::BcrDecoder;
use nid::NidDecoder;
use preprocess::HeightMap;

/// Raw scan file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanFormat {
    /// Binary BCR-STM file: fixed 2048-byte text header, 16-bit samples.
    Bcr,
    /// Nanosurf NID file: INI-like text header, `#!` marker, 16/32-bit samples.
    Nid,
}

impl ScanFormat {
    const TRACE_SUFFIXES: [(&'static str, ScanFormat); 2] =
        [("_trace.bcr", ScanFormat::Bcr), ("_trace.nid", ScanFormat::Nid)];

    /// Format of a trace file, from its name.
    ///
    /// Return
    /// ----------
    /// * `None` when the name is not a trace file or is a `._` resource fork.
    pub fn from_file_name(name: &str) -> Option<ScanFormat> {
        if name.starts_with("._") {
            return None;
        }
        let lower = name.to_ascii_lowercase();
        Self::TRACE_SUFFIXES
            .iter()
            .find(|(suffix, _)| lower.ends_with(suffix))
            .map(|&(_, format)| format)
    }

    pub fn decoder(&self) -> &'static dyn RawScanDecoder {
        match self {
            ScanFormat::Bcr => &BcrDecoder,
            ScanFormat::Nid => &NidDecoder,
        }
    }
}

/// Decode the bytes of one raw scan file into a height matrix (rows = scan lines).
pub trait RawScanDecoder: Send + Sync {
    fn decode(&self, bytes: &[u8], path: &Utf8Path) -> Result<DMatrix<f64>, CnoError>;
}

/// A raw scan file tagged with its format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFile {
    pub path: Utf8PathBuf,
    pub format: ScanFormat,
}

impl ScanFile {
    /// File name without extension, e.g. `A1_trace`.
    pub fn stem(&self) -> &str {
        self.path.file_stem().unwrap_or_default()
    }

    pub fn load(&self) -> Result<HeightMap, CnoError> {
        let bytes = std::fs::read(&self.path)?;
        let raw = self.format.decoder().decode(&bytes, &self.path)?;
        HeightMap::from_raw(&raw).ok_or_else(|| CnoError::ScanDecode {
            path: self.path.clone(),
            reason: "empty or flat height map".into(),
        })
    }

    /// Decode, preprocess and write the original/enhanced previews.
    ///
    /// Return
    /// ----------
    /// * The path of the enhanced PNG.
    pub fn preprocess(
        &self,
        original_dir: &Utf8Path,
        enhanced_dir: &Utf8Path,
    ) -> Result<Utf8PathBuf, CnoError> {
        let height_map = self.load()?;
        let name = format!("{}.png", self.stem());

        height_map.original_image().save(original_dir.join(&name))?;
        let enhanced_path = enhanced_dir.join(&name);
        height_map.enhanced_image().save(&enhanced_path)?;
        Ok(enhanced_path)
    }
}

/// Trace files lying directly in `folder`, sorted by path.
pub fn discover_scans(folder: &Utf8Path) -> Result<Vec<ScanFile>, CnoError> {
    let mut scans = Vec::new();
    for entry in folder.read_dir_utf8()? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(format) = ScanFormat::from_file_name(entry.file_name()) {
            scans.push(ScanFile {
                path: entry.into_path(),
                format,
            });
        }
    }
    scans.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(scans)
}
