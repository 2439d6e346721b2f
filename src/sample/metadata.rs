//! Cohort metadata encoded in session folder names.
//!
//! Folders follow `{country}_G{group}_TL{tlss}_..._No.{number}`, e.g.
//! `DK_G2_TL3_No.14`. Tokens are read positionally; a name that does not follow
//! the convention yields a [`FolderMetadata`] with every field empty.
use std::fmt;

/// Metadata of one session folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderMetadata {
    pub country: Option<String>,
    pub group: Option<String>,
    pub tlss: Option<u32>,
    /// `true` when the TLSS score is non-zero.
    pub lesional: Option<bool>,
    pub number: Option<u32>,
}

impl FolderMetadata {
    pub fn parse(folder_name: &str) -> Self {
        Self::try_parse(folder_name).unwrap_or_default()
    }

    fn try_parse(folder_name: &str) -> Option<Self> {
        let tokens: Vec<&str> = folder_name.split('_').collect();
        let tl_token = tokens.get(2)?;
        if !tl_token.starts_with("TL") {
            return None;
        }

        let tlss = tl_token.trim_matches(|c: char| c == 'T' || c == 'L').parse::<u32>().ok()?;
        let number = tokens
            .last()?
            .trim_matches(|c: char| c == 'N' || c == 'o' || c == '.')
            .parse::<u32>()
            .ok()?;
        let group = tokens[1].trim_matches('G').to_string();

        Some(FolderMetadata {
            country: Some(tokens[0].to_string()),
            group: Some(group),
            tlss: Some(tlss),
            lesional: Some(tlss != 0),
            number: Some(number),
        })
    }

    pub fn is_empty(&self) -> bool {
        *self == FolderMetadata::default()
    }
}

impl fmt::Display for FolderMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn show<T: fmt::Display>(v: &Option<T>) -> String {
            v.as_ref().map_or_else(|| "-".to_string(), |v| v.to_string())
        }
        write!(
            f,
            "country={} group={} no.={} tlss={} lesional={}",
            show(&self.country),
            show(&self.group),
            show(&self.number),
            show(&self.tlss),
            show(&self.lesional)
        )
    }
}
