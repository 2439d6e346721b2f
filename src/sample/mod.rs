//! # Samples
//!
//! Everything attached to one analyzed image once the density work is done:
//! the cohort metadata of its folder ([`metadata`]), the output row
//! ([`record`]) and the per-folder result table ([`table`]).
pub mod metadata;
pub mod record;
pub mod table;

pub use metadata::FolderMetadata;
pub use record::SampleRecord;
