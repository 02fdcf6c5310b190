//! Record ingestion
//!
//! Streams section and page rows from CSV files and decodes their
//! literal-encoded columns. A malformed row fails the whole run; nothing is
//! skipped.

pub mod literal;
mod records;

pub use records::{PageReader, PageRecord, SectionReader, SectionRecord};

use literal::LiteralError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading input records
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Cannot open {}: {source}", path.display())]
    Open { path: PathBuf, source: csv::Error },

    #[error("CSV error in record {record}: {source}")]
    Csv { record: usize, source: csv::Error },

    #[error("Malformed {column} in record {record}: {source}")]
    Literal {
        record: usize,
        column: &'static str,
        source: LiteralError,
    },
}
