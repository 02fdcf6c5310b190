//! Graph merge engine
//!
//! Builds the corpus graph in two phases:
//! - Phase 1 upserts structural nodes (sections, pages, categories) row by
//!   row and merges each text unit's extraction result with provenance edges
//!   back to the unit it came from.
//! - Phase 2 derives structural relationships from stored properties:
//!   containment, category membership, section sequence and first-section
//!   pointers.
//!
//! Phase 2 reads everything back from the store, so it only depends on what
//! Phase 1 left behind, never on input order.

mod engine;
mod linkage;
mod options;
mod summary;

pub use engine::MergeEngine;
pub use linkage::Linker;
pub use options::{CounterOrdering, MergeOptions, RelationshipTypes};
pub use summary::{IngestReport, LinkageReport, RunSummary};

use crate::extraction::ExtractionError;
use crate::ingest::IngestError;
use crate::storage::StorageError;
use thiserror::Error;

/// Errors that stop a construction run
#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error("Invalid merge options: {0}")]
    InvalidOptions(String),
}

/// Result type for merge operations
pub type MergeResult<T> = Result<T, MergeError>;
