//! corpus-graph: knowledge graph construction from a sectioned text corpus
//!
//! Reads a corpus of pages split into sections (CSV exports with embeddings
//! and category lists), asks an extraction service for the entities each
//! text mentions, and merges everything into a property graph.
//!
//! # Core Concepts
//!
//! - **Structural nodes**: `Section`, `Page` and `Category`, keyed by their
//!   ids and created at most once
//! - **Extracted nodes**: entities returned by the extractor, keyed by
//!   `(type, id)` and linked back to the text that mentioned them
//! - **Derived relationships**: containment, category membership, section
//!   sequence and first-section pointers, computed after ingestion
//!
//! # Example
//!
//! ```
//! use corpus_graph::{MergeEngine, MergeOptions, MockExtractor, OpenStore, SqliteStore};
//! use std::sync::Arc;
//!
//! let store = Arc::new(SqliteStore::open_in_memory().unwrap());
//! let engine = MergeEngine::new(store, Arc::new(MockExtractor::available()), MergeOptions::default())
//!     .unwrap();
//! let report = engine.derive_relationships().unwrap();
//! assert_eq!(report.total(), 0);
//! ```

pub mod config;
pub mod extraction;
pub mod graph;
pub mod ingest;
pub mod logging;
pub mod merge;
pub mod storage;

pub use config::{Config, ConfigError};
pub use extraction::{ChatExtractor, ChatExtractorConfig, EntityExtractor, ExtractionError, MockExtractor};
pub use graph::{
    label, ExtractedNode, ExtractedRelationship, GraphDocument, NodeRef, Properties,
    PropertyValue, StoredNode,
};
pub use ingest::{IngestError, PageReader, PageRecord, SectionReader, SectionRecord};
pub use merge::{
    CounterOrdering, IngestReport, LinkageReport, Linker, MergeEngine, MergeError, MergeOptions,
    MergeResult, RelationshipTypes, RunSummary,
};
pub use storage::{
    DocumentMergeStats, EdgePolicy, GraphStore, Join, NodeSelector, OpenStore, RelationshipPattern,
    SqliteStore, StorageError, StorageResult, TransferStats,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
