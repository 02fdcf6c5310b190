//! Graph store adapter
//!
//! The merge engine talks to storage only through the `GraphStore` trait.
//! `SqliteStore` is the embedded property-graph implementation; `export`
//! defines the line-delimited backup format used by bulk export and import.

pub mod export;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{
    DocumentMergeStats, EdgePolicy, GraphStore, Join, NodeSelector, OpenStore,
    RelationshipPattern, StorageError, StorageResult, TransferStats, UpsertOutcome,
};
