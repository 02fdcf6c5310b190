//! Storage trait definitions

use crate::graph::{GraphDocument, NodeRef, Properties, PropertyValue, StoredNode};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("Invalid relationship pattern: {0}")]
    InvalidPattern(String),

    #[error("Invalid export record on line {line}: {reason}")]
    InvalidExport { line: usize, reason: String },

    #[error("Relationship {rel_id} on line {line} references unknown node {node_id}")]
    DanglingImport {
        line: usize,
        rel_id: String,
        node_id: String,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// What an upsert did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    /// Identifier of the created or matched node
    pub node_id: i64,
    /// True when the key was new and the attributes were written
    pub created: bool,
}

/// How `create_relationship` treats an edge that already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgePolicy {
    /// Create only if no edge of the same type joins the same two nodes
    #[default]
    Merge,
    /// Always create
    Create,
}

/// Selects a set of nodes by label and property equality
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeSelector {
    /// Restrict to one label; `None` matches any label
    pub label: Option<String>,
    /// Property equality filters, all of which must hold
    pub filters: Vec<(String, PropertyValue)>,
}

impl NodeSelector {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn label(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            filters: Vec::new(),
        }
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.filters.push((field.into(), value.into()));
        self
    }

    /// Select exactly the node a [`NodeRef`] names.
    pub fn node(node: &NodeRef) -> Self {
        Self::label(node.label.clone()).with_filter(node.key_field.clone(), node.key_value.clone())
    }
}

/// Condition relating a source node to a target node
#[derive(Debug, Clone, PartialEq)]
pub enum Join {
    /// Every source/target pair passing the selectors
    None,
    /// `source.<source> == target.<target>`
    PropertyEq { source: String, target: String },
    /// `target.<target>` is an element of the list `source.<list>`
    ListContains { list: String, target: String },
}

/// A relationship-creation pattern: match two node sets, join them, and
/// create a typed edge for each matching pair.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipPattern {
    pub source: NodeSelector,
    pub target: NodeSelector,
    pub join: Join,
    pub rel_type: String,
    pub policy: EdgePolicy,
}

impl RelationshipPattern {
    pub fn new(
        source: NodeSelector,
        target: NodeSelector,
        join: Join,
        rel_type: impl Into<String>,
    ) -> Self {
        Self {
            source,
            target,
            join,
            rel_type: rel_type.into(),
            policy: EdgePolicy::Merge,
        }
    }

    pub fn with_policy(mut self, policy: EdgePolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Counts from merging one extraction result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentMergeStats {
    pub nodes_created: usize,
    pub nodes_matched: usize,
    pub relationships_created: usize,
    pub mentions_created: usize,
}

impl std::ops::AddAssign for DocumentMergeStats {
    fn add_assign(&mut self, rhs: Self) {
        self.nodes_created += rhs.nodes_created;
        self.nodes_matched += rhs.nodes_matched;
        self.relationships_created += rhs.relationships_created;
        self.mentions_created += rhs.mentions_created;
    }
}

/// Counts from a bulk export or import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub nodes: usize,
    pub relationships: usize,
}

/// Trait for graph storage backends
///
/// Every method is its own atomic unit. Implementations must be thread-safe
/// (Send + Sync); callers in this crate drive them from a single task.
pub trait GraphStore: Send + Sync {
    /// Delete every node and relationship
    fn wipe_all(&self) -> StorageResult<()>;

    /// Merge-or-create a node by label and key.
    ///
    /// On create all attributes are written (plus the key itself); on match
    /// the stored attributes are left untouched.
    fn upsert(
        &self,
        label: &str,
        key_field: &str,
        key_value: &str,
        attributes: &Properties,
    ) -> StorageResult<UpsertOutcome>;

    /// Create the edges a pattern describes; returns how many were created
    fn create_relationship(&self, pattern: &RelationshipPattern) -> StorageResult<usize>;

    /// Link the given nodes in order, `a -> b -> c`, skipping existing edges
    fn link_chain(&self, rel_type: &str, node_ids: &[i64]) -> StorageResult<usize>;

    /// All nodes carrying a label
    fn find_nodes(&self, label: &str) -> StorageResult<Vec<StoredNode>>;

    /// Merge one extraction result and its provenance edges from `origin`
    /// as a single transaction
    fn merge_document(
        &self,
        origin: &NodeRef,
        document: &GraphDocument,
        mentions_type: &str,
    ) -> StorageResult<DocumentMergeStats>;

    /// Number of nodes, optionally restricted to a label
    fn count_nodes(&self, label: Option<&str>) -> StorageResult<usize>;

    /// Number of relationships, optionally restricted to a type
    fn count_relationships(&self, rel_type: Option<&str>) -> StorageResult<usize>;

    /// Stream the whole graph to a line-delimited JSON file
    fn bulk_export(&self, path: &Path) -> StorageResult<TransferStats>;

    /// Load a file written by `bulk_export`
    fn bulk_import(&self, path: &Path) -> StorageResult<TransferStats>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: GraphStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
