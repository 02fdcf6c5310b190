//! Core graph data structures

mod extracted;
mod node;

pub use extracted::{ExtractedNode, ExtractedRelationship, GraphDocument};
pub use node::{label, NodeRef, Properties, PropertyValue, StoredNode};
