//! Graph elements produced by the entity extraction service

use super::node::Properties;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// An entity discovered in a text unit.
///
/// `id` is the human-readable name the service assigned; `label` is the
/// entity type and becomes the node label in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedNode {
    pub id: String,
    #[serde(alias = "type")]
    pub label: String,
    #[serde(default)]
    pub properties: Properties,
}

impl ExtractedNode {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            properties: Properties::new(),
        }
    }
}

/// A typed edge between two extracted nodes, referenced by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRelationship {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub rel_type: String,
    #[serde(default)]
    pub properties: Properties,
}

impl ExtractedRelationship {
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        rel_type: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            rel_type: rel_type.into(),
            properties: Properties::new(),
        }
    }
}

/// Everything the extraction service returned for one text unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<ExtractedNode>,
    #[serde(default)]
    pub relationships: Vec<ExtractedRelationship>,
}

impl GraphDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node: ExtractedNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_relationship(mut self, relationship: ExtractedRelationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty()
    }

    /// Collapse nodes reported under the same id; the first occurrence wins.
    pub fn dedup_nodes(&mut self) {
        let mut seen = HashSet::new();
        self.nodes.retain(|node| seen.insert(node.id.clone()));
    }

    /// Give every node the label first recorded for its id in `first_labels`,
    /// recording the ids seen here for the first time. Returns how many
    /// nodes were relabelled.
    pub fn adopt_labels(&mut self, first_labels: &mut HashMap<String, String>) -> usize {
        let mut relabelled = 0;
        for node in &mut self.nodes {
            match first_labels.get(&node.id) {
                Some(label) if *label != node.label => {
                    node.label = label.clone();
                    relabelled += 1;
                }
                Some(_) => {}
                None => {
                    first_labels.insert(node.id.clone(), node.label.clone());
                }
            }
        }
        relabelled
    }

    /// First relationship endpoint that names no node in this document.
    pub fn dangling_endpoint(&self) -> Option<&str> {
        let ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        self.relationships
            .iter()
            .flat_map(|r| [r.source.as_str(), r.target.as_str()])
            .find(|id| !ids.contains(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node<'a>(doc: &'a GraphDocument, id: &str) -> &'a ExtractedNode {
        doc.nodes.iter().find(|n| n.id == id).unwrap()
    }

    #[test]
    fn dedup_keeps_first_label() {
        let mut doc = GraphDocument::new()
            .with_node(ExtractedNode::new("Aspirin", "Medikament"))
            .with_node(ExtractedNode::new("Fieber", "Symptom"))
            .with_node(ExtractedNode::new("Aspirin", "Wirkstoff"));

        doc.dedup_nodes();

        assert_eq!(doc.nodes.len(), 2);
        assert_eq!(node(&doc, "Aspirin").label, "Medikament");
    }

    #[test]
    fn dangling_endpoint_detected() {
        let doc = GraphDocument::new()
            .with_node(ExtractedNode::new("Aspirin", "Medikament"))
            .with_relationship(ExtractedRelationship::new("Aspirin", "Fieber", "BEHANDELT"));
        assert_eq!(doc.dangling_endpoint(), Some("Fieber"));

        let doc = doc.with_node(ExtractedNode::new("Fieber", "Symptom"));
        assert_eq!(doc.dangling_endpoint(), None);
    }

    #[test]
    fn later_documents_adopt_first_label_for_an_id() {
        let mut first_labels = HashMap::new();
        let mut first = GraphDocument::new()
            .with_node(ExtractedNode::new("Herz", "Organ"))
            .with_node(ExtractedNode::new("Blut", "Stoff"));
        let mut second = GraphDocument::new()
            .with_node(ExtractedNode::new("Herz", "Koerperteil"))
            .with_node(ExtractedNode::new("Lunge", "Organ"));

        assert_eq!(first.adopt_labels(&mut first_labels), 0);
        assert_eq!(second.adopt_labels(&mut first_labels), 1);

        assert_eq!(node(&second, "Herz").label, "Organ");
        assert_eq!(node(&second, "Lunge").label, "Organ");
        assert_eq!(first_labels.len(), 3);
    }

    #[test]
    fn deserializes_service_payload() {
        let doc: GraphDocument = serde_json::from_str(
            r#"{
                "nodes": [{"id": "Aspirin", "type": "Medikament"}],
                "relationships": [{"source": "Aspirin", "target": "Aspirin", "type": "IST"}]
            }"#,
        )
        .unwrap();
        assert_eq!(doc.nodes[0].label, "Medikament");
        assert!(doc.nodes[0].properties.is_empty());
        assert_eq!(doc.relationships[0].rel_type, "IST");
    }
}
