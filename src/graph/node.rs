//! Node representation in the knowledge graph

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Labels of the nodes built directly from input records
pub mod label {
    pub const SECTION: &str = "Section";
    pub const PAGE: &str = "Page";
    pub const CATEGORY: &str = "Category";
}

/// Typed property values
///
/// Serialized untagged, so a property map round-trips as plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<PropertyValue>),
    Object(HashMap<String, PropertyValue>),
    Null,
}

impl PropertyValue {
    /// Text form used for upsert keys and grouping.
    ///
    /// Returns `None` for composite values and null.
    pub fn as_key_text(&self) -> Option<String> {
        match self {
            PropertyValue::String(s) => Some(s.clone()),
            PropertyValue::Int(i) => Some(i.to_string()),
            PropertyValue::Float(f) => Some(f.to_string()),
            PropertyValue::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<Vec<f64>> for PropertyValue {
    fn from(values: Vec<f64>) -> Self {
        PropertyValue::Array(values.into_iter().map(PropertyValue::Float).collect())
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(values: Vec<String>) -> Self {
        PropertyValue::Array(values.into_iter().map(PropertyValue::String).collect())
    }
}

/// Properties collection
pub type Properties = HashMap<String, PropertyValue>;

/// Identity of a node by its upsert key: label, key property and key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub label: String,
    pub key_field: String,
    pub key_value: String,
}

impl NodeRef {
    pub fn new(
        label: impl Into<String>,
        key_field: impl Into<String>,
        key_value: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            key_field: key_field.into(),
            key_value: key_value.into(),
        }
    }

    pub fn section(section_id: impl Into<String>) -> Self {
        Self::new(label::SECTION, "section_id", section_id)
    }

    pub fn page(page_id: impl Into<String>) -> Self {
        Self::new(label::PAGE, "page_id", page_id)
    }

    pub fn category(name: impl Into<String>) -> Self {
        Self::new(label::CATEGORY, "name", name)
    }
}

impl std::fmt::Display for NodeRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}:{}={})", self.label, self.key_field, self.key_value)
    }
}

/// A node as it lives in the store
#[derive(Debug, Clone, PartialEq)]
pub struct StoredNode {
    /// Store-assigned identifier
    pub id: i64,
    pub label: String,
    pub key_field: String,
    pub key_value: String,
    pub properties: Properties,
}

impl StoredNode {
    /// Look up a property rendered as text (see [`PropertyValue::as_key_text`]).
    pub fn text(&self, field: &str) -> Option<String> {
        self.properties.get(field).and_then(PropertyValue::as_key_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn properties_serialize_as_plain_json() {
        let mut props = Properties::new();
        props.insert("section_counter".into(), "0".into());
        props.insert("cls_embed".into(), vec![0.5, -1.0].into());

        let json = serde_json::to_value(&props).unwrap();
        assert_eq!(json["section_counter"], "0");
        assert_eq!(json["cls_embed"], serde_json::json!([0.5, -1.0]));
    }

    #[test]
    fn property_value_deserializes_null_and_numbers() {
        let props: Properties =
            serde_json::from_str(r#"{"a": null, "b": 3, "c": 2.5, "d": [1, "x"]}"#).unwrap();
        assert_eq!(props["a"], PropertyValue::Null);
        assert_eq!(props["b"], PropertyValue::Int(3));
        assert_eq!(props["c"], PropertyValue::Float(2.5));
        assert_eq!(
            props["d"],
            PropertyValue::Array(vec![PropertyValue::Int(1), PropertyValue::String("x".into())])
        );
    }

    #[test]
    fn key_text_only_for_scalars() {
        assert_eq!(PropertyValue::Int(7).as_key_text().as_deref(), Some("7"));
        assert_eq!(PropertyValue::from("P1").as_key_text().as_deref(), Some("P1"));
        assert_eq!(PropertyValue::Null.as_key_text(), None);
        assert_eq!(PropertyValue::Array(vec![]).as_key_text(), None);
    }

    #[test]
    fn node_ref_display() {
        assert_eq!(NodeRef::section("S0").to_string(), "(Section:section_id=S0)");
    }
}
