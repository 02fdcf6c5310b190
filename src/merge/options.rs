//! Tunables of a construction run

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How sections within a page are ordered by `section_counter`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterOrdering {
    /// Compare as integers; counters that don't parse sort after the
    /// numeric ones, by text
    #[default]
    Numeric,
    /// Compare as text ("10" sorts before "2")
    Lexicographic,
}

impl CounterOrdering {
    pub fn compare(self, a: &str, b: &str) -> Ordering {
        match self {
            CounterOrdering::Lexicographic => a.cmp(b),
            CounterOrdering::Numeric => match (a.parse::<u64>(), b.parse::<u64>()) {
                (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
                (Ok(_), Err(_)) => Ordering::Less,
                (Err(_), Ok(_)) => Ordering::Greater,
                (Err(_), Err(_)) => a.cmp(b),
            },
        }
    }
}

/// Relationship type names written to the graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipTypes {
    /// Section -> Page
    pub part_of: String,
    /// Page -> Category
    pub belongs_to: String,
    /// Section -> next Section of the same page
    pub next: String,
    /// Page -> its section with counter "0"
    pub first_section: String,
    /// Section/Page -> extracted entity
    pub mentions: String,
}

impl Default for RelationshipTypes {
    fn default() -> Self {
        Self {
            part_of: "TEIL_VON".to_string(),
            belongs_to: "GEHÖRT_ZU".to_string(),
            next: "NEXT".to_string(),
            first_section: "ERSTE_SECTION".to_string(),
            mentions: "ERWÄHNT".to_string(),
        }
    }
}

impl RelationshipTypes {
    pub(crate) fn all(&self) -> [(&'static str, &str); 5] {
        [
            ("part_of", self.part_of.as_str()),
            ("belongs_to", self.belongs_to.as_str()),
            ("next", self.next.as_str()),
            ("first_section", self.first_section.as_str()),
            ("mentions", self.mentions.as_str()),
        ]
    }
}

/// Options for [`MergeEngine`](super::MergeEngine)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Text units queued before the extraction service is called
    pub batch_size: usize,
    /// Delete the whole graph before Phase 1
    pub wipe_before_run: bool,
    pub extract_sections: bool,
    pub extract_pages: bool,
    pub counter_ordering: CounterOrdering,
    /// Counter value marking a page's first section
    pub first_counter: String,
    pub relationships: RelationshipTypes,
}

impl MergeOptions {
    /// Reject settings a run cannot proceed with.
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".into());
        }
        if self.first_counter.trim().is_empty() {
            return Err("first_counter must not be empty".into());
        }
        for (name, value) in self.relationships.all() {
            if value.trim().is_empty() {
                return Err(format!("relationships.{} must not be empty", name));
            }
        }
        Ok(())
    }
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            batch_size: 1,
            wipe_before_run: true,
            extract_sections: true,
            extract_pages: true,
            counter_ordering: CounterOrdering::Numeric,
            first_counter: "0".to_string(),
            relationships: RelationshipTypes::default(),
        }
    }
}
