//! Phase 2: relationships derived from stored properties

use super::{LinkageReport, MergeOptions, MergeResult};
use crate::graph::label;
use crate::storage::{GraphStore, Join, NodeSelector, RelationshipPattern};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Phase 2 over a store; needs no extractor
pub struct Linker<'a> {
    store: &'a dyn GraphStore,
    options: &'a MergeOptions,
}

impl<'a> Linker<'a> {
    pub fn new(store: &'a dyn GraphStore, options: &'a MergeOptions) -> Self {
        Self { store, options }
    }

    /// Derive every structural relationship. Edges that already exist are
    /// left alone, so a second call creates nothing.
    pub fn derive(&self) -> MergeResult<LinkageReport> {
        let (next, unsequenced) = self.link_section_sequences()?;
        let report = LinkageReport {
            part_of: self.link_sections_to_pages()?,
            belongs_to: self.link_pages_to_categories()?,
            next,
            first_section: self.link_first_sections()?,
            unsequenced,
        };
        info!(
            part_of = report.part_of,
            belongs_to = report.belongs_to,
            next = report.next,
            first_section = report.first_section,
            "relationships derived"
        );
        Ok(report)
    }

    /// Section -> Page where the section's `page_id` names the page.
    pub fn link_sections_to_pages(&self) -> MergeResult<usize> {
        let pattern = RelationshipPattern::new(
            NodeSelector::label(label::SECTION),
            NodeSelector::label(label::PAGE),
            Join::PropertyEq {
                source: "page_id".into(),
                target: "page_id".into(),
            },
            self.options.relationships.part_of.clone(),
        );
        Ok(self.store.create_relationship(&pattern)?)
    }

    /// Page -> Category for every name in the page's `categories` list.
    pub fn link_pages_to_categories(&self) -> MergeResult<usize> {
        let pattern = RelationshipPattern::new(
            NodeSelector::label(label::PAGE),
            NodeSelector::label(label::CATEGORY),
            Join::ListContains {
                list: "categories".into(),
                target: "name".into(),
            },
            self.options.relationships.belongs_to.clone(),
        );
        Ok(self.store.create_relationship(&pattern)?)
    }

    /// Chain the sections of each page in counter order.
    ///
    /// Returns the edges created and the number of sections skipped for
    /// lacking a page id or counter.
    pub fn link_section_sequences(&self) -> MergeResult<(usize, usize)> {
        let mut by_page: BTreeMap<String, Vec<(String, i64)>> = BTreeMap::new();
        let mut skipped = 0;

        for node in self.store.find_nodes(label::SECTION)? {
            match (node.text("page_id"), node.text("section_counter")) {
                (Some(page_id), Some(counter)) if !page_id.is_empty() && !counter.is_empty() => {
                    by_page.entry(page_id).or_default().push((counter, node.id));
                }
                _ => {
                    skipped += 1;
                    warn!(section = %node.key_value, "section without page_id or section_counter left out of sequence");
                }
            }
        }

        let ordering = self.options.counter_ordering;
        let rel_type = &self.options.relationships.next;
        let mut created = 0;
        for (page_id, mut members) in by_page {
            // Stable: equal counters keep store order
            members.sort_by(|a, b| ordering.compare(&a.0, &b.0));
            let chain: Vec<i64> = members.iter().map(|(_, id)| *id).collect();
            let n = self.store.link_chain(rel_type, &chain)?;
            debug!(%page_id, sections = chain.len(), created = n, "sequence linked");
            created += n;
        }
        Ok((created, skipped))
    }

    /// Page -> its section whose counter is the configured first counter.
    pub fn link_first_sections(&self) -> MergeResult<usize> {
        let pattern = RelationshipPattern::new(
            NodeSelector::label(label::PAGE),
            NodeSelector::label(label::SECTION)
                .with_filter("section_counter", self.options.first_counter.clone()),
            Join::PropertyEq {
                source: "page_id".into(),
                target: "page_id".into(),
            },
            self.options.relationships.first_section.clone(),
        );
        Ok(self.store.create_relationship(&pattern)?)
    }
}
