//! Counters reported by a construction run

use crate::storage::DocumentMergeStats;
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// What Phase 1 did with one input file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Rows read
    pub rows: usize,
    /// Structural nodes created (sections or pages)
    pub nodes_created: usize,
    /// Structural nodes that already existed
    pub nodes_matched: usize,
    /// Category nodes created while reading pages
    pub categories_created: usize,
    /// Units sent to the extractor
    pub extraction_calls: usize,
    /// Units skipped because their text was blank
    pub blank_texts: usize,
    /// Accumulated results of merging extracted documents
    pub extracted: DocumentMergeStats,
}

/// Edges created by Phase 2, per derived relationship
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkageReport {
    pub part_of: usize,
    pub belongs_to: usize,
    pub next: usize,
    pub first_section: usize,
    /// Sections left out of sequence derivation for lack of a page id or counter
    pub unsequenced: usize,
}

impl LinkageReport {
    pub fn total(&self) -> usize {
        self.part_of + self.belongs_to + self.next + self.first_section
    }
}

/// Outcome of [`MergeEngine::run`](super::MergeEngine::run)
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub wiped: bool,
    pub sections: IngestReport,
    pub pages: IngestReport,
    pub linkage: LinkageReport,
    /// Store totals once the run finished
    pub total_nodes: usize,
    pub total_relationships: usize,
}

impl RunSummary {
    pub fn extraction_calls(&self) -> usize {
        self.sections.extraction_calls + self.pages.extraction_calls
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {}", self.run_id)?;
        writeln!(
            f,
            "  sections:   {} rows, {} created, {} extracted",
            self.sections.rows, self.sections.nodes_created, self.sections.extraction_calls
        )?;
        writeln!(
            f,
            "  pages:      {} rows, {} created, {} extracted",
            self.pages.rows, self.pages.nodes_created, self.pages.extraction_calls
        )?;
        writeln!(f, "  categories: {} created", self.pages.categories_created)?;

        let mut extracted = self.sections.extracted;
        extracted += self.pages.extracted;
        writeln!(
            f,
            "  entities:   {} created, {} matched, {} relationships, {} mentions",
            extracted.nodes_created,
            extracted.nodes_matched,
            extracted.relationships_created,
            extracted.mentions_created
        )?;
        writeln!(
            f,
            "  linkage:    {} part-of, {} membership, {} next, {} first-section",
            self.linkage.part_of,
            self.linkage.belongs_to,
            self.linkage.next,
            self.linkage.first_section
        )?;
        write!(
            f,
            "  graph:      {} nodes, {} relationships ({} ms)",
            self.total_nodes,
            self.total_relationships,
            self.elapsed().num_milliseconds()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linkage_total_ignores_unsequenced() {
        let report = LinkageReport {
            part_of: 4,
            belongs_to: 3,
            next: 2,
            first_section: 2,
            unsequenced: 5,
        };
        assert_eq!(report.total(), 11);
    }

    #[test]
    fn summary_display_lists_counts() {
        let now = Utc::now();
        let summary = RunSummary {
            run_id: Uuid::nil(),
            started_at: now,
            finished_at: now,
            wiped: true,
            sections: IngestReport {
                rows: 4,
                nodes_created: 4,
                extraction_calls: 4,
                ..Default::default()
            },
            pages: IngestReport {
                rows: 2,
                nodes_created: 2,
                categories_created: 2,
                ..Default::default()
            },
            linkage: LinkageReport::default(),
            total_nodes: 8,
            total_relationships: 11,
        };
        let text = summary.to_string();
        assert!(text.contains("4 rows, 4 created"));
        assert!(text.contains("categories: 2 created"));
        assert!(text.contains("8 nodes, 11 relationships"));
        assert_eq!(summary.extraction_calls(), 4);
    }
}
