//! Phase 1: structural upserts and extraction merges

use super::{IngestReport, LinkageReport, Linker, MergeError, MergeOptions, MergeResult, RunSummary};
use crate::extraction::{EntityExtractor, ExtractionError};
use crate::graph::NodeRef;
use crate::ingest::{IngestError, PageRecord, SectionRecord};
use crate::storage::{GraphStore, UpsertOutcome};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, Instrument};
use uuid::Uuid;

/// A text unit waiting for extraction, with the node it came from
struct PendingUnit {
    origin: NodeRef,
    text: String,
}

/// Drives a construction run against a store and an extractor
pub struct MergeEngine {
    store: Arc<dyn GraphStore>,
    extractor: Arc<dyn EntityExtractor>,
    options: MergeOptions,
}

impl MergeEngine {
    pub fn new(
        store: Arc<dyn GraphStore>,
        extractor: Arc<dyn EntityExtractor>,
        options: MergeOptions,
    ) -> MergeResult<Self> {
        options.validate().map_err(MergeError::InvalidOptions)?;
        Ok(Self {
            store,
            extractor,
            options,
        })
    }

    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Phase 2; see [`Linker::derive`].
    pub fn derive_relationships(&self) -> MergeResult<LinkageReport> {
        Linker::new(self.store.as_ref(), &self.options).derive()
    }

    /// Full build: optional wipe, sections, pages, then Phase 2.
    ///
    /// Sections are completely ingested before pages start, and Phase 2
    /// starts only after both.
    pub async fn run<S, P>(&self, sections: S, pages: P) -> MergeResult<RunSummary>
    where
        S: IntoIterator<Item = Result<SectionRecord, IngestError>>,
        P: IntoIterator<Item = Result<PageRecord, IngestError>>,
    {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id, extractor = self.extractor.name());
        self.run_phases(run_id, sections, pages)
            .instrument(span)
            .await
    }

    async fn run_phases<S, P>(&self, run_id: Uuid, sections: S, pages: P) -> MergeResult<RunSummary>
    where
        S: IntoIterator<Item = Result<SectionRecord, IngestError>>,
        P: IntoIterator<Item = Result<PageRecord, IngestError>>,
    {
        let started_at = Utc::now();

        let wiped = self.options.wipe_before_run;
        if wiped {
            self.store.wipe_all()?;
            info!("graph wiped");
        }

        let sections = self.ingest_sections(sections).await?;
        let pages = self.ingest_pages(pages).await?;
        let linkage = self.derive_relationships()?;

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            wiped,
            sections,
            pages,
            linkage,
            total_nodes: self.store.count_nodes(None)?,
            total_relationships: self.store.count_relationships(None)?,
        };
        info!(
            nodes = summary.total_nodes,
            relationships = summary.total_relationships,
            elapsed_ms = summary.elapsed().num_milliseconds(),
            "run finished"
        );
        Ok(summary)
    }

    /// Phase 1 for section rows.
    ///
    /// Stops at the first malformed row; everything merged before it stays.
    pub async fn ingest_sections<I>(&self, rows: I) -> MergeResult<IngestReport>
    where
        I: IntoIterator<Item = Result<SectionRecord, IngestError>>,
    {
        let mut report = IngestReport::default();
        let mut pending = Vec::with_capacity(self.options.batch_size);

        for row in rows {
            let record = row?;
            report.rows += 1;

            let node = record.node_ref();
            let outcome = self.upsert(&node, &record.attributes())?;
            count_upsert(&mut report, outcome);
            debug!(section_id = %record.section_id, created = outcome.created, "section upserted");

            if self.options.extract_sections {
                self.enqueue(&mut pending, &mut report, node, record.extraction_text())
                    .await?;
            }
        }
        self.flush(&mut pending, &mut report).await?;

        info!(
            rows = report.rows,
            created = report.nodes_created,
            extracted = report.extraction_calls,
            "sections ingested"
        );
        Ok(report)
    }

    /// Phase 1 for page rows, including their categories.
    pub async fn ingest_pages<I>(&self, rows: I) -> MergeResult<IngestReport>
    where
        I: IntoIterator<Item = Result<PageRecord, IngestError>>,
    {
        let mut report = IngestReport::default();
        let mut pending = Vec::with_capacity(self.options.batch_size);

        for row in rows {
            let record = row?;
            report.rows += 1;

            let node = record.node_ref();
            let outcome = self.upsert(&node, &record.attributes())?;
            count_upsert(&mut report, outcome);
            debug!(page_id = %record.page_id, created = outcome.created, "page upserted");

            for category in record.category_refs() {
                let outcome = self.upsert(&category, &Default::default())?;
                if outcome.created {
                    report.categories_created += 1;
                    info!(category = %category.key_value, "category created");
                }
            }

            if self.options.extract_pages {
                self.enqueue(&mut pending, &mut report, node, record.extraction_text())
                    .await?;
            }
        }
        self.flush(&mut pending, &mut report).await?;

        info!(
            rows = report.rows,
            created = report.nodes_created,
            categories = report.categories_created,
            extracted = report.extraction_calls,
            "pages ingested"
        );
        Ok(report)
    }

    fn upsert(
        &self,
        node: &NodeRef,
        attributes: &crate::graph::Properties,
    ) -> MergeResult<UpsertOutcome> {
        Ok(self
            .store
            .upsert(&node.label, &node.key_field, &node.key_value, attributes)?)
    }

    async fn enqueue(
        &self,
        pending: &mut Vec<PendingUnit>,
        report: &mut IngestReport,
        origin: NodeRef,
        text: &str,
    ) -> MergeResult<()> {
        if text.trim().is_empty() {
            report.blank_texts += 1;
            debug!(%origin, "blank text, not extracted");
            return Ok(());
        }
        pending.push(PendingUnit {
            origin,
            text: text.to_string(),
        });
        if pending.len() >= self.options.batch_size {
            self.flush(pending, report).await?;
        }
        Ok(())
    }

    /// Extract and merge every queued unit, one at a time, in queue order.
    ///
    /// An id reported under several labels within the batch keeps the label
    /// it was first reported with.
    async fn flush(
        &self,
        pending: &mut Vec<PendingUnit>,
        report: &mut IngestReport,
    ) -> MergeResult<()> {
        let mut first_labels = HashMap::new();
        for unit in pending.drain(..) {
            let mut document = self.extractor.extract(&unit.text).await?;
            report.extraction_calls += 1;

            document.dedup_nodes();
            if let Some(id) = document.dangling_endpoint() {
                return Err(ExtractionError::MalformedResponse(format!(
                    "relationship endpoint {:?} from {} is not among the returned nodes",
                    id, unit.origin
                ))
                .into());
            }
            let relabelled = document.adopt_labels(&mut first_labels);
            if relabelled > 0 {
                debug!(origin = %unit.origin, relabelled, "ids relabelled to their first label in batch");
            }

            let stats = self.store.merge_document(
                &unit.origin,
                &document,
                &self.options.relationships.mentions,
            )?;
            debug!(
                origin = %unit.origin,
                nodes = document.nodes.len(),
                relationships = document.relationships.len(),
                created = stats.nodes_created,
                "extraction merged"
            );
            report.extracted += stats;
        }
        Ok(())
    }
}

fn count_upsert(report: &mut IngestReport, outcome: UpsertOutcome) {
    if outcome.created {
        report.nodes_created += 1;
    } else {
        report.nodes_matched += 1;
    }
}
