//! Shared fixtures for the integration tests
//!
//! Writes corpus CSV files into a temporary directory and builds engines
//! over an in-memory store with a mock extractor.

#![allow(dead_code)]

use corpus_graph::{
    label, GraphStore, IngestError, Join, MergeEngine, MergeOptions, MockExtractor, NodeSelector,
    OpenStore, PageReader, PageRecord, RelationshipPattern, SectionReader, SectionRecord,
    SqliteStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub const SECTIONS_HEADER: &str =
    "section_id,section_title,text_to_embed,page_id,cls_embed,section_counter,section";
pub const PAGES_HEADER: &str = "page_id,title,text_to_embed,cls_embed,section_ids,categories";

/// P1 has three sections, P2 one
pub const SCENARIO_SECTIONS: &str = r#"section_id,section_title,text_to_embed,page_id,cls_embed,section_counter,section
S0,Einleitung,Das Herz pumpt Blut.,P1,"[0.1, 0.2]",0,
S1,Anatomie,Das Herz hat vier Kammern.,P1,"[0.3, 0.4]",1,
S2,Erkrankungen,Herzinfarkt ist häufig.,P1,"[0.5, 0.6]",2,
S3,Überblick,Das Gehirn steuert den Körper.,P2,"[0.7, 0.8]",0,
"#;

pub const SCENARIO_PAGES: &str = r#"page_id,title,text_to_embed,cls_embed,section_ids,categories
P1,Herz,Seite über das Herz.,"[0.9, 1.0]","['S0', 'S1', 'S2']",['Cardiology']
P2,Gehirn,Seite über das Gehirn.,"[1.1, 1.2]",['S3'],"['Cardiology', 'Neurology']"
"#;

/// Input files on disk; removed when dropped
pub struct Corpus {
    _dir: TempDir,
    pub sections: PathBuf,
    pub pages: PathBuf,
}

impl Corpus {
    pub fn write(sections_csv: &str, pages_csv: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let sections = dir.path().join("sections.csv");
        let pages = dir.path().join("pages.csv");
        std::fs::write(&sections, sections_csv).unwrap();
        std::fs::write(&pages, pages_csv).unwrap();
        Self {
            _dir: dir,
            sections,
            pages,
        }
    }

    pub fn scenario() -> Self {
        Self::write(SCENARIO_SECTIONS, SCENARIO_PAGES)
    }

    pub fn section_rows(&self) -> Vec<Result<SectionRecord, IngestError>> {
        SectionReader::open(&self.sections).unwrap().collect()
    }

    pub fn page_rows(&self) -> Vec<Result<PageRecord, IngestError>> {
        PageReader::open(&self.pages).unwrap().collect()
    }
}

/// Engine over a fresh in-memory store
pub struct Harness {
    pub engine: MergeEngine,
    pub store: Arc<SqliteStore>,
    pub extractor: Arc<MockExtractor>,
}

impl Harness {
    pub fn new(extractor: MockExtractor, options: MergeOptions) -> Self {
        Self::with_store(Arc::new(SqliteStore::open_in_memory().unwrap()), extractor, options)
    }

    pub fn with_store(store: Arc<SqliteStore>, extractor: MockExtractor, options: MergeOptions) -> Self {
        let extractor = Arc::new(extractor);
        let engine = MergeEngine::new(store.clone(), extractor.clone(), options).unwrap();
        Self {
            engine,
            store,
            extractor,
        }
    }
}

/// Whether a relationship of `rel_type` links the two sections
pub fn sections_linked(store: &dyn GraphStore, rel_type: &str, from: &str, to: &str) -> bool {
    let pattern = RelationshipPattern::new(
        NodeSelector::label(label::SECTION).with_filter("section_id", from),
        NodeSelector::label(label::SECTION).with_filter("section_id", to),
        Join::None,
        rel_type,
    );
    // A merge over an existing edge creates nothing
    store.create_relationship(&pattern).unwrap() == 0
}

/// Whether `origin` has a mentions edge to the extracted node `(node_type, id)`
pub fn mentions(store: &dyn GraphStore, origin: &NodeSelector, node_type: &str, id: &str) -> bool {
    let pattern = RelationshipPattern::new(
        origin.clone(),
        NodeSelector::label(node_type).with_filter("id", id),
        Join::None,
        "ERWÄHNT",
    );
    store.create_relationship(&pattern).unwrap() == 0
}
