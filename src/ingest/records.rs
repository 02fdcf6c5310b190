//! Section and page records and their CSV readers

use super::literal::{self, LiteralError};
use super::IngestError;
use crate::graph::{label, NodeRef, Properties, PropertyValue};
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// One row of the sections file, with literal columns decoded
#[derive(Debug, Clone, PartialEq)]
pub struct SectionRecord {
    pub section_id: String,
    pub section_title: String,
    pub text_to_embed: String,
    pub page_id: String,
    pub cls_embed: Vec<f64>,
    /// Ordinal within the page, as written in the input
    pub section_counter: String,
    /// Body text, when the file carries one separately from `text_to_embed`
    pub section: Option<String>,
}

impl SectionRecord {
    pub fn node_ref(&self) -> NodeRef {
        NodeRef::section(self.section_id.clone())
    }

    /// Attributes written when the node is first created
    pub fn attributes(&self) -> Properties {
        let mut props = Properties::new();
        props.insert("section_title".into(), self.section_title.clone().into());
        props.insert("text_to_embed".into(), self.text_to_embed.clone().into());
        props.insert("page_id".into(), self.page_id.clone().into());
        props.insert("cls_embed".into(), self.cls_embed.clone().into());
        props.insert("section_counter".into(), self.section_counter.clone().into());
        props
    }

    /// Text handed to entity extraction
    pub fn extraction_text(&self) -> &str {
        match self.section.as_deref() {
            Some(body) if !body.trim().is_empty() => body,
            _ => &self.text_to_embed,
        }
    }
}

/// One row of the pages file, with literal columns decoded
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecord {
    pub page_id: String,
    pub title: String,
    pub text_to_embed: String,
    pub cls_embed: Vec<f64>,
    pub section_ids: Vec<String>,
    pub categories: Vec<String>,
}

impl PageRecord {
    pub fn node_ref(&self) -> NodeRef {
        NodeRef::page(self.page_id.clone())
    }

    pub fn attributes(&self) -> Properties {
        let mut props = Properties::new();
        props.insert("page_title".into(), self.title.clone().into());
        props.insert("text_to_embed".into(), self.text_to_embed.clone().into());
        props.insert("cls_embed".into(), self.cls_embed.clone().into());
        props.insert("section_ids".into(), self.section_ids.clone().into());
        props.insert(
            "categories".into(),
            PropertyValue::from(self.categories.clone()),
        );
        props
    }

    pub fn extraction_text(&self) -> &str {
        &self.text_to_embed
    }

    pub fn category_refs(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.categories.iter().map(|c| NodeRef::new(label::CATEGORY, "name", c.clone()))
    }
}

#[derive(Debug, Deserialize)]
struct RawSectionRow {
    section_id: String,
    section_title: String,
    text_to_embed: String,
    page_id: String,
    cls_embed: String,
    section_counter: String,
    #[serde(default)]
    section: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPageRow {
    page_id: String,
    title: String,
    text_to_embed: String,
    cls_embed: String,
    section_ids: String,
    categories: String,
}

fn decode<T>(
    record: usize,
    column: &'static str,
    result: Result<T, LiteralError>,
) -> Result<T, IngestError> {
    result.map_err(|source| IngestError::Literal {
        record,
        column,
        source,
    })
}

fn open_csv(path: &Path) -> Result<csv::Reader<File>, IngestError> {
    csv::Reader::from_path(path).map_err(|source| IngestError::Open {
        path: path.to_path_buf(),
        source,
    })
}

/// Lazy, single-pass reader over a sections file in file order
pub struct SectionReader<R: Read> {
    rows: csv::DeserializeRecordsIntoIter<R, RawSectionRow>,
    record: usize,
}

impl SectionReader<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        Ok(Self::new(open_csv(path.as_ref())?))
    }
}

impl<R: Read> SectionReader<R> {
    pub fn from_reader(reader: R) -> Self {
        Self::new(csv::Reader::from_reader(reader))
    }

    fn new(reader: csv::Reader<R>) -> Self {
        Self {
            rows: reader.into_deserialize(),
            record: 0,
        }
    }
}

impl<R: Read> Iterator for SectionReader<R> {
    type Item = Result<SectionRecord, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        self.record += 1;
        let record = self.record;

        Some(row.map_err(|source| IngestError::Csv { record, source }).and_then(|raw| {
            Ok(SectionRecord {
                cls_embed: decode(record, "cls_embed", literal::parse_float_list(&raw.cls_embed))?,
                section_id: raw.section_id,
                section_title: raw.section_title,
                text_to_embed: raw.text_to_embed,
                page_id: raw.page_id,
                section_counter: raw.section_counter.trim().to_string(),
                section: raw.section,
            })
        }))
    }
}

/// Lazy, single-pass reader over a pages file in file order
pub struct PageReader<R: Read> {
    rows: csv::DeserializeRecordsIntoIter<R, RawPageRow>,
    record: usize,
}

impl PageReader<File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IngestError> {
        Ok(Self::new(open_csv(path.as_ref())?))
    }
}

impl<R: Read> PageReader<R> {
    pub fn from_reader(reader: R) -> Self {
        Self::new(csv::Reader::from_reader(reader))
    }

    fn new(reader: csv::Reader<R>) -> Self {
        Self {
            rows: reader.into_deserialize(),
            record: 0,
        }
    }
}

impl<R: Read> Iterator for PageReader<R> {
    type Item = Result<PageRecord, IngestError>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        self.record += 1;
        let record = self.record;

        Some(row.map_err(|source| IngestError::Csv { record, source }).and_then(|raw| {
            Ok(PageRecord {
                cls_embed: decode(record, "cls_embed", literal::parse_float_list(&raw.cls_embed))?,
                section_ids: decode(
                    record,
                    "section_ids",
                    literal::parse_string_list(&raw.section_ids),
                )?,
                categories: decode(
                    record,
                    "categories",
                    literal::parse_string_list(&raw.categories),
                )?,
                page_id: raw.page_id,
                title: raw.title,
                text_to_embed: raw.text_to_embed,
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECTIONS: &str = "\
section_id,section_title,text_to_embed,page_id,cls_embed,section_counter,section
S0,Einleitung,Herz und Kreislauf,P1,\"[0.1, 0.2]\",0,Das Herz pumpt Blut.
S1,Symptome,Brustschmerz,P1,\"[0.3, -0.4]\", 1 ,
";

    const PAGES: &str = "\
page_id,title,text_to_embed,cls_embed,section_ids,categories
P1,Herzinfarkt,Herzinfarkt Überblick,\"[0.5, 0.5]\",\"['S0', 'S1']\",\"['Kardiologie']\"
";

    #[test]
    fn reads_sections_in_file_order() {
        let records: Vec<_> = SectionReader::from_reader(SECTIONS.as_bytes())
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].section_id, "S0");
        assert_eq!(records[0].cls_embed, vec![0.1, 0.2]);
        assert_eq!(records[0].extraction_text(), "Das Herz pumpt Blut.");
        assert_eq!(records[1].section_counter, "1");
        // Empty body column falls back to the embedded text
        assert_eq!(records[1].extraction_text(), "Brustschmerz");
    }

    #[test]
    fn body_column_is_optional() {
        let csv = "section_id,section_title,text_to_embed,page_id,cls_embed,section_counter\n\
                   S0,T,Text,P1,[],0\n";
        let record = SectionReader::from_reader(csv.as_bytes())
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(record.section, None);
        assert_eq!(record.extraction_text(), "Text");
    }

    #[test]
    fn reads_pages_with_lists() {
        let page = PageReader::from_reader(PAGES.as_bytes())
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(page.section_ids, vec!["S0", "S1"]);
        assert_eq!(page.categories, vec!["Kardiologie"]);

        let attrs = page.attributes();
        assert_eq!(attrs["page_title"], PropertyValue::from("Herzinfarkt"));
        assert_eq!(page.category_refs().next().unwrap(), NodeRef::category("Kardiologie"));
    }

    #[test]
    fn malformed_literal_names_record_and_column() {
        let csv = "page_id,title,text_to_embed,cls_embed,section_ids,categories\n\
                   P1,T,Text,[],[],[]\n\
                   P2,T,Text,[],\"['S0'\",[]\n";
        let results: Vec<_> = PageReader::from_reader(csv.as_bytes()).collect();

        assert!(results[0].is_ok());
        match &results[1] {
            Err(IngestError::Literal { record, column, .. }) => {
                assert_eq!(*record, 2);
                assert_eq!(*column, "section_ids");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn missing_column_is_csv_error() {
        let csv = "section_id,page_id\nS0,P1\n";
        let result = SectionReader::from_reader(csv.as_bytes()).next().unwrap();
        assert!(matches!(result, Err(IngestError::Csv { record: 1, .. })));
    }

    #[test]
    fn open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SectionReader::open(dir.path().join("missing.csv")),
            Err(IngestError::Open { .. })
        ));
    }
}
