//! Line-delimited JSON backup format
//!
//! One record per line, tagged by `type`:
//!
//! ```text
//! {"type":"node","id":"1","labels":["Section"],"key":"section_id","properties":{...}}
//! {"type":"relationship","id":"7","label":"NEXT","properties":{},"start":{"id":"1","labels":["Section"]},"end":{"id":"2","labels":["Section"]}}
//! ```
//!
//! All nodes precede all relationships. Node ids are the exporting store's
//! identifiers and become import identifiers on the way back in.

use super::sqlite::lookup_node;
use super::traits::{StorageError, StorageResult, TransferStats};
use crate::graph::Properties;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Key field used for nodes whose record names no key
const IMPORT_KEY_FIELD: &str = "_import_id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExportRecord {
    Node(NodeRecord),
    Relationship(RelationshipRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub properties: Properties,
    pub start: EndpointRecord,
    pub end: EndpointRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub id: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

/// Iterate the records of an export file with their 1-based line numbers.
fn records(path: &Path) -> StorageResult<impl Iterator<Item = StorageResult<(usize, ExportRecord)>>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(reader
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let line_no = idx + 1;
            match line {
                Err(e) => Some(Err(StorageError::Io(e))),
                Ok(text) if text.trim().is_empty() => None,
                Ok(text) => Some(
                    serde_json::from_str::<ExportRecord>(&text)
                        .map(|record| (line_no, record))
                        .map_err(|e| StorageError::InvalidExport {
                            line: line_no,
                            reason: e.to_string(),
                        }),
                ),
            }
        }))
}

/// Stream every node, then every relationship, to `path`.
pub(super) fn export_graph(conn: &Connection, path: &Path) -> StorageResult<TransferStats> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut out = BufWriter::new(File::create(path)?);
    let mut stats = TransferStats::default();

    let mut stmt = conn.prepare(
        "SELECT id, label, key_field, properties_json FROM nodes ORDER BY id",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let record = ExportRecord::Node(NodeRecord {
            id: row.get::<_, i64>(0)?.to_string(),
            labels: vec![row.get(1)?],
            key: Some(row.get(2)?),
            properties: serde_json::from_str(&row.get::<_, String>(3)?)?,
        });
        serde_json::to_writer(&mut out, &record)?;
        out.write_all(b"\n")?;
        stats.nodes += 1;
    }

    let mut stmt = conn.prepare(
        "SELECT e.id, e.rel_type, e.properties_json, e.source_id, s.label, e.target_id, t.label
         FROM edges AS e
         JOIN nodes AS s ON s.id = e.source_id
         JOIN nodes AS t ON t.id = e.target_id
         ORDER BY e.id",
    )?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let record = ExportRecord::Relationship(RelationshipRecord {
            id: row.get::<_, i64>(0)?.to_string(),
            label: row.get(1)?,
            properties: serde_json::from_str(&row.get::<_, String>(2)?)?,
            start: EndpointRecord {
                id: row.get::<_, i64>(3)?.to_string(),
                labels: vec![row.get(4)?],
            },
            end: EndpointRecord {
                id: row.get::<_, i64>(5)?.to_string(),
                labels: vec![row.get(6)?],
            },
        });
        serde_json::to_writer(&mut out, &record)?;
        out.write_all(b"\n")?;
        stats.relationships += 1;
    }

    out.flush()?;
    Ok(stats)
}

/// Collect every node label that occurs in an export file.
pub fn detect_labels(path: &Path) -> StorageResult<BTreeSet<String>> {
    let mut labels = BTreeSet::new();
    for record in records(path)? {
        if let (_, ExportRecord::Node(node)) = record? {
            labels.extend(node.labels);
        }
    }
    Ok(labels)
}

fn import_index_name(label: &str) -> String {
    let hex: String = label.bytes().map(|b| format!("{:02x}", b)).collect();
    format!("uq_import_{}", hex)
}

/// One unique index per label on the import identifier.
pub(super) fn create_import_constraints(
    conn: &Connection,
    labels: &BTreeSet<String>,
) -> StorageResult<()> {
    for label in labels {
        conn.execute_batch(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON nodes(import_id) WHERE label = '{}'",
            import_index_name(label),
            label.replace('\'', "''"),
        ))?;
    }
    Ok(())
}

/// Load an export file in one transaction.
///
/// Nodes are merged on their key and on their import identifier, so loading
/// the same file twice leaves the graph unchanged.
pub(super) fn import_graph(conn: &mut Connection, path: &Path) -> StorageResult<TransferStats> {
    let tx = conn.transaction()?;
    let mut stats = TransferStats::default();
    // import id -> local node id
    let mut resolved: HashMap<String, i64> = HashMap::new();

    for record in records(path)? {
        match record? {
            (line, ExportRecord::Node(node)) => {
                let label = node.labels.first().ok_or_else(|| StorageError::InvalidExport {
                    line,
                    reason: format!("node {} has no label", node.id),
                })?;
                let (key_field, key_value) = match &node.key {
                    Some(field) => {
                        let value = node
                            .properties
                            .get(field)
                            .and_then(|v| v.as_key_text())
                            .ok_or_else(|| StorageError::InvalidExport {
                                line,
                                reason: format!("node {} lacks its key property {}", node.id, field),
                            })?;
                        (field.clone(), value)
                    }
                    None => (IMPORT_KEY_FIELD.to_string(), node.id.clone()),
                };

                let inserted = tx.execute(
                    r#"
                    INSERT OR IGNORE INTO nodes (label, key_field, key_value, properties_json, import_id)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                    params![
                        label,
                        key_field,
                        key_value,
                        serde_json::to_string(&node.properties)?,
                        node.id
                    ],
                )?;
                stats.nodes += inserted;

                // An ignored insert with no node under this key means another
                // node of the label already holds the import id.
                let local = lookup_node(&tx, label, &key_field, &key_value)?.ok_or_else(|| {
                    StorageError::InvalidExport {
                        line,
                        reason: format!(
                            "import id {} already belongs to another {} node",
                            node.id, label
                        ),
                    }
                })?;
                resolved.insert(node.id, local);
            }
            (line, ExportRecord::Relationship(rel)) => {
                let source = resolve(&tx, &resolved, &rel.start, line, &rel.id)?;
                let target = resolve(&tx, &resolved, &rel.end, line, &rel.id)?;

                let inserted = tx.execute(
                    r#"
                    INSERT OR IGNORE INTO edges (rel_type, source_id, target_id, properties_json, import_id)
                    SELECT ?1, ?2, ?3, ?4, ?5
                    WHERE NOT EXISTS (
                        SELECT 1 FROM edges WHERE rel_type = ?1 AND source_id = ?2 AND target_id = ?3
                    )
                    "#,
                    params![
                        rel.label,
                        source,
                        target,
                        serde_json::to_string(&rel.properties)?,
                        rel.id
                    ],
                )?;
                stats.relationships += inserted;
            }
        }
    }

    tx.commit()?;
    Ok(stats)
}

/// Node previously imported under `import_id`, restricted to `label` when given.
fn find_by_import_id(
    conn: &Connection,
    label: Option<&str>,
    import_id: &str,
) -> StorageResult<Option<i64>> {
    let mut stmt = conn.prepare(
        "SELECT id FROM nodes WHERE import_id = ?1 AND (?2 IS NULL OR label = ?2) LIMIT 2",
    )?;
    let ids = stmt
        .query_map(params![import_id, label], |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    // Unlabelled endpoints only resolve when the import id is unambiguous
    Ok(match ids.as_slice() {
        [id] => Some(*id),
        _ => None,
    })
}

fn resolve(
    conn: &Connection,
    resolved: &HashMap<String, i64>,
    endpoint: &EndpointRecord,
    line: usize,
    rel_id: &str,
) -> StorageResult<i64> {
    if let Some(id) = resolved.get(&endpoint.id) {
        return Ok(*id);
    }
    let label = endpoint.labels.first().map(String::as_str);
    find_by_import_id(conn, label, &endpoint.id)?.ok_or_else(|| StorageError::DanglingImport {
        line,
        rel_id: rel_id.to_string(),
        node_id: endpoint.id.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{label, ExtractedNode, GraphDocument, NodeRef, PropertyValue};
    use crate::storage::{GraphStore, OpenStore, SqliteStore};

    fn populated_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut attrs = Properties::new();
        attrs.insert("page_id".into(), "P1".into());
        attrs.insert("cls_embed".into(), vec![0.25, -0.5].into());
        let a = store.upsert(label::SECTION, "section_id", "S0", &attrs).unwrap();
        let b = store.upsert(label::SECTION, "section_id", "S1", &attrs).unwrap();
        store.link_chain("NEXT", &[a.node_id, b.node_id]).unwrap();

        let doc = GraphDocument::new().with_node(ExtractedNode::new("Aspirin", "Medikament"));
        store
            .merge_document(&NodeRef::section("S0"), &doc, "ERWÄHNT")
            .unwrap();
        store
    }

    #[test]
    fn export_writes_tagged_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.jsonl");
        let store = populated_store();

        let stats = store.bulk_export(&path).unwrap();
        assert_eq!(stats, TransferStats { nodes: 3, relationships: 2 });

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0]["type"], "node");
        assert_eq!(lines[0]["labels"][0], "Section");
        assert_eq!(lines[0]["key"], "section_id");
        assert_eq!(lines[4]["type"], "relationship");
        assert_eq!(lines[4]["label"], "ERWÄHNT");
        assert_eq!(lines[4]["end"]["labels"][0], "Medikament");
    }

    #[test]
    fn import_restores_graph_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.jsonl");
        populated_store().bulk_export(&path).unwrap();

        let target = SqliteStore::open_in_memory().unwrap();
        let first = target.bulk_import(&path).unwrap();
        assert_eq!(first, TransferStats { nodes: 3, relationships: 2 });

        let second = target.bulk_import(&path).unwrap();
        assert_eq!(second, TransferStats::default());

        assert_eq!(target.count_nodes(None).unwrap(), 3);
        assert_eq!(target.count_relationships(Some("NEXT")).unwrap(), 1);

        let sections = target.find_nodes(label::SECTION).unwrap();
        assert_eq!(
            sections[0].properties["cls_embed"],
            PropertyValue::Array(vec![PropertyValue::Float(0.25), PropertyValue::Float(-0.5)])
        );

        // Imported nodes keep their upsert keys
        let again = target
            .upsert(label::SECTION, "section_id", "S0", &Properties::new())
            .unwrap();
        assert!(!again.created);
    }

    #[test]
    fn detect_labels_collects_node_labels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.jsonl");
        populated_store().bulk_export(&path).unwrap();

        let labels = detect_labels(&path).unwrap();
        assert_eq!(
            labels.into_iter().collect::<Vec<_>>(),
            vec!["Medikament".to_string(), "Section".to_string()]
        );
    }

    #[test]
    fn import_accepts_records_without_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foreign.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"type":"node","id":"10","labels":["Person"],"properties":{"id":"Ada"}}"#,
                "\n\n",
                r#"{"type":"node","id":"11","labels":["Ort"],"properties":{"id":"London"}}"#,
                "\n",
                r#"{"type":"relationship","id":"3","label":"LEBT_IN","start":{"id":"10"},"end":{"id":"11"}}"#,
                "\n"
            ),
        )
        .unwrap();

        let store = SqliteStore::open_in_memory().unwrap();
        let stats = store.bulk_import(&path).unwrap();
        assert_eq!(stats, TransferStats { nodes: 2, relationships: 1 });
    }

    #[test]
    fn import_rejects_dangling_relationship() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jsonl");
        std::fs::write(
            &path,
            r#"{"type":"relationship","id":"3","label":"R","start":{"id":"1"},"end":{"id":"2"}}"#,
        )
        .unwrap();

        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.bulk_import(&path).unwrap_err();
        assert!(matches!(err, StorageError::DanglingImport { line: 1, .. }));
        assert_eq!(store.count_nodes(None).unwrap(), 0);
    }

    #[test]
    fn import_rejects_import_id_held_by_another_node() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.jsonl");
        let second = dir.path().join("second.jsonl");
        std::fs::write(
            &first,
            r#"{"type":"node","id":"7","labels":["Person"],"key":"id","properties":{"id":"Ada"}}"#,
        )
        .unwrap();
        std::fs::write(
            &second,
            concat!(
                r#"{"type":"node","id":"7","labels":["Person"],"key":"id","properties":{"id":"Grace"}}"#,
                "\n",
                r#"{"type":"node","id":"8","labels":["Ort"],"key":"id","properties":{"id":"London"}}"#,
                "\n",
                r#"{"type":"relationship","id":"1","label":"LEBT_IN","start":{"id":"7","labels":["Person"]},"end":{"id":"8","labels":["Ort"]}}"#,
                "\n"
            ),
        )
        .unwrap();

        let store = SqliteStore::open_in_memory().unwrap();
        store.bulk_import(&first).unwrap();
        let err = store.bulk_import(&second).unwrap_err();
        assert!(matches!(err, StorageError::InvalidExport { line: 1, .. }));

        // The failed import is rolled back and Ada gains no edge
        assert_eq!(store.count_nodes(None).unwrap(), 1);
        assert_eq!(store.count_relationships(None).unwrap(), 0);
    }

    #[test]
    fn endpoints_resolve_by_import_id_and_label() {
        let dir = tempfile::tempdir().unwrap();
        let nodes = dir.path().join("nodes.jsonl");
        let edges = dir.path().join("edges.jsonl");
        std::fs::write(
            &nodes,
            concat!(
                r#"{"type":"node","id":"5","labels":["Person"],"key":"id","properties":{"id":"Ada"}}"#,
                "\n",
                r#"{"type":"node","id":"5","labels":["Ort"],"key":"id","properties":{"id":"London"}}"#,
                "\n"
            ),
        )
        .unwrap();
        std::fs::write(
            &edges,
            concat!(
                r#"{"type":"relationship","id":"1","label":"SELBST","start":{"id":"5","labels":["Ort"]},"end":{"id":"5","labels":["Ort"]}}"#,
                "\n",
                r#"{"type":"relationship","id":"2","label":"R","start":{"id":"5"},"end":{"id":"5"}}"#,
                "\n"
            ),
        )
        .unwrap();

        let store = SqliteStore::open_in_memory().unwrap();
        store.bulk_import(&nodes).unwrap();
        let err = store.bulk_import(&edges).unwrap_err();
        // The labelled edge resolves, the ambiguous unlabelled one does not
        assert!(matches!(err, StorageError::DanglingImport { line: 2, .. }));

        std::fs::write(
            &edges,
            r#"{"type":"relationship","id":"1","label":"SELBST","start":{"id":"5","labels":["Ort"]},"end":{"id":"5","labels":["Ort"]}}"#,
        )
        .unwrap();
        let stats = store.bulk_import(&edges).unwrap();
        assert_eq!(stats, TransferStats { nodes: 0, relationships: 1 });
    }

    #[test]
    fn import_reports_malformed_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jsonl");
        std::fs::write(&path, "{\"type\":\"node\"\n").unwrap();

        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.bulk_import(&path).unwrap_err();
        assert!(matches!(err, StorageError::InvalidExport { line: 1, .. }));
    }
}
