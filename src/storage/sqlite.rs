//! SQLite storage backend
//!
//! Models a property graph in two tables: `nodes` (label, upsert key and a
//! JSON property document) and `edges` (typed, directed). Relationship
//! patterns compile to `INSERT ... SELECT` statements that match node
//! properties through SQLite's JSON functions.

use super::export;
use super::traits::{
    DocumentMergeStats, EdgePolicy, GraphStore, Join, NodeSelector, OpenStore,
    RelationshipPattern, StorageError, StorageResult, TransferStats, UpsertOutcome,
};
use crate::graph::{GraphDocument, NodeRef, Properties, PropertyValue, StoredNode};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed graph store
///
/// Thread-safe via internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS nodes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                label TEXT NOT NULL,
                key_field TEXT NOT NULL,
                key_value TEXT NOT NULL,
                properties_json TEXT NOT NULL,
                import_id TEXT,
                UNIQUE (label, key_field, key_value)
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_label ON nodes(label);

            CREATE TABLE IF NOT EXISTS edges (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                rel_type TEXT NOT NULL,
                source_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
                target_id INTEGER NOT NULL REFERENCES nodes(id) ON DELETE CASCADE,
                properties_json TEXT NOT NULL DEFAULT '{}',
                import_id TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_edges_endpoints
                ON edges(rel_type, source_id, target_id);
            CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
            CREATE UNIQUE INDEX IF NOT EXISTS uq_edges_import ON edges(import_id);
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// SQL string literal of the JSON path addressing a top-level property.
///
/// Inlined, never bound: the planner only uses a property index when the
/// query expression matches the indexed expression exactly.
fn json_path(field: &str) -> StorageResult<String> {
    if field.is_empty() || field.contains('"') {
        return Err(StorageError::InvalidPattern(format!(
            "unsupported property name {:?}",
            field
        )));
    }
    Ok(format!("'$.\"{}\"'", field.replace('\'', "''")))
}

fn property_index_name(field: &str) -> String {
    let hex: String = field.bytes().map(|b| format!("{:02x}", b)).collect();
    format!("idx_prop_{}", hex)
}

/// Index `(label, property)` so joins and filters on the property become
/// index lookups instead of a scan over every node pair.
fn ensure_property_index(conn: &Connection, field: &str) -> StorageResult<()> {
    conn.execute_batch(&format!(
        "CREATE INDEX IF NOT EXISTS {} ON nodes(label, json_extract(properties_json, {}))",
        property_index_name(field),
        json_path(field)?,
    ))?;
    Ok(())
}

/// Properties a pattern compares, each of which gets an index
fn pattern_fields(pattern: &RelationshipPattern) -> Vec<&str> {
    let mut fields: Vec<&str> = pattern
        .source
        .filters
        .iter()
        .chain(&pattern.target.filters)
        .map(|(field, _)| field.as_str())
        .collect();
    match &pattern.join {
        Join::None => {}
        Join::PropertyEq { source, target } => fields.extend([source.as_str(), target.as_str()]),
        Join::ListContains { target, .. } => fields.push(target.as_str()),
    }
    fields.sort_unstable();
    fields.dedup();
    fields
}

fn sql_value(value: &PropertyValue) -> StorageResult<SqlValue> {
    Ok(match value {
        PropertyValue::String(s) => SqlValue::Text(s.clone()),
        PropertyValue::Int(i) => SqlValue::Integer(*i),
        PropertyValue::Float(f) => SqlValue::Real(*f),
        PropertyValue::Bool(b) => SqlValue::Integer(i64::from(*b)),
        other => {
            return Err(StorageError::InvalidPattern(format!(
                "cannot filter on composite value {:?}",
                other
            )))
        }
    })
}

fn push_selector(
    alias: &str,
    selector: &NodeSelector,
    clauses: &mut Vec<String>,
    values: &mut Vec<SqlValue>,
) -> StorageResult<()> {
    if let Some(label) = &selector.label {
        clauses.push(format!("{alias}.label = ?"));
        values.push(SqlValue::Text(label.clone()));
    }
    for (field, value) in &selector.filters {
        clauses.push(format!(
            "json_extract({alias}.properties_json, {}) = ?",
            json_path(field)?
        ));
        values.push(sql_value(value)?);
    }
    Ok(())
}

/// Compile a pattern into one `INSERT ... SELECT` statement and its parameters.
fn compile_pattern(pattern: &RelationshipPattern) -> StorageResult<(String, Vec<SqlValue>)> {
    if pattern.rel_type.is_empty() {
        return Err(StorageError::InvalidPattern("empty relationship type".into()));
    }

    let mut from = "nodes AS s, nodes AS t".to_string();
    let mut clauses = Vec::new();
    let mut values = vec![SqlValue::Text(pattern.rel_type.clone())];

    push_selector("s", &pattern.source, &mut clauses, &mut values)?;
    push_selector("t", &pattern.target, &mut clauses, &mut values)?;

    match &pattern.join {
        Join::None => {}
        Join::PropertyEq { source, target } => {
            clauses.push(format!(
                "json_extract(s.properties_json, {}) = json_extract(t.properties_json, {})",
                json_path(source)?,
                json_path(target)?
            ));
        }
        Join::ListContains { list, target } => {
            // Each list element drives an index lookup on the target property
            from = format!(
                "nodes AS s, json_each(s.properties_json, {}) AS j, nodes AS t",
                json_path(list)?
            );
            clauses.push(format!(
                "json_extract(t.properties_json, {}) = j.value",
                json_path(target)?
            ));
        }
    }

    if pattern.policy == EdgePolicy::Merge {
        clauses.push(
            "NOT EXISTS (SELECT 1 FROM edges AS e \
             WHERE e.rel_type = ? AND e.source_id = s.id AND e.target_id = t.id)"
                .into(),
        );
        values.push(SqlValue::Text(pattern.rel_type.clone()));
    }

    let condition = if clauses.is_empty() {
        "1".to_string()
    } else {
        clauses.join(" AND ")
    };

    let sql = format!(
        "INSERT INTO edges (rel_type, source_id, target_id, properties_json) \
         SELECT DISTINCT ?, s.id, t.id, '{{}}' FROM {from} WHERE {condition}"
    );
    Ok((sql, values))
}

fn upsert_on(
    conn: &Connection,
    label: &str,
    key_field: &str,
    key_value: &str,
    attributes: &Properties,
) -> StorageResult<UpsertOutcome> {
    let mut properties = attributes.clone();
    properties.insert(
        key_field.to_string(),
        PropertyValue::String(key_value.to_string()),
    );
    let properties_json = serde_json::to_string(&properties)?;

    let inserted = conn.execute(
        r#"
        INSERT INTO nodes (label, key_field, key_value, properties_json)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(label, key_field, key_value) DO NOTHING
        "#,
        params![label, key_field, key_value, properties_json],
    )?;

    let node_id = lookup_node(conn, label, key_field, key_value)?
        .ok_or_else(|| StorageError::NodeNotFound(NodeRef::new(label, key_field, key_value).to_string()))?;

    Ok(UpsertOutcome {
        node_id,
        created: inserted > 0,
    })
}

pub(super) fn lookup_node(
    conn: &Connection,
    label: &str,
    key_field: &str,
    key_value: &str,
) -> StorageResult<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM nodes WHERE label = ?1 AND key_field = ?2 AND key_value = ?3",
            params![label, key_field, key_value],
            |row| row.get(0),
        )
        .optional()?)
}

/// Insert an edge unless one of the same type already joins the two nodes.
fn merge_edge(
    conn: &Connection,
    rel_type: &str,
    source_id: i64,
    target_id: i64,
    properties: &Properties,
) -> StorageResult<bool> {
    let properties_json = serde_json::to_string(properties)?;
    let inserted = conn.execute(
        r#"
        INSERT INTO edges (rel_type, source_id, target_id, properties_json)
        SELECT ?1, ?2, ?3, ?4
        WHERE NOT EXISTS (
            SELECT 1 FROM edges WHERE rel_type = ?1 AND source_id = ?2 AND target_id = ?3
        )
        "#,
        params![rel_type, source_id, target_id, properties_json],
    )?;
    Ok(inserted > 0)
}

impl GraphStore for SqliteStore {
    fn wipe_all(&self) -> StorageResult<()> {
        let conn = self.conn();
        conn.execute_batch("DELETE FROM edges; DELETE FROM nodes;")?;
        Ok(())
    }

    fn upsert(
        &self,
        label: &str,
        key_field: &str,
        key_value: &str,
        attributes: &Properties,
    ) -> StorageResult<UpsertOutcome> {
        let conn = self.conn();
        upsert_on(&conn, label, key_field, key_value, attributes)
    }

    fn create_relationship(&self, pattern: &RelationshipPattern) -> StorageResult<usize> {
        let (sql, values) = compile_pattern(pattern)?;
        let conn = self.conn();
        for field in pattern_fields(pattern) {
            ensure_property_index(&conn, field)?;
        }
        let created = conn.execute(&sql, params_from_iter(values))?;
        Ok(created)
    }

    fn link_chain(&self, rel_type: &str, node_ids: &[i64]) -> StorageResult<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let mut created = 0;
        for pair in node_ids.windows(2) {
            if merge_edge(&tx, rel_type, pair[0], pair[1], &Properties::new())? {
                created += 1;
            }
        }
        tx.commit()?;
        Ok(created)
    }

    fn find_nodes(&self, label: &str) -> StorageResult<Vec<StoredNode>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, label, key_field, key_value, properties_json
             FROM nodes WHERE label = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![label], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut nodes = Vec::new();
        for row in rows {
            let (id, label, key_field, key_value, properties_json) = row?;
            nodes.push(StoredNode {
                id,
                label,
                key_field,
                key_value,
                properties: serde_json::from_str(&properties_json)?,
            });
        }
        Ok(nodes)
    }

    fn merge_document(
        &self,
        origin: &NodeRef,
        document: &GraphDocument,
        mentions_type: &str,
    ) -> StorageResult<DocumentMergeStats> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let origin_id = lookup_node(&tx, &origin.label, &origin.key_field, &origin.key_value)?
            .ok_or_else(|| StorageError::NodeNotFound(origin.to_string()))?;

        let mut stats = DocumentMergeStats::default();
        let mut merged: HashMap<&str, i64> = HashMap::new();

        for node in &document.nodes {
            if merged.contains_key(node.id.as_str()) {
                continue;
            }
            let outcome = upsert_on(&tx, &node.label, "id", &node.id, &node.properties)?;
            if outcome.created {
                stats.nodes_created += 1;
            } else {
                stats.nodes_matched += 1;
            }
            merged.insert(node.id.as_str(), outcome.node_id);
        }

        for rel in &document.relationships {
            let source = merged
                .get(rel.source.as_str())
                .ok_or_else(|| StorageError::NodeNotFound(format!("extracted node {}", rel.source)))?;
            let target = merged
                .get(rel.target.as_str())
                .ok_or_else(|| StorageError::NodeNotFound(format!("extracted node {}", rel.target)))?;
            if merge_edge(&tx, &rel.rel_type, *source, *target, &rel.properties)? {
                stats.relationships_created += 1;
            }
        }

        // Provenance: one edge per distinct extracted node
        for node in &document.nodes {
            if let Some(node_id) = merged.remove(node.id.as_str()) {
                if merge_edge(&tx, mentions_type, origin_id, node_id, &Properties::new())? {
                    stats.mentions_created += 1;
                }
            }
        }

        tx.commit()?;
        Ok(stats)
    }

    fn count_nodes(&self, label: Option<&str>) -> StorageResult<usize> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE ?1 IS NULL OR label = ?1",
            params![label],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn count_relationships(&self, rel_type: Option<&str>) -> StorageResult<usize> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM edges WHERE ?1 IS NULL OR rel_type = ?1",
            params![rel_type],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn bulk_export(&self, path: &Path) -> StorageResult<TransferStats> {
        let conn = self.conn();
        export::export_graph(&conn, path)
    }

    fn bulk_import(&self, path: &Path) -> StorageResult<TransferStats> {
        let labels = export::detect_labels(path)?;
        let mut conn = self.conn();
        export::create_import_constraints(&conn, &labels)?;
        export::import_graph(&mut conn, path)
    }
}
