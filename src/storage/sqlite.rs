//! SQLite storage backend for the mapping graph

use super::traits::{GraphStore, NodeFilter, OpenStore, StorageError, StorageResult};
use crate::graph::{Edge, Node, NodeId};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed graph store
///
/// A single database file with tables for nodes and edges, both partitioned
/// by `dataset`. Thread-safe via an internal mutex on the connection; WAL
/// mode keeps readers unblocked during writes.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                node_type TEXT NOT NULL,
                name TEXT NOT NULL,
                dataset TEXT NOT NULL,
                dataset_version TEXT NOT NULL,
                local_id TEXT,
                attributes_json TEXT NOT NULL
            );

            -- (dataset, local_id) is unique when local_id is present
            CREATE UNIQUE INDEX IF NOT EXISTS idx_nodes_local_id
                ON nodes(dataset, local_id) WHERE local_id IS NOT NULL;
            CREATE INDEX IF NOT EXISTS idx_nodes_type
                ON nodes(dataset, node_type);
            -- Set-based external-id resolution
            CREATE INDEX IF NOT EXISTS idx_nodes_external_id
                ON nodes(dataset, json_extract(attributes_json, '$.external_id'));

            CREATE TABLE IF NOT EXISTS edges (
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                relationship TEXT NOT NULL,
                dataset TEXT NOT NULL,
                dataset_version TEXT NOT NULL,
                PRIMARY KEY (dataset, source_id, target_id, relationship)
            );

            CREATE INDEX IF NOT EXISTS idx_edges_source
                ON edges(dataset, source_id);
            CREATE INDEX IF NOT EXISTS idx_edges_target
                ON edges(dataset, target_id);

            PRAGMA foreign_keys = ON;

            -- Concurrent reads during writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;

        Ok(())
    }

    /// Serialize a node's open attribute payload
    fn node_to_row(node: &Node) -> StorageResult<String> {
        Ok(serde_json::to_string(&node.attributes)?)
    }

    /// Deserialize a node from database columns
    fn row_to_node(
        id: String,
        node_type: String,
        name: String,
        dataset: String,
        dataset_version: String,
        local_id: Option<String>,
        attributes_json: String,
    ) -> StorageResult<Node> {
        Ok(Node {
            id: NodeId::from_string(id),
            node_type,
            name,
            dataset,
            dataset_version,
            local_id,
            attributes: serde_json::from_str(&attributes_json)?,
        })
    }

    fn row_to_edge(
        source_id: String,
        target_id: String,
        relationship: String,
        dataset: String,
        dataset_version: String,
    ) -> Edge {
        Edge {
            source_id: NodeId::from_string(source_id),
            target_id: NodeId::from_string(target_id),
            relationship,
            dataset,
            dataset_version,
        }
    }

    fn query_edges(
        conn: &Connection,
        sql: &str,
        dataset: &str,
        node_id: &NodeId,
    ) -> StorageResult<Vec<Edge>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params![dataset, node_id.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut edges = Vec::new();
        for row in rows {
            let (source, target, rel, ds, version) = row?;
            edges.push(Self::row_to_edge(source, target, rel, ds, version));
        }
        Ok(edges)
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
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

impl GraphStore for SqliteStore {
    // === Node Operations ===

    fn insert_node_if_absent(&self, node: &Node) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let attributes_json = Self::node_to_row(node)?;

        // First-write-wins: an existing node's attributes are never
        // overwritten by upsert.
        let rows = conn.execute(
            r#"
            INSERT INTO nodes (id, node_type, name, dataset, dataset_version, local_id, attributes_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO NOTHING
            "#,
            params![
                node.id.as_str(),
                node.node_type,
                node.name,
                node.dataset,
                node.dataset_version,
                node.local_id,
                attributes_json,
            ],
        )?;

        Ok(rows > 0)
    }

    fn load_node(&self, id: &NodeId) -> StorageResult<Option<Node>> {
        let conn = self.conn.lock().unwrap();

        let row: Option<(String, String, String, String, String, Option<String>, String)> = conn
            .query_row(
                "SELECT id, node_type, name, dataset, dataset_version, local_id, attributes_json
                 FROM nodes WHERE id = ?1",
                params![id.as_str()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((id, node_type, name, dataset, version, local_id, attributes)) => Ok(Some(
                Self::row_to_node(id, node_type, name, dataset, version, local_id, attributes)?,
            )),
            None => Ok(None),
        }
    }

    fn node_exists(&self, id: &NodeId) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM nodes WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn delete_node(&self, id: &NodeId) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute("DELETE FROM nodes WHERE id = ?1", params![id.as_str()])?;
        Ok(rows > 0)
    }

    fn find_nodes(&self, filter: &NodeFilter) -> StorageResult<Vec<Node>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = String::from(
            "SELECT id, node_type, name, dataset, dataset_version, local_id, attributes_json
             FROM nodes WHERE dataset = ?1",
        );
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(filter.dataset.clone())];

        if let Some(ref node_type) = filter.node_type {
            sql.push_str(" AND node_type = ?");
            params_vec.push(Box::new(node_type.clone()));
        }

        if let Some(ref name) = filter.name {
            sql.push_str(" AND name = ?");
            params_vec.push(Box::new(name.clone()));
        }

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|b| b.as_ref()).collect();

        let rows = stmt.query_map(params_refs.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut nodes = Vec::new();
        for row in rows {
            let (id, node_type, name, dataset, version, local_id, attributes) = row?;
            nodes.push(Self::row_to_node(
                id, node_type, name, dataset, version, local_id, attributes,
            )?);
        }

        Ok(nodes)
    }

    fn find_by_external_ids(&self, dataset: &str, refs: &[String]) -> StorageResult<Vec<Node>> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock().unwrap();

        // One set-based lookup, not one round trip per reference
        let placeholders: Vec<&str> = refs.iter().map(|_| "?").collect();
        let sql = format!(
            "SELECT id, node_type, name, dataset, dataset_version, local_id, attributes_json
             FROM nodes
             WHERE dataset = ?1
               AND json_extract(attributes_json, '$.external_id') IN ({})",
            placeholders.join(",")
        );

        let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&dataset];
        for r in refs {
            params_vec.push(r);
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_vec.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut nodes = Vec::new();
        for row in rows {
            let (id, node_type, name, ds, version, local_id, attributes) = row?;
            nodes.push(Self::row_to_node(
                id, node_type, name, ds, version, local_id, attributes,
            )?);
        }

        Ok(nodes)
    }

    // === Edge Operations ===

    fn replace_edges(
        &self,
        source_id: &NodeId,
        dataset: &str,
        edges: &[Edge],
    ) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();

        // Delete + insert in one transaction so a partial edge set is never
        // externally visible.
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM edges WHERE dataset = ?1 AND source_id = ?2",
            params![dataset, source_id.as_str()],
        )?;

        // The dataset parameter names the partition being snapshotted; an
        // edge tagged otherwise must not escape into another partition.
        for edge in edges {
            tx.execute(
                r#"
                INSERT INTO edges (source_id, target_id, relationship, dataset, dataset_version)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(dataset, source_id, target_id, relationship) DO NOTHING
                "#,
                params![
                    edge.source_id.as_str(),
                    edge.target_id.as_str(),
                    edge.relationship,
                    dataset,
                    edge.dataset_version,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn edges_from(&self, source_id: &NodeId, dataset: &str) -> StorageResult<Vec<Edge>> {
        let conn = self.conn.lock().unwrap();
        Self::query_edges(
            &conn,
            "SELECT source_id, target_id, relationship, dataset, dataset_version
             FROM edges WHERE dataset = ?1 AND source_id = ?2",
            dataset,
            source_id,
        )
    }

    fn edges_to(&self, target_id: &NodeId, dataset: &str) -> StorageResult<Vec<Edge>> {
        let conn = self.conn.lock().unwrap();
        Self::query_edges(
            &conn,
            "SELECT source_id, target_id, relationship, dataset, dataset_version
             FROM edges WHERE dataset = ?1 AND target_id = ?2",
            dataset,
            target_id,
        )
    }

    fn delete_edges_from(&self, source_id: &NodeId, dataset: &str) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let rows = conn.execute(
            "DELETE FROM edges WHERE dataset = ?1 AND source_id = ?2",
            params![dataset, source_id.as_str()],
        )?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{attr, dataset, kind, relationship};

    const CANONICAL: &str = "mitre-attack";

    fn create_test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn technique(id: &str, external_id: &str, name: &str) -> Node {
        Node::new(NodeId::from(id), kind::TECHNIQUE, name, CANONICAL, "18.0")
            .with_attribute(attr::EXTERNAL_ID, external_id)
    }

    fn local_product(id: &str, local_id: &str) -> Node {
        Node::new(NodeId::from(id), kind::PRODUCT, "sensor", dataset::LOCAL, "1")
            .with_local_id(local_id)
    }

    #[test]
    fn insert_node_if_absent_is_first_write_wins() {
        let store = create_test_store();

        let original = local_product("x-mitre-mapper-product--a", "42")
            .with_attribute("enrichment_state", "done");
        assert!(store.insert_node_if_absent(&original).unwrap());

        // Second upsert with different attributes must not clobber
        let second = local_product("x-mitre-mapper-product--a", "42");
        assert!(!store.insert_node_if_absent(&second).unwrap());

        let loaded = store.load_node(&original.id).unwrap().unwrap();
        assert_eq!(
            loaded.attributes.get("enrichment_state").and_then(|v| v.as_str()),
            Some("done")
        );
    }

    #[test]
    fn load_and_delete_node() {
        let store = create_test_store();
        let node = technique("attack-pattern--t1", "T1059", "Scripting");
        store.insert_node_if_absent(&node).unwrap();

        assert!(store.node_exists(&node.id).unwrap());
        let loaded = store.load_node(&node.id).unwrap().unwrap();
        assert_eq!(loaded.name, "Scripting");
        assert_eq!(loaded.external_id(), Some("T1059"));

        assert!(store.delete_node(&node.id).unwrap());
        assert!(!store.node_exists(&node.id).unwrap());
        assert!(store.load_node(&node.id).unwrap().is_none());
    }

    #[test]
    fn find_nodes_by_type_and_name() {
        let store = create_test_store();
        store.insert_node_if_absent(&technique("attack-pattern--t1", "T1059", "Scripting")).unwrap();
        store.insert_node_if_absent(&technique("attack-pattern--t2", "T1003", "Credential Dumping")).unwrap();
        store
            .insert_node_if_absent(
                &Node::new(NodeId::from("plat--win"), kind::PLATFORM, "Windows", CANONICAL, "18.0"),
            )
            .unwrap();

        let techniques = store
            .find_nodes(&NodeFilter::in_dataset(CANONICAL).with_type(kind::TECHNIQUE))
            .unwrap();
        assert_eq!(techniques.len(), 2);

        let windows = store
            .find_nodes(
                &NodeFilter::in_dataset(CANONICAL)
                    .with_type(kind::PLATFORM)
                    .with_name("Windows"),
            )
            .unwrap();
        assert_eq!(windows.len(), 1);

        // Local partition sees none of it
        let local = store.find_nodes(&NodeFilter::in_dataset(dataset::LOCAL)).unwrap();
        assert!(local.is_empty());
    }

    #[test]
    fn find_by_external_ids_is_set_based() {
        let store = create_test_store();
        store.insert_node_if_absent(&technique("attack-pattern--t1", "T1059", "Scripting")).unwrap();
        store.insert_node_if_absent(&technique("attack-pattern--t2", "T1003", "Credential Dumping")).unwrap();

        let found = store
            .find_by_external_ids(
                CANONICAL,
                &["T1059".to_string(), "T1003".to_string(), "T9999".to_string()],
            )
            .unwrap();
        assert_eq!(found.len(), 2);

        // Misses simply don't appear
        let ids: Vec<&str> = found.iter().filter_map(|n| n.external_id()).collect();
        assert!(ids.contains(&"T1059"));
        assert!(ids.contains(&"T1003"));
    }

    #[test]
    fn find_by_external_ids_respects_dataset_partition() {
        let store = create_test_store();
        store.insert_node_if_absent(&technique("attack-pattern--t1", "T1059", "Scripting")).unwrap();

        let found = store
            .find_by_external_ids(dataset::LOCAL, &["T1059".to_string()])
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn replace_edges_snapshots_the_set() {
        let store = create_test_store();
        let source = NodeId::from("x-mitre-mapper-product--a");

        let make_edge = |target: &str| {
            Edge::new(
                source.clone(),
                NodeId::from(target),
                relationship::PROVIDES,
                dataset::LOCAL,
                "1",
            )
        };

        store
            .replace_edges(&source, dataset::LOCAL, &[make_edge("dc--1"), make_edge("dc--2")])
            .unwrap();
        assert_eq!(store.edges_from(&source, dataset::LOCAL).unwrap().len(), 2);

        // Replace with a different set, old edges gone, no duplicates
        store
            .replace_edges(&source, dataset::LOCAL, &[make_edge("dc--2"), make_edge("dc--3")])
            .unwrap();
        let edges = store.edges_from(&source, dataset::LOCAL).unwrap();
        assert_eq!(edges.len(), 2);
        let targets: Vec<&str> = edges.iter().map(|e| e.target_id.as_str()).collect();
        assert!(targets.contains(&"dc--2"));
        assert!(targets.contains(&"dc--3"));

        // Empty set reduces to pure deletion
        store.replace_edges(&source, dataset::LOCAL, &[]).unwrap();
        assert!(store.edges_from(&source, dataset::LOCAL).unwrap().is_empty());
    }

    #[test]
    fn replace_edges_is_idempotent() {
        let store = create_test_store();
        let source = NodeId::from("x-mitre-mapper-product--a");
        let edges = vec![Edge::new(
            source.clone(),
            NodeId::from("dc--1"),
            relationship::PROVIDES,
            dataset::LOCAL,
            "1",
        )];

        store.replace_edges(&source, dataset::LOCAL, &edges).unwrap();
        store.replace_edges(&source, dataset::LOCAL, &edges).unwrap();

        assert_eq!(store.edges_from(&source, dataset::LOCAL).unwrap().len(), 1);
    }

    #[test]
    fn replace_edges_pins_the_snapshot_partition() {
        let store = create_test_store();
        let source = NodeId::from("x-mitre-mapper-product--a");

        // Edge tagged with a foreign dataset still lands in the snapshot's
        // partition
        let mistagged = Edge::new(
            source.clone(),
            NodeId::from("dc--1"),
            relationship::PROVIDES,
            CANONICAL,
            "1",
        );
        store.replace_edges(&source, dataset::LOCAL, &[mistagged]).unwrap();

        assert_eq!(store.edges_from(&source, dataset::LOCAL).unwrap().len(), 1);
        assert!(store.edges_from(&source, CANONICAL).unwrap().is_empty());
    }

    #[test]
    fn edges_to_and_delete_edges_from() {
        let store = create_test_store();
        let source = NodeId::from("x-mitre-mapper-product--a");
        let target = NodeId::from("dc--1");

        store
            .replace_edges(
                &source,
                dataset::LOCAL,
                &[Edge::new(
                    source.clone(),
                    target.clone(),
                    relationship::PROVIDES,
                    dataset::LOCAL,
                    "1",
                )],
            )
            .unwrap();

        assert_eq!(store.edges_to(&target, dataset::LOCAL).unwrap().len(), 1);
        assert_eq!(store.delete_edges_from(&source, dataset::LOCAL).unwrap(), 1);
        assert!(store.edges_to(&target, dataset::LOCAL).unwrap().is_empty());
    }

    #[test]
    fn wal_mode_enabled_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("graph.db")).unwrap();

        let journal_mode: String = store
            .conn
            .lock()
            .unwrap()
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode, "wal");
    }
}
