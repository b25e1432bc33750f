//! Graph Sync Service
//!
//! Projects an external product record into the graph store as a node plus a
//! current snapshot of its outgoing capability edges, resolving raw
//! references against canonical identifiers.

use crate::graph::{attr, dataset, kind, relationship, Edge, Node, NodeId};
use crate::ident;
use crate::storage::{GraphStore, StorageError};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from sync operations
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// A product record as handed over by the CRUD store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Record id in the external store
    pub id: String,
    /// Product name / identifier
    #[serde(rename = "productId")]
    pub product_id: String,
    /// Raw data-component references (canonical ids or external ids)
    #[serde(default, rename = "dataComponentIds")]
    pub data_component_ids: Vec<String>,
    /// Platforms the product runs on
    #[serde(default)]
    pub platforms: Vec<String>,
}

/// Outcome of one `sync_edges` call
///
/// Partial success is first-class: resolvable references are synced even
/// when others miss. The unresolved subset is returned to the caller rather
/// than dropped silently.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Number of edges in the new snapshot
    pub edges_written: usize,
    /// References that failed to resolve against the canonical dataset
    pub unresolved: Vec<String>,
}

impl SyncReport {
    /// True if every reference resolved
    pub fn is_fully_resolved(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Projects local entities into the graph store.
///
/// Writes to one source entity are serialized through a per-entity mutex;
/// the store itself offers no edge versioning to arbitrate interleaved
/// delete+insert pairs. Operations on distinct entities run in parallel.
pub struct SyncService<S: GraphStore> {
    store: Arc<S>,
    /// Canonical dataset raw references resolve against
    canonical_dataset: String,
    /// Version tag written on local nodes and edges
    local_version: String,
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl<S: GraphStore> SyncService<S> {
    pub fn new(store: Arc<S>, canonical_dataset: impl Into<String>) -> Self {
        Self {
            store,
            canonical_dataset: canonical_dataset.into(),
            local_version: "1".to_string(),
            locks: DashMap::new(),
        }
    }

    fn entity_lock(&self, record_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(record_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Derive the graph node id for a product record
    pub fn node_id(record: &ProductRecord) -> NodeId {
        ident::generate(kind::PRODUCT, &record.id)
    }

    /// Project the record as a node in the local partition.
    ///
    /// First-write-wins: an already-present node keeps its attributes;
    /// explicit update paths live elsewhere.
    pub async fn upsert_node(&self, record: &ProductRecord) -> SyncResult<NodeId> {
        let lock = self.entity_lock(&record.id);
        let _guard = lock.lock().await;

        let id = Self::node_id(record);
        let node = Node::new(
            id.clone(),
            kind::PRODUCT,
            &record.product_id,
            dataset::LOCAL,
            &self.local_version,
        )
        .with_local_id(&record.id)
        .with_attribute(attr::PLATFORMS, record.platforms.clone());

        let inserted = self.store.insert_node_if_absent(&node)?;
        debug!(id = %id, inserted, "upserted product node");
        Ok(id)
    }

    /// Replace the record's outgoing `provides` edge snapshot.
    ///
    /// References already in canonical id form are used verbatim; the rest
    /// are resolved in one set-based lookup against the canonical dataset's
    /// external ids. Unresolved references are reported, not synced. An
    /// empty `raw_refs` reduces to pure deletion.
    pub async fn sync_edges(
        &self,
        record: &ProductRecord,
        raw_refs: &[String],
    ) -> SyncResult<SyncReport> {
        let lock = self.entity_lock(&record.id);
        let _guard = lock.lock().await;

        let source_id = Self::node_id(record);

        let mut targets: Vec<NodeId> = Vec::new();
        let mut pending: Vec<String> = Vec::new();
        for r in raw_refs {
            if ident::is_canonical_ref(r) {
                let target = NodeId::from_string(r.clone());
                if !targets.contains(&target) {
                    targets.push(target);
                }
            } else if !pending.contains(r) {
                pending.push(r.clone());
            }
        }

        // Batched resolution of external identifiers
        let mut unresolved = Vec::new();
        if !pending.is_empty() {
            let resolved = self
                .store
                .find_by_external_ids(&self.canonical_dataset, &pending)?;
            for r in &pending {
                match resolved.iter().find(|n| n.external_id() == Some(r)) {
                    Some(node) => {
                        if !targets.contains(&node.id) {
                            targets.push(node.id.clone());
                        }
                    }
                    None => unresolved.push(r.clone()),
                }
            }
        }

        if !unresolved.is_empty() {
            warn!(
                record = %record.id,
                unresolved = unresolved.len(),
                "references failed to resolve against canonical dataset"
            );
        }

        let edges: Vec<Edge> = targets
            .into_iter()
            .map(|target| {
                Edge::new(
                    source_id.clone(),
                    target,
                    relationship::PROVIDES,
                    dataset::LOCAL,
                    &self.local_version,
                )
            })
            .collect();

        let edges_written = edges.len();
        self.store.replace_edges(&source_id, dataset::LOCAL, &edges)?;
        debug!(record = %record.id, edges_written, "replaced edge snapshot");

        Ok(SyncReport {
            edges_written,
            unresolved,
        })
    }

    /// Remove the record's projection: outgoing edges first, then the node.
    ///
    /// Edges that target this node from elsewhere are left in place.
    pub async fn delete_graph(&self, record: &ProductRecord) -> SyncResult<()> {
        let lock = self.entity_lock(&record.id);
        let _guard = lock.lock().await;

        let id = Self::node_id(record);
        let removed = self.store.delete_edges_from(&id, dataset::LOCAL)?;
        self.store.delete_node(&id)?;
        debug!(record = %record.id, edges_removed = removed, "deleted graph projection");
        Ok(())
    }
}
