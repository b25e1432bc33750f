//! Storage trait definitions

use crate::graph::{Edge, Node, NodeId};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Filter criteria for querying nodes
///
/// `dataset` is mandatory: every store call is explicitly partitioned.
#[derive(Debug, Clone)]
pub struct NodeFilter {
    /// Dataset partition to search
    pub dataset: String,
    /// Filter by node type (e.g. "technique", "platform")
    pub node_type: Option<String>,
    /// Filter by exact name
    pub name: Option<String>,
    /// Maximum number of results
    pub limit: Option<usize>,
}

impl NodeFilter {
    pub fn in_dataset(dataset: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            node_type: None,
            name: None,
            limit: None,
        }
    }

    pub fn with_type(mut self, node_type: impl Into<String>) -> Self {
        self.node_type = Some(node_type.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Trait for graph storage backends
///
/// Implementations must be thread-safe (Send + Sync) to support concurrent
/// access from multiple threads. Writes within one call must be atomic:
/// `replace_edges` in particular may never leave a partial edge set visible.
pub trait GraphStore: Send + Sync {
    // === Node Operations ===

    /// Insert a node if no node with its id exists. First-write-wins: an
    /// existing node's attributes are left untouched. Returns true if the
    /// node was inserted.
    fn insert_node_if_absent(&self, node: &Node) -> StorageResult<bool>;

    /// Load a node by id
    fn load_node(&self, id: &NodeId) -> StorageResult<Option<Node>>;

    /// Check whether a node id resolves
    fn node_exists(&self, id: &NodeId) -> StorageResult<bool>;

    /// Delete a node by id. Returns true if a node was removed.
    fn delete_node(&self, id: &NodeId) -> StorageResult<bool>;

    /// Find nodes matching filter criteria
    fn find_nodes(&self, filter: &NodeFilter) -> StorageResult<Vec<Node>>;

    /// Resolve external identifiers against one dataset partition in a
    /// single set-based lookup. Returns only the nodes that matched.
    fn find_by_external_ids(&self, dataset: &str, refs: &[String]) -> StorageResult<Vec<Node>>;

    // === Edge Operations ===

    /// Atomically replace the full edge set for `(source_id, dataset)`:
    /// delete all current edges from the source, insert the given edges, in
    /// one transaction. An empty slice reduces to pure deletion. Inserted
    /// edges are written into `dataset` regardless of their own tag.
    fn replace_edges(&self, source_id: &NodeId, dataset: &str, edges: &[Edge])
        -> StorageResult<()>;

    /// Get edges originating from a node within one dataset partition
    fn edges_from(&self, source_id: &NodeId, dataset: &str) -> StorageResult<Vec<Edge>>;

    /// Get edges targeting a node within one dataset partition
    fn edges_to(&self, target_id: &NodeId, dataset: &str) -> StorageResult<Vec<Edge>>;

    /// Delete all edges originating from a node within one dataset
    /// partition. Returns the number of edges removed.
    fn delete_edges_from(&self, source_id: &NodeId, dataset: &str) -> StorageResult<usize>;
}

/// Extension trait for opening stores from paths
pub trait OpenStore: GraphStore + Sized {
    /// Open or create a store at the given path
    fn open(path: impl AsRef<Path>) -> StorageResult<Self>;

    /// Create an in-memory store (useful for testing)
    fn open_in_memory() -> StorageResult<Self>;
}
