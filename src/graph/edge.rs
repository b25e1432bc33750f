//! Edge representation: typed relationships between nodes

use super::node::NodeId;
use serde::{Deserialize, Serialize};

/// Well-known relationship types
pub mod relationship {
    /// A product provides telemetry for a data component
    pub const PROVIDES: &str = "provides";
    /// A platform's canonical coverage of a technique
    pub const COVERS: &str = "covers";
    /// A data component detects a technique (canonical corpus)
    pub const DETECTS: &str = "detects";
    /// A detection strategy addresses a technique (canonical corpus)
    pub const ADDRESSES: &str = "addresses";
}

/// A directed, typed relationship between two nodes
///
/// For a given `(source_id, dataset = "local")` the edge set is a current
/// snapshot, not an append-only history: each sync call fully replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Source node
    pub source_id: NodeId,
    /// Target node
    pub target_id: NodeId,
    /// Relationship type (e.g. "provides")
    pub relationship: String,
    /// Dataset partition this edge belongs to
    pub dataset: String,
    /// Version tag of the dataset
    pub dataset_version: String,
}

impl Edge {
    /// Create an edge in the given dataset partition
    pub fn new(
        source_id: NodeId,
        target_id: NodeId,
        relationship: impl Into<String>,
        dataset: impl Into<String>,
        dataset_version: impl Into<String>,
    ) -> Self {
        Self {
            source_id,
            target_id,
            relationship: relationship.into(),
            dataset: dataset.into(),
            dataset_version: dataset_version.into(),
        }
    }
}
