//! Enrichment source: the canonical-fetch seam
//!
//! The engine fetches canonical detection strategies and data components
//! for a combined technique-id set through this trait; the store-backed
//! implementation reads the canonical partition.

use super::types::{Enrichment, EnrichmentItem};
use crate::graph::{kind, relationship};
use crate::storage::{GraphStore, StorageResult};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Fetches canonical enrichment for a technique-id set.
///
/// Read-only and freely parallelizable across products.
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    async fn fetch(&self, technique_ids: &BTreeSet<String>) -> StorageResult<Enrichment>;
}

/// Store-backed enrichment over the canonical dataset partition
pub struct StoreEnrichmentSource<S: GraphStore> {
    store: Arc<S>,
    canonical_dataset: String,
}

impl<S: GraphStore> StoreEnrichmentSource<S> {
    pub fn new(store: Arc<S>, canonical_dataset: impl Into<String>) -> Self {
        Self {
            store,
            canonical_dataset: canonical_dataset.into(),
        }
    }
}

#[async_trait]
impl<S: GraphStore> EnrichmentSource for StoreEnrichmentSource<S> {
    async fn fetch(&self, technique_ids: &BTreeSet<String>) -> StorageResult<Enrichment> {
        let refs: Vec<String> = technique_ids.iter().cloned().collect();
        let techniques = self.store.find_by_external_ids(&self.canonical_dataset, &refs)?;

        // Walk inbound canonical edges: strategies address techniques,
        // data components detect them.
        let mut strategies: BTreeSet<EnrichmentItem> = BTreeSet::new();
        let mut components: BTreeSet<EnrichmentItem> = BTreeSet::new();
        for technique in &techniques {
            for edge in self.store.edges_to(&technique.id, &self.canonical_dataset)? {
                let Some(node) = self.store.load_node(&edge.source_id)? else {
                    continue;
                };
                let Some(external_id) = node.external_id() else {
                    continue;
                };
                let item = EnrichmentItem {
                    id: external_id.to_string(),
                    name: node.name.clone(),
                };
                match (edge.relationship.as_str(), node.node_type.as_str()) {
                    (relationship::ADDRESSES, kind::DETECTION_STRATEGY) => {
                        strategies.insert(item);
                    }
                    (relationship::DETECTS, kind::DATA_COMPONENT) => {
                        components.insert(item);
                    }
                    _ => {}
                }
            }
        }

        Ok(Enrichment {
            detection_strategies: strategies.into_iter().collect(),
            data_components: components.into_iter().collect(),
        })
    }
}
