//! Selector Expansion Service
//!
//! Expands an operator-chosen coverage-overlay value (currently a platform)
//! into the technique-id set the canonical graph implies for it. Lets an
//! operator assert broader coverage than literal data-component mappings
//! capture.

use crate::graph::{kind, relationship, NodeId};
use crate::storage::{GraphStore, NodeFilter, StorageResult};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Selector types understood by the expansion service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorType {
    Platform,
}

/// An operator-chosen coverage overlay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    pub selector_type: SelectorType,
    pub value: String,
}

impl Selector {
    pub fn platform(value: impl Into<String>) -> Self {
        Self {
            selector_type: SelectorType::Platform,
            value: value.into(),
        }
    }
}

/// The distinct technique-id set a selector expands to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorExpansion {
    pub technique_ids: BTreeSet<String>,
    pub count: usize,
}

/// Read-only expansion over the canonical partition.
///
/// Deterministic for fixed canonical data; freely parallelizable across
/// selector values.
pub struct SelectorExpansionService<S: GraphStore> {
    store: Arc<S>,
    canonical_dataset: String,
}

impl<S: GraphStore> SelectorExpansionService<S> {
    pub fn new(store: Arc<S>, canonical_dataset: impl Into<String>) -> Self {
        Self {
            store,
            canonical_dataset: canonical_dataset.into(),
        }
    }

    /// Expand a selector into the implied technique-id set.
    ///
    /// An unknown selector value expands to the empty set, not an error.
    pub fn techniques_for_selector(&self, selector: &Selector) -> StorageResult<SelectorExpansion> {
        let technique_ids = match selector.selector_type {
            SelectorType::Platform => self.techniques_for_platform(&selector.value)?,
        };
        let count = technique_ids.len();
        debug!(value = %selector.value, count, "expanded selector");
        Ok(SelectorExpansion {
            technique_ids,
            count,
        })
    }

    fn techniques_for_platform(&self, value: &str) -> StorageResult<BTreeSet<String>> {
        let platforms = self.store.find_nodes(
            &NodeFilter::in_dataset(&self.canonical_dataset)
                .with_type(kind::PLATFORM)
                .with_name(value),
        )?;

        let mut technique_ids = BTreeSet::new();
        for platform in &platforms {
            for edge in self.store.edges_from(&platform.id, &self.canonical_dataset)? {
                if edge.relationship != relationship::COVERS {
                    continue;
                }
                if let Some(id) = self.technique_external_id(&edge.target_id)? {
                    technique_ids.insert(id);
                }
            }
        }
        Ok(technique_ids)
    }

    fn technique_external_id(&self, id: &NodeId) -> StorageResult<Option<String>> {
        Ok(self
            .store
            .load_node(id)?
            .filter(|n| n.node_type == kind::TECHNIQUE)
            .and_then(|n| n.external_id().map(String::from)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{import_corpus, Corpus, OpenStore, SqliteStore};

    fn seeded_service() -> SelectorExpansionService<SqliteStore> {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let corpus: Corpus = serde_json::from_str(
            r#"{
                "techniques": [
                    {"id": "T1059", "name": "Command and Scripting Interpreter",
                     "platforms": ["Windows", "Linux"]},
                    {"id": "T1003", "name": "OS Credential Dumping",
                     "platforms": ["Windows"]},
                    {"id": "T1071", "name": "Application Layer Protocol",
                     "platforms": ["Linux"]}
                ]
            }"#,
        )
        .unwrap();
        import_corpus(store.as_ref(), "mitre-attack", "18.0", &corpus).unwrap();
        SelectorExpansionService::new(store, "mitre-attack")
    }

    #[test]
    fn expands_platform_to_distinct_techniques() {
        let service = seeded_service();

        let expansion = service
            .techniques_for_selector(&Selector::platform("Windows"))
            .unwrap();
        assert_eq!(expansion.count, 2);
        assert!(expansion.technique_ids.contains("T1059"));
        assert!(expansion.technique_ids.contains("T1003"));

        let expansion = service
            .techniques_for_selector(&Selector::platform("Linux"))
            .unwrap();
        assert_eq!(expansion.count, 2);
        assert!(expansion.technique_ids.contains("T1071"));
    }

    #[test]
    fn unknown_platform_expands_to_empty_set() {
        let service = seeded_service();
        let expansion = service
            .techniques_for_selector(&Selector::platform("Solaris"))
            .unwrap();
        assert!(expansion.technique_ids.is_empty());
        assert_eq!(expansion.count, 0);
    }

    #[test]
    fn expansion_is_deterministic() {
        let service = seeded_service();
        let a = service
            .techniques_for_selector(&Selector::platform("Windows"))
            .unwrap();
        let b = service
            .techniques_for_selector(&Selector::platform("Windows"))
            .unwrap();
        assert_eq!(a, b);
    }
}
