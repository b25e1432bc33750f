//! Canonical corpus importer
//!
//! Loads an extracted reference corpus (techniques, data components,
//! detection strategies, tactics, assets, platform coverage) into one
//! canonical dataset partition. The input shape matches the extraction pipeline's JSON output:
//! techniques carry `tactics` and `platforms`, data components carry their
//! STIX ids, detection strategies reference techniques and component ids.

use super::traits::{GraphStore, StorageResult};
use crate::graph::{attr, kind, relationship, Edge, Node, NodeId};
use crate::ident;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::info;

/// An extracted reference corpus, as produced by the import pipeline
#[derive(Debug, Clone, Deserialize)]
pub struct Corpus {
    #[serde(default)]
    pub assets: Vec<AssetRecord>,
    #[serde(default, rename = "dataComponents")]
    pub data_components: Vec<DataComponentRecord>,
    #[serde(default, rename = "detectionStrategies")]
    pub detection_strategies: Vec<DetectionStrategyRecord>,
    #[serde(default)]
    pub techniques: Vec<TechniqueRecord>,
    #[serde(default)]
    pub tactics: Vec<TacticRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetRecord {
    /// STIX id (`x-mitre-asset--<uuid>`)
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// "Enterprise" or "ICS"
    #[serde(default)]
    pub domain: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TacticRecord {
    /// Kill-chain phase shortname (`execution`, `credential-access`, ...)
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataComponentRecord {
    /// STIX id (`x-mitre-data-component--<uuid>`)
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "dataSource")]
    pub data_source: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetectionStrategyRecord {
    /// Strategy id (`DS-<technique id>`)
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Technique ids this strategy addresses
    #[serde(default)]
    pub techniques: Vec<String>,
    /// STIX ids of the data components the strategy's analytics read
    #[serde(default, rename = "dataComponentRefs")]
    pub data_component_refs: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TechniqueRecord {
    /// Technique id (`T1059`, `T1059.001`, ...)
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tactics: Vec<String>,
    #[serde(default)]
    pub platforms: Vec<String>,
}

/// Summary of one import run
#[derive(Debug, Default)]
pub struct ImportSummary {
    pub nodes: usize,
    pub edges: usize,
}

/// Import a corpus into the given canonical dataset partition.
///
/// Node ids: data components and assets keep their STIX ids; techniques,
/// strategies, tactics and platforms get deterministic derived ids so
/// re-imports converge on the same nodes. Edges written:
/// platform --covers--> technique, data component --detects--> technique,
/// strategy --addresses--> technique.
pub fn import_corpus<S: GraphStore>(
    store: &S,
    dataset: &str,
    version: &str,
    corpus: &Corpus,
) -> StorageResult<ImportSummary> {
    let mut summary = ImportSummary::default();

    // Techniques first: everything else resolves against them
    let mut technique_ids: HashMap<String, NodeId> = HashMap::new();
    for tech in &corpus.techniques {
        let id = ident::generate(kind::TECHNIQUE, &tech.id);
        let node = Node::new(id.clone(), kind::TECHNIQUE, &tech.name, dataset, version)
            .with_attribute(attr::EXTERNAL_ID, tech.id.as_str())
            .with_attribute(attr::PLATFORMS, tech.platforms.clone())
            .with_attribute(attr::TACTICS, tech.tactics.clone());
        if store.insert_node_if_absent(&node)? {
            summary.nodes += 1;
        }
        technique_ids.insert(tech.id.clone(), id);
    }

    for tactic in &corpus.tactics {
        let id = ident::generate(kind::TACTIC, &tactic.id);
        let node = Node::new(id, kind::TACTIC, &tactic.name, dataset, version)
            .with_attribute(attr::EXTERNAL_ID, tactic.id.as_str())
            .with_attribute(attr::DESCRIPTION, tactic.description.as_str());
        if store.insert_node_if_absent(&node)? {
            summary.nodes += 1;
        }
    }

    for asset in &corpus.assets {
        let node = Node::new(
            NodeId::from_string(&asset.id),
            kind::ASSET,
            &asset.name,
            dataset,
            version,
        )
        .with_attribute(attr::EXTERNAL_ID, asset.id.as_str())
        .with_attribute(attr::DESCRIPTION, asset.description.as_str())
        .with_attribute(attr::DOMAIN, asset.domain.as_str());
        if store.insert_node_if_absent(&node)? {
            summary.nodes += 1;
        }
    }

    for dc in &corpus.data_components {
        let node = Node::new(
            NodeId::from_string(&dc.id),
            kind::DATA_COMPONENT,
            &dc.name,
            dataset,
            version,
        )
        .with_attribute(attr::EXTERNAL_ID, dc.id.as_str())
        .with_attribute(attr::DESCRIPTION, dc.description.as_str())
        .with_attribute(attr::DATA_SOURCE, dc.data_source.as_str());
        if store.insert_node_if_absent(&node)? {
            summary.nodes += 1;
        }
    }

    for ds in &corpus.detection_strategies {
        let id = ident::generate(kind::DETECTION_STRATEGY, &ds.id);
        let node = Node::new(id.clone(), kind::DETECTION_STRATEGY, &ds.name, dataset, version)
            .with_attribute(attr::EXTERNAL_ID, ds.id.as_str())
            .with_attribute(attr::DESCRIPTION, ds.description.as_str());
        if store.insert_node_if_absent(&node)? {
            summary.nodes += 1;
        }

        let edges: Vec<Edge> = ds
            .techniques
            .iter()
            .filter_map(|t| technique_ids.get(t))
            .map(|tech_id| {
                Edge::new(id.clone(), tech_id.clone(), relationship::ADDRESSES, dataset, version)
            })
            .collect();
        summary.edges += edges.len();
        store.replace_edges(&id, dataset, &edges)?;
    }

    // detects edges: data component -> every technique whose strategy reads it
    let mut detects: HashMap<String, Vec<NodeId>> = HashMap::new();
    for ds in &corpus.detection_strategies {
        for dc_ref in &ds.data_component_refs {
            let targets = detects.entry(dc_ref.clone()).or_default();
            for t in &ds.techniques {
                if let Some(tech_id) = technique_ids.get(t) {
                    if !targets.contains(tech_id) {
                        targets.push(tech_id.clone());
                    }
                }
            }
        }
    }
    for (dc_ref, targets) in &detects {
        let source = NodeId::from_string(dc_ref);
        let edges: Vec<Edge> = targets
            .iter()
            .map(|t| Edge::new(source.clone(), t.clone(), relationship::DETECTS, dataset, version))
            .collect();
        summary.edges += edges.len();
        store.replace_edges(&source, dataset, &edges)?;
    }

    // Platform coverage: one node per distinct platform name, covers edges
    // to every technique listing it
    let mut platforms: HashMap<String, Vec<NodeId>> = HashMap::new();
    for tech in &corpus.techniques {
        for platform in &tech.platforms {
            platforms
                .entry(platform.clone())
                .or_default()
                .push(technique_ids[&tech.id].clone());
        }
    }
    for (platform, targets) in &platforms {
        let id = ident::generate(kind::PLATFORM, platform);
        let node = Node::new(id.clone(), kind::PLATFORM, platform, dataset, version);
        if store.insert_node_if_absent(&node)? {
            summary.nodes += 1;
        }

        let edges: Vec<Edge> = targets
            .iter()
            .map(|t| Edge::new(id.clone(), t.clone(), relationship::COVERS, dataset, version))
            .collect();
        summary.edges += edges.len();
        store.replace_edges(&id, dataset, &edges)?;
    }

    info!(
        dataset,
        version,
        nodes = summary.nodes,
        edges = summary.edges,
        "imported canonical corpus"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{NodeFilter, OpenStore, SqliteStore};

    fn sample_corpus() -> Corpus {
        serde_json::from_str(
            r#"{
                "assets": [
                    {"id": "x-mitre-asset--dddddddd-0000-4000-8000-000000000004",
                     "name": "Workstation", "description": "", "domain": "Enterprise"}
                ],
                "tactics": [
                    {"id": "execution", "name": "Execution", "description": ""}
                ],
                "dataComponents": [
                    {"id": "x-mitre-data-component--aaaaaaaa-0000-4000-8000-000000000001",
                     "name": "Process Creation", "description": "", "dataSource": "Process"}
                ],
                "detectionStrategies": [
                    {"id": "DS-T1059", "name": "Detection Strategy for T1059",
                     "techniques": ["T1059"],
                     "dataComponentRefs": ["x-mitre-data-component--aaaaaaaa-0000-4000-8000-000000000001"]}
                ],
                "techniques": [
                    {"id": "T1059", "name": "Command and Scripting Interpreter",
                     "tactics": ["execution"], "platforms": ["Windows", "Linux"]},
                    {"id": "T1003", "name": "OS Credential Dumping",
                     "tactics": ["credential-access"], "platforms": ["Windows"]}
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn import_creates_partitioned_nodes_and_edges() {
        let store = SqliteStore::open_in_memory().unwrap();
        let summary = import_corpus(&store, "mitre-attack", "18.0", &sample_corpus()).unwrap();

        // 2 techniques + 1 component + 1 strategy + 2 platforms
        // + 1 tactic + 1 asset
        assert_eq!(summary.nodes, 8);

        let techniques = store
            .find_nodes(&NodeFilter::in_dataset("mitre-attack").with_type(kind::TECHNIQUE))
            .unwrap();
        assert_eq!(techniques.len(), 2);

        // Windows covers both techniques, Linux one
        let windows = ident::generate(kind::PLATFORM, "Windows");
        assert_eq!(store.edges_from(&windows, "mitre-attack").unwrap().len(), 2);
        let linux = ident::generate(kind::PLATFORM, "Linux");
        assert_eq!(store.edges_from(&linux, "mitre-attack").unwrap().len(), 1);
    }

    #[test]
    fn import_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        import_corpus(&store, "mitre-attack", "18.0", &sample_corpus()).unwrap();
        let second = import_corpus(&store, "mitre-attack", "18.0", &sample_corpus()).unwrap();

        // Second run inserts nothing new
        assert_eq!(second.nodes, 0);
        let all = store.find_nodes(&NodeFilter::in_dataset("mitre-attack")).unwrap();
        assert_eq!(all.len(), 8);
    }

    #[test]
    fn import_carries_tactics_and_assets() {
        let store = SqliteStore::open_in_memory().unwrap();
        import_corpus(&store, "mitre-attack", "18.0", &sample_corpus()).unwrap();

        let tactics = store
            .find_nodes(&NodeFilter::in_dataset("mitre-attack").with_type(kind::TACTIC))
            .unwrap();
        assert_eq!(tactics.len(), 1);
        assert_eq!(tactics[0].external_id(), Some("execution"));

        let assets = store
            .find_nodes(&NodeFilter::in_dataset("mitre-attack").with_type(kind::ASSET))
            .unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(
            assets[0].attributes.get(attr::DOMAIN).and_then(|v| v.as_str()),
            Some("Enterprise")
        );
    }

    #[test]
    fn detects_edges_link_components_to_techniques() {
        let store = SqliteStore::open_in_memory().unwrap();
        import_corpus(&store, "mitre-attack", "18.0", &sample_corpus()).unwrap();

        let dc = NodeId::from("x-mitre-data-component--aaaaaaaa-0000-4000-8000-000000000001");
        let edges = store.edges_from(&dc, "mitre-attack").unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].relationship, relationship::DETECTS);
    }
}
