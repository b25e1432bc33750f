//! Node representation in the mapping graph

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stable identifier for a node
///
/// Serializes as a plain string. Ids are deterministic (see [`crate::ident`]),
/// shaped like `x-mitre-mapper-product--<uuid>` for locally derived nodes and
/// like the canonical corpus's own ids (`attack-pattern--<uuid>`, ...) for
/// imported reference nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a NodeId from a string
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Well-known node type discriminants
///
/// The discriminant is an open string; unknown kinds pass through untouched.
pub mod kind {
    pub const PRODUCT: &str = "product";
    pub const DATA_COMPONENT: &str = "data_component";
    pub const DETECTION_STRATEGY: &str = "detection_strategy";
    pub const TECHNIQUE: &str = "technique";
    pub const PLATFORM: &str = "platform";
    pub const ANALYTIC: &str = "analytic";
    pub const TACTIC: &str = "tactic";
    pub const ASSET: &str = "asset";
}

/// Dataset partition names
///
/// Canonical corpora are further values of the same dimension; the partition
/// is always an explicit parameter, never a hard-coded branch.
pub mod dataset {
    /// Locally derived entities (products and their projections)
    pub const LOCAL: &str = "local";
}

/// Well-known attribute keys
pub mod attr {
    /// Canonical corpus-side identifier (e.g. `T1059`,
    /// `x-mitre-data-component--<uuid>`)
    pub const EXTERNAL_ID: &str = "external_id";
    /// Platforms a technique applies to
    pub const PLATFORMS: &str = "platforms";
    pub const DESCRIPTION: &str = "description";
    /// Data source a data component belongs to
    pub const DATA_SOURCE: &str = "data_source";
    pub const TACTICS: &str = "tactics";
    /// Domain an asset belongs to ("Enterprise" or "ICS")
    pub const DOMAIN: &str = "domain";
}

/// Typed attribute values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<AttrValue>),
    Object(HashMap<String, AttrValue>),
}

impl AttrValue {
    /// String accessor, None for non-string values
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Array-of-strings accessor; non-string elements are skipped
    pub fn as_str_array(&self) -> Vec<&str> {
        match self {
            Self::Array(items) => items.iter().filter_map(|v| v.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(items: Vec<String>) -> Self {
        Self::Array(items.into_iter().map(AttrValue::String).collect())
    }
}

/// Open, type-specific attribute payload
pub type Attributes = HashMap<String, AttrValue>;

/// A typed entity in the mapping graph
///
/// One model holds both canonical reference data and locally derived data;
/// the `dataset` field is the partition. Canonical-dataset nodes are written
/// only by the importer and treated as read-only everywhere else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Stable, globally unique identifier
    pub id: NodeId,
    /// Type discriminant (e.g. "product", "technique")
    pub node_type: String,
    /// Human-readable name
    pub name: String,
    /// Dataset partition this node belongs to
    pub dataset: String,
    /// Version tag of the dataset
    pub dataset_version: String,
    /// Back-reference to the owning external record, when locally derived
    pub local_id: Option<String>,
    /// Open, type-specific payload
    pub attributes: Attributes,
}

impl Node {
    /// Create a node in the given dataset partition
    pub fn new(
        id: NodeId,
        node_type: impl Into<String>,
        name: impl Into<String>,
        dataset: impl Into<String>,
        dataset_version: impl Into<String>,
    ) -> Self {
        Self {
            id,
            node_type: node_type.into(),
            name: name.into(),
            dataset: dataset.into(),
            dataset_version: dataset_version.into(),
            local_id: None,
            attributes: HashMap::new(),
        }
    }

    /// Set the back-reference to the owning external record
    pub fn with_local_id(mut self, local_id: impl Into<String>) -> Self {
        self.local_id = Some(local_id.into());
        self
    }

    /// Add an attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Canonical corpus-side identifier, if present
    pub fn external_id(&self) -> Option<&str> {
        self.attributes.get(attr::EXTERNAL_ID).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attr_value_str_accessors() {
        let v = AttrValue::from(vec!["Windows".to_string(), "Linux".to_string()]);
        assert_eq!(v.as_str_array(), vec!["Windows", "Linux"]);
        assert!(v.as_str().is_none());
    }

    #[test]
    fn node_external_id() {
        let node = Node::new(
            NodeId::from("attack-pattern--abc"),
            kind::TECHNIQUE,
            "Command and Scripting Interpreter",
            "mitre-attack",
            "18.0",
        )
        .with_attribute(attr::EXTERNAL_ID, "T1059");

        assert_eq!(node.external_id(), Some("T1059"));
    }

    #[test]
    fn attributes_round_trip_json() {
        let node = Node::new(
            NodeId::from("x-mitre-mapper-product--abc"),
            kind::PRODUCT,
            "sysmon",
            dataset::LOCAL,
            "1",
        )
        .with_local_id("42")
        .with_attribute(attr::PLATFORMS, vec!["Windows".to_string()]);

        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert_eq!(back.local_id.as_deref(), Some("42"));
        assert_eq!(
            back.attributes.get(attr::PLATFORMS).unwrap().as_str_array(),
            vec!["Windows"]
        );
    }
}
