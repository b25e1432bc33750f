//! Reconciliation types: mapping states, adapter results, enriched output

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-product mapping state.
///
/// `NoMapping → MappingPending` fires exactly once per product; the pending
/// run concludes in one of the three terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingStatus {
    NoMapping,
    MappingPending,
    MappingMatched,
    MappingPartial,
    MappingError,
}

/// Outcome status reported by a community-content adapter run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterStatus {
    Matched,
    Partial,
    Error,
}

/// A community analytic carried through enrichment unchanged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunityAnalytic {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// The latest per-product result of a community-content adapter.
///
/// Owned and persisted by the adapter orchestration collaborator; this
/// engine only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingResult {
    pub status: AdapterStatus,
    /// Which adapter produced the mapping (e.g. "sigma", "elastic")
    pub source: String,
    pub confidence: f32,
    /// Technique or strategy ids; community sources sometimes carry a
    /// `DS-` prefix that canonical ids never do
    #[serde(default, rename = "detectionStrategies")]
    pub detection_strategies: Vec<String>,
    #[serde(default)]
    pub analytics: Vec<CommunityAnalytic>,
    #[serde(default, rename = "dataComponents")]
    pub data_components: Vec<String>,
    /// When the adapter produced this result
    #[serde(default = "Utc::now", rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// A canonical entity reference in an enriched mapping
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EnrichmentItem {
    /// Canonical external id (e.g. `DS-T1059`, `x-mitre-data-component--...`)
    pub id: String,
    pub name: String,
}

/// Canonical enrichment fetched for one combined technique-id set
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Enrichment {
    pub detection_strategies: Vec<EnrichmentItem>,
    pub data_components: Vec<EnrichmentItem>,
}

/// The reconciled, read-time aggregate of a product's technique coverage.
///
/// Derived and non-persisted; recomputed whenever its inputs change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedMapping {
    pub source: String,
    pub confidence: f32,
    #[serde(rename = "techniqueIds")]
    pub technique_ids: Vec<String>,
    #[serde(rename = "detectionStrategies")]
    pub detection_strategies: Vec<EnrichmentItem>,
    #[serde(rename = "dataComponents")]
    pub data_components: Vec<EnrichmentItem>,
    #[serde(rename = "communityAnalytics")]
    pub community_analytics: Vec<CommunityAnalytic>,
    #[serde(rename = "computedAt")]
    pub computed_at: DateTime<Utc>,
}
