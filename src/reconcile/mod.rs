//! Mapping reconciliation: state machine, canonical key, enrichment fetch

mod engine;
mod enrichment;
mod types;

pub use engine::{
    canonical_key, normalize_technique_ids, ReconcileEngine, ReconcileError, ReconcileResult,
};
pub use enrichment::{EnrichmentSource, StoreEnrichmentSource};
pub use types::{
    AdapterStatus, CommunityAnalytic, EnrichedMapping, Enrichment, EnrichmentItem, MappingResult,
    MappingStatus,
};
