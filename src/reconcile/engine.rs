//! Mapping Reconciliation Engine
//!
//! Combines a stored community mapping with selector-expanded coverage into
//! one canonicalized technique-id set, fetches canonical enrichment for it,
//! and exposes a single enriched mapping per product. Staleness is arbitrated
//! by canonical key, never by response arrival order.

use super::enrichment::EnrichmentSource;
use super::types::{AdapterStatus, EnrichedMapping, MappingResult, MappingStatus};
use crate::selector::SelectorExpansion;
use crate::storage::StorageError;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from reconciliation operations
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for reconciliation operations
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Strip the community-side `DS-` prefix; canonical ids never carry it.
pub fn normalize_technique_ids(ids: &[String]) -> BTreeSet<String> {
    ids.iter()
        .map(|id| id.strip_prefix("DS-").unwrap_or(id).to_string())
        .collect()
}

/// Deterministic, order-independent serialization of a technique-id set.
///
/// Doubles as the cache key: two orderings of the same set compare equal.
pub fn canonical_key(ids: &BTreeSet<String>) -> String {
    ids.iter().cloned().collect::<Vec<_>>().join(",")
}

/// Latest enrichment state for one product
#[derive(Debug, Default)]
struct EnrichedEntry {
    /// Canonical key of the newest combined set; fetch results whose tag no
    /// longer matches are discarded on completion
    latest_key: Option<String>,
    /// Key the cached `enriched` was actually computed for. Set only on a
    /// successful fetch, so a failed fetch never turns into a cache hit.
    enriched_key: Option<String>,
    enriched: Option<EnrichedMapping>,
    /// Non-blocking fetch error, distinct from the mapping's own status
    last_fetch_error: Option<String>,
}

/// Per-product reconciliation engine.
///
/// Holds request-scoped state only: status machine, the latest stored
/// mapping, the active selector expansion, and the cached enriched mapping.
pub struct ReconcileEngine<E: EnrichmentSource> {
    enrichment: Arc<E>,
    states: DashMap<String, MappingStatus>,
    mappings: DashMap<String, MappingResult>,
    selectors: DashMap<String, SelectorExpansion>,
    entries: DashMap<String, Arc<Mutex<EnrichedEntry>>>,
}

impl<E: EnrichmentSource> ReconcileEngine<E> {
    pub fn new(enrichment: Arc<E>) -> Self {
        Self {
            enrichment,
            states: DashMap::new(),
            mappings: DashMap::new(),
            selectors: DashMap::new(),
            entries: DashMap::new(),
        }
    }

    /// Current mapping status for a product
    pub fn status(&self, product: &str) -> MappingStatus {
        self.states
            .get(product)
            .map(|s| *s)
            .unwrap_or(MappingStatus::NoMapping)
    }

    /// Fire the `NoMapping → MappingPending` transition.
    ///
    /// Returns true only for the single call that wins the transition; a run
    /// already in flight or concluded leaves the state untouched.
    pub fn begin_mapping(&self, product: &str) -> bool {
        let mut entry = self
            .states
            .entry(product.to_string())
            .or_insert(MappingStatus::NoMapping);
        if *entry == MappingStatus::NoMapping {
            *entry = MappingStatus::MappingPending;
            info!(product, "mapping run started");
            true
        } else {
            debug!(product, status = ?*entry, "mapping run already in flight or concluded");
            false
        }
    }

    /// Conclude a pending run with the adapter's result.
    ///
    /// An adapter failure concludes this product as `MappingError` without
    /// touching any other product's state. A result for a run that was never
    /// begun is accepted, so restarted adapters can land late results, but
    /// the skipped `MappingPending` transition is logged.
    pub fn complete_mapping(&self, product: &str, result: MappingResult) {
        let status = match result.status {
            AdapterStatus::Matched => MappingStatus::MappingMatched,
            AdapterStatus::Partial => MappingStatus::MappingPartial,
            AdapterStatus::Error => MappingStatus::MappingError,
        };
        if status == MappingStatus::MappingError {
            warn!(product, source = %result.source, "adapter run failed");
        }
        let previous = self.states.insert(product.to_string(), status);
        if matches!(previous, None | Some(MappingStatus::NoMapping)) {
            warn!(product, "mapping concluded without a pending run");
        }
        self.mappings.insert(product.to_string(), result);
    }

    /// Set or clear the active selector expansion for a product
    pub fn set_selector_expansion(&self, product: &str, expansion: Option<SelectorExpansion>) {
        match expansion {
            Some(e) => {
                self.selectors.insert(product.to_string(), e);
            }
            None => {
                self.selectors.remove(product);
            }
        }
    }

    /// Non-blocking error from the most recent failed enrichment fetch
    pub fn last_fetch_error(&self, product: &str) -> Option<String> {
        self.entries
            .get(product)
            .and_then(|e| e.lock().unwrap().last_fetch_error.clone())
    }

    /// The latest enriched mapping, if one has been computed
    pub fn enriched_mapping(&self, product: &str) -> Option<EnrichedMapping> {
        self.entries
            .get(product)
            .and_then(|e| e.lock().unwrap().enriched.clone())
    }

    /// The stored mapping and its combined technique-id set, when computable
    fn combined_set(&self, product: &str) -> Option<(MappingResult, BTreeSet<String>)> {
        let stored = self.mappings.get(product)?.clone();
        let mut combined = normalize_technique_ids(&stored.detection_strategies);
        if let Some(selector) = self.selectors.get(product) {
            combined.extend(selector.technique_ids.iter().cloned());
        }
        Some((stored, combined))
    }

    fn entry(&self, product: &str) -> Arc<Mutex<EnrichedEntry>> {
        self.entries
            .entry(product.to_string())
            .or_default()
            .clone()
    }

    /// Recompute the enriched mapping for a product.
    ///
    /// Performs the combination and canonical fetch only when the product's
    /// state is `MappingMatched`. An empty combined set yields `None` and no
    /// fetch; an unchanged canonical key returns the cached result; a fetch
    /// superseded by a newer key is discarded on completion.
    pub async fn reconcile(&self, product: &str) -> ReconcileResult<Option<EnrichedMapping>> {
        if self.status(product) != MappingStatus::MappingMatched {
            return Ok(None);
        }

        // Status is Matched, so the stored mapping exists
        let Some((stored, combined)) = self.combined_set(product) else {
            return Ok(None);
        };

        let entry = self.entry(product);

        if combined.is_empty() {
            let mut state = entry.lock().unwrap();
            state.latest_key = None;
            state.enriched_key = None;
            state.enriched = None;
            return Ok(None);
        }

        let key = canonical_key(&combined);
        {
            let mut state = entry.lock().unwrap();
            if state.enriched_key.as_deref() == Some(key.as_str()) {
                if let Some(cached) = state.enriched.clone() {
                    debug!(product, key = %key, "canonical key unchanged, serving cached mapping");
                    return Ok(Some(cached));
                }
            }
            // This fetch's tag; any later key supersedes it
            state.latest_key = Some(key.clone());
        }

        let fetched = self.enrichment.fetch(&combined).await;

        let mut state = entry.lock().unwrap();
        if state.latest_key.as_deref() != Some(key.as_str()) {
            // Superseded while in flight; the newer key's result wins
            // regardless of arrival order.
            debug!(product, key = %key, "discarding stale enrichment fetch");
            return Ok(state.enriched.clone());
        }

        match fetched {
            Ok(enrichment) => {
                let mapping = EnrichedMapping {
                    source: stored.source.clone(),
                    confidence: stored.confidence,
                    technique_ids: combined.into_iter().collect(),
                    detection_strategies: enrichment.detection_strategies,
                    data_components: enrichment.data_components,
                    community_analytics: stored.analytics.clone(),
                    computed_at: chrono::Utc::now(),
                };
                state.enriched_key = Some(key);
                state.enriched = Some(mapping.clone());
                state.last_fetch_error = None;
                Ok(Some(mapping))
            }
            Err(err) => {
                // Previous mapping stays in place; failure is surfaced out
                // of band of the mapping status.
                warn!(product, error = %err, "enrichment fetch failed");
                state.last_fetch_error = Some(err.to_string());
                Ok(state.enriched.clone())
            }
        }
    }
}
