//! attack-mapper: knowledge-graph synchronization and mapping reconciliation
//!
//! Maps security-product telemetry capabilities onto a threat-intelligence
//! taxonomy and reconciles that mapping from several asynchronous,
//! partially-overlapping sources.
//!
//! # Core Concepts
//!
//! - **Nodes / Edges**: generic graph primitives holding canonical reference
//!   data and locally derived data under one model, partitioned by dataset
//! - **Deterministic identity**: name-based UUIDs let independent records
//!   agree on an entity's id without a central allocator
//! - **Reconciliation**: a stored community mapping and a selector-expanded
//!   coverage overlay combine into one cache-stable technique-id set

pub mod graph;
pub mod ident;
pub mod reconcile;
pub mod selector;
pub mod storage;
pub mod sync;

pub use graph::{attr, dataset, kind, relationship, AttrValue, Attributes, Edge, Node, NodeId};
pub use reconcile::{
    AdapterStatus, EnrichedMapping, EnrichmentSource, MappingResult, MappingStatus,
    ReconcileEngine, ReconcileError, StoreEnrichmentSource,
};
pub use selector::{Selector, SelectorExpansion, SelectorExpansionService, SelectorType};
pub use storage::{
    import_corpus, Corpus, GraphStore, NodeFilter, OpenStore, SqliteStore, StorageError,
    StorageResult,
};
pub use sync::{ProductRecord, SyncError, SyncReport, SyncResult, SyncService};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
