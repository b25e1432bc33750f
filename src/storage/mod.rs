//! Graph persistence: trait definitions and the SQLite backend

pub mod import;
mod sqlite;
mod traits;

pub use import::{import_corpus, Corpus, ImportSummary};
pub use sqlite::SqliteStore;
pub use traits::{GraphStore, NodeFilter, OpenStore, StorageError, StorageResult};
