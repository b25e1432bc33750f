//! attack-mapper CLI: graph inspection and sync driver.
//!
//! Usage:
//!   attack-mapper import <corpus.json> --dataset mitre-attack --corpus-version 18.0
//!   attack-mapper sync <record.json> [--db path]
//!   attack-mapper expand <platform> [--db path]
//!   attack-mapper show <node-id> [--db path]

use attack_mapper::{
    import_corpus, Corpus, GraphStore, NodeId, OpenStore, ProductRecord, Selector,
    SelectorExpansionService, SqliteStore, SyncService,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "attack-mapper",
    version,
    about = "Telemetry-coverage knowledge graph and mapping reconciliation"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Canonical dataset name to resolve against
    #[arg(long, global = true, default_value = "mitre-attack")]
    dataset: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Import an extracted canonical corpus into the graph
    Import {
        /// Path to the corpus JSON file
        corpus: PathBuf,
        /// Dataset version tag
        #[arg(long, default_value = "18.0")]
        corpus_version: String,
    },
    /// Sync a product record (node + edge snapshot) from JSON
    Sync {
        /// Path to a product record JSON file
        record: PathBuf,
    },
    /// Expand a platform selector into its technique-id set
    Expand {
        /// Platform name (e.g. "Windows")
        platform: String,
    },
    /// Show a node and its outgoing edges
    Show {
        /// Node id
        id: String,
    },
}

/// Default database path (~/.local/share/attack-mapper/graph.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    let dir = data_dir.join("attack-mapper");
    std::fs::create_dir_all(&dir).ok();
    dir.join("graph.db")
}

fn open_store(db: Option<PathBuf>) -> Result<Arc<SqliteStore>, String> {
    let db_path = db.unwrap_or_else(default_db_path);
    SqliteStore::open(&db_path)
        .map(Arc::new)
        .map_err(|e| format!("Failed to open database: {}", e))
}

fn cmd_import(store: &SqliteStore, canonical: &str, path: &PathBuf, version: &str) -> i32 {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: cannot read '{}': {}", path.display(), e);
            return 1;
        }
    };
    let corpus: Corpus = match serde_json::from_str(&text) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: invalid corpus JSON: {}", e);
            return 1;
        }
    };
    match import_corpus(store, canonical, version, &corpus) {
        Ok(summary) => {
            println!(
                "Imported {} nodes and {} edges into '{}' ({})",
                summary.nodes, summary.edges, canonical, version
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

async fn cmd_sync(store: Arc<SqliteStore>, canonical: &str, path: &PathBuf) -> i32 {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: cannot read '{}': {}", path.display(), e);
            return 1;
        }
    };
    let record: ProductRecord = match serde_json::from_str(&text) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: invalid product record JSON: {}", e);
            return 1;
        }
    };

    let service = SyncService::new(store, canonical);
    let id = match service.upsert_node(&record).await {
        Ok(id) => id,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    match service.sync_edges(&record, &record.data_component_ids).await {
        Ok(report) => {
            println!("Synced {} as {}", record.product_id, id);
            println!("  edges written: {}", report.edges_written);
            for miss in &report.unresolved {
                println!("  unresolved:    {}", miss);
            }
            if report.is_fully_resolved() {
                0
            } else {
                2
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_expand(store: Arc<SqliteStore>, canonical: &str, platform: &str) -> i32 {
    let service = SelectorExpansionService::new(store, canonical);
    match service.techniques_for_selector(&Selector::platform(platform)) {
        Ok(expansion) => {
            println!("{} technique(s) for platform '{}'", expansion.count, platform);
            for id in &expansion.technique_ids {
                println!("  {}", id);
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_show(store: &SqliteStore, id: &str) -> i32 {
    let node_id = NodeId::from(id);
    let node = match store.load_node(&node_id) {
        Ok(Some(node)) => node,
        Ok(None) => {
            eprintln!("Error: node '{}' not found", id);
            return 1;
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    println!("{} [{}] {}", node.id, node.node_type, node.name);
    println!("  dataset: {} ({})", node.dataset, node.dataset_version);
    if let Some(local_id) = &node.local_id {
        println!("  local_id: {}", local_id);
    }

    match store.edges_from(&node_id, &node.dataset) {
        Ok(edges) => {
            for edge in edges {
                println!("  --{}--> {}", edge.relationship, edge.target_id);
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("attack_mapper=info")),
        )
        .init();

    let cli = Cli::parse();
    let store = match open_store(cli.db) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Import {
            corpus,
            corpus_version,
        } => cmd_import(&store, &cli.dataset, &corpus, &corpus_version),
        Commands::Sync { record } => cmd_sync(store, &cli.dataset, &record).await,
        Commands::Expand { platform } => cmd_expand(store, &cli.dataset, &platform),
        Commands::Show { id } => cmd_show(&store, &id),
    };
    std::process::exit(code);
}
