//! corpus-graph CLI: build, link, back up and inspect the corpus graph.
//!
//! Usage:
//!   corpus-graph build [--config FILE] [--sections CSV] [--pages CSV] [--db FILE]
//!   corpus-graph link | wipe | stats [--db FILE]
//!   corpus-graph export <FILE> | import <FILE> [--db FILE]

use clap::{Parser, Subcommand};
use corpus_graph::{
    label, logging, ChatExtractor, Config, GraphStore, Linker, MergeEngine, OpenStore,
    PageReader, SectionReader, SqliteStore,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "corpus-graph",
    version,
    about = "Build a knowledge graph from a sectioned text corpus"
)]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest sections and pages, extract entities and derive relationships
    Build {
        /// Sections CSV
        #[arg(long)]
        sections: Option<PathBuf>,
        /// Pages CSV
        #[arg(long)]
        pages: Option<PathBuf>,
        /// Keep the existing graph instead of wiping it first
        #[arg(long)]
        no_wipe: bool,
        /// Text units per extraction batch
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Derive structural relationships only
    Link,
    /// Write the whole graph to a JSON-lines file
    Export {
        file: PathBuf,
    },
    /// Load a file written by `export`
    Import {
        file: PathBuf,
    },
    /// Delete every node and relationship
    Wipe,
    /// Print node and relationship counts
    Stats,
}

fn load_config(path: Option<&Path>, db: Option<PathBuf>) -> Result<Config, String> {
    let mut config = match path {
        Some(path) => Config::load(path).map_err(|e| e.to_string())?,
        None => Config::default(),
    };
    config.load_env_file().map_err(|e| e.to_string())?;
    config.apply_env();
    if db.is_some() {
        config.database = db;
    }
    Ok(config)
}

fn open_store(config: &Config) -> Result<Arc<SqliteStore>, String> {
    let db_path = config.database_path();
    SqliteStore::open(&db_path)
        .map(Arc::new)
        .map_err(|e| format!("Failed to open database {}: {}", db_path.display(), e))
}

fn with_store(config: &Config, f: impl FnOnce(&dyn GraphStore) -> i32) -> i32 {
    match open_store(config) {
        Ok(store) => f(&*store),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_build(config: &Config) -> i32 {
    let store = match open_store(config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let extractor = match ChatExtractor::new(config.extraction.clone()) {
        Ok(x) => Arc::new(x),
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let engine = match MergeEngine::new(store, extractor, config.merge.clone()) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let sections = match SectionReader::open(&config.sections) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let pages = match PageReader::open(&config.pages) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: cannot start runtime: {}", e);
            return 1;
        }
    };
    match runtime.block_on(engine.run(sections, pages)) {
        Ok(summary) => {
            println!("{}", summary);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_link(store: &dyn GraphStore, config: &Config) -> i32 {
    match Linker::new(store, &config.merge).derive() {
        Ok(report) => {
            println!(
                "Created {} part-of, {} membership, {} next, {} first-section relationships",
                report.part_of, report.belongs_to, report.next, report.first_section
            );
            if report.unsequenced > 0 {
                println!("{} sections lack a page id or counter", report.unsequenced);
            }
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_export(store: &dyn GraphStore, file: &Path) -> i32 {
    match store.bulk_export(file) {
        Ok(stats) => {
            println!(
                "Exported {} nodes and {} relationships to {}",
                stats.nodes,
                stats.relationships,
                file.display()
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_import(store: &dyn GraphStore, file: &Path) -> i32 {
    match store.bulk_import(file) {
        Ok(stats) => {
            println!(
                "Imported {} nodes and {} relationships from {}",
                stats.nodes,
                stats.relationships,
                file.display()
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_wipe(store: &dyn GraphStore) -> i32 {
    match store.wipe_all() {
        Ok(()) => {
            println!("Graph wiped");
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_stats(store: &dyn GraphStore, config: &Config) -> i32 {
    let rels = &config.merge.relationships;
    let result = (|| -> Result<(), corpus_graph::StorageError> {
        println!("{:<16}  {:>8}", "NODES", "COUNT");
        println!("{}", "-".repeat(26));
        for l in [label::SECTION, label::PAGE, label::CATEGORY] {
            println!("{:<16}  {:>8}", l, store.count_nodes(Some(l))?);
        }
        println!("{:<16}  {:>8}", "total", store.count_nodes(None)?);
        println!();
        println!("{:<16}  {:>8}", "RELATIONSHIPS", "COUNT");
        println!("{}", "-".repeat(26));
        for t in [&rels.part_of, &rels.belongs_to, &rels.next, &rels.first_section, &rels.mentions] {
            println!("{:<16}  {:>8}", t, store.count_relationships(Some(t.as_str()))?);
        }
        println!("{:<16}  {:>8}", "total", store.count_relationships(None)?);
        Ok(())
    })();
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_deref(), cli.db) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };
    if let Commands::Build {
        sections,
        pages,
        no_wipe,
        batch_size,
    } = &cli.command
    {
        if let Some(path) = sections {
            config.sections = path.clone();
        }
        if let Some(path) = pages {
            config.pages = path.clone();
        }
        if *no_wipe {
            config.merge.wipe_before_run = false;
        }
        if let Some(n) = batch_size {
            config.merge.batch_size = *n;
        }
    }
    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = logging::init(&config.log_level) {
        eprintln!("Warning: {}", e);
    }

    let code = match &cli.command {
        Commands::Build { .. } => cmd_build(&config),
        Commands::Link => with_store(&config, |store| cmd_link(store, &config)),
        Commands::Export { file } => with_store(&config, |store| cmd_export(store, file)),
        Commands::Import { file } => with_store(&config, |store| cmd_import(store, file)),
        Commands::Wipe => with_store(&config, cmd_wipe),
        Commands::Stats => with_store(&config, |store| cmd_stats(store, &config)),
    };
    std::process::exit(code);
}
