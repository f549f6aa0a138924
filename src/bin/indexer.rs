//! Batch indexer CLI.
//!
//! ```text
//! coderag-indexer --project myproject          # incremental index
//! coderag-indexer --project myproject --full   # clear and rebuild
//! coderag-indexer --all                        # index all projects
//! coderag-indexer --all --full                 # full rebuild of all
//! ```
//!
//! Environment: `CONFIG_PATH` (default `configs/config.yaml`),
//! `SOURCES_PATH` (host-side bind mount), `DEBUG`.

use anyhow::Result;
use clap::Parser;
use coderag::config::{project, Config};
use coderag::embedding::create_provider;
use coderag::indexer::{IndexResult, Indexer};
use coderag::vector_db::create_store;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Batch indexing tool for configured projects
#[derive(Parser)]
#[command(name = "coderag-indexer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Index project sources into the vector store", long_about = None)]
struct Cli {
    /// Project ID to index
    #[arg(long)]
    project: Option<String>,

    /// Perform a full reindex (clear existing vectors and cache)
    #[arg(long)]
    full: bool,

    /// Index all configured projects
    #[arg(long)]
    all: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.project.is_none() && !cli.all {
        eprintln!("error: --project or --all is required");
        eprintln!("usage:");
        eprintln!("  coderag-indexer --project <id>         # incremental index");
        eprintln!("  coderag-indexer --project <id> --full  # full reindex");
        eprintln!("  coderag-indexer --all                  # index all projects");
        return ExitCode::FAILURE;
    }
    if cli.project.is_some() && cli.all {
        eprintln!("error: --project and --all are mutually exclusive");
        return ExitCode::FAILURE;
    }

    let config = match Config::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            eprintln!("failed to load config: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    coderag::logging::init(&config.logging);

    tracing::info!(
        embedding_provider = %config.embedding.provider,
        vectordb_provider = %config.vectordb.provider,
        "configuration loaded"
    );

    match run(cli, config).await {
        Ok(clean) => {
            if clean {
                tracing::info!("indexing completed successfully");
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "indexing failed");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the run finished without any recorded error.
async fn run(cli: Cli, config: Arc<Config>) -> Result<bool> {
    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received interrupt, shutting down");
            signal_cancel.cancel();
        }
    });

    let embedder = create_provider(&config.embedding)?;
    if let Err(e) = embedder.health().await {
        tracing::error!(error = %format!("{e:#}"), "embedder health check failed");
        tracing::info!(
            model = %config.embedding.model,
            endpoint = %config.embedding.endpoint,
            "hint: ensure the embedding model is available"
        );
        anyhow::bail!("embedder unavailable");
    }
    tracing::info!(
        provider = %config.embedding.provider,
        model = %config.embedding.model,
        "embedder connected"
    );

    let store = create_store(&config.vectordb)?;
    if let Err(e) = store.health().await {
        tracing::error!(error = %format!("{e:#}"), "vectordb health check failed");
        anyhow::bail!("vector store unavailable");
    }
    tracing::info!(
        provider = %config.vectordb.provider,
        collection = %config.vectordb.collection_name,
        "vectordb connected"
    );

    let indexer = Indexer::new(config.clone(), embedder, store);
    indexer.ensure_collection().await?;

    if cli.all {
        let results = indexer.index_all_projects(cli.full, &cancel).await?;

        println!("\n=== Indexing Summary ===");
        let mut total_files = 0;
        let mut total_chunks = 0;
        let mut clean = true;

        for result in &results {
            println!("\nProject: {}", result.project_id);
            println!("  Files indexed:  {}", result.files_indexed);
            println!("  Chunks created: {}", result.chunks_created);
            println!("  Duration:       {:.2?}", result.duration);

            if !result.errors.is_empty() {
                clean = false;
                println!("  Errors: {}", result.errors.len());
                for error in &result.errors {
                    println!("    - {error}");
                }
            }

            total_files += result.files_indexed;
            total_chunks += result.chunks_created;
        }

        println!(
            "\nTotal: {} files, {} chunks across {} projects",
            total_files,
            total_chunks,
            results.len()
        );
        Ok(clean)
    } else {
        let project_id = cli.project.expect("validated above");
        let project = project::get_project(&config.projects.config_dir, &project_id)?;

        let result = indexer.index_project(&project, cli.full, &cancel).await?;
        print_summary(&result, &config);
        Ok(result.errors.is_empty())
    }
}

fn print_summary(result: &IndexResult, config: &Config) {
    println!("\n=== Indexing Complete ===");
    println!("Project:        {}", result.project_id);
    println!("Files scanned:  {}", result.files_scanned);
    println!("Files indexed:  {}", result.files_indexed);
    println!("Files skipped:  {}", result.files_skipped);
    println!("Files deleted:  {}", result.files_deleted);
    println!("Chunks created: {}", result.chunks_created);
    println!("Chunks deleted: {}", result.chunks_deleted);
    println!("Duration:       {:.2?}", result.duration);

    if !result.oversized_chunks.is_empty() {
        println!(
            "Oversized chunks: {} (see {}/reports/{}-oversized.json)",
            result.oversized_chunks.len(),
            config.cache.dir.display(),
            result.project_id
        );
    }

    if !result.errors.is_empty() {
        println!("Errors: {}", result.errors.len());
        for error in &result.errors {
            println!("  - {error}");
        }
    }
}
