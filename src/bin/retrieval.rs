//! Retrieval service: HTTP API for semantic code search.
//!
//! Embeds queries and searches the vector store for relevant code chunks.
//!
//! Endpoints: `POST /retrieve`, `GET /health`, `GET /`.
//!
//! Environment: `CONFIG_PATH` (default `configs/config.yaml`), `DEBUG`,
//! `LOG_FORMAT` (`text` | `json`). Send SIGHUP to reload configuration
//! without a restart; SIGINT/SIGTERM shut down gracefully.

use anyhow::Result;
use coderag::config::ConfigManager;
use coderag::embedding::create_provider;
use coderag::server::RetrievalServer;
use coderag::vector_db::create_store;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

const STARTUP_PROBE_ATTEMPTS: u32 = 30;
const STARTUP_PROBE_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> ExitCode {
    let manager = match ConfigManager::from_env() {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            eprintln!("failed to load config: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let config = manager.get().await;
    coderag::logging::init(&config.logging);

    tracing::info!(
        port = config.server.port,
        embedding_provider = %config.embedding.provider,
        vectordb_provider = %config.vectordb.provider,
        "starting retrieval service"
    );

    match run(manager).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "server error");
            ExitCode::FAILURE
        }
    }
}

async fn run(manager: Arc<ConfigManager>) -> Result<()> {
    let config = manager.get().await;

    let embedder = create_provider(&config.embedding)?;
    tracing::info!(endpoint = %config.embedding.endpoint, "waiting for embedder");
    wait_healthy("embedder", || embedder.health()).await?;
    tracing::info!(
        provider = %config.embedding.provider,
        model = %config.embedding.model,
        "embedder connected"
    );

    let store = create_store(&config.vectordb)?;
    tracing::info!(endpoint = %config.vectordb.endpoint, "waiting for vectordb");
    wait_healthy("vectordb", || store.health()).await?;
    tracing::info!(
        provider = %config.vectordb.provider,
        collection = %config.vectordb.collection_name,
        "vectordb connected"
    );

    if let Err(e) = store.ensure_collection(config.embedding.dimensions).await {
        tracing::warn!(error = %format!("{e:#}"), "failed to ensure collection");
    }

    RetrievalServer::new(manager, embedder, store).serve().await
}

/// Retry a health probe during startup while the backing services come up.
async fn wait_healthy<F, Fut>(component: &str, probe: F) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let mut last_error = None;
    for attempt in 1..=STARTUP_PROBE_ATTEMPTS {
        match probe().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::debug!(component, attempt, error = %format!("{e:#}"), "health probe failed");
                last_error = Some(e);
            }
        }
        if attempt < STARTUP_PROBE_ATTEMPTS {
            tokio::time::sleep(STARTUP_PROBE_INTERVAL).await;
        }
    }

    Err(last_error
        .unwrap_or_else(|| anyhow::anyhow!("health probe failed"))
        .context(format!(
            "{component} health check failed after {STARTUP_PROBE_ATTEMPTS} attempts"
        )))
}
