//! HTTP retrieval service.
//!
//! Embeds query text and performs filtered similarity search against the
//! vector store. Providers live behind a reader/writer lock so a SIGHUP
//! config reload can swap in fresh instances without a restart.

pub mod handlers;

pub use handlers::{
    ApiError, ErrorCode, HealthResponse, RetrieveRequest, RetrieveResponse, RetrieveResult,
};

use crate::config::ConfigManager;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::vector_db::{create_store, VectorStore};
use anyhow::{Context, Result};
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{watch, RwLock};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// The provider pair the handlers search with.
pub struct Providers {
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub store: Arc<dyn VectorStore>,
}

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigManager>,
    pub providers: Arc<RwLock<Providers>>,
}

/// Build the service router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/retrieve", post(handlers::retrieve))
        .route("/health", get(handlers::health))
        .route("/", get(handlers::root))
        .with_state(state)
}

/// The retrieval HTTP server.
pub struct RetrievalServer {
    state: AppState,
}

impl RetrievalServer {
    pub fn new(
        config: Arc<ConfigManager>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            state: AppState {
                config,
                providers: Arc::new(RwLock::new(Providers { embedder, store })),
            },
        }
    }

    /// Serve until SIGINT/SIGTERM, with graceful shutdown bounded by the
    /// configured timeout. SIGHUP reloads configuration in place.
    pub async fn serve(self) -> Result<()> {
        let cfg = self.state.config.get().await;

        let router = build_router(self.state.clone())
            .layer(TraceLayer::new_for_http())
            .layer(TimeoutLayer::new(cfg.server.write_timeout()));

        let addr = SocketAddr::from(([0, 0, 0, 0], cfg.server.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;

        tracing::info!(
            port = cfg.server.port,
            version = env!("CARGO_PKG_VERSION"),
            "starting server"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        spawn_shutdown_signal_task(shutdown_tx);
        spawn_reload_task(self.state.clone());

        let mut graceful_rx = shutdown_rx.clone();
        let server = async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    wait_for_shutdown(&mut graceful_rx).await;
                    tracing::info!("shutting down server");
                })
                .await
        };

        let shutdown_timeout = cfg.server.shutdown_timeout();
        let mut deadline_rx = shutdown_rx;
        let deadline = async move {
            wait_for_shutdown(&mut deadline_rx).await;
            tokio::time::sleep(shutdown_timeout).await;
        };

        tokio::select! {
            result = server => result.context("server error")?,
            () = deadline => {
                tracing::warn!("graceful shutdown deadline exceeded, aborting in-flight requests");
            }
        }

        tracing::info!("server stopped");
        Ok(())
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn spawn_shutdown_signal_task(tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        tracing::info!("received shutdown signal");
        let _ = tx.send(true);
    });
}

fn spawn_reload_task(state: AppState) {
    tokio::spawn(async move {
        let mut sighup = match signal(SignalKind::hangup()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGHUP handler");
                return;
            }
        };

        while sighup.recv().await.is_some() {
            tracing::info!("received SIGHUP, reloading config");
            match reload(&state).await {
                Ok(()) => tracing::info!("config reloaded"),
                Err(e) => tracing::error!(error = %format!("{e:#}"), "config reload failed"),
            }
        }
    });
}

/// Re-parse the configuration and swap provider instances. Port changes
/// and provider-kind switches require a restart and are left untouched.
pub async fn reload(state: &AppState) -> Result<()> {
    let old = state.config.get().await;
    let new = state.config.reload().await?;

    if let Err(e) = crate::logging::set_level(&new.logging.level) {
        tracing::warn!(error = %e, "failed to update log level");
    }

    if new.server.port != old.server.port {
        tracing::warn!(
            old_port = old.server.port,
            new_port = new.server.port,
            "port change requires restart; keeping current listener"
        );
    }

    if new.embedding.provider != old.embedding.provider
        || new.vectordb.provider != old.vectordb.provider
    {
        tracing::warn!("provider kind change requires restart; keeping existing providers");
        return Ok(());
    }

    let embedder = create_provider(&new.embedding)?;
    let store = create_store(&new.vectordb)?;

    let superseded = {
        let mut providers = state.providers.write().await;
        std::mem::replace(&mut *providers, Providers { embedder, store })
    };
    // Old instances close on drop, outside the lock.
    drop(superseded);

    tracing::info!(
        embedding_provider = %new.embedding.provider,
        vectordb_provider = %new.vectordb.provider,
        "providers swapped"
    );
    Ok(())
}
