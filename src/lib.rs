//! # coderag — semantic code indexing and retrieval
//!
//! Indexes source repositories into a vector store so language-model
//! tools can retrieve relevant code fragments for a natural-language
//! query. Two cooperating programs share this library and one storage
//! backend:
//!
//! - the **batch indexer** (`coderag-indexer`) walks a project tree,
//!   splits files into semantically anchored chunks, embeds them, and
//!   upserts them into the vector store, tracking per-file and per-chunk
//!   content hashes for incremental re-indexing;
//! - the **retrieval service** (`coderag-retrieval`) exposes a small HTTP
//!   surface, embeds query text, and performs filtered similarity search
//!   against the same store.
//!
//! ## Pipeline
//!
//! Discovery → deterministic chunking → chunk-level change detection →
//! batched embedding → vector upsert/delete. The pipeline is
//! deterministic (same input, same chunk ids), incremental (unchanged
//! content is never re-embedded), parallel (a bounded worker pool), and
//! crash-tolerant (the cache file is written atomically and survives
//! partial runs). Embedding providers and vector stores are pluggable
//! behind trait objects selected by configuration tags.
//!
//! ## Modules
//!
//! - [`chunker`]: strategy-per-extension splitters with deterministic ids
//! - [`cache`]: per-project change-detection cache
//! - [`embedding`]: Ollama / OpenAI / Hugging Face embedding clients
//! - [`vector_db`]: vector store clients (Qdrant) and UUID key derivation
//! - [`indexer`]: orchestration of the indexing pipeline
//! - [`server`]: the retrieval HTTP service with SIGHUP hot reload
//! - [`config`]: YAML configuration, per-project configs, hot-reload holder
//! - [`error`]: typed error taxonomy
//! - [`logging`]: tracing setup with a reloadable level filter

/// Per-project change-detection cache
pub mod cache;

/// Chunking strategies for code and documentation
pub mod chunker;

/// Global and per-project configuration
pub mod config;

/// Pluggable embedding providers
pub mod embedding;

/// Error types
pub mod error;

/// Indexing pipeline orchestration
pub mod indexer;

/// Logging setup
pub mod logging;

/// Retrieval HTTP service
pub mod server;

/// Pluggable vector store clients
pub mod vector_db;

pub use cache::{CacheEntry, CacheStats, IndexCache};
pub use chunker::{Chunk, Chunker, ChunkerFactory, ChunkingConfig, FileMetadata};
pub use config::{Config, ConfigManager};
pub use embedding::EmbeddingProvider;
pub use error::{CacheError, ConfigError, IndexingError, ProviderError};
pub use indexer::{IndexResult, Indexer, OversizedChunk};
pub use server::RetrievalServer;
pub use vector_db::{point_uuid, Point, PointPayload, ScoredPoint, SearchFilter, SearchQuery, VectorStore};
