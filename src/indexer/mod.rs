//! Indexing pipeline: discovery, change detection, parallel chunking,
//! batched embedding, and vector store upserts.
//!
//! An incremental run re-processes only files whose bytes changed, and
//! within a changed file re-embeds only chunks whose content hash moved.

mod progress;
mod walker;

pub use progress::{Progress, ProgressSnapshot};
pub use walker::{discover_files, DiscoveredFile};

use crate::cache::{CacheEntry, IndexCache};
use crate::chunker::{detect_language, extract_module, Chunk, ChunkerFactory, FileMetadata};
use crate::config::project::{load_all_projects, ProjectConfig};
use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::IndexingError;
use crate::vector_db::{Point, PointPayload, SearchFilter, VectorStore};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Token ceiling of the smallest supported embedding model window. Chunks
/// estimated above it are reported but still embedded; the provider
/// truncates internally.
const OVERSIZE_TOKEN_LIMIT: usize = 2048;

const WORKER_COUNT: usize = 4;

/// A chunk that exceeds the embedding window, reported per project.
#[derive(Debug, Clone, Serialize)]
pub struct OversizedChunk {
    pub file_path: String,
    pub symbol: String,
    pub token_count: usize,
    pub max_allowed: usize,
    pub content_size_bytes: usize,
}

/// Counters and errors from one indexing run.
#[derive(Debug, Default)]
pub struct IndexResult {
    pub project_id: String,
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_deleted: usize,
    pub chunks_created: usize,
    pub chunks_deleted: usize,
    pub oversized_chunks: Vec<OversizedChunk>,
    pub duration: Duration,
    pub errors: Vec<String>,
}

struct FileTask {
    abs_path: std::path::PathBuf,
    rel_path: String,
    content_hash: String,
}

struct FileOutcome {
    rel_path: String,
    content_hash: String,
    mod_time: DateTime<Utc>,
    chunks: Vec<Chunk>,
    oversized: Vec<OversizedChunk>,
    error: Option<String>,
}

/// Orchestrates project indexing against an embedding provider and a
/// vector store.
pub struct Indexer {
    config: Arc<Config>,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    worker_count: usize,
    oversize_limit: usize,
}

impl Indexer {
    pub fn new(
        config: Arc<Config>,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            config,
            embedder,
            store,
            worker_count: WORKER_COUNT,
            oversize_limit: OVERSIZE_TOKEN_LIMIT,
        }
    }

    pub fn with_worker_count(mut self, workers: usize) -> Self {
        self.worker_count = workers.max(1);
        self
    }

    pub fn with_oversize_limit(mut self, limit: usize) -> Self {
        self.oversize_limit = limit;
        self
    }

    /// Create the vector collection for the configured dimensions.
    pub async fn ensure_collection(&self) -> Result<()> {
        self.store
            .ensure_collection(self.config.embedding.dimensions)
            .await
    }

    /// Index every configured project. Per-project failures are recorded
    /// in that project's result; the run continues.
    pub async fn index_all_projects(
        &self,
        full_index: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<IndexResult>> {
        let projects = load_all_projects(&self.config.projects.config_dir)?;
        let mut ids: Vec<&String> = projects.keys().collect();
        ids.sort();

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let project = &projects[id];
            match self.index_project(project, full_index, cancel).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!(project = %id, error = %e, "project indexing failed");
                    results.push(IndexResult {
                        project_id: id.clone(),
                        errors: vec![format!("{e:#}")],
                        ..IndexResult::default()
                    });
                }
            }
            if cancel.is_cancelled() {
                break;
            }
        }

        Ok(results)
    }

    /// Index a single project, incrementally unless `full_index` is set.
    pub async fn index_project(
        &self,
        project: &ProjectConfig,
        full_index: bool,
        cancel: &CancellationToken,
    ) -> Result<IndexResult> {
        let started = Instant::now();
        let mut result = IndexResult {
            project_id: project.project_id.clone(),
            ..IndexResult::default()
        };

        tracing::info!(
            project = %project.project_id,
            full_index,
            "starting indexing"
        );

        let mut cache = IndexCache::open(&self.config.cache.dir, &project.project_id)
            .context("failed to initialize cache")?;

        if full_index {
            cache.clear();
            self.store
                .delete_by_filter(SearchFilter {
                    project_id: project.project_id.clone(),
                    ..SearchFilter::default()
                })
                .await
                .context("failed to clear vectors")?;
            tracing::info!(project = %project.project_id, "cleared existing index");
        }

        let factory = Arc::new(ChunkerFactory::for_project(self.config.chunking, project));

        // Discovery.
        let source_root = project.full_source_path(&self.config.projects.source_base_path);
        let files = discover_files(&source_root, project)?;
        result.files_scanned = files.len();
        tracing::info!(count = files.len(), "discovered files");

        // Tombstones: cached paths that no longer exist on disk.
        let discovered: HashSet<&str> = files.iter().map(|f| f.rel_path.as_str()).collect();
        let mut staged_deletes: Vec<String> = Vec::new();
        for cached_path in cache.files() {
            if !discovered.contains(cached_path.as_str()) {
                let ids = cache.chunk_ids(&cached_path);
                result.chunks_deleted += ids.len();
                staged_deletes.extend(ids);
                cache.delete(&cached_path);
                result.files_deleted += 1;
            }
        }
        if result.files_deleted > 0 {
            tracing::info!(count = result.files_deleted, "reaped deleted files");
        }

        // Change partition.
        let mut tasks: Vec<FileTask> = Vec::new();
        for file in files {
            if cancel.is_cancelled() {
                break;
            }
            let hash = match hash_file(&file.abs_path) {
                Ok(hash) => hash,
                Err(e) => {
                    result.errors.push(format!("hash {}: {e:#}", file.rel_path));
                    continue;
                }
            };

            if !full_index && !cache.has_changed(&file.rel_path, &hash) {
                result.files_skipped += 1;
                continue;
            }

            tasks.push(FileTask {
                abs_path: file.abs_path,
                rel_path: file.rel_path,
                content_hash: hash,
            });
        }

        tracing::info!(
            total = result.files_scanned,
            changed = tasks.len(),
            skipped = result.files_skipped,
            "files to process"
        );

        // Parallel chunking.
        let outcomes = self
            .process_files(tasks, project, factory, cancel)
            .await;

        // Per-file chunk diff against the cached chunk hashes. Cache
        // entries are staged and applied only once their chunks are safely
        // in the store, so a failed run is re-attempted next time.
        let mut to_embed: Vec<Chunk> = Vec::new();
        let mut pending_entries: Vec<(String, CacheEntry)> = Vec::new();

        for outcome in outcomes {
            if let Some(error) = outcome.error {
                result.errors.push(format!("{}: {error}", outcome.rel_path));
                continue;
            }

            result.files_indexed += 1;
            result.chunks_created += outcome.chunks.len();
            result.oversized_chunks.extend(outcome.oversized);

            let prev = cache.chunk_hashes(&outcome.rel_path);
            let curr: HashMap<String, String> = outcome
                .chunks
                .iter()
                .map(|c| (c.id.clone(), c.content_hash.clone()))
                .collect();

            for id in prev.keys() {
                if !curr.contains_key(id) {
                    staged_deletes.push(id.clone());
                    result.chunks_deleted += 1;
                }
            }

            for chunk in &outcome.chunks {
                match prev.get(&chunk.id) {
                    Some(hash) if *hash == chunk.content_hash => {}
                    _ => to_embed.push(chunk.clone()),
                }
            }

            pending_entries.push((
                outcome.rel_path.clone(),
                CacheEntry {
                    content_hash: outcome.content_hash,
                    mod_time: outcome.mod_time,
                    indexed_at: Utc::now(),
                    chunk_ids: outcome.chunks.iter().map(|c| c.id.clone()).collect(),
                    chunk_hashes: curr,
                },
            ));
        }

        if cancel.is_cancelled() {
            result.errors.push(IndexingError::Cancelled.to_string());
            self.finish(&mut cache, &mut result, started, project);
            return Ok(result);
        }

        // Batched embedding of changed chunks only. A failed batch aborts
        // the write phase; the staged cache entries are dropped so the next
        // run re-derives the same work.
        let vectors = match self.embed_chunks(&to_embed, cancel).await {
            Ok(vectors) => vectors,
            Err(e) => {
                result.errors.push(format!("{e:#}"));
                self.finish(&mut cache, &mut result, started, project);
                return Ok(result);
            }
        };

        // Deletes go first so a changed id is removed and re-inserted
        // under the same UUID within one run.
        if !staged_deletes.is_empty() {
            if let Err(e) = self.store.delete(&staged_deletes).await {
                result
                    .errors
                    .push(format!("delete {} chunks: {e:#}", staged_deletes.len()));
            }
        }

        let mut write_ok = true;
        if !to_embed.is_empty() {
            let points = build_points(&to_embed, vectors);
            if let Err(e) = self.store.upsert(points).await {
                result.errors.push(format!("upsert chunks: {e:#}"));
                write_ok = false;
            }
        }

        if write_ok {
            for (path, entry) in pending_entries {
                cache.set(path, entry);
            }
        }

        self.finish(&mut cache, &mut result, started, project);

        tracing::info!(
            project = %project.project_id,
            files_indexed = result.files_indexed,
            chunks_created = result.chunks_created,
            duration_ms = result.duration.as_millis() as u64,
            "indexing complete"
        );

        Ok(result)
    }

    /// Persist the cache and the oversize report, and stamp the duration.
    fn finish(
        &self,
        cache: &mut IndexCache,
        result: &mut IndexResult,
        started: Instant,
        project: &ProjectConfig,
    ) {
        if let Err(e) = cache.save(&project.project_id) {
            result.errors.push(format!("save cache: {e:#}"));
        }

        if !result.oversized_chunks.is_empty() {
            self.save_oversized_report(&project.project_id, &result.oversized_chunks);
        }

        result.duration = started.elapsed();
    }

    async fn process_files(
        &self,
        tasks: Vec<FileTask>,
        project: &ProjectConfig,
        factory: Arc<ChunkerFactory>,
        cancel: &CancellationToken,
    ) -> Vec<FileOutcome> {
        if tasks.is_empty() {
            return Vec::new();
        }

        let total = tasks.len();
        let progress = Progress::new(total);
        let reporter = progress::spawn_reporter(progress.clone());

        let tasks = Arc::new(tasks);
        let next = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::channel::<FileOutcome>(total);

        let mut workers = Vec::with_capacity(self.worker_count);
        for _ in 0..self.worker_count {
            let tasks = tasks.clone();
            let next = next.clone();
            let tx = tx.clone();
            let cancel = cancel.clone();
            let factory = factory.clone();
            let progress = progress.clone();
            let project_id = project.project_id.clone();
            let oversize_limit = self.oversize_limit;

            workers.push(tokio::spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        return;
                    }
                    let i = next.fetch_add(1, Ordering::SeqCst);
                    let Some(task) = tasks.get(i) else {
                        return;
                    };

                    let file_started = Instant::now();
                    let outcome =
                        process_file(task, &project_id, &factory, oversize_limit).await;
                    progress.record(file_started.elapsed());

                    if tx.send(outcome).await.is_err() {
                        return;
                    }
                }
            }));
        }
        drop(tx);

        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }

        for worker in workers {
            let _ = worker.await;
        }
        reporter.abort();

        // Collection order depends on worker scheduling; restore source
        // order for deterministic downstream batching.
        outcomes.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
        outcomes
    }

    async fn embed_chunks(
        &self,
        chunks: &[Chunk],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.config.embedding.batch_size.max(1);
        let total_batches = chunks.len().div_ceil(batch_size);
        let mut vectors = Vec::with_capacity(chunks.len());
        let embed_started = Instant::now();

        for (batch_num, batch) in chunks.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                return Err(IndexingError::Cancelled.into());
            }

            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let start = batch_num * batch_size;

            let batch_started = Instant::now();
            let batch_vectors = self.embedder.embed_batch(&texts).await.map_err(|e| {
                IndexingError::EmbedBatchFailed {
                    start,
                    end: start + texts.len(),
                    reason: format!("{e:#}"),
                }
            })?;
            vectors.extend(batch_vectors);

            tracing::info!(
                batch = batch_num + 1,
                total_batches,
                chunks = texts.len(),
                took_ms = batch_started.elapsed().as_millis() as u64,
                "embedded batch"
            );
        }

        tracing::info!(
            chunks = chunks.len(),
            took_ms = embed_started.elapsed().as_millis() as u64,
            "embedding complete"
        );

        Ok(vectors)
    }

    fn save_oversized_report(&self, project_id: &str, chunks: &[OversizedChunk]) {
        #[derive(Serialize)]
        struct Report<'a> {
            project_id: &'a str,
            generated_at: String,
            total_count: usize,
            max_tokens_allowed: usize,
            chunks: &'a [OversizedChunk],
        }

        let report_dir = self.config.cache.dir.join("reports");
        if let Err(e) = std::fs::create_dir_all(&report_dir) {
            tracing::error!(error = %e, "failed to create reports directory");
            return;
        }

        let report = Report {
            project_id,
            generated_at: Utc::now().to_rfc3339(),
            total_count: chunks.len(),
            max_tokens_allowed: self.oversize_limit,
            chunks,
        };

        let path = report_dir.join(format!("{project_id}-oversized.json"));
        let data = match serde_json::to_vec_pretty(&report) {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize oversized report");
                return;
            }
        };

        if let Err(e) = std::fs::write(&path, data) {
            tracing::error!(error = %e, "failed to write oversized report");
            return;
        }

        tracing::warn!(
            count = chunks.len(),
            report = %path.display(),
            "oversized chunks detected"
        );
    }
}

async fn process_file(
    task: &FileTask,
    project_id: &str,
    factory: &Arc<ChunkerFactory>,
    oversize_limit: usize,
) -> FileOutcome {
    let mut outcome = FileOutcome {
        rel_path: task.rel_path.clone(),
        content_hash: task.content_hash.clone(),
        mod_time: Utc::now(),
        chunks: Vec::new(),
        oversized: Vec::new(),
        error: None,
    };

    let bytes = match tokio::fs::read(&task.abs_path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            outcome.error = Some(format!("read file: {e}"));
            return outcome;
        }
    };

    if let Ok(meta) = tokio::fs::metadata(&task.abs_path).await {
        if let Ok(modified) = meta.modified() {
            outcome.mod_time = DateTime::<Utc>::from(modified);
        }
    }

    let metadata = FileMetadata {
        file_path: task.rel_path.clone(),
        language: detect_language(&task.rel_path),
        module: extract_module(&task.rel_path),
        project_id: project_id.to_string(),
    };

    let factory = factory.clone();
    let rel_path = task.rel_path.clone();
    let chunked = tokio::task::spawn_blocking(move || {
        factory.chunker_for(&rel_path).chunk(&bytes, &metadata)
    })
    .await;

    match chunked {
        Ok(Ok(chunks)) => {
            for chunk in &chunks {
                if chunk.token_count > oversize_limit {
                    outcome.oversized.push(OversizedChunk {
                        file_path: task.rel_path.clone(),
                        symbol: chunk.symbol.clone(),
                        token_count: chunk.token_count,
                        max_allowed: oversize_limit,
                        content_size_bytes: chunk.content.len(),
                    });
                }
            }
            outcome.chunks = chunks;
        }
        Ok(Err(e)) => outcome.error = Some(format!("chunk file: {e:#}")),
        Err(e) => outcome.error = Some(format!("chunking task failed: {e}")),
    }

    outcome
}

fn build_points(chunks: &[Chunk], vectors: Vec<Vec<f32>>) -> Vec<Point> {
    let indexed_at = Utc::now().to_rfc3339();

    chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, vector)| Point {
            id: chunk.id.clone(),
            vector,
            payload: PointPayload {
                project_id: chunk.project_id.clone(),
                file_path: chunk.file_path.clone(),
                symbol: chunk.symbol.clone(),
                symbol_type: chunk.symbol_type.clone(),
                language: chunk.language.clone(),
                module: chunk.module.clone(),
                start_line: chunk.start_line,
                end_line: chunk.end_line,
                content: chunk.content.clone(),
                content_hash: chunk.content_hash.clone(),
                indexed_at: indexed_at.clone(),
            },
        })
        .collect()
}

/// SHA-256 of a file's bytes as lowercase hex.
pub fn hash_file(path: &std::path::Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::hash_content;

    #[test]
    fn hash_file_matches_content_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        std::fs::write(&path, "hello world").unwrap();

        assert_eq!(hash_file(&path).unwrap(), hash_content("hello world"));
    }

    #[test]
    fn build_points_pairs_positionally() {
        let chunk = Chunk {
            id: "p:f:s:12345678".to_string(),
            content: "body".to_string(),
            symbol: "s".to_string(),
            symbol_type: "function".to_string(),
            start_line: 1,
            end_line: 3,
            token_count: 1,
            content_hash: "abc".to_string(),
            file_path: "f".to_string(),
            language: "rust".to_string(),
            module: "m".to_string(),
            project_id: "p".to_string(),
        };
        let points = build_points(
            &[chunk.clone(), chunk],
            vec![vec![1.0, 2.0], vec![3.0, 4.0]],
        );

        assert_eq!(points.len(), 2);
        assert_eq!(points[0].vector, vec![1.0, 2.0]);
        assert_eq!(points[1].vector, vec![3.0, 4.0]);
        assert_eq!(points[0].payload.symbol, "s");
        assert_eq!(points[0].payload.start_line, 1);
    }
}
