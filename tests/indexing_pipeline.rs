//! End-to-end pipeline tests: `index_project` against a temp source tree
//! with in-memory mock providers.

mod common;

use coderag::chunker::ChunkingConfig;
use coderag::config::project::{ProjectChunking, ProjectConfig};
use coderag::config::Config;
use coderag::indexer::Indexer;
use common::{MockEmbedder, MockStore};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

struct Harness {
    _sources: TempDir,
    _cache: TempDir,
    source_root: PathBuf,
    project: ProjectConfig,
    config: Arc<Config>,
    embedder: Arc<MockEmbedder>,
    store: Arc<MockStore>,
    cache_dir: PathBuf,
}

impl Harness {
    fn new() -> Self {
        Self::with_chunking(ChunkingConfig {
            min_tokens: 1,
            ideal_tokens: 500,
            max_tokens: 800,
            merge_small_chunks: false,
        })
    }

    fn with_chunking(chunking: ChunkingConfig) -> Self {
        let sources = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let source_root = sources.path().join("proj");
        fs::create_dir_all(&source_root).unwrap();

        let mut config = Config::default();
        config.projects.source_base_path = sources.path().to_path_buf();
        config.cache.dir = cache.path().to_path_buf();
        config.chunking = chunking;

        let project = ProjectConfig {
            project_id: "proj".to_string(),
            display_name: "Test Project".to_string(),
            source_path: PathBuf::from("proj"),
            include_extensions: vec![".md".to_string(), ".go".to_string(), ".js".to_string()],
            exclude_paths: vec![".git/".to_string(), "vendor/".to_string()],
            chunking: ProjectChunking::default(),
            metadata: HashMap::new(),
        };

        let cache_dir = cache.path().to_path_buf();
        Self {
            _sources: sources,
            _cache: cache,
            source_root,
            project,
            config: Arc::new(config),
            embedder: Arc::new(MockEmbedder::default()),
            store: Arc::new(MockStore::default()),
            cache_dir,
        }
    }

    fn indexer(&self) -> Indexer {
        Indexer::new(
            self.config.clone(),
            self.embedder.clone(),
            self.store.clone(),
        )
    }

    fn write(&self, rel: &str, content: &str) {
        let path = self.source_root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn remove(&self, rel: &str) {
        fs::remove_file(self.source_root.join(rel)).unwrap();
    }
}

fn go_func(name: &str, body_lines: usize) -> String {
    let body: String = (0..body_lines)
        .map(|i| format!("\tfmt.Println(\"{name} line {i}\")\n"))
        .collect();
    format!("func {name}() {{\n{body}}}\n")
}

#[tokio::test]
async fn first_run_indexes_everything() {
    let h = Harness::new();
    h.write("a.md", "# Alpha\nsome alpha content\n");
    h.write("b.md", "# Beta\nsome beta content\n");

    let cancel = CancellationToken::new();
    let result = h.indexer().index_project(&h.project, false, &cancel).await.unwrap();

    assert_eq!(result.files_scanned, 2);
    assert_eq!(result.files_indexed, 2);
    assert_eq!(result.files_skipped, 0);
    assert!(result.chunks_created >= 2);
    assert!(result.errors.is_empty());
    assert!(h.embedder.embedded() >= 2);
    assert_eq!(h.store.live_paths(), vec!["a.md", "b.md"]);
}

#[tokio::test]
async fn unchanged_rerun_is_a_no_op() {
    let h = Harness::new();
    h.write("a.md", "# Alpha\nalpha body\n");
    h.write("b.md", "# Beta\nbeta body\n");

    let cancel = CancellationToken::new();
    let indexer = h.indexer();
    indexer.index_project(&h.project, false, &cancel).await.unwrap();

    let embedded_before = h.embedder.embedded();
    let upserts_before = h.store.upserts();

    let second = indexer.index_project(&h.project, false, &cancel).await.unwrap();

    assert_eq!(second.files_indexed, 0);
    assert_eq!(second.files_skipped, 2);
    assert_eq!(second.chunks_created, 0);
    // No embeddings and no vector-store writes on the second run.
    assert_eq!(h.embedder.embedded(), embedded_before);
    assert_eq!(h.store.upserts(), upserts_before);
}

#[tokio::test]
async fn deleted_file_is_reaped_from_store_and_cache() {
    let h = Harness::new();
    h.write("a.md", "# Alpha\nalpha body\n");
    h.write("b.md", "# Beta\nbeta body\n");

    let cancel = CancellationToken::new();
    let indexer = h.indexer();
    indexer.index_project(&h.project, false, &cancel).await.unwrap();
    assert_eq!(h.store.live_paths(), vec!["a.md", "b.md"]);

    h.remove("a.md");
    let second = indexer.index_project(&h.project, false, &cancel).await.unwrap();

    assert_eq!(second.files_deleted, 1);
    assert!(second.chunks_deleted >= 1);
    assert_eq!(h.store.live_paths(), vec!["b.md"]);

    // The cache entry went with it: a third run skips only b.md.
    let third = indexer.index_project(&h.project, false, &cancel).await.unwrap();
    assert_eq!(third.files_skipped, 1);
    assert_eq!(third.files_deleted, 0);
}

#[tokio::test]
async fn editing_one_function_reembeds_only_its_chunk() {
    let h = Harness::new();
    let original = format!(
        "package main\n\n{}\n{}",
        go_func("Alpha", 30),
        go_func("Beta", 30)
    );
    h.write("main.go", &original);

    let cancel = CancellationToken::new();
    let indexer = h.indexer();
    let first = indexer.index_project(&h.project, false, &cancel).await.unwrap();
    assert_eq!(first.chunks_created, 2);
    assert_eq!(h.embedder.embedded(), 2);
    assert_eq!(h.store.point_count(), 2);

    // Change Beta only; Alpha stays byte-identical.
    let edited = format!(
        "package main\n\n{}\n{}",
        go_func("Alpha", 30),
        go_func("Beta", 31)
    );
    h.write("main.go", &edited);

    let second = indexer.index_project(&h.project, false, &cancel).await.unwrap();
    assert_eq!(second.files_indexed, 1);
    assert_eq!(second.chunks_created, 2);
    // Only Beta's chunk was embedded again, and Beta's old id was dropped.
    assert_eq!(h.embedder.embedded(), 3);
    assert_eq!(second.chunks_deleted, 1);
    assert_eq!(h.store.point_count(), 2);
}

#[tokio::test]
async fn full_reindex_rebuilds_the_same_live_set() {
    let h = Harness::new();
    h.write("a.md", "# Alpha\nalpha body\n");
    h.write("code/main.go", "package main\n\nfunc Run() {\n\tprintln(\"run\")\n}\n");

    let cancel = CancellationToken::new();
    let indexer = h.indexer();
    indexer.index_project(&h.project, false, &cancel).await.unwrap();
    let incremental_uuids = h.store.live_uuids();
    assert!(!incremental_uuids.is_empty());

    let full = indexer.index_project(&h.project, true, &cancel).await.unwrap();
    assert_eq!(full.files_skipped, 0);
    assert_eq!(h.store.live_uuids(), incremental_uuids);
}

#[tokio::test]
async fn small_chunk_merge_spans_tiny_prefix_functions() {
    let h = Harness::with_chunking(ChunkingConfig {
        min_tokens: 60,
        ideal_tokens: 500,
        max_tokens: 4000,
        merge_small_chunks: true,
    });

    let source = format!(
        "{}\n{}\n{}",
        "function f1() { return 1; }",
        "function f2() { return 2; }\n",
        go_js_big_function()
    );
    h.write("app.js", &source);

    let cancel = CancellationToken::new();
    let result = h.indexer().index_project(&h.project, false, &cancel).await.unwrap();

    assert_eq!(result.chunks_created, 1);
    let points = h.store.points.lock().unwrap();
    let point = points.values().next().unwrap();
    assert!(point.payload.symbol.contains("f3"));
    assert_eq!(point.payload.start_line, 1);
    assert!(point.payload.end_line > 3);
}

fn go_js_big_function() -> String {
    let body: String = (0..50)
        .map(|i| format!("  console.log(\"big line number {i}\");\n"))
        .collect();
    format!("function f3() {{\n{body}}}\n")
}

#[tokio::test]
async fn oversized_chunks_are_reported_but_still_embedded() {
    let h = Harness::new();
    let huge_body = "very long documentation line with padding words\n".repeat(200);
    h.write("big.md", &format!("# Huge\n{huge_body}"));

    let cancel = CancellationToken::new();
    let result = h.indexer().index_project(&h.project, false, &cancel).await.unwrap();

    assert!(!result.oversized_chunks.is_empty());
    assert_eq!(result.oversized_chunks[0].max_allowed, 2048);
    assert!(result.oversized_chunks[0].token_count > 2048);
    // Still embedded and upserted.
    assert!(h.store.point_count() >= 1);

    let report = h.cache_dir.join("reports").join("proj-oversized.json");
    assert!(report.exists());
    let body: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(report).unwrap()).unwrap();
    assert_eq!(body["project_id"], "proj");
    assert_eq!(body["total_count"], result.oversized_chunks.len());
}

#[tokio::test]
async fn embed_failure_leaves_work_for_the_next_run() {
    let h = Harness::new();
    h.write("a.md", "# Alpha\nalpha body\n");

    let cancel = CancellationToken::new();
    let indexer = h.indexer();

    h.embedder.set_fail(true);
    let failed = indexer.index_project(&h.project, false, &cancel).await.unwrap();
    assert!(!failed.errors.is_empty());
    assert_eq!(h.store.point_count(), 0);

    // The file was not marked done, so a healthy run picks it up again.
    h.embedder.set_fail(false);
    let recovered = indexer.index_project(&h.project, false, &cancel).await.unwrap();
    assert_eq!(recovered.files_indexed, 1);
    assert_eq!(recovered.files_skipped, 0);
    assert!(h.store.point_count() >= 1);
}

#[tokio::test]
async fn excluded_directories_are_not_indexed() {
    let h = Harness::new();
    h.write("src.md", "# Src\nbody\n");
    h.write("vendor/dep.md", "# Dep\nbody\n");

    let cancel = CancellationToken::new();
    let result = h.indexer().index_project(&h.project, false, &cancel).await.unwrap();

    assert_eq!(result.files_scanned, 1);
    assert_eq!(h.store.live_paths(), vec!["src.md"]);
}

#[tokio::test]
async fn unreadable_root_surfaces_a_precise_error() {
    let h = Harness::new();
    let mut project = h.project.clone();
    project.source_path = PathBuf::from("does-not-exist");

    let cancel = CancellationToken::new();
    let err = h
        .indexer()
        .index_project(&project, false, &cancel)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("source directory not found"));
}

#[tokio::test]
async fn cache_file_is_written_atomically() {
    let h = Harness::new();
    h.write("a.md", "# Alpha\nbody\n");

    let cancel = CancellationToken::new();
    h.indexer().index_project(&h.project, false, &cancel).await.unwrap();

    assert!(h.cache_dir.join("proj.json").exists());
    assert!(no_temp_files(&h.cache_dir));
}

fn no_temp_files(dir: &Path) -> bool {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .all(|e| e.path().extension().map(|ext| ext != "tmp").unwrap_or(true))
}
