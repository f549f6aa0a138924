//! In-memory mock providers for driving the pipeline and the HTTP
//! handlers without external services.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use coderag::embedding::{EmbeddingProvider, ModelInfo};
use coderag::vector_db::{
    point_uuid, Point, ScoredPoint, SearchFilter, SearchQuery, VectorStore,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub const MOCK_DIMENSIONS: usize = 4;

/// Deterministic embedder that counts how many texts it has embedded.
#[derive(Default)]
pub struct MockEmbedder {
    pub batch_calls: AtomicUsize,
    pub texts_embedded: AtomicUsize,
    pub fail: AtomicBool,
}

impl MockEmbedder {
    pub fn embedded(&self) -> usize {
        self.texts_embedded.load(Ordering::SeqCst)
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    fn vector_for(text: &str) -> Vec<f32> {
        // Stable pseudo-embedding derived from the text bytes.
        let mut acc: [u32; MOCK_DIMENSIONS] = [1; MOCK_DIMENSIONS];
        for (i, b) in text.bytes().enumerate() {
            acc[i % MOCK_DIMENSIONS] = acc[i % MOCK_DIMENSIONS]
                .wrapping_mul(31)
                .wrapping_add(b as u32);
        }
        acc.iter().map(|v| (*v % 1000) as f32 / 1000.0).collect()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("mock embedder failure");
        }
        self.texts_embedded.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector_for(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("mock embedder failure");
        }
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector_for(t)).collect())
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "mock",
            model: "mock-embed".to_string(),
            dimensions: MOCK_DIMENSIONS,
        }
    }

    async fn health(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("mock embedder unhealthy");
        }
        Ok(())
    }
}

/// In-memory vector store recording every write and query.
#[derive(Default, Debug)]
pub struct MockStore {
    pub points: Mutex<HashMap<String, Point>>,
    pub upsert_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub queries: Mutex<Vec<SearchQuery>>,
    pub seeded_results: Mutex<Vec<ScoredPoint>>,
    pub fail_search: AtomicBool,
    pub fail_health: AtomicBool,
}

impl MockStore {
    pub fn live_paths(&self) -> Vec<String> {
        let points = self.points.lock().unwrap();
        let mut paths: Vec<String> = points
            .values()
            .map(|p| p.payload.file_path.clone())
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    pub fn live_uuids(&self) -> Vec<String> {
        let points = self.points.lock().unwrap();
        let mut uuids: Vec<String> = points.keys().cloned().collect();
        uuids.sort();
        uuids
    }

    pub fn point_count(&self) -> usize {
        self.points.lock().unwrap().len()
    }

    pub fn upserts(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }

    pub fn seed(&self, results: Vec<ScoredPoint>) {
        *self.seeded_results.lock().unwrap() = results;
    }

    pub fn last_query_top_k(&self) -> Option<usize> {
        self.queries.lock().unwrap().last().map(|q| q.top_k)
    }

    fn matches(filter: &SearchFilter, hit: &ScoredPoint) -> bool {
        if !filter.project_id.is_empty() && hit.payload.project_id != filter.project_id {
            return false;
        }
        if let Some(module) = &filter.module {
            if &hit.payload.module != module {
                return false;
            }
        }
        if let Some(language) = &filter.language {
            if &hit.payload.language != language {
                return false;
            }
        }
        if let Some(symbol_type) = &filter.symbol_type {
            if &hit.payload.symbol_type != symbol_type {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl VectorStore for MockStore {
    async fn ensure_collection(&self, _dimensions: usize) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, new_points: Vec<Point>) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);
        let mut points = self.points.lock().unwrap();
        for p in new_points {
            points.insert(point_uuid(&p.id).to_string(), p);
        }
        Ok(())
    }

    async fn search(&self, query: SearchQuery) -> Result<Vec<ScoredPoint>> {
        if self.fail_search.load(Ordering::SeqCst) {
            bail!("mock search failure");
        }

        let filter = query.filter.clone();
        let top_k = query.top_k;
        let threshold = query.score_threshold;
        self.queries.lock().unwrap().push(query);

        let mut hits: Vec<ScoredPoint> = self
            .seeded_results
            .lock()
            .unwrap()
            .iter()
            .filter(|hit| Self::matches(&filter, hit))
            .filter(|hit| threshold <= 0.0 || hit.score >= threshold)
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let mut points = self.points.lock().unwrap();
        for id in ids {
            points.remove(&point_uuid(id).to_string());
        }
        Ok(())
    }

    async fn delete_by_filter(&self, filter: SearchFilter) -> Result<()> {
        let mut points = self.points.lock().unwrap();
        points.retain(|_, p| p.payload.project_id != filter.project_id);
        Ok(())
    }

    async fn health(&self) -> Result<()> {
        if self.fail_health.load(Ordering::SeqCst) {
            bail!("mock store unhealthy");
        }
        Ok(())
    }
}
