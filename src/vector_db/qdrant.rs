//! Qdrant vector store client.
//!
//! Points are keyed by the UUID derived from the chunk id; the original id
//! is preserved in the payload as `original_id` so deletes and display can
//! target it. Cosine distance.

use super::{point_uuid, Point, PointPayload, ScoredPoint, SearchFilter, SearchQuery, VectorStore};
use crate::config::VectorDbConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::vectors_config::Config;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter, PointId,
    PointStruct, PointsIdsList, SearchPointsBuilder, UpsertPointsBuilder, VectorParams,
    VectorsConfig,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;
use std::collections::HashMap;

pub struct QdrantStore {
    client: Qdrant,
    collection: String,
}

impl std::fmt::Debug for QdrantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QdrantStore")
            .field("collection", &self.collection)
            .finish()
    }
}

impl QdrantStore {
    pub fn new(cfg: &VectorDbConfig) -> Result<Self> {
        tracing::info!(endpoint = %cfg.endpoint, "connecting to qdrant");

        let client = Qdrant::from_url(&cfg.endpoint)
            .timeout(cfg.timeout())
            .build()
            .context("failed to create qdrant client")?;

        Ok(Self {
            client,
            collection: cfg.collection_name.clone(),
        })
    }

    async fn collection_exists(&self) -> Result<bool> {
        let collections = self
            .client
            .list_collections()
            .await
            .context("failed to list collections")?;

        Ok(collections
            .collections
            .iter()
            .any(|c| c.name == self.collection))
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, dimensions: usize) -> Result<()> {
        if self.collection_exists().await? {
            tracing::debug!(collection = %self.collection, "collection already exists");
            return Ok(());
        }

        tracing::info!(
            collection = %self.collection,
            dimensions,
            "creating collection"
        );

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection).vectors_config(VectorsConfig {
                    config: Some(Config::Params(VectorParams {
                        size: dimensions as u64,
                        distance: Distance::Cosine.into(),
                        ..Default::default()
                    })),
                }),
            )
            .await
            .context("failed to create collection")?;

        Ok(())
    }

    async fn upsert(&self, points: Vec<Point>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }

        let count = points.len();
        let mut qdrant_points = Vec::with_capacity(count);
        for p in points {
            let payload: Payload = json!({
                "original_id": p.id,
                "project_id": p.payload.project_id,
                "file_path": p.payload.file_path,
                "symbol": p.payload.symbol,
                "symbol_type": p.payload.symbol_type,
                "language": p.payload.language,
                "module": p.payload.module,
                "start_line": p.payload.start_line,
                "end_line": p.payload.end_line,
                "content": p.payload.content,
                "content_hash": p.payload.content_hash,
                "indexed_at": p.payload.indexed_at,
            })
            .try_into()
            .map_err(|e| anyhow!("payload conversion failed: {e}"))?;

            qdrant_points.push(PointStruct::new(
                point_uuid(&p.id).to_string(),
                p.vector,
                payload,
            ));
        }

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, qdrant_points))
            .await
            .context("failed to upsert points")?;

        tracing::debug!(count, "upserted points");
        Ok(())
    }

    async fn search(&self, query: SearchQuery) -> Result<Vec<ScoredPoint>> {
        let mut builder =
            SearchPointsBuilder::new(&self.collection, query.vector, query.top_k as u64)
                .with_payload(true);

        if query.score_threshold > 0.0 {
            builder = builder.score_threshold(query.score_threshold);
        }

        let conditions = filter_conditions(&query.filter);
        if !conditions.is_empty() {
            builder = builder.filter(Filter::must(conditions));
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .context("failed to search points")?;

        let results = response
            .result
            .into_iter()
            .map(|point| {
                let payload = read_payload(&point.payload);
                ScoredPoint {
                    id: get_str(&point.payload, "original_id"),
                    score: point.score,
                    payload,
                }
            })
            .collect();

        Ok(results)
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        let uuids: Vec<PointId> = ids
            .iter()
            .map(|id| PointId::from(point_uuid(id).to_string()))
            .collect();

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(PointsIdsList { ids: uuids }),
            )
            .await
            .context("failed to delete points")?;

        tracing::debug!(count = ids.len(), "deleted points");
        Ok(())
    }

    async fn delete_by_filter(&self, filter: SearchFilter) -> Result<()> {
        // An empty filter would wipe the whole collection.
        if filter.project_id.is_empty() {
            anyhow::bail!("delete_by_filter requires a project_id");
        }
        let conditions = filter_conditions(&filter);

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection).points(Filter::must(conditions)),
            )
            .await
            .context("failed to delete points by filter")?;

        tracing::debug!(project_id = %filter.project_id, "deleted points by filter");
        Ok(())
    }

    async fn health(&self) -> Result<()> {
        self.client
            .health_check()
            .await
            .context("qdrant health check failed")?;
        Ok(())
    }
}

fn filter_conditions(filter: &SearchFilter) -> Vec<Condition> {
    let mut conditions = Vec::new();

    if !filter.project_id.is_empty() {
        conditions.push(Condition::matches(
            "project_id",
            filter.project_id.clone(),
        ));
    }
    if let Some(module) = filter.module.as_ref().filter(|m| !m.is_empty()) {
        conditions.push(Condition::matches("module", module.clone()));
    }
    if let Some(language) = filter.language.as_ref().filter(|l| !l.is_empty()) {
        conditions.push(Condition::matches("language", language.clone()));
    }
    if let Some(symbol_type) = filter.symbol_type.as_ref().filter(|s| !s.is_empty()) {
        conditions.push(Condition::matches("symbol_type", symbol_type.clone()));
    }

    conditions
}

fn read_payload(payload: &HashMap<String, qdrant_client::qdrant::Value>) -> PointPayload {
    PointPayload {
        project_id: get_str(payload, "project_id"),
        file_path: get_str(payload, "file_path"),
        symbol: get_str(payload, "symbol"),
        symbol_type: get_str(payload, "symbol_type"),
        language: get_str(payload, "language"),
        module: get_str(payload, "module"),
        start_line: get_int(payload, "start_line"),
        end_line: get_int(payload, "end_line"),
        content: get_str(payload, "content"),
        content_hash: get_str(payload, "content_hash"),
        indexed_at: get_str(payload, "indexed_at"),
    }
}

fn get_str(payload: &HashMap<String, qdrant_client::qdrant::Value>, key: &str) -> String {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .unwrap_or_default()
}

fn get_int(payload: &HashMap<String, qdrant_client::qdrant::Value>, key: &str) -> usize {
    payload
        .get(key)
        .and_then(|v| v.as_integer())
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or_default()
}
