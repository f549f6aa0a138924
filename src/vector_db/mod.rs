//! Pluggable vector store clients.
//!
//! The store is an opaque upsert/search/delete service keyed by UUID.
//! Chunk ids are free-form strings; the UUID key is derived from them by a
//! pure function so no external index is needed to translate back.

mod qdrant;

pub use qdrant::QdrantStore;

use crate::config::{VectorDbConfig, VectorDbProviderKind};
use crate::error::ProviderError;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

/// A vector plus its chunk metadata, ready for upsert.
#[derive(Debug, Clone)]
pub struct Point {
    /// The chunk id; converted to a UUID key at the store boundary
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// Metadata stored alongside each vector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointPayload {
    pub project_id: String,
    pub file_path: String,
    pub symbol: String,
    pub symbol_type: String,
    pub language: String,
    pub module: String,
    pub start_line: usize,
    pub end_line: usize,
    pub content: String,
    pub content_hash: String,
    pub indexed_at: String,
}

/// Conjunction of equality predicates over payload fields. `project_id`
/// is always present; the rest apply when set.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub project_id: String,
    pub module: Option<String>,
    pub language: Option<String>,
    pub symbol_type: Option<String>,
}

/// Parameters for a similarity search.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub filter: SearchFilter,
    /// Results scoring below this are suppressed; 0 disables the cut
    pub score_threshold: f32,
}

/// A single search hit, ordered by descending cosine score.
#[derive(Debug, Clone)]
pub struct ScoredPoint {
    /// Original chunk id, recovered from the payload
    pub id: String,
    pub score: f32,
    pub payload: PointPayload,
}

/// Contract shared by all vector store clients.
#[async_trait]
pub trait VectorStore: Send + Sync + std::fmt::Debug {
    /// Create the collection if missing; succeeds when it already exists.
    async fn ensure_collection(&self, dimensions: usize) -> Result<()>;

    /// Insert or replace points by primary key.
    async fn upsert(&self, points: Vec<Point>) -> Result<()>;

    /// Similarity search returning at most `top_k` results by descending
    /// score.
    async fn search(&self, query: SearchQuery) -> Result<Vec<ScoredPoint>>;

    /// Remove points by their chunk ids.
    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Remove every point matching the filter (at minimum one project).
    async fn delete_by_filter(&self, filter: SearchFilter) -> Result<()>;

    /// Availability probe.
    async fn health(&self) -> Result<()>;
}

/// Derive the vector store key for a chunk id: the first 16 bytes of
/// `sha256(chunk_id)` formatted as a UUID. Identical on every host.
pub fn point_uuid(chunk_id: &str) -> Uuid {
    let digest = Sha256::digest(chunk_id.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

/// Create a vector store client from configuration.
pub fn create_store(cfg: &VectorDbConfig) -> Result<Arc<dyn VectorStore>> {
    match cfg.provider {
        VectorDbProviderKind::Qdrant => Ok(Arc::new(QdrantStore::new(cfg)?)),
        VectorDbProviderKind::Milvus => Err(ProviderError::NotImplemented {
            kind: "vector store",
            provider: "milvus".to_string(),
        }
        .into()),
        VectorDbProviderKind::Weaviate => Err(ProviderError::NotImplemented {
            kind: "vector store",
            provider: "weaviate".to_string(),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_uuid_is_deterministic() {
        let a = point_uuid("proj:src/main.rs:main:abcd1234");
        let b = point_uuid("proj:src/main.rs:main:abcd1234");
        assert_eq!(a, b);
    }

    #[test]
    fn point_uuid_differs_by_id() {
        assert_ne!(point_uuid("one"), point_uuid("two"));
    }

    #[test]
    fn point_uuid_has_canonical_form() {
        let s = point_uuid("some:chunk:id:00aabbcc").to_string();
        // 8-4-4-4-12 hex groups.
        let groups: Vec<usize> = s.split('-').map(|g| g.len()).collect();
        assert_eq!(groups, vec![8, 4, 4, 4, 12]);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit() || c == '-'));
    }

    #[test]
    fn point_uuid_matches_sha256_prefix() {
        let digest = Sha256::digest(b"chunk");
        let uuid = point_uuid("chunk");
        assert_eq!(&uuid.as_bytes()[..], &digest[..16]);
    }

    #[test]
    fn unimplemented_providers_error() {
        let mut cfg = VectorDbConfig::default();

        cfg.provider = VectorDbProviderKind::Milvus;
        let err = create_store(&cfg).unwrap_err();
        assert!(err.to_string().contains("milvus"));

        cfg.provider = VectorDbProviderKind::Weaviate;
        assert!(create_store(&cfg).is_err());
    }
}
