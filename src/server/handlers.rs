//! HTTP handlers for the retrieval service.

use super::AppState;
use crate::vector_db::{SearchFilter, SearchQuery};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use uuid::Uuid;

const DEFAULT_TOP_K: usize = 5;
const MAX_TOP_K: usize = 20;
const EMBED_DEADLINE: Duration = Duration::from_secs(30);
const HEALTH_DEADLINE: Duration = Duration::from_secs(5);

/// Closed set of error codes on the HTTP surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidRequest,
    MissingRequiredField,
    EmbeddingFailed,
    SearchFailed,
    ServiceDegraded,
}

/// Error body shape: `{error, code, request_id?}`.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip)]
    status: StatusCode,
}

impl ApiError {
    fn new(status: StatusCode, code: ErrorCode, error: impl Into<String>, request_id: &Uuid) -> Self {
        Self {
            error: error.into(),
            code,
            request_id: Some(request_id.to_string()),
            status,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Request body for `POST /retrieve`.
#[derive(Debug, Deserialize)]
pub struct RetrieveRequest {
    #[serde(default)]
    pub project_id: String,

    #[serde(default)]
    pub query: String,

    /// Number of results; clamped to [1, 20], default 5
    #[serde(default)]
    pub top_k: Option<i64>,

    #[serde(default)]
    pub filters: Option<RetrieveFilters>,
}

/// Optional equality filters intersected with the project filter.
#[derive(Debug, Default, Deserialize)]
pub struct RetrieveFilters {
    #[serde(default)]
    pub module: Option<String>,

    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub symbol_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RetrieveResponse {
    pub results: Vec<RetrieveResult>,
    pub query_time_ms: u64,
}

/// A single retrieved chunk.
#[derive(Debug, Serialize)]
pub struct RetrieveResult {
    pub content: String,
    pub source: String,
    pub symbol: String,
    pub symbol_type: String,
    pub project_id: String,
    pub module: String,
    pub language: String,
    pub start_line: usize,
    pub end_line: usize,
    pub score: f32,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
}

/// Clamp the requested result count to [1, 20]; non-positive or missing
/// values fall back to the default of 5.
pub(crate) fn clamp_top_k(requested: Option<i64>) -> usize {
    match requested {
        Some(k) if k > MAX_TOP_K as i64 => MAX_TOP_K,
        Some(k) if k >= 1 => k as usize,
        _ => DEFAULT_TOP_K,
    }
}

pub(crate) async fn retrieve(
    State(state): State<AppState>,
    payload: Result<Json<RetrieveRequest>, JsonRejection>,
) -> Response {
    let request_id = Uuid::new_v4();
    let started = Instant::now();

    let Json(req) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            return ApiError::new(
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidRequest,
                format!("invalid request body: {rejection}"),
                &request_id,
            )
            .into_response()
        }
    };

    if req.project_id.is_empty() {
        return ApiError::new(
            StatusCode::BAD_REQUEST,
            ErrorCode::MissingRequiredField,
            "project_id is required",
            &request_id,
        )
        .into_response();
    }
    if req.query.is_empty() {
        return ApiError::new(
            StatusCode::BAD_REQUEST,
            ErrorCode::MissingRequiredField,
            "query is required",
            &request_id,
        )
        .into_response();
    }

    let top_k = clamp_top_k(req.top_k);

    let (embedder, store) = {
        let providers = state.providers.read().await;
        (providers.embedder.clone(), providers.store.clone())
    };

    let query_vector = match tokio::time::timeout(EMBED_DEADLINE, embedder.embed(&req.query)).await
    {
        Ok(Ok(vector)) => vector,
        Ok(Err(e)) => {
            tracing::error!(request_id = %request_id, error = %format!("{e:#}"), "embedding failed");
            return ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::EmbeddingFailed,
                "failed to process query",
                &request_id,
            )
            .into_response();
        }
        Err(_) => {
            tracing::error!(request_id = %request_id, "query embedding timed out");
            return ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::EmbeddingFailed,
                "query embedding timed out",
                &request_id,
            )
            .into_response();
        }
    };

    let filters = req.filters.unwrap_or_default();
    let filter = SearchFilter {
        project_id: req.project_id,
        module: filters.module.filter(|m| !m.is_empty()),
        language: filters.language.filter(|l| !l.is_empty()),
        symbol_type: filters.symbol_type.filter(|s| !s.is_empty()),
    };

    let search_results = match store
        .search(SearchQuery {
            vector: query_vector,
            top_k,
            filter,
            score_threshold: 0.0,
        })
        .await
    {
        Ok(results) => results,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %format!("{e:#}"), "search failed");
            return ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::SearchFailed,
                "search failed",
                &request_id,
            )
            .into_response();
        }
    };

    let results = search_results
        .into_iter()
        .map(|hit| RetrieveResult {
            content: hit.payload.content,
            source: hit.payload.file_path,
            symbol: hit.payload.symbol,
            symbol_type: hit.payload.symbol_type,
            project_id: hit.payload.project_id,
            module: hit.payload.module,
            language: hit.payload.language,
            start_line: hit.payload.start_line,
            end_line: hit.payload.end_line,
            score: hit.score,
        })
        .collect();

    Json(RetrieveResponse {
        results,
        query_time_ms: started.elapsed().as_millis() as u64,
    })
    .into_response()
}

pub(crate) async fn health(State(state): State<AppState>) -> Response {
    let (embedder, store) = {
        let providers = state.providers.read().await;
        (providers.embedder.clone(), providers.store.clone())
    };

    let mut components = HashMap::new();
    let mut healthy = true;

    match tokio::time::timeout(HEALTH_DEADLINE, embedder.health()).await {
        Ok(Ok(())) => {
            components.insert("embedder".to_string(), "ok".to_string());
        }
        Ok(Err(e)) => {
            components.insert("embedder".to_string(), format!("error: {e:#}"));
            healthy = false;
        }
        Err(_) => {
            components.insert("embedder".to_string(), "error: probe timed out".to_string());
            healthy = false;
        }
    }

    match tokio::time::timeout(HEALTH_DEADLINE, store.health()).await {
        Ok(Ok(())) => {
            components.insert("vectordb".to_string(), "ok".to_string());
        }
        Ok(Err(e)) => {
            components.insert("vectordb".to_string(), format!("error: {e:#}"));
            healthy = false;
        }
        Err(_) => {
            components.insert("vectordb".to_string(), "error: probe timed out".to_string());
            healthy = false;
        }
    }

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response)).into_response()
}

pub(crate) async fn root() -> Response {
    Json(serde_json::json!({
        "name": "coderag-retrieval",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ["POST /retrieve", "GET /health"],
    }))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_k_clamping() {
        assert_eq!(clamp_top_k(None), 5);
        assert_eq!(clamp_top_k(Some(0)), 5);
        assert_eq!(clamp_top_k(Some(-3)), 5);
        assert_eq!(clamp_top_k(Some(1)), 1);
        assert_eq!(clamp_top_k(Some(7)), 7);
        assert_eq!(clamp_top_k(Some(20)), 20);
        assert_eq!(clamp_top_k(Some(21)), 20);
        assert_eq!(clamp_top_k(Some(1000)), 20);
    }

    #[test]
    fn error_codes_serialize_screaming_snake() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::InvalidRequest).unwrap(),
            "\"INVALID_REQUEST\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::MissingRequiredField).unwrap(),
            "\"MISSING_REQUIRED_FIELD\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::EmbeddingFailed).unwrap(),
            "\"EMBEDDING_FAILED\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::SearchFailed).unwrap(),
            "\"SEARCH_FAILED\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::ServiceDegraded).unwrap(),
            "\"SERVICE_DEGRADED\""
        );
    }

    #[test]
    fn api_error_body_shape() {
        let request_id = Uuid::new_v4();
        let err = ApiError::new(
            StatusCode::BAD_REQUEST,
            ErrorCode::MissingRequiredField,
            "project_id is required",
            &request_id,
        );
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["error"], "project_id is required");
        assert_eq!(json["code"], "MISSING_REQUIRED_FIELD");
        assert_eq!(json["request_id"], request_id.to_string());
    }

    #[test]
    fn retrieve_request_defaults() {
        let req: RetrieveRequest = serde_json::from_str(r#"{"query": "q"}"#).unwrap();
        assert!(req.project_id.is_empty());
        assert_eq!(req.query, "q");
        assert!(req.top_k.is_none());
        assert!(req.filters.is_none());
    }
}
