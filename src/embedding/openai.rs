//! OpenAI embedding provider.
//!
//! Batch-native: one request embeds many inputs. Response entries arrive
//! tagged with an index and are reordered to input order.

use super::{http_client, EmbeddingProvider, ModelInfo};
use crate::config::EmbeddingConfig;
use crate::error::{ConfigError, ProviderError};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1";

pub struct OpenAiEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    data: Vec<EmbeddingData>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

impl OpenAiEmbedder {
    pub fn new(cfg: &EmbeddingConfig) -> Result<Self> {
        let api_key = match &cfg.api_key_env {
            None => {
                return Err(ConfigError::InvalidValue {
                    key: "embedding.api_key_env".to_string(),
                    reason: "required for the openai provider".to_string(),
                }
                .into())
            }
            Some(env) => cfg.api_key().ok_or_else(|| ProviderError::MissingApiKey {
                env: env.clone(),
            })?,
        };

        let endpoint = if cfg.endpoint.is_empty() {
            DEFAULT_ENDPOINT.to_string()
        } else {
            cfg.endpoint.trim_end_matches('/').to_string()
        };

        Ok(Self {
            client: http_client(cfg)?,
            endpoint,
            model: cfg.model.clone(),
            api_key,
            dimensions: cfg.dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results.pop().context("no embedding returned")
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embeddings", self.endpoint);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .context("embedding request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("embedding request failed with status {status}: {body}");
        }

        let result: EmbedResponse = response
            .json()
            .await
            .context("failed to decode embedding response")?;

        if let Some(err) = result.error {
            bail!("openai error: {}", err.message);
        }

        reorder_by_index(result.data, texts.len())
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "openai",
            model: self.model.clone(),
            dimensions: self.dimensions,
        }
    }

    async fn health(&self) -> Result<()> {
        self.embed("ping")
            .await
            .context("openai health check failed")?;
        Ok(())
    }
}

/// Restore input order from index-tagged response entries, verifying that
/// every position is filled.
fn reorder_by_index(data: Vec<EmbeddingData>, expected: usize) -> Result<Vec<Vec<f32>>> {
    if data.is_empty() {
        bail!("no embeddings returned");
    }

    let mut vectors: Vec<Vec<f32>> = vec![Vec::new(); expected];
    for entry in data {
        if entry.index >= expected {
            bail!(
                "embedding index {} out of range for batch of {expected}",
                entry.index
            );
        }
        vectors[entry.index] = entry.embedding;
    }

    if let Some(missing) = vectors.iter().position(|v| v.is_empty()) {
        bail!("missing embedding for input {missing}");
    }

    Ok(vectors)
}
