//! Ollama embedding provider.
//!
//! Ollama's embeddings API takes a single prompt per request, so batches
//! are fulfilled sequentially behind the batch-oriented contract.

use super::{http_client, EmbeddingProvider, ModelInfo};
use crate::config::EmbeddingConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub struct OllamaEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Deserialize)]
struct EmbedResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TaggedModel>,
}

#[derive(Deserialize)]
struct TaggedModel {
    name: String,
}

impl OllamaEmbedder {
    pub fn new(cfg: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            client: http_client(cfg)?,
            endpoint: cfg.endpoint.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            dimensions: cfg.dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                model: &self.model,
                prompt: text,
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

        if result.embedding.is_empty() {
            bail!("empty embedding returned");
        }

        Ok(result.embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            let embedding = self
                .embed(text)
                .await
                .with_context(|| format!("failed to embed text {i}"))?;
            results.push(embedding);
        }
        Ok(results)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "ollama",
            model: self.model.clone(),
            dimensions: self.dimensions,
        }
    }

    async fn health(&self) -> Result<()> {
        let url = format!("{}/api/tags", self.endpoint);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("ollama health check failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("ollama returned status {status}");
        }

        let tags: TagsResponse = response
            .json()
            .await
            .context("failed to decode tags response")?;

        if !model_available(&self.model, &tags.models) {
            bail!(
                "model {} not found in ollama, run: ollama pull {}",
                self.model,
                self.model
            );
        }

        Ok(())
    }
}

fn model_available(model: &str, tagged: &[TaggedModel]) -> bool {
    tagged
        .iter()
        .any(|m| m.name == model || m.name == format!("{model}:latest"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(names: &[&str]) -> Vec<TaggedModel> {
        names
            .iter()
            .map(|n| TaggedModel {
                name: n.to_string(),
            })
            .collect()
    }

    #[test]
    fn model_matching_accepts_latest_tag() {
        let models = tagged(&["nomic-embed-text:latest", "llama3:8b"]);
        assert!(model_available("nomic-embed-text", &models));
        assert!(model_available("llama3:8b", &models));
        assert!(!model_available("mxbai-embed-large", &models));
    }

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let cfg = EmbeddingConfig {
            endpoint: "http://localhost:11434/".to_string(),
            ..EmbeddingConfig::default()
        };
        let embedder = OllamaEmbedder::new(&cfg).unwrap();
        assert_eq!(embedder.endpoint, "http://localhost:11434");
    }

    #[test]
    fn model_info_reports_configuration() {
        let cfg = EmbeddingConfig {
            model: "nomic-embed-text".to_string(),
            dimensions: 768,
            ..EmbeddingConfig::default()
        };
        let info = OllamaEmbedder::new(&cfg).unwrap().model_info();
        assert_eq!(info.provider, "ollama");
        assert_eq!(info.model, "nomic-embed-text");
        assert_eq!(info.dimensions, 768);
    }
}
