//! Hugging Face Inference API embedding provider.
//!
//! Uses the feature-extraction pipeline, which is batch-native: the
//! request carries every input and the response is one vector per input,
//! already in order.

use super::{http_client, EmbeddingProvider, ModelInfo};
use crate::config::EmbeddingConfig;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;

pub struct HuggingFaceEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
}

impl HuggingFaceEmbedder {
    pub fn new(cfg: &EmbeddingConfig) -> Result<Self> {
        let endpoint = cfg.endpoint.trim_end_matches('/');
        Ok(Self {
            client: http_client(cfg)?,
            url: format!("{endpoint}/pipeline/feature-extraction/{}", cfg.model),
            model: cfg.model.clone(),
            api_key: cfg.api_key(),
            dimensions: cfg.dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut results = self.embed_batch(&[text.to_string()]).await?;
        results.pop().context("no embedding returned")
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self.client.post(&self.url).json(&EmbedRequest { inputs: texts });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.context("embedding request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("embedding request failed with status {status}: {body}");
        }

        let vectors: Vec<Vec<f32>> = response
            .json()
            .await
            .context("failed to decode embedding response")?;

        if vectors.len() != texts.len() {
            bail!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            );
        }

        Ok(vectors)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            provider: "huggingface",
            model: self.model.clone(),
            dimensions: self.dimensions,
        }
    }

    async fn health(&self) -> Result<()> {
        self.embed("ping")
            .await
            .context("huggingface health check failed")?;
        Ok(())
    }
}
