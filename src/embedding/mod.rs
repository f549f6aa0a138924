//! Pluggable text-embedding providers.
//!
//! Every provider satisfies the same contract: single-text `embed`,
//! order-preserving `embed_batch`, a cheap `health` probe, and model
//! metadata. A tag in the configuration selects the implementation.

mod huggingface;
mod ollama;
mod openai;

pub use huggingface::HuggingFaceEmbedder;
pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;

use crate::config::{EmbeddingConfig, EmbeddingProviderKind};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Metadata about an embedding model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub provider: &'static str,
    pub model: String,
    pub dimensions: usize,
}

/// Contract shared by all embedding providers.
///
/// `embed_batch` preserves one-to-one positional alignment with its input;
/// vectors from a single provider/model are of constant length equal to
/// the configured dimensions. Instances release their resources on drop.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Information about the configured model.
    fn model_info(&self) -> ModelInfo;

    /// Cheap availability probe covering transport and, where the API
    /// exposes it, model availability.
    async fn health(&self) -> Result<()>;
}

/// Create an embedding provider from configuration.
pub fn create_provider(cfg: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match cfg.provider {
        EmbeddingProviderKind::Ollama => Arc::new(OllamaEmbedder::new(cfg)?),
        EmbeddingProviderKind::Openai => Arc::new(OpenAiEmbedder::new(cfg)?),
        EmbeddingProviderKind::Huggingface => Arc::new(HuggingFaceEmbedder::new(cfg)?),
    };
    Ok(provider)
}

pub(crate) fn http_client(cfg: &EmbeddingConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(cfg.timeout())
        .build()
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmbeddingProviderKind;

    #[test]
    fn factory_builds_each_provider() {
        let mut cfg = EmbeddingConfig {
            endpoint: "http://localhost:11434".to_string(),
            ..EmbeddingConfig::default()
        };

        cfg.provider = EmbeddingProviderKind::Ollama;
        assert_eq!(
            create_provider(&cfg).unwrap().model_info().provider,
            "ollama"
        );

        cfg.provider = EmbeddingProviderKind::Huggingface;
        assert_eq!(
            create_provider(&cfg).unwrap().model_info().provider,
            "huggingface"
        );
    }

    #[test]
    fn openai_requires_api_key() {
        let cfg = EmbeddingConfig {
            provider: EmbeddingProviderKind::Openai,
            api_key_env: Some("CODERAG_TEST_MISSING_KEY".to_string()),
            ..EmbeddingConfig::default()
        };
        assert!(create_provider(&cfg).is_err());
    }
}
