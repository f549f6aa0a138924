//! Configuration loading and management.
//!
//! The global configuration is a YAML file (path from `CONFIG_PATH`,
//! default `configs/config.yaml`); per-project configs live in their own
//! directory. A `ConfigManager` holds the current config behind a
//! reader/writer lock so the retrieval service can hot-reload on SIGHUP.

pub mod project;

use crate::chunker::ChunkingConfig;
use crate::error::ConfigError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub vectordb: VectorDbConfig,

    #[serde(default)]
    pub projects: ProjectsConfig,

    #[serde(default)]
    pub chunking: ChunkingConfig,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Supported embedding providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    Ollama,
    Openai,
    Huggingface,
}

impl std::fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ollama => "ollama",
            Self::Openai => "openai",
            Self::Huggingface => "huggingface",
        };
        f.write_str(s)
    }
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider: ollama | openai | huggingface
    #[serde(default = "default_embedding_provider")]
    pub provider: EmbeddingProviderKind,

    /// Model name (varies by provider)
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Provider endpoint URL
    #[serde(default = "default_embedding_endpoint")]
    pub endpoint: String,

    /// Vector dimensions; must match the model output
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Batch size for bulk embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Request timeout, Go-style duration string
    #[serde(default = "default_timeout_str")]
    pub timeout: String,

    /// Environment variable holding the API key, for providers that need one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(30))
    }

    /// Resolve the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|env| std::env::var(env).ok())
            .filter(|k| !k.is_empty())
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: default_embedding_model(),
            endpoint: default_embedding_endpoint(),
            dimensions: default_dimensions(),
            batch_size: default_batch_size(),
            timeout: default_timeout_str(),
            api_key_env: None,
        }
    }
}

/// Supported vector store providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorDbProviderKind {
    Qdrant,
    Milvus,
    Weaviate,
}

impl std::fmt::Display for VectorDbProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Qdrant => "qdrant",
            Self::Milvus => "milvus",
            Self::Weaviate => "weaviate",
        };
        f.write_str(s)
    }
}

/// Vector database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDbConfig {
    /// Provider: qdrant | milvus | weaviate
    #[serde(default = "default_vectordb_provider")]
    pub provider: VectorDbProviderKind,

    /// Provider endpoint URL
    #[serde(default = "default_vectordb_endpoint")]
    pub endpoint: String,

    /// Collection name for stored vectors
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Request timeout, Go-style duration string
    #[serde(default = "default_timeout_str")]
    pub timeout: String,
}

impl VectorDbConfig {
    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(30))
    }
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            provider: default_vectordb_provider(),
            endpoint: default_vectordb_endpoint(),
            collection_name: default_collection_name(),
            timeout: default_timeout_str(),
        }
    }
}

/// Project discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectsConfig {
    /// Directory holding per-project YAML configs
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,

    /// Base path under which project sources are mounted
    #[serde(default = "default_source_base_path")]
    pub source_base_path: PathBuf,
}

impl Default for ProjectsConfig {
    fn default() -> Self {
        Self {
            config_dir: default_config_dir(),
            source_base_path: default_source_base_path(),
        }
    }
}

/// Index cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Directory for cache files and reports
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,

    /// Cache format; only "json" is supported
    #[serde(default = "default_cache_format")]
    pub format: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            format: default_cache_format(),
        }
    }
}

/// HTTP server settings for the retrieval service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_timeout_str")]
    pub read_timeout: String,

    #[serde(default = "default_timeout_str")]
    pub write_timeout: String,

    #[serde(default = "default_shutdown_timeout_str")]
    pub shutdown_timeout: String,
}

impl ServerConfig {
    pub fn read_timeout(&self) -> Duration {
        parse_duration(&self.read_timeout).unwrap_or(Duration::from_secs(30))
    }

    pub fn write_timeout(&self) -> Duration {
        parse_duration(&self.write_timeout).unwrap_or(Duration::from_secs(30))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        parse_duration(&self.shutdown_timeout).unwrap_or(Duration::from_secs(10))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            read_timeout: default_timeout_str(),
            write_timeout: default_timeout_str(),
            shutdown_timeout: default_shutdown_timeout_str(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Level: debug | info | warn | error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Format: json | text
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_embedding_provider() -> EmbeddingProviderKind {
    EmbeddingProviderKind::Ollama
}

fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_embedding_endpoint() -> String {
    "http://ollama:11434".to_string()
}

fn default_dimensions() -> usize {
    768
}

fn default_batch_size() -> usize {
    32
}

fn default_timeout_str() -> String {
    "30s".to_string()
}

fn default_shutdown_timeout_str() -> String {
    "10s".to_string()
}

fn default_vectordb_provider() -> VectorDbProviderKind {
    VectorDbProviderKind::Qdrant
}

fn default_vectordb_endpoint() -> String {
    "http://qdrant:6334".to_string()
}

fn default_collection_name() -> String {
    "code_chunks".to_string()
}

fn default_config_dir() -> PathBuf {
    PathBuf::from("configs/projects")
}

fn default_source_base_path() -> PathBuf {
    PathBuf::from("/sources")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/index-cache")
}

fn default_cache_format() -> String {
    "json".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Parse a Go-style duration string: `300ms`, `30s`, `5m`, `1h`.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (value, unit) = if let Some(v) = s.strip_suffix("ms") {
        (v, 1u64)
    } else if let Some(v) = s.strip_suffix('s') {
        (v, 1_000)
    } else if let Some(v) = s.strip_suffix('m') {
        (v, 60_000)
    } else if let Some(v) = s.strip_suffix('h') {
        (v, 3_600_000)
    } else {
        return None;
    };
    let value: u64 = value.trim().parse().ok()?;
    Some(Duration::from_millis(value * unit))
}

impl Config {
    /// Load and validate configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut config: Config =
            serde_yaml::from_str(&data).map_err(|e| ConfigError::ParseFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        // SOURCES_PATH points at the host-side bind mount.
        if let Ok(sources) = std::env::var("SOURCES_PATH") {
            if !sources.is_empty() {
                config.projects.source_base_path = PathBuf::from(sources);
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from `CONFIG_PATH` (default `configs/config.yaml`).
    pub fn from_env() -> Result<Self> {
        Self::from_file(&config_path_from_env())
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::InvalidValue {
                key: "embedding.dimensions".to_string(),
                reason: "must be positive".to_string(),
            }
            .into());
        }

        if self.embedding.batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "embedding.batch_size".to_string(),
                reason: "must be positive".to_string(),
            }
            .into());
        }

        if self.chunking.min_tokens >= self.chunking.max_tokens {
            return Err(ConfigError::InvalidValue {
                key: "chunking.min_tokens".to_string(),
                reason: format!(
                    "min_tokens ({}) must be less than max_tokens ({})",
                    self.chunking.min_tokens, self.chunking.max_tokens
                ),
            }
            .into());
        }

        if self.cache.format != "json" {
            return Err(ConfigError::InvalidValue {
                key: "cache.format".to_string(),
                reason: format!("unsupported format '{}', only json", self.cache.format),
            }
            .into());
        }

        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "server.port".to_string(),
                reason: "must be between 1 and 65535".to_string(),
            }
            .into());
        }

        match self.logging.level.as_str() {
            "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "logging.level".to_string(),
                    reason: format!("unknown level '{other}'"),
                }
                .into())
            }
        }

        match self.logging.format.as_str() {
            "json" | "text" => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "logging.format".to_string(),
                    reason: format!("unknown format '{other}'"),
                }
                .into())
            }
        }

        Ok(())
    }
}

/// Resolve the config file path from `CONFIG_PATH`.
pub fn config_path_from_env() -> PathBuf {
    let path = std::env::var("CONFIG_PATH").unwrap_or_default();
    if path.is_empty() {
        PathBuf::from("configs/config.yaml")
    } else {
        PathBuf::from(path)
    }
}

/// Holds the current configuration and supports hot reload.
///
/// Handlers read a cheap `Arc` snapshot; reload re-parses the file and
/// swaps the snapshot under the writer lock.
#[derive(Debug)]
pub struct ConfigManager {
    path: PathBuf,
    current: RwLock<Arc<Config>>,
}

impl ConfigManager {
    /// Load the initial configuration from `path`.
    pub fn load(path: PathBuf) -> Result<Self> {
        let config = Config::from_file(&path)?;
        Ok(Self {
            path,
            current: RwLock::new(Arc::new(config)),
        })
    }

    /// Load from `CONFIG_PATH` (default `configs/config.yaml`).
    pub fn from_env() -> Result<Self> {
        Self::load(config_path_from_env())
    }

    /// Current configuration snapshot.
    pub async fn get(&self) -> Arc<Config> {
        self.current.read().await.clone()
    }

    /// Re-parse the config file and swap it in. Returns the new snapshot;
    /// the previous config stays active when loading fails.
    pub async fn reload(&self) -> Result<Arc<Config>> {
        let config = Arc::new(Config::from_file(&self.path)?);
        *self.current.write().await = config.clone();
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(yaml: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        f.write_all(yaml.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn empty_config_gets_defaults() {
        let f = write_config("{}");
        let cfg = Config::from_file(f.path()).unwrap();

        assert_eq!(cfg.embedding.provider, EmbeddingProviderKind::Ollama);
        assert_eq!(cfg.embedding.model, "nomic-embed-text");
        assert_eq!(cfg.embedding.dimensions, 768);
        assert_eq!(cfg.embedding.batch_size, 32);
        assert_eq!(cfg.vectordb.provider, VectorDbProviderKind::Qdrant);
        assert_eq!(cfg.vectordb.collection_name, "code_chunks");
        assert_eq!(cfg.chunking.min_tokens, 200);
        assert_eq!(cfg.chunking.max_tokens, 800);
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.server.shutdown_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn full_config_parses() {
        let f = write_config(
            r#"
embedding:
  provider: openai
  model: text-embedding-3-small
  endpoint: https://api.openai.com/v1
  dimensions: 1536
  batch_size: 64
  timeout: 45s
  api_key_env: OPENAI_API_KEY
vectordb:
  provider: qdrant
  endpoint: http://localhost:6334
  collection_name: my_chunks
  timeout: 20s
chunking:
  min_tokens: 100
  ideal_tokens: 400
  max_tokens: 900
  merge_small_chunks: false
server:
  port: 9090
  read_timeout: 15s
logging:
  level: debug
  format: text
"#,
        );
        let cfg = Config::from_file(f.path()).unwrap();

        assert_eq!(cfg.embedding.provider, EmbeddingProviderKind::Openai);
        assert_eq!(cfg.embedding.dimensions, 1536);
        assert_eq!(cfg.embedding.timeout(), Duration::from_secs(45));
        assert_eq!(cfg.vectordb.collection_name, "my_chunks");
        assert!(!cfg.chunking.merge_small_chunks);
        assert_eq!(cfg.server.port, 9090);
        assert_eq!(cfg.server.read_timeout(), Duration::from_secs(15));
        assert_eq!(cfg.logging.format, "text");
    }

    #[test]
    fn unknown_embedding_provider_rejected() {
        let f = write_config("embedding:\n  provider: cohere\n");
        assert!(Config::from_file(f.path()).is_err());
    }

    #[test]
    fn unknown_vectordb_provider_rejected() {
        let f = write_config("vectordb:\n  provider: pinecone\n");
        assert!(Config::from_file(f.path()).is_err());
    }

    #[test]
    fn min_tokens_must_be_below_max() {
        let f = write_config("chunking:\n  min_tokens: 800\n  max_tokens: 800\n");
        let err = Config::from_file(f.path()).unwrap_err();
        assert!(err.to_string().contains("min_tokens"));
    }

    #[test]
    fn zero_port_rejected() {
        let f = write_config("server:\n  port: 0\n");
        assert!(Config::from_file(f.path()).is_err());
    }

    #[test]
    fn bad_log_level_rejected() {
        let f = write_config("logging:\n  level: verbose\n");
        assert!(Config::from_file(f.path()).is_err());
    }

    #[test]
    fn duration_parsing() {
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("nope"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn bad_duration_falls_back_to_default() {
        let f = write_config("embedding:\n  timeout: forever\n");
        let cfg = Config::from_file(f.path()).unwrap();
        assert_eq!(cfg.embedding.timeout(), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn manager_reload_swaps_config() {
        let f = write_config("server:\n  port: 8081\n");
        let manager = ConfigManager::load(f.path().to_path_buf()).unwrap();
        assert_eq!(manager.get().await.server.port, 8081);

        std::fs::write(f.path(), "server:\n  port: 8082\n").unwrap();
        manager.reload().await.unwrap();
        assert_eq!(manager.get().await.server.port, 8082);
    }

    #[tokio::test]
    async fn manager_keeps_old_config_on_bad_reload() {
        let f = write_config("server:\n  port: 8081\n");
        let manager = ConfigManager::load(f.path().to_path_buf()).unwrap();

        std::fs::write(f.path(), "server:\n  port: 0\n").unwrap();
        assert!(manager.reload().await.is_err());
        assert_eq!(manager.get().await.server.port, 8081);
    }
}
