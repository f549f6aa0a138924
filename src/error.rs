/// Centralized error types for coderag using thiserror
///
/// Fatal configuration problems get precise, typed messages; pipeline
/// plumbing uses `anyhow` with context and converts from these at module
/// boundaries.
use thiserror::Error;

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("failed to parse config file '{path}': {reason}")]
    ParseFailed { path: String, reason: String },

    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("project not found: {0}")]
    ProjectNotFound(String),

    #[error("invalid project config '{path}': {reason}")]
    InvalidProject { path: String, reason: String },
}

/// Errors raised by provider factories
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{kind} provider '{provider}' is not implemented")]
    NotImplemented { kind: &'static str, provider: String },

    #[error("API key environment variable '{env}' is not set")]
    MissingApiKey { env: String },
}

/// Errors raised by the per-project index cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("failed to load cache from '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("failed to save cache to '{path}': {reason}")]
    SaveFailed { path: String, reason: String },
}

/// Errors raised by the indexing pipeline
#[derive(Error, Debug)]
pub enum IndexingError {
    #[error("source directory not found: {0}")]
    SourceNotFound(String),

    #[error("indexing was cancelled")]
    Cancelled,

    #[error("embedding batch {start}..{end} failed: {reason}")]
    EmbedBatchFailed {
        start: usize,
        end: usize,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::InvalidValue {
            key: "server.port".to_string(),
            reason: "must be between 1 and 65535".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid configuration value for 'server.port': must be between 1 and 65535"
        );
    }

    #[test]
    fn provider_error_display() {
        let err = ProviderError::NotImplemented {
            kind: "vector store",
            provider: "milvus".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "vector store provider 'milvus' is not implemented"
        );
    }

    #[test]
    fn indexing_error_cancelled() {
        assert_eq!(
            IndexingError::Cancelled.to_string(),
            "indexing was cancelled"
        );
    }

    #[test]
    fn errors_convert_to_anyhow() {
        fn takes_anyhow(_: anyhow::Error) {}
        takes_anyhow(
            CacheError::LoadFailed {
                path: "/tmp/x.json".to_string(),
                reason: "permission denied".to_string(),
            }
            .into(),
        );
    }
}
