//! Per-project configuration.
//!
//! Each indexed project has its own YAML file in the project config
//! directory, naming its source path, the file extensions to index, paths
//! to exclude, and chunking overrides.

use crate::chunker::ChunkingConfig;
use crate::error::ConfigError;
use anyhow::Result;
use globset::Glob;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Configuration for a single indexed project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Unique identifier (lowercase letters, digits, hyphens)
    pub project_id: String,

    /// Human-readable name; defaults to the project id
    #[serde(default)]
    pub display_name: String,

    /// Source path relative to the global source base path
    pub source_path: PathBuf,

    /// File extensions to index, e.g. [".go", ".md"]
    #[serde(default)]
    pub include_extensions: Vec<String>,

    /// Paths and patterns excluded from indexing
    #[serde(default)]
    pub exclude_paths: Vec<String>,

    /// Chunking overrides
    #[serde(default)]
    pub chunking: ProjectChunking,

    /// Free-form metadata carried for filtering and display
    #[serde(default)]
    pub metadata: HashMap<String, serde_yaml::Value>,
}

/// Project-level chunking settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectChunking {
    #[serde(default)]
    pub code: CodeChunking,

    #[serde(default)]
    pub markdown: MarkdownChunking,

    /// Optional token overrides on top of the global chunking config
    #[serde(default)]
    pub min_tokens: Option<usize>,

    #[serde(default)]
    pub ideal_tokens: Option<usize>,

    #[serde(default)]
    pub max_tokens: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CodeChunking {
    #[serde(default)]
    pub strategy: CodeStrategy,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MarkdownChunking {
    #[serde(default)]
    pub strategy: MarkdownStrategy,
}

/// Chunking strategy for code files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeStrategy {
    #[default]
    Function,
    File,
    Fixed,
}

/// Chunking strategy for markdown files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkdownStrategy {
    #[default]
    Heading,
    Paragraph,
    Fixed,
}

fn default_exclude_paths() -> Vec<String> {
    vec![
        ".git/".to_string(),
        "vendor/".to_string(),
        "node_modules/".to_string(),
        "target/".to_string(),
    ]
}

impl ProjectConfig {
    /// Absolute path of this project's source tree.
    pub fn full_source_path(&self, base: &Path) -> PathBuf {
        base.join(&self.source_path)
    }

    /// Whether a file should be indexed, by extension.
    pub fn should_include_file(&self, path: &str) -> bool {
        let ext = Path::new(path)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();

        self.include_extensions
            .iter()
            .any(|e| e.to_lowercase() == ext)
    }

    /// Whether a relative path matches any exclusion.
    ///
    /// An exclusion matches as a path prefix, as a basename glob, or — when
    /// it ends with `/` — as a path component anywhere in the path.
    pub fn should_exclude_path(&self, rel_path: &str) -> bool {
        let basename = Path::new(rel_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        self.exclude_paths.iter().any(|pattern| {
            if rel_path.starts_with(pattern.as_str()) {
                return true;
            }

            if let Ok(glob) = Glob::new(pattern) {
                if glob.compile_matcher().is_match(&basename) {
                    return true;
                }
            }

            pattern.ends_with('/') && rel_path.contains(pattern.as_str())
        })
    }

    /// Chunking config with this project's overrides applied on top of the
    /// global defaults.
    pub fn effective_chunking(&self, global: ChunkingConfig) -> ChunkingConfig {
        let mut cfg = global;
        if let Some(min) = self.chunking.min_tokens {
            cfg.min_tokens = min;
        }
        if let Some(ideal) = self.chunking.ideal_tokens {
            cfg.ideal_tokens = ideal;
        }
        if let Some(max) = self.chunking.max_tokens {
            cfg.max_tokens = max;
        }
        cfg
    }

    pub fn validate(&self) -> Result<()> {
        if self.project_id.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "project_id".to_string(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }

        let valid_id = self
            .project_id
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !valid_id {
            return Err(ConfigError::InvalidValue {
                key: "project_id".to_string(),
                reason: format!(
                    "'{}' may contain only lowercase letters, digits, and hyphens",
                    self.project_id
                ),
            }
            .into());
        }

        if self.source_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "source_path".to_string(),
                reason: "must not be empty".to_string(),
            }
            .into());
        }

        if self.include_extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "include_extensions".to_string(),
                reason: "at least one extension is required".to_string(),
            }
            .into());
        }

        Ok(())
    }

    fn apply_defaults(&mut self) {
        if self.display_name.is_empty() {
            self.display_name = self.project_id.clone();
        }
        if self.exclude_paths.is_empty() {
            self.exclude_paths = default_exclude_paths();
        }
    }
}

/// Load one project configuration file.
pub fn load_project_config(path: &Path) -> Result<ProjectConfig> {
    let data = std::fs::read_to_string(path).map_err(|e| ConfigError::InvalidProject {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut config: ProjectConfig =
        serde_yaml::from_str(&data).map_err(|e| ConfigError::InvalidProject {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

    config.apply_defaults();
    config.validate().map_err(|e| ConfigError::InvalidProject {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    Ok(config)
}

/// Load every project configuration in a directory, keyed by project id.
pub fn load_all_projects(config_dir: &Path) -> Result<HashMap<String, ProjectConfig>> {
    let mut projects = HashMap::new();

    let entries = std::fs::read_dir(config_dir).map_err(|e| ConfigError::ReadFailed {
        path: config_dir.display().to_string(),
        reason: e.to_string(),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::ReadFailed {
            path: config_dir.display().to_string(),
            reason: e.to_string(),
        })?;
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        let is_yaml = path
            .extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml");
        if !is_yaml {
            continue;
        }

        let config = load_project_config(&path)?;
        projects.insert(config.project_id.clone(), config);
    }

    Ok(projects)
}

/// Load one project by id, trying the conventional file names first.
pub fn get_project(config_dir: &Path, project_id: &str) -> Result<ProjectConfig> {
    for name in [
        format!("{project_id}.yaml"),
        format!("{project_id}.yml"),
    ] {
        let path = config_dir.join(name);
        if path.exists() {
            return load_project_config(&path);
        }
    }

    // Fall back to scanning for a file whose project_id matches.
    let projects = load_all_projects(config_dir)?;
    projects
        .get(project_id)
        .cloned()
        .ok_or_else(|| ConfigError::ProjectNotFound(project_id.to_string()).into())
}
