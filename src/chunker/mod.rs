//! Chunking strategies for source code and documentation
//!
//! Splits files into self-contained, deterministically identified pieces
//! suitable for embedding and retrieval. One chunker per strategy; dispatch
//! is by file extension with per-project strategy overrides.

mod code;
mod generic;
mod markdown;
mod php;
mod symbols;
mod typescript;

pub use code::AstChunker;
pub use generic::GenericChunker;
pub use markdown::MarkdownChunker;
pub use php::PhpChunker;
pub use typescript::TypeScriptChunker;

use crate::config::project::{CodeStrategy, MarkdownStrategy, ProjectConfig};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Information about the file being chunked, carried into every chunk.
#[derive(Debug, Clone, Default)]
pub struct FileMetadata {
    /// Relative file path within the project
    pub file_path: String,
    /// Language tag (e.g. "rust", "markdown")
    pub language: String,
    /// Module name derived from the parent directory
    pub module: String,
    /// Project identifier
    pub project_id: String,
}

/// A single chunk of code or documentation.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Deterministic identifier: `{project}:{path}:{symbol}:{hash8}`
    pub id: String,
    /// The raw text fragment
    pub content: String,
    /// Symbol name (function, struct, heading, ...)
    pub symbol: String,
    /// Symbol kind (function, method, struct, heading, file, ...)
    pub symbol_type: String,
    /// Start line in the source file (1-indexed, inclusive)
    pub start_line: usize,
    /// End line in the source file (1-indexed, inclusive)
    pub end_line: usize,
    /// Estimated token count
    pub token_count: usize,
    /// SHA-256 of `content`, used for change detection
    pub content_hash: String,
    pub file_path: String,
    pub language: String,
    pub module: String,
    pub project_id: String,
}

/// Chunking parameters, settable globally and overridable per project.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Minimum tokens per chunk; smaller chunks are merged
    #[serde(default = "default_min_tokens")]
    pub min_tokens: usize,

    /// Ideal chunk size in tokens
    #[serde(default = "default_ideal_tokens")]
    pub ideal_tokens: usize,

    /// Maximum tokens per chunk
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Whether undersized chunks are merged into neighbours
    #[serde(default = "default_merge_small_chunks")]
    pub merge_small_chunks: bool,
}

fn default_min_tokens() -> usize {
    200
}

fn default_ideal_tokens() -> usize {
    500
}

fn default_max_tokens() -> usize {
    800
}

fn default_merge_small_chunks() -> bool {
    true
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_tokens: default_min_tokens(),
            ideal_tokens: default_ideal_tokens(),
            max_tokens: default_max_tokens(),
            merge_small_chunks: default_merge_small_chunks(),
        }
    }
}

/// Contract shared by every chunking strategy.
///
/// Identical `(content, metadata, configuration)` must produce identical
/// output, in source order, with non-overlapping line ranges.
pub trait Chunker: Send + Sync {
    /// Split content into chunks with metadata.
    fn chunk(&self, content: &[u8], metadata: &FileMetadata) -> Result<Vec<Chunk>>;

    /// Strategy name for logging.
    fn name(&self) -> &'static str;
}

/// Creates the appropriate chunker for each file, honouring per-project
/// strategy overrides.
pub struct ChunkerFactory {
    rust: AstChunker,
    go: AstChunker,
    typescript: TypeScriptChunker,
    php: PhpChunker,
    markdown: MarkdownChunker,
    generic: GenericChunker,
    code_strategy: CodeStrategy,
    markdown_strategy: MarkdownStrategy,
}

impl ChunkerFactory {
    pub fn new(cfg: ChunkingConfig) -> Self {
        Self::with_strategies(cfg, CodeStrategy::Function, MarkdownStrategy::Heading)
    }

    pub fn with_strategies(
        cfg: ChunkingConfig,
        code_strategy: CodeStrategy,
        markdown_strategy: MarkdownStrategy,
    ) -> Self {
        Self {
            rust: AstChunker::rust(cfg),
            go: AstChunker::go(cfg),
            typescript: TypeScriptChunker::new(cfg),
            php: PhpChunker::new(cfg),
            markdown: MarkdownChunker::new(cfg),
            generic: GenericChunker::new(cfg),
            code_strategy,
            markdown_strategy,
        }
    }

    /// Build a factory for a project, applying its chunking overrides on
    /// top of the global defaults.
    pub fn for_project(global: ChunkingConfig, project: &ProjectConfig) -> Self {
        Self::with_strategies(
            project.effective_chunking(global),
            project.chunking.code.strategy,
            project.chunking.markdown.strategy,
        )
    }

    /// Select a chunker by file extension.
    pub fn chunker_for(&self, file_path: &str) -> &dyn Chunker {
        let ext = extension_of(file_path);
        match ext.as_str() {
            "rs" | "go" => {
                if self.code_strategy == CodeStrategy::Function {
                    if ext == "rs" {
                        &self.rust
                    } else {
                        &self.go
                    }
                } else {
                    &self.generic
                }
            }
            "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" => {
                if self.code_strategy == CodeStrategy::Function {
                    &self.typescript
                } else {
                    &self.generic
                }
            }
            "php" => {
                if self.code_strategy == CodeStrategy::Function {
                    &self.php
                } else {
                    &self.generic
                }
            }
            "md" | "markdown" => match self.markdown_strategy {
                MarkdownStrategy::Fixed => &self.generic,
                // Paragraph strategy is accepted in config but splits at
                // headings.
                MarkdownStrategy::Heading | MarkdownStrategy::Paragraph => &self.markdown,
            },
            _ => &self.generic,
        }
    }
}

/// Create a deterministic chunk identifier.
///
/// Format: `{project_id}:{file_path}:{symbol}:{content_hash_prefix}` with
/// the symbol sanitized so the id stays colon-delimited.
pub fn chunk_id(project_id: &str, file_path: &str, symbol: &str, content_hash: &str) -> String {
    let hash_prefix = if content_hash.len() > 8 {
        &content_hash[..8]
    } else {
        content_hash
    };

    let symbol_part = if symbol.is_empty() {
        "_".to_string()
    } else {
        symbol.replace(':', "_")
    };

    format!("{project_id}:{file_path}:{symbol_part}:{hash_prefix}")
}

/// SHA-256 hash of content as lowercase hex.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Rough token count estimate: ~4 characters per token works reasonably
/// well for code.
pub fn estimate_tokens(content: &str) -> usize {
    content.len() / 4
}

/// Detect the language tag from a file extension.
pub fn detect_language(file_path: &str) -> String {
    let lang = match extension_of(file_path).as_str() {
        "rs" => "rust",
        "go" => "go",
        "md" | "markdown" => "markdown",
        "py" => "python",
        "js" | "mjs" | "cjs" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "java" => "java",
        "rb" => "ruby",
        "php" => "php",
        "c" | "h" => "c",
        "cpp" | "hpp" | "cc" | "hh" => "cpp",
        "cs" => "csharp",
        "swift" => "swift",
        "kt" => "kotlin",
        "scala" => "scala",
        "sql" => "sql",
        "sh" | "bash" | "zsh" => "shell",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "xml" => "xml",
        "html" => "html",
        "css" => "css",
        "scss" => "scss",
        "less" => "less",
        "vue" => "vue",
        "svelte" => "svelte",
        _ => "text",
    };
    lang.to_string()
}

/// Derive the module tag from a file path: the basename of the parent
/// directory, or empty for top-level files.
pub fn extract_module(file_path: &str) -> String {
    Path::new(file_path)
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn extension_of(file_path: &str) -> String {
    Path::new(file_path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// Extract lines `start..=end` (1-indexed, inclusive) joined with newlines.
pub(crate) fn extract_lines(lines: &[&str], start: usize, end: usize) -> String {
    let start = start.max(1);
    let end = end.min(lines.len());
    if start > end {
        return String::new();
    }
    lines[start - 1..end].join("\n")
}
