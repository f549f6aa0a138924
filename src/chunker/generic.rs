//! Fixed-size chunking for file types without a dedicated strategy.
//!
//! Accumulates lines until the next one would push the chunk past
//! `max_tokens`, then emits and resets; a trailing chunk carries the
//! remainder. Files that fit under `max_tokens` become a single
//! file-level chunk.

use super::symbols::file_chunk;
use super::{
    chunk_id, estimate_tokens, extract_lines, hash_content, Chunk, Chunker, ChunkingConfig,
    FileMetadata,
};
use anyhow::Result;
use std::path::Path;

/// Fixed-size chunker for any text file.
pub struct GenericChunker {
    config: ChunkingConfig,
}

impl GenericChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    fn fragment(
        &self,
        lines: &[&str],
        start_line: usize,
        end_line: usize,
        metadata: &FileMetadata,
    ) -> Chunk {
        let content = extract_lines(lines, start_line, end_line);
        let content_hash = hash_content(&content);
        let symbol = file_stem(&metadata.file_path);

        Chunk {
            id: chunk_id(&metadata.project_id, &metadata.file_path, &symbol, &content_hash),
            content: content.clone(),
            symbol,
            symbol_type: "fragment".to_string(),
            start_line,
            end_line,
            token_count: estimate_tokens(&content),
            content_hash,
            file_path: metadata.file_path.clone(),
            language: metadata.language.clone(),
            module: metadata.module.clone(),
            project_id: metadata.project_id.clone(),
        }
    }
}

impl Chunker for GenericChunker {
    fn chunk(&self, content: &[u8], metadata: &FileMetadata) -> Result<Vec<Chunk>> {
        let source = String::from_utf8_lossy(content);

        if estimate_tokens(&source) <= self.config.max_tokens {
            let symbol = Path::new(&metadata.file_path)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| metadata.file_path.clone());
            return Ok(file_chunk(&source, &symbol, metadata, &metadata.language));
        }

        let lines: Vec<&str> = source.split('\n').collect();
        let mut chunks = Vec::new();
        let mut start_line = 1usize;
        let mut current_tokens = 0usize;
        let mut have_lines = false;

        for (i, line) in lines.iter().enumerate() {
            let line_tokens = estimate_tokens(line);

            if have_lines && current_tokens + line_tokens > self.config.max_tokens {
                chunks.push(self.fragment(&lines, start_line, i, metadata));
                start_line = i + 1;
                current_tokens = line_tokens;
            } else {
                current_tokens += line_tokens;
                have_lines = true;
            }
        }

        if start_line <= lines.len() {
            chunks.push(self.fragment(&lines, start_line, lines.len(), metadata));
        }

        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

fn file_stem(file_path: &str) -> String {
    Path::new(file_path)
        .file_stem()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| file_path.to_string())
}
